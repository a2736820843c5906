use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use tabula_core::export::{CodecError, DecodedImage, ImageCodec};

/// Image decoding and PNG encoding backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        let decoded = image::load_from_memory(bytes).map_err(|error| CodecError::new(error.to_string()))?;
        let rgba = decoded.to_rgba8();
        Ok(DecodedImage {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }

    fn thumbnail(&self, image: &DecodedImage, max_edge: u32) -> DecodedImage {
        if image.width <= max_edge && image.height <= max_edge {
            return image.clone();
        }
        let Some(buffer) = RgbaImage::from_raw(image.width, image.height, image.rgba.clone()) else {
            return image.clone();
        };

        let (width, height) = fit_within(image.width, image.height, max_edge);
        let resized = imageops::resize(&buffer, width, height, FilterType::Lanczos3);
        DecodedImage {
            width,
            height,
            rgba: resized.into_raw(),
        }
    }

    fn encode_png(&self, image: &DecodedImage) -> Result<Vec<u8>, CodecError> {
        let mut encoded = Vec::new();
        PngEncoder::new(&mut encoded)
            .write_image(&image.rgba, image.width, image.height, ColorType::Rgba8)
            .map_err(|error| CodecError::new(error.to_string()))?;
        Ok(encoded)
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let scale = f64::from(max_edge) / f64::from(width.max(height).max(1));
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

/// RGB copy for writers that cannot handle an alpha channel.
pub(crate) fn to_rgb_dynamic(image: &DecodedImage) -> Option<DynamicImage> {
    RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
        .map(|buffer| DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buffer).to_rgb8()))
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::io::Cursor;
    use tabula_core::export::ImageCodec;

    use super::{fit_within, ImageCrateCodec};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::new(width, height))
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("encode fixture");
        bytes.into_inner()
    }

    #[test]
    fn decodes_and_shrinks_preserving_aspect_ratio() {
        let codec = ImageCrateCodec;
        let decoded = codec.decode(&png_bytes(300, 150)).expect("decode");
        assert_eq!((decoded.width, decoded.height), (300, 150));

        let thumbnail = codec.thumbnail(&decoded, 100);
        assert_eq!((thumbnail.width, thumbnail.height), (100, 50));
        assert_eq!(thumbnail.rgba.len(), 100 * 50 * 4);

        let png = codec.encode_png(&thumbnail).expect("encode");
        assert!(png.starts_with(b"\x89PNG"));
    }

    #[test]
    fn small_images_are_not_enlarged() {
        let codec = ImageCrateCodec;
        let decoded = codec.decode(&png_bytes(20, 10)).expect("decode");
        assert_eq!(codec.thumbnail(&decoded, 80), decoded);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let mut bytes = vec![0xFF, 0xD8, 0xFF];
        bytes.resize(150, 0);
        assert!(ImageCrateCodec.decode(&bytes).is_err());
    }

    #[test]
    fn fit_never_collapses_to_zero() {
        assert_eq!(fit_within(1000, 1, 100), (100, 1));
    }
}
