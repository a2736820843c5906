use crate::value::CellValue;

/// BLOBs shorter than this are assumed not to be photographs.
pub const MIN_IMAGE_BLOB_LEN: usize = 100;

const IMAGE_COLUMN_KEYWORDS: [&str; 7] = [
    "photo",
    "image",
    "img",
    "picture",
    "pic",
    "фото",
    "изображение",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl ImageFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }
}

/// Matches the leading magic bytes only; nothing is decoded.
#[must_use]
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"\x89PNG") {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else {
        None
    }
}

#[must_use]
pub fn is_displayable_image_bytes(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_IMAGE_BLOB_LEN && detect_image_format(bytes).is_some()
}

#[must_use]
pub fn is_displayable_image(value: &CellValue) -> bool {
    value.as_blob().is_some_and(is_displayable_image_bytes)
}

/// Type-based and name-based checks are additive. The name check happily
/// flags text columns such as `picture_caption`.
#[must_use]
pub fn is_image_column(column_name: &str, declared_type: Option<&str>) -> bool {
    if declared_type.is_some_and(|declared| declared.trim().eq_ignore_ascii_case("BLOB")) {
        return true;
    }

    let lowered = column_name.to_lowercase();
    IMAGE_COLUMN_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}
