use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rect,
};
use tabula_core::export::{DecodedImage, DocumentWriter, WriterError, PAGE_HEIGHT, PAGE_WIDTH};

use crate::codec::to_rgb_dynamic;

const MM_PER_POINT: f32 = 0.352_778;
const IMAGE_DPI: f32 = 72.0;

fn mm(points: f32) -> Mm {
    Mm(points * MM_PER_POINT)
}

/// Landscape A4 PDF. The document is created with its first page; the
/// configured TrueType font replaces Helvetica when it can be loaded.
pub struct PdfWriter {
    title: String,
    font_path: Option<PathBuf>,
    document: Option<PdfDocumentReference>,
    layer: Option<PdfLayerReference>,
    font: Option<IndirectFontRef>,
    pages: usize,
}

impl PdfWriter {
    #[must_use]
    pub fn new(title: impl Into<String>, font_path: Option<PathBuf>) -> Self {
        Self {
            title: title.into(),
            font_path,
            document: None,
            layer: None,
            font: None,
            pages: 0,
        }
    }

    fn load_font(&self, document: &PdfDocumentReference) -> Result<IndirectFontRef, WriterError> {
        if let Some(path) = &self.font_path {
            match File::open(path).map(|file| document.add_external_font(file)) {
                Ok(Ok(font)) => return Ok(font),
                Ok(Err(error)) => {
                    tracing::warn!(path = %path.display(), %error, "font rejected, using Helvetica");
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "font unavailable, using Helvetica");
                }
            }
        }
        document
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|error| WriterError::new(error.to_string()))
    }

    fn layer(&self) -> Result<&PdfLayerReference, WriterError> {
        self.layer
            .as_ref()
            .ok_or_else(|| WriterError::new("no page started"))
    }
}

impl DocumentWriter for PdfWriter {
    fn new_page(&mut self) -> Result<(), WriterError> {
        self.pages += 1;
        let layer_name = format!("Page {}", self.pages);
        let layer = match &self.document {
            Some(document) => {
                let (page, layer) = document.add_page(mm(PAGE_WIDTH), mm(PAGE_HEIGHT), layer_name);
                document.get_page(page).get_layer(layer)
            }
            None => {
                let (document, page, layer) =
                    PdfDocument::new(&self.title, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), layer_name);
                self.font = Some(self.load_font(&document)?);
                let layer = document.get_page(page).get_layer(layer);
                self.document = Some(document);
                layer
            }
        };
        self.layer = Some(layer);
        Ok(())
    }

    fn draw_text(&mut self, x: f32, y: f32, size: f32, text: &str) -> Result<(), WriterError> {
        let font = self
            .font
            .as_ref()
            .ok_or_else(|| WriterError::new("no font loaded"))?;
        self.layer()?.use_text(text, size, mm(x), mm(y), font);
        Ok(())
    }

    fn draw_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), WriterError> {
        let rect = Rect::new(mm(x), mm(y), mm(x + width), mm(y + height)).with_mode(PaintMode::Stroke);
        self.layer()?.add_rect(rect);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn draw_image(
        &mut self,
        image: &DecodedImage,
        x: f32,
        y: f32,
        max_width: f32,
        max_height: f32,
    ) -> Result<(), WriterError> {
        if image.width == 0 || image.height == 0 {
            return Ok(());
        }
        let dynamic = to_rgb_dynamic(image)
            .ok_or_else(|| WriterError::new("image buffer does not match its size"))?;
        let scale = (max_width / image.width as f32).min(max_height / image.height as f32);

        Image::from_dynamic_image(&dynamic).add_to_layer(
            self.layer()?.clone(),
            ImageTransform {
                translate_x: Some(mm(x)),
                translate_y: Some(mm(y)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..ImageTransform::default()
            },
        );
        Ok(())
    }

    fn finish(&mut self, path: &Path) -> Result<(), WriterError> {
        let document = self
            .document
            .take()
            .ok_or_else(|| WriterError::new("document has no pages"))?;
        self.layer = None;
        let file = File::create(path)
            .map_err(|error| WriterError::new(format!("cannot create {}: {error}", path.display())))?;
        document
            .save(&mut BufWriter::new(file))
            .map_err(|error| WriterError::new(error.to_string()))
    }
}
