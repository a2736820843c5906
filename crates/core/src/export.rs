use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_blob::{detect_image_format, is_displayable_image_bytes};
use crate::query_runner::{QueryRow, ResultSet};
use crate::value::{render_cell, CellValue};

pub const INVALID_IMAGE_TEXT: &str = "[invalid image]";

const COLUMN_WIDTH_CHARS: f64 = 15.0;
const ERROR_DETAIL_CHARS: usize = 30;
const INFO_SHEET: &str = "Info";
const SHEET_NAME_LIMIT: usize = 31;

/// Landscape A4 in points.
pub const PAGE_WIDTH: f32 = 842.0;
pub const PAGE_HEIGHT: f32 = 595.0;
const CELL_WIDTH: f32 = 120.0;
const CELL_HEIGHT: f32 = 100.0;
const HEADER_HEIGHT: f32 = 20.0;
const CELL_PADDING: f32 = 2.0;
const GRID_LEFT: f32 = 50.0;
const GRID_TOP: f32 = 450.0;
const BOTTOM_MARGIN: f32 = 50.0;
const TITLE_Y: f32 = 520.0;
const CELL_TEXT_CHARS: usize = 20;
const HEADER_TEXT_CHARS: usize = 15;
const SAFE_TEXT_CHARS: usize = 30;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write `{}`: {source}; choose a writable directory", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("export writer failed: {0}")]
    Writer(#[from] WriterError),
    #[error("failed to serialize JSON export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no data to export")]
    NothingToExport,
}

impl ExportError {
    pub fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CodecError {
    message: String,
}

impl CodecError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WriterError {
    message: String,
}

impl WriterError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl ThumbnailSize {
    #[must_use]
    pub fn pixels(self) -> u32 {
        match self {
            Self::Small => 80,
            Self::Medium => 100,
            Self::Large => 150,
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Small => Self::Medium,
            Self::Medium => Self::Large,
            Self::Large => Self::Small,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub include_images: bool,
    pub save_images_as_files: bool,
    pub thumbnail_size: ThumbnailSize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            include_images: true,
            save_images_as_files: false,
            thumbnail_size: ThumbnailSize::default(),
        }
    }
}

/// A query result ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub title: String,
    pub database_name: String,
    pub headers: Vec<String>,
    /// One flag per header.
    pub image_columns: Vec<bool>,
    pub rows: Vec<QueryRow>,
}

impl ExportTable {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        database_name: impl Into<String>,
        result: &ResultSet,
        image_columns: Vec<bool>,
    ) -> Self {
        Self {
            title: title.into(),
            database_name: database_name.into(),
            headers: result.columns.clone(),
            image_columns,
            rows: result.rows.clone(),
        }
    }

    #[must_use]
    pub fn is_image_column(&self, column: usize) -> bool {
        self.image_columns.get(column).copied().unwrap_or(false)
    }

    /// Rows as grid text, the way the table view shows them.
    #[must_use]
    pub fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.values
                    .iter()
                    .enumerate()
                    .map(|(column, value)| render_cell(value, self.is_image_column(column)))
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportReport {
    pub rows: usize,
    pub columns: usize,
    pub embedded_images: usize,
    pub invalid_images: usize,
    pub failed_images: usize,
    pub saved_files: Vec<PathBuf>,
    pub pages: usize,
}

/// RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub trait ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError>;

    /// Scales down to fit a `max_edge` square, keeping the aspect ratio.
    fn thumbnail(&self, image: &DecodedImage, max_edge: u32) -> DecodedImage;

    fn encode_png(&self, image: &DecodedImage) -> Result<Vec<u8>, CodecError>;
}

/// Workbook sink. Rows and columns are zero-based; writes go to the sheet
/// added last.
pub trait SpreadsheetWriter {
    fn add_sheet(&mut self, name: &str) -> Result<(), WriterError>;
    fn write_text(&mut self, row: u32, column: u16, text: &str) -> Result<(), WriterError>;
    fn embed_image(
        &mut self,
        row: u32,
        column: u16,
        png_path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), WriterError>;
    fn set_column_width(&mut self, column: u16, width: f64) -> Result<(), WriterError>;
    fn set_row_height(&mut self, row: u32, height: f64) -> Result<(), WriterError>;
    fn finish(&mut self, path: &Path) -> Result<(), WriterError>;
}

/// Page sink measured in points with the origin at the bottom-left corner.
pub trait DocumentWriter {
    fn new_page(&mut self) -> Result<(), WriterError>;
    fn draw_text(&mut self, x: f32, y: f32, size: f32, text: &str) -> Result<(), WriterError>;
    fn draw_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), WriterError>;
    /// Scales `image` to fit the box, keeping the aspect ratio.
    fn draw_image(
        &mut self,
        image: &DecodedImage,
        x: f32,
        y: f32,
        max_width: f32,
        max_height: f32,
    ) -> Result<(), WriterError>;
    fn finish(&mut self, path: &Path) -> Result<(), WriterError>;
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn short_detail(error: &CodecError) -> String {
    error.to_string().chars().take(ERROR_DETAIL_CHARS).collect()
}

fn column_index(column: usize) -> u16 {
    u16::try_from(column).unwrap_or(u16::MAX)
}

fn row_index(row: usize) -> u32 {
    u32::try_from(row).unwrap_or(u32::MAX)
}

/// Makes a table, column or title usable inside a single file name: path
/// separators, characters Windows rejects and control characters become `_`.
#[must_use]
pub fn file_name_part(text: &str) -> String {
    text.chars()
        .map(|ch| {
            let reserved = matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
            if reserved || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

/// Worksheet names are limited to 31 characters and may not contain
/// `[]:*?/\`.
#[must_use]
pub fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|ch| {
            if matches!(ch, '[' | ']' | ':' | '*' | '?' | '/' | '\\') {
                '_'
            } else {
                ch
            }
        })
        .take(SHEET_NAME_LIMIT)
        .collect();
    if cleaned.trim().is_empty() {
        "Data".to_string()
    } else {
        cleaned
    }
}

/// Writes the table to a workbook at `destination`. Image cells are
/// thumbnailed and embedded, or saved next to the workbook when
/// `save_images_as_files` is set. A broken image never aborts the export.
pub fn export_spreadsheet<C, W>(
    table: &ExportTable,
    settings: &ExportSettings,
    codec: &C,
    writer: &mut W,
    destination: &Path,
) -> Result<ExportReport, ExportError>
where
    C: ImageCodec + ?Sized,
    W: SpreadsheetWriter + ?Sized,
{
    let scratch = tempfile::Builder::new()
        .prefix("tabula-export-")
        .tempdir()
        .map_err(ExportError::io(&std::env::temp_dir()))?;
    let save_dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let size = settings.thumbnail_size.pixels();

    let mut report = ExportReport {
        rows: table.rows.len(),
        columns: table.headers.len(),
        ..ExportReport::default()
    };

    writer.add_sheet(&sheet_name(&table.title))?;
    for (column, header) in table.headers.iter().enumerate() {
        writer.write_text(0, column_index(column), header)?;
        writer.set_column_width(column_index(column), COLUMN_WIDTH_CHARS)?;
    }

    for (index, row) in table.rows.iter().enumerate() {
        let sheet_row = row_index(index + 1);
        for (column, value) in row.values.iter().enumerate() {
            let image_column = table.is_image_column(column);
            let sheet_column = column_index(column);
            let bytes = match value {
                CellValue::Blob(bytes) if image_column && settings.include_images => bytes,
                other => {
                    writer.write_text(sheet_row, sheet_column, &render_cell(other, image_column))?;
                    continue;
                }
            };

            if !is_displayable_image_bytes(bytes) {
                report.invalid_images += 1;
                writer.write_text(sheet_row, sheet_column, INVALID_IMAGE_TEXT)?;
                continue;
            }

            if settings.save_images_as_files {
                let extension = detect_image_format(bytes).map_or("png", |format| format.extension());
                let header = table.headers.get(column).map_or("image", String::as_str);
                let file_name = format!(
                    "{}_row{}_{}.{extension}",
                    file_name_part(&table.title),
                    index + 1,
                    file_name_part(header)
                );
                let path = save_dir.join(&file_name);
                fs::write(&path, bytes).map_err(ExportError::io(&path))?;
                writer.write_text(sheet_row, sheet_column, &file_name)?;
                report.saved_files.push(path);
                continue;
            }

            let thumbnail_path = scratch
                .path()
                .join(format!("photo_{sheet_row}_{sheet_column}.png"));
            match thumbnail_png(codec, bytes, size) {
                Ok((png, thumbnail)) => {
                    fs::write(&thumbnail_path, png).map_err(ExportError::io(&thumbnail_path))?;
                    writer.embed_image(
                        sheet_row,
                        sheet_column,
                        &thumbnail_path,
                        thumbnail.width,
                        thumbnail.height,
                    )?;
                    writer.set_row_height(sheet_row, f64::from(size) * 0.75)?;
                    report.embedded_images += 1;
                }
                Err(error) => {
                    tracing::warn!(row = index, column, %error, "image skipped during export");
                    report.failed_images += 1;
                    writer.write_text(
                        sheet_row,
                        sheet_column,
                        &format!("[error: {}]", short_detail(&error)),
                    )?;
                }
            }
        }
    }

    write_info_sheet(table, &report, writer)?;
    writer.finish(destination)?;
    tracing::info!(
        path = %destination.display(),
        rows = report.rows,
        images = report.embedded_images,
        "spreadsheet exported"
    );
    Ok(report)
}

fn thumbnail_png<C: ImageCodec + ?Sized>(
    codec: &C,
    bytes: &[u8],
    size: u32,
) -> Result<(Vec<u8>, DecodedImage), CodecError> {
    let decoded = codec.decode(bytes)?;
    let thumbnail = codec.thumbnail(&decoded, size);
    let png = codec.encode_png(&thumbnail)?;
    Ok((png, thumbnail))
}

fn write_info_sheet<W: SpreadsheetWriter + ?Sized>(
    table: &ExportTable,
    report: &ExportReport,
    writer: &mut W,
) -> Result<(), WriterError> {
    writer.add_sheet(INFO_SHEET)?;
    let lines = [
        (0, "Export report".to_string()),
        (2, format!("Table: {}", table.title)),
        (3, format!("Database file: {}", table.database_name)),
        (4, format!("Exported at: {}", timestamp())),
        (5, format!("Rows: {}", report.rows)),
        (6, format!("Columns: {}", report.columns)),
        (7, format!("Images embedded: {}", report.embedded_images)),
    ];
    for (row, text) in lines {
        writer.write_text(row, 0, &text)?;
    }

    if !report.saved_files.is_empty() {
        writer.write_text(9, 0, "Saved image files:")?;
        for (offset, path) in report.saved_files.iter().enumerate() {
            let name = path
                .file_name()
                .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
            writer.write_text(row_index(10 + offset), 0, &name)?;
        }
    }
    Ok(())
}

/// Keeps printable ASCII and Cyrillic, capped at 30 characters.
#[must_use]
pub fn safe_text(text: &str) -> String {
    let kept: Vec<char> = text
        .chars()
        .filter(|ch| matches!(ch, '\u{20}'..='\u{7E}' | '\u{400}'..='\u{4FF}'))
        .collect();
    if kept.len() > SAFE_TEXT_CHARS {
        let mut shortened: String = kept[..SAFE_TEXT_CHARS - 3].iter().collect();
        shortened.push_str("...");
        shortened
    } else {
        kept.into_iter().collect()
    }
}

#[must_use]
pub fn truncate_cell_text(text: &str) -> String {
    if text.chars().count() > CELL_TEXT_CHARS {
        let mut shortened: String = text.chars().take(CELL_TEXT_CHARS - 3).collect();
        shortened.push_str("...");
        shortened
    } else {
        text.to_string()
    }
}

fn draw_header<D: DocumentWriter + ?Sized>(
    headers: &[String],
    writer: &mut D,
) -> Result<(), WriterError> {
    for (index, header) in headers.iter().enumerate() {
        let x = cell_x(index);
        writer.draw_rect(x, GRID_TOP, CELL_WIDTH, HEADER_HEIGHT)?;
        let label: String = header.chars().take(HEADER_TEXT_CHARS).collect();
        writer.draw_text(x + CELL_PADDING, GRID_TOP + 5.0, 8.0, &safe_text(&label))?;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn cell_x(column: usize) -> f32 {
    GRID_LEFT + column as f32 * CELL_WIDTH
}

/// Renders the table as a paginated grid. Fails on an empty result.
pub fn export_document<C, D>(
    table: &ExportTable,
    codec: &C,
    writer: &mut D,
    destination: &Path,
) -> Result<ExportReport, ExportError>
where
    C: ImageCodec + ?Sized,
    D: DocumentWriter + ?Sized,
{
    if table.rows.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let mut report = ExportReport {
        rows: table.rows.len(),
        columns: table.headers.len(),
        pages: 1,
        ..ExportReport::default()
    };

    writer.new_page()?;
    writer.draw_text(GRID_LEFT, TITLE_Y, 16.0, &safe_text(&format!("Table: {}", table.title)))?;
    writer.draw_text(
        GRID_LEFT,
        500.0,
        10.0,
        &safe_text(&format!("Database: {}", table.database_name)),
    )?;
    writer.draw_text(GRID_LEFT, 485.0, 10.0, &format!("Exported: {}", timestamp()))?;
    draw_header(&table.headers, writer)?;

    let mut y = GRID_TOP - CELL_HEIGHT;
    for row in &table.rows {
        if y < BOTTOM_MARGIN {
            writer.new_page()?;
            report.pages += 1;
            writer.draw_text(
                GRID_LEFT,
                TITLE_Y,
                16.0,
                &safe_text(&format!("{} (continued)", table.title)),
            )?;
            draw_header(&table.headers, writer)?;
            y = GRID_TOP - CELL_HEIGHT;
        }

        for (column, value) in row.values.iter().enumerate() {
            let x = cell_x(column);
            writer.draw_rect(x, y, CELL_WIDTH, CELL_HEIGHT)?;
            let text_x = x + CELL_PADDING;

            match value {
                CellValue::Blob(bytes) if table.is_image_column(column) => {
                    if !is_displayable_image_bytes(bytes) {
                        report.invalid_images += 1;
                        writer.draw_text(text_x, y + 40.0, 7.0, "Invalid image")?;
                        writer.draw_text(text_x, y + 30.0, 7.0, &format!("{} bytes", bytes.len()))?;
                        continue;
                    }
                    match codec.decode(bytes) {
                        Ok(image) => {
                            writer.draw_image(
                                &image,
                                text_x,
                                y + CELL_PADDING,
                                CELL_WIDTH - 2.0 * CELL_PADDING,
                                CELL_HEIGHT - 2.0 * CELL_PADDING,
                            )?;
                            report.embedded_images += 1;
                        }
                        Err(error) => {
                            tracing::warn!(column, %error, "image skipped during export");
                            report.failed_images += 1;
                            writer.draw_text(text_x, y + 40.0, 7.0, "Image")?;
                            writer.draw_text(
                                text_x,
                                y + 30.0,
                                7.0,
                                &format!("{} bytes", bytes.len()),
                            )?;
                        }
                    }
                }
                other => {
                    let text = truncate_cell_text(&render_cell(other, table.is_image_column(column)));
                    writer.draw_text(text_x, y + 40.0, 7.0, &safe_text(&text))?;
                }
            }
        }
        y -= CELL_HEIGHT;
    }

    writer.finish(destination)?;
    tracing::info!(
        path = %destination.display(),
        rows = report.rows,
        pages = report.pages,
        "document exported"
    );
    Ok(report)
}
