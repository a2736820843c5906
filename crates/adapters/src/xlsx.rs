use std::path::Path;

use rust_xlsxwriter::{Image, Workbook, Worksheet, XlsxError};
use tabula_core::export::{SpreadsheetWriter, WriterError};

/// `.xlsx` workbook built in memory and written on [`SpreadsheetWriter::finish`].
pub struct XlsxSpreadsheet {
    workbook: Workbook,
    sheets: usize,
}

impl XlsxSpreadsheet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            workbook: Workbook::new(),
            sheets: 0,
        }
    }

    fn current_sheet(&mut self) -> Result<&mut Worksheet, WriterError> {
        let index = self
            .sheets
            .checked_sub(1)
            .ok_or_else(|| WriterError::new("no worksheet added yet"))?;
        self.workbook.worksheet_from_index(index).map_err(to_writer_error)
    }
}

impl Default for XlsxSpreadsheet {
    fn default() -> Self {
        Self::new()
    }
}

impl SpreadsheetWriter for XlsxSpreadsheet {
    fn add_sheet(&mut self, name: &str) -> Result<(), WriterError> {
        self.workbook
            .add_worksheet()
            .set_name(name)
            .map_err(to_writer_error)?;
        self.sheets += 1;
        Ok(())
    }

    fn write_text(&mut self, row: u32, column: u16, text: &str) -> Result<(), WriterError> {
        self.current_sheet()?
            .write_string(row, column, text)
            .map_err(to_writer_error)?;
        Ok(())
    }

    fn embed_image(
        &mut self,
        row: u32,
        column: u16,
        png_path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), WriterError> {
        let image = Image::new(png_path)
            .map_err(to_writer_error)?
            .set_scale_to_size(width, height, true);
        self.current_sheet()?
            .insert_image(row, column, &image)
            .map_err(to_writer_error)?;
        Ok(())
    }

    fn set_column_width(&mut self, column: u16, width: f64) -> Result<(), WriterError> {
        self.current_sheet()?
            .set_column_width(column, width)
            .map_err(to_writer_error)?;
        Ok(())
    }

    fn set_row_height(&mut self, row: u32, height: f64) -> Result<(), WriterError> {
        self.current_sheet()?
            .set_row_height(row, height)
            .map_err(to_writer_error)?;
        Ok(())
    }

    fn finish(&mut self, path: &Path) -> Result<(), WriterError> {
        self.workbook.save(path).map_err(to_writer_error)
    }
}

fn to_writer_error(error: XlsxError) -> WriterError {
    WriterError::new(error.to_string())
}

#[cfg(test)]
mod tests {
    use tabula_core::export::SpreadsheetWriter;
    use tempfile::TempDir;

    use super::XlsxSpreadsheet;

    #[test]
    fn writes_workbook_with_two_sheets() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("out.xlsx");
        let mut writer = XlsxSpreadsheet::new();

        writer.add_sheet("people").expect("sheet");
        writer.write_text(0, 0, "id").expect("text");
        writer.set_column_width(0, 15.0).expect("width");
        writer.set_row_height(1, 75.0).expect("height");
        writer.add_sheet("Info").expect("info sheet");
        writer.write_text(0, 0, "Export report").expect("text");
        writer.finish(&path).expect("save");

        let bytes = std::fs::read(&path).expect("workbook");
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn writing_before_adding_a_sheet_fails() {
        let mut writer = XlsxSpreadsheet::new();
        assert!(writer.write_text(0, 0, "orphan").is_err());
    }
}
