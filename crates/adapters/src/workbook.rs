use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType, Reader};
use tabula_core::import::{ImportSheet, ReaderError, SpreadsheetReader};
use tabula_core::value::CellValue;

/// Reads `.xlsx`, `.xls` and `.ods` workbooks. The first row of the first
/// sheet holds the headers; rows with no value at all are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineReader;

impl SpreadsheetReader for CalamineReader {
    fn read_first_sheet(&self, path: &Path) -> Result<ImportSheet, ReaderError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|error| ReaderError::new(error.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ReaderError::new("workbook has no sheets"))?
            .map_err(|error| ReaderError::new(error.to_string()))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(header_text).collect())
            .unwrap_or_default();
        let rows = rows
            .map(|row| row.iter().map(cell_value).collect::<Vec<_>>())
            .filter(|row| !row.iter().all(CellValue::is_null))
            .collect();
        Ok(ImportSheet { headers, rows })
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::Int(value) => CellValue::Integer(*value),
        Data::Float(value) if value.is_nan() => CellValue::Null,
        Data::Float(value) => CellValue::Real(*value),
        Data::Bool(flag) => CellValue::Integer(i64::from(*flag)),
        Data::String(text) if text.trim().is_empty() => CellValue::Null,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            CellValue::Text(text.clone())
        }
        other => other
            .as_datetime()
            .map_or(CellValue::Null, |moment| CellValue::Text(moment.to_string())),
    }
}
