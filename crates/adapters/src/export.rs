use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};
use tabula_core::export::{ExportError, ExportTable};
use tabula_core::value::{render_cell, CellValue};

/// Writes the grid as shown on screen, header row first.
pub fn export_table_to_csv(path: &Path, table: &ExportTable) -> Result<usize, ExportError> {
    let mut content = String::new();
    content.push_str(
        &table
            .headers
            .iter()
            .map(|header| csv_escape(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    content.push('\n');

    for row in table.rendered_rows() {
        let values = (0..table.headers.len())
            .map(|column_index| csv_escape(row.get(column_index).map_or("", String::as_str)))
            .collect::<Vec<_>>();
        content.push_str(&values.join(","));
        content.push('\n');
    }

    fs::write(path, content).map_err(ExportError::io(path))?;
    tracing::info!(path = %path.display(), rows = table.rows.len(), "csv exported");
    Ok(table.rows.len())
}

/// One object per row keyed by header. Numbers stay numbers; BLOBs become
/// their placeholder text.
pub fn export_table_to_json(path: &Path, table: &ExportTable) -> Result<usize, ExportError> {
    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut object = Map::with_capacity(table.headers.len());
        for (column_index, header) in table.headers.iter().enumerate() {
            let value = row.values.get(column_index).map_or(Value::Null, |value| {
                json_value(value, table.is_image_column(column_index))
            });
            object.insert(header.clone(), value);
        }
        records.push(Value::Object(object));
    }

    let payload = serde_json::to_string_pretty(&records)?;
    fs::write(path, payload).map_err(ExportError::io(path))?;
    tracing::info!(path = %path.display(), rows = table.rows.len(), "json exported");
    Ok(table.rows.len())
}

fn json_value(value: &CellValue, image_column: bool) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Integer(number) => json!(number),
        CellValue::Real(number) => json!(number),
        CellValue::Text(text) => json!(text),
        CellValue::Blob(_) => json!(render_cell(value, image_column)),
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
