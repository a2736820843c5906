use std::fmt;

use crate::image_blob::is_displayable_image;

pub const IMAGE_PLACEHOLDER: &str = "[image]";
pub const BLOB_PLACEHOLDER: &str = "[BLOB data]";

const TRUE_WORDS: [&str; 5] = ["true", "1", "yes", "да", "истина"];
const FALSE_WORDS: [&str; 5] = ["false", "0", "no", "нет", "ложь"];

/// One SQLite value, used both for result cells and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Blob(_) => f.write_str(BLOB_PLACEHOLDER),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

/// Text shown for a cell. Raw BLOB bytes are never rendered.
#[must_use]
pub fn render_cell(value: &CellValue, image_column: bool) -> String {
    match value {
        CellValue::Blob(_) if image_column && is_displayable_image(value) => {
            IMAGE_PLACEHOLDER.to_string()
        }
        other => other.to_string(),
    }
}

#[must_use]
pub fn parse_boolean_input(input: &str) -> Option<bool> {
    let normalized = input.trim().to_lowercase();
    if TRUE_WORDS.contains(&normalized.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&normalized.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn is_boolean_type(declared_type: &str) -> bool {
    declared_type.trim().eq_ignore_ascii_case("BOOLEAN")
}

/// Converts text typed into a cell editor into a bound value.
///
/// BOOLEAN columns store `1`/`0`; unrecognised text is kept as typed and
/// left for SQLite's type affinity to deal with.
#[must_use]
pub fn coerce_input(input: &str, declared_type: &str) -> CellValue {
    if is_boolean_type(declared_type) {
        if let Some(flag) = parse_boolean_input(input) {
            return CellValue::Integer(i64::from(flag));
        }
    }
    CellValue::Text(input.to_string())
}

/// Like [`coerce_input`], but for new rows: empty input and unrecognised
/// booleans become NULL.
#[must_use]
pub fn coerce_insert_input(input: &str, declared_type: &str) -> CellValue {
    if input.is_empty() {
        return CellValue::Null;
    }
    if is_boolean_type(declared_type) {
        return parse_boolean_input(input)
            .map_or(CellValue::Null, |flag| CellValue::Integer(i64::from(flag)));
    }
    CellValue::Text(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        coerce_input, coerce_insert_input, parse_boolean_input, render_cell, CellValue,
        BLOB_PLACEHOLDER, IMAGE_PLACEHOLDER,
    };

    fn png_payload(len: usize) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.resize(len, 0);
        bytes
    }

    #[test]
    fn image_blobs_render_as_placeholder_never_raw_bytes() {
        let value = CellValue::Blob(png_payload(137));
        assert_eq!(render_cell(&value, true), IMAGE_PLACEHOLDER);
        assert_eq!(render_cell(&value, false), BLOB_PLACEHOLDER);
        assert_eq!(
            render_cell(&CellValue::Blob(vec![1, 2, 3]), true),
            BLOB_PLACEHOLDER
        );
    }

    #[test]
    fn scalar_values_render_in_display_form() {
        assert_eq!(render_cell(&CellValue::Null, false), "");
        assert_eq!(render_cell(&CellValue::Integer(-3), false), "-3");
        assert_eq!(render_cell(&CellValue::Real(1.5), false), "1.5");
        assert_eq!(render_cell(&CellValue::from("Ann"), true), "Ann");
    }

    #[test]
    fn boolean_words_are_recognised_in_both_languages() {
        assert_eq!(parse_boolean_input(" Yes "), Some(true));
        assert_eq!(parse_boolean_input("ДА"), Some(true));
        assert_eq!(parse_boolean_input("ложь"), Some(false));
        assert_eq!(parse_boolean_input("0"), Some(false));
        assert_eq!(parse_boolean_input("maybe"), None);
    }

    #[test]
    fn edits_and_inserts_coerce_booleans_differently_for_unknown_words() {
        assert_eq!(coerce_input("yes", "boolean"), CellValue::Integer(1));
        assert_eq!(coerce_input("maybe", "BOOLEAN"), CellValue::from("maybe"));
        assert_eq!(coerce_input("42", "INTEGER"), CellValue::from("42"));

        assert_eq!(coerce_insert_input("", "TEXT"), CellValue::Null);
        assert_eq!(coerce_insert_input("maybe", "BOOLEAN"), CellValue::Null);
        assert_eq!(coerce_insert_input("нет", "BOOLEAN"), CellValue::Integer(0));
    }
}
