pub mod codec;
pub mod export;
pub mod pdf;
pub mod sqlite;
pub mod workbook;
pub mod xlsx;
