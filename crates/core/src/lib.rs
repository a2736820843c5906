pub mod config;
pub mod export;
pub mod image_blob;
pub mod import;
pub mod inspect;
pub mod joins;
pub mod mutations;
pub mod projection;
pub mod query_builder;
pub mod query_runner;
pub mod schema;
pub mod session;
pub mod sql_generator;
pub mod value;
