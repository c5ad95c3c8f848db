// src/ingest/providers/mod.rs
//! Raw record sources: canned samples, local files, a search-capable provider.

pub mod file;
pub mod sample;
pub mod search;

pub use file::{FileSource, InputFormat};
pub use sample::StaticSampleSource;
pub use search::SearchSource;
