pub mod config;
pub mod extractor;
pub mod inspect;
pub mod report;

pub use config::ExtractConfig;
