//! Core types and rate logic

pub mod cache;
pub mod config;
pub mod convert;
pub mod currency;
pub mod error;
pub mod log;
pub mod parse;
pub mod source;

// Re-export main types for cleaner imports
pub use convert::{ConversionRequest, ConversionResult, convert};
pub use currency::{RateRow, RateTable};
pub use error::RateError;
pub use source::RateSource;
