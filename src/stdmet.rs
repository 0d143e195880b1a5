// ! NDBC standard meteorological ("stdmet") historical file format

pub mod parser;
pub mod sentinel;

// Re-export commonly used items
pub use parser::{ColumnLayout, Measurement, SampleRows, StdmetParseError, StdmetParser};
