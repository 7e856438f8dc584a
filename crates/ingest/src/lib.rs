//! Reading ingestion: pulling raw records from the upstream source and
//! sorting them into valid readings and rejected records.

pub mod source;
pub mod validation;

pub use source::{HttpSource, ReadingSource, TransportError};
pub use validation::{SchemaError, Validation, ValidationVerdict, Validator};
