//! Stream wrappers used by the extraction pipeline.

pub mod header;
pub mod limited;

pub use header::HeaderReader;
pub use limited::ByteCounter;
pub use limited::InputLimitError;
pub use limited::LimitedReader;
