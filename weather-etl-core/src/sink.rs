//! Durable destinations for a run's successful batch.
//!
//! Both sinks do blocking I/O and are expected to run on a blocking thread.
//! They are independent: one failing never affects the other.

pub mod relational;
pub mod table_file;

pub use relational::RelationalStore;
pub use table_file::TableFileSink;
