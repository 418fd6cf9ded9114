pub mod builder;
pub mod schema;

pub use builder::{build_batches, QueryBatch, QueryError};
