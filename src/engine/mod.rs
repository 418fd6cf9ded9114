pub mod analytics;
pub mod coordinator;
pub mod worker;

pub use analytics::{Analytics, NodeReport};
pub use coordinator::{run_node, NodeError, NodeOptions};
pub use worker::{Worker, WorkerError};
