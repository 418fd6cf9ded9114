pub mod mysql;

use async_trait::async_trait;

pub use mysql::MySqlTarget;

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("connect failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("execute failed: {0}")]
    Execute(#[source] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// One exclusively-owned connection to the store under test.
#[async_trait]
pub trait Connection: Send {
    /// Executes one statement as a single round-trip. No retries: the
    /// benchmark measures achieved throughput, not resilience, so a failed
    /// execute is fatal to whoever issued it.
    async fn execute(&mut self, sql: &str) -> Result<(), TargetError>;
}

/// Connection factory for the store under test. Each worker acquires exactly
/// one connection for its whole lifetime.
#[async_trait]
pub trait Target: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, TargetError>;
}
