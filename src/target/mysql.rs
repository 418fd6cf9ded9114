use super::{Connection, Target, TargetError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Executor};

/// MySQL-wire target (MemSQL/SingleStore and friends speak this protocol).
#[derive(Debug, Clone)]
pub struct MySqlTarget {
    options: MySqlConnectOptions,
}

impl MySqlTarget {
    pub fn new(
        host: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: Option<&str>,
    ) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(user);
        if let Some(password) = password {
            options = options.password(password);
        }
        if let Some(database) = database {
            options = options.database(database);
        }
        Self { options }
    }
}

#[async_trait]
impl Target for MySqlTarget {
    async fn connect(&self) -> Result<Box<dyn Connection>, TargetError> {
        let conn = self
            .options
            .connect()
            .await
            .map_err(TargetError::Connect)?;
        Ok(Box::new(MySqlConn { conn }))
    }
}

struct MySqlConn {
    conn: MySqlConnection,
}

#[async_trait]
impl Connection for MySqlConn {
    async fn execute(&mut self, sql: &str) -> Result<(), TargetError> {
        // Raw text-protocol execute: batches are fully rendered strings and
        // must not go through the prepared-statement cache.
        self.conn
            .execute(sql)
            .await
            .map(|_| ())
            .map_err(TargetError::Execute)
    }
}
