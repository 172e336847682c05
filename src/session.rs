//! Connection lifecycle for a command invocation.
//!
//! The session owns at most one live database client and the status shown to
//! the user. A dead client is dropped and replaced on the next run.

use std::fmt;

use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::db::{self, DatabaseClient, MockDatabaseClient};
use crate::error::{Result, SqlDocxError};

/// Connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    NotConnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::NotConnected => write!(f, "Not connected"),
        }
    }
}

enum Backend {
    Server {
        config: Option<ConnectionConfig>,
        retries: u32,
    },
    Mock,
    Fixed,
}

/// Owns the database connection used by report runs.
pub struct Session {
    backend: Backend,
    client: Option<Box<dyn DatabaseClient>>,
    status: ConnectionStatus,
}

impl Session {
    /// Session that connects to SQL Server on first use.
    ///
    /// `config` may be `None`; running a script then fails with a
    /// precondition error.
    pub fn new(config: Option<ConnectionConfig>, retries: u32) -> Self {
        Self {
            backend: Backend::Server { config, retries },
            client: None,
            status: ConnectionStatus::NotConnected,
        }
    }

    /// Session backed by the in-memory mock client.
    pub fn mock() -> Self {
        Self {
            backend: Backend::Mock,
            client: None,
            status: ConnectionStatus::NotConnected,
        }
    }

    /// Session around an already-connected client. It is never replaced.
    pub fn with_client(client: Box<dyn DatabaseClient>) -> Self {
        let status = if client.is_live() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::NotConnected
        };
        Self {
            backend: Backend::Fixed,
            client: Some(client),
            status,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Human-readable connection target.
    pub fn target(&self) -> String {
        match &self.backend {
            Backend::Server {
                config: Some(config),
                ..
            } => config.display_string(),
            Backend::Server { config: None, .. } => "(no connection configured)".to_string(),
            Backend::Mock => "mock database".to_string(),
            Backend::Fixed => "provided client".to_string(),
        }
    }

    /// Returns the live client, connecting once if there is none.
    pub async fn ensure_connected(&mut self) -> Result<&dyn DatabaseClient> {
        let live = self.client.as_ref().is_some_and(|c| c.is_live());

        if !live {
            if self.client.take().is_some() {
                warn!("Dropping dead connection to {}", self.target());
                self.set_status(ConnectionStatus::NotConnected);
            }

            let client: Box<dyn DatabaseClient> = match &self.backend {
                Backend::Server {
                    config: Some(config),
                    retries,
                } => db::connect(config, *retries).await?,
                Backend::Server { config: None, .. } => {
                    return Err(SqlDocxError::precondition(
                        "No connection configured. Use --url, --host or a [connections] entry in the config file.",
                    ));
                }
                Backend::Mock => Box::new(MockDatabaseClient::new()),
                Backend::Fixed => {
                    return Err(SqlDocxError::connection("Connection is closed"));
                }
            };
            self.client = Some(client);
            self.set_status(ConnectionStatus::Connected);
        }

        self.client
            .as_deref()
            .ok_or_else(|| SqlDocxError::internal("connection missing after connect"))
    }

    /// Releases the connection.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
            self.set_status(ConnectionStatus::NotConnected);
        }
        Ok(())
    }

    /// Re-reads liveness after a run so the indicator reflects a dropped link.
    pub fn refresh_status(&mut self) {
        let live = self.client.as_ref().is_some_and(|c| c.is_live());
        self.set_status(if live {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::NotConnected
        });
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!("Status: {} ({})", status, self.target());
            self.status = status;
        }
    }
}
