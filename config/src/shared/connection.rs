use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::SerializableSecretString;

/// Configuration for connecting to a Postgres database.
///
/// Used both for the discovery-side database (watermarks, holds summary) and,
/// where the deployment exposes one, the ILS reporting database that the holds
/// aggregation reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the database to connect to.
    pub name: String,
    /// Username for authenticating with the server.
    pub username: String,
    /// Password for the specified user. Redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

impl PgConnectionConfig {
    /// Returns sqlx connect options for this database.
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.username)
            .ssl_mode(PgSslMode::Prefer);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }
}
