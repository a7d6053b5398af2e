//! Resolution of legacy connection parameters.
//!
//! Credential storage and decryption are owned elsewhere; this module only
//! turns a [`SourceKind`] into something a driver can connect with.

use crate::error::{ConnectorError, DbError};
use async_trait::async_trait;
use model::sync::scope::SourceKind;
use mysql_async::{Opts, OptsBuilder, Pool, prelude::*};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    #[default]
    Mysql,
    Mariadb,
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(EngineType::Mysql),
            "mariadb" => Ok(EngineType::Mariadb),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyConnection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    /// Already decrypted.
    pub password: String,
    #[serde(default)]
    pub engine: EngineType,
}

fn default_port() -> u16 {
    3306
}

impl fmt::Debug for LegacyConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("engine", &self.engine)
            .finish()
    }
}

impl LegacyConnection {
    pub fn opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .db_name(Some(self.database.clone()))
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .into()
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[async_trait]
pub trait ConnectionSupplier: Send + Sync {
    async fn resolve(&self, source: SourceKind) -> Result<LegacyConnection, ConnectorError>;
}

/// Connection parameters fixed at configuration time.
#[derive(Debug, Clone, Default)]
pub struct StaticConnectionSupplier {
    sources: HashMap<SourceKind, LegacyConnection>,
}

impl StaticConnectionSupplier {
    pub fn new(sources: HashMap<SourceKind, LegacyConnection>) -> Self {
        Self { sources }
    }

    pub fn with(mut self, source: SourceKind, conn: LegacyConnection) -> Self {
        self.sources.insert(source, conn);
        self
    }
}

#[async_trait]
impl ConnectionSupplier for StaticConnectionSupplier {
    async fn resolve(&self, source: SourceKind) -> Result<LegacyConnection, ConnectorError> {
        self.sources
            .get(&source)
            .cloned()
            .ok_or_else(|| ConnectorError::NotRegistered(source.registry_subtype().to_string()))
    }
}

/// Tries `primary` first and falls back when it does not know the source.
pub struct ChainedConnectionSupplier {
    primary: Arc<dyn ConnectionSupplier>,
    fallback: Arc<dyn ConnectionSupplier>,
}

impl ChainedConnectionSupplier {
    pub fn new(primary: Arc<dyn ConnectionSupplier>, fallback: Arc<dyn ConnectionSupplier>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ConnectionSupplier for ChainedConnectionSupplier {
    async fn resolve(&self, source: SourceKind) -> Result<LegacyConnection, ConnectorError> {
        match self.primary.resolve(source).await {
            Err(ConnectorError::NotRegistered(_)) => self.fallback.resolve(source).await,
            other => other,
        }
    }
}

/// Turns a stored (encrypted) password into the plaintext one.
pub trait PasswordDecryptor: Send + Sync {
    fn decrypt(&self, stored: &str) -> Result<String, ConnectorError>;
}

/// For registries that keep passwords in the clear.
pub struct PlaintextPasswords;

impl PasswordDecryptor for PlaintextPasswords {
    fn decrypt(&self, stored: &str) -> Result<String, ConnectorError> {
        Ok(stored.to_string())
    }
}

const QUERY_REGISTERED_SOURCE_SQL: &str = "SELECT `type`, host, port, `database`, username, password \
     FROM legacy_databases WHERE subtype = ? AND is_active = 1 ORDER BY id LIMIT 1";

/// Looks sources up in the target store's `legacy_databases` registry.
pub struct RegistryConnectionSupplier {
    pool: Pool,
    decryptor: Arc<dyn PasswordDecryptor>,
}

impl RegistryConnectionSupplier {
    pub fn new(pool: Pool, decryptor: Arc<dyn PasswordDecryptor>) -> Self {
        Self { pool, decryptor }
    }
}

#[async_trait]
impl ConnectionSupplier for RegistryConnectionSupplier {
    async fn resolve(&self, source: SourceKind) -> Result<LegacyConnection, ConnectorError> {
        let subtype = source.registry_subtype();
        let mut conn = self.pool.get_conn().await.map_err(DbError::from)?;
        let row: Option<(String, String, u16, String, String, String)> = conn
            .exec_first(QUERY_REGISTERED_SOURCE_SQL, (subtype,))
            .await
            .map_err(DbError::from)?;

        let (engine, host, port, database, username, stored_password) =
            row.ok_or_else(|| ConnectorError::NotRegistered(subtype.to_string()))?;
        let engine = engine
            .parse::<EngineType>()
            .map_err(|engine| ConnectorError::UnsupportedEngine {
                subtype: subtype.to_string(),
                engine,
            })?;

        debug!(source = %source, host = %host, port, database = %database, "Resolved legacy source");
        Ok(LegacyConnection {
            host,
            port,
            database,
            username,
            password: self.decryptor.decrypt(&stored_password)?,
            engine,
        })
    }
}
