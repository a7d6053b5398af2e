use crate::{credentials::LegacyConnection, error::DbError};
use async_trait::async_trait;
use model::{core::value::Value, records::row::LegacyRow};

/// One filtered, deterministically ordered SELECT against a legacy table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractQuery {
    pub table: &'static str,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// The legacy table does not exist on this source.
    TableMissing,
    Rows(Vec<LegacyRow>),
}

/// Read-only access to a legacy database.
///
/// Implementations open their own connection for every call and release it
/// before returning, whatever the outcome.
#[async_trait]
pub trait LegacySource: Send + Sync {
    async fn extract(
        &self,
        conn: &LegacyConnection,
        query: &ExtractQuery,
    ) -> Result<Extracted, DbError>;

    /// Opens and closes a connection without reading anything.
    async fn ping(&self, conn: &LegacyConnection) -> Result<(), DbError>;
}
