use crate::error::ProcessingError;
use connectors::{
    credentials::{ConnectionSupplier, LegacyConnection},
    source::{ExtractQuery, Extracted, LegacySource},
    sql::literal::{MySqlLiteralEncoder, SqlLiteralEncoder},
};
use model::{
    core::value::Value,
    records::row::LegacyRow,
    sync::{
        entity::GroupLink,
        scope::{ScopeFilter, SourceKind, SyncScope},
    },
};
use std::sync::Arc;
use tracing::{debug, info};

/// Pulls the full filtered row-set of a scope from its legacy source.
pub struct Extractor {
    supplier: Arc<dyn ConnectionSupplier>,
    source: Arc<dyn LegacySource>,
}

impl Extractor {
    pub fn new(supplier: Arc<dyn ConnectionSupplier>, source: Arc<dyn LegacySource>) -> Self {
        Self { supplier, source }
    }

    /// Rows of `scope` in stable order. A missing legacy table yields no rows.
    pub async fn extract(&self, scope: &SyncScope) -> Result<Vec<LegacyRow>, ProcessingError> {
        let conn = self.resolve(scope.source).await?;
        let query = build_query(scope);
        debug!(scope = %scope, sql = %query.sql, params = query.params.len(), "Extracting legacy rows");

        match self
            .source
            .extract(&conn, &query)
            .await
            .map_err(ProcessingError::Extract)?
        {
            Extracted::TableMissing => {
                info!(
                    scope = %scope,
                    table = query.table,
                    endpoint = %conn.endpoint(),
                    "Legacy table does not exist; nothing to sync"
                );
                Ok(Vec::new())
            }
            Extracted::Rows(rows) => Ok(rows),
        }
    }

    /// Resolves `source` and opens one connection to it.
    pub async fn check(&self, source: SourceKind) -> Result<LegacyConnection, ProcessingError> {
        let conn = self.resolve(source).await?;
        self.source
            .ping(&conn)
            .await
            .map_err(ProcessingError::Extract)?;
        Ok(conn)
    }

    async fn resolve(&self, source: SourceKind) -> Result<LegacyConnection, ProcessingError> {
        self.supplier
            .resolve(source)
            .await
            .map_err(ProcessingError::Resolve)
    }
}

/// SELECT for a scope: the entity's legacy columns, the scope's filter, and
/// the entity's stable ordering.
pub fn build_query(scope: &SyncScope) -> ExtractQuery {
    let enc = MySqlLiteralEncoder;
    let entity = scope.entity;
    let table = entity.legacy_table();
    let col = |name: &str| format!("t.{}", enc.quote_identifier(name));

    let columns = entity
        .legacy_columns()
        .iter()
        .map(|c| col(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    match &scope.filter {
        ScopeFilter::All => {}
        ScopeFilter::Date { date } => {
            if let Some(date_column) = entity.date_column() {
                conditions.push(format!("{} = ?", col(date_column)));
                params.push(Value::Date(*date));
            }
        }
        ScopeFilter::DateAndLines { date, lines } => {
            if let Some(date_column) = entity.date_column() {
                conditions.push(format!("{} = ?", col(date_column)));
                params.push(Value::Date(*date));
            }
            if let Some(line_column) = entity.line_column() {
                let lines = distinct_lines(lines);
                let placeholders = vec!["?"; lines.len()].join(", ");
                conditions.push(format!("{} IN ({placeholders})", col(line_column)));
                params.extend(lines.into_iter().map(Value::String));
            }
        }
        ScopeFilter::Group { group_id } => match entity.group_link() {
            Some(GroupLink::Column(column)) => {
                conditions.push(format!("{} = ?", col(column)));
                params.push(Value::Int(*group_id));
            }
            Some(GroupLink::Assignment) => {
                conditions.push(format!(
                    "{} IN (SELECT `turnus_id` FROM `turnus_groups_assign` WHERE `group_id` = ?)",
                    col("turnus_id")
                ));
                params.push(Value::Int(*group_id));
            }
            None => {}
        },
    }

    let mut sql = format!(
        "SELECT {columns} FROM {} t",
        enc.quote_identifier(table)
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    let order = entity
        .legacy_order()
        .iter()
        .map(|c| col(c))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(" ORDER BY ");
    sql.push_str(&order);

    ExtractQuery { table, sql, params }
}

fn distinct_lines(lines: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if !out.iter().any(|seen| seen == line) {
            out.push(line.to_string());
        }
    }
    out
}
