//! Multi-row `INSERT ... ON DUPLICATE KEY UPDATE` assembly.
//!
//! Values are embedded as literals rather than bound one by one, so all
//! escaping goes through a single [`SqlLiteralEncoder`].

use crate::{error::DbError, sql::literal::SqlLiteralEncoder};
use model::{records::mapped::MappedRecord, sync::entity::TargetTable};

#[derive(Debug, Clone)]
pub struct UpsertStatement {
    table: &'static TargetTable,
    records: Vec<MappedRecord>,
    sql: String,
}

impl UpsertStatement {
    /// Renders one statement covering all `records`, which must belong to `table`.
    pub fn build(
        table: &'static TargetTable,
        records: Vec<MappedRecord>,
        encoder: &dyn SqlLiteralEncoder,
    ) -> Result<Self, DbError> {
        if records.is_empty() {
            return Err(DbError::QueryBuild(format!(
                "no rows to upsert into {}",
                table.name
            )));
        }
        if let Some(stray) = records.iter().find(|r| !std::ptr::eq(r.table(), table)) {
            return Err(DbError::QueryBuild(format!(
                "{} row cannot be written to {}",
                stray.entity(),
                table.name
            )));
        }

        let mut sql = String::with_capacity(64 + records.len() * table.columns.len() * 12);
        sql.push_str("INSERT INTO ");
        sql.push_str(&encoder.quote_identifier(table.name));
        sql.push_str(" (");
        push_joined(
            &mut sql,
            table.columns.iter().map(|c| encoder.quote_identifier(c)),
        );
        sql.push_str(") VALUES ");

        for (idx, record) in records.iter().enumerate() {
            if idx > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            push_joined(&mut sql, record.values().iter().map(|v| encoder.encode_value(v)));
            sql.push(')');
        }

        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        push_joined(&mut sql, update_assignments(table, encoder).into_iter());

        Ok(Self {
            table,
            records,
            sql,
        })
    }

    pub fn table(&self) -> &'static TargetTable {
        self.table
    }

    pub fn records(&self) -> &[MappedRecord] {
        &self.records
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

fn update_assignments(table: &TargetTable, encoder: &dyn SqlLiteralEncoder) -> Vec<String> {
    let mut assignments: Vec<String> = table
        .update_columns()
        .map(|column| {
            let col = encoder.quote_identifier(column);
            if table.keep_existing_on_null.contains(&column) {
                format!("{col} = COALESCE(VALUES({col}), {col})")
            } else {
                format!("{col} = VALUES({col})")
            }
        })
        .collect();

    if let Some(touch) = table.touch_column {
        assignments.push(format!("{} = NOW()", encoder.quote_identifier(touch)));
    }

    // MySQL needs at least one assignment; key-only tables reassign their first key column.
    if assignments.is_empty() {
        if let Some(first) = table.key.first() {
            let col = encoder.quote_identifier(first);
            assignments.push(format!("{col} = VALUES({col})"));
        }
    }
    assignments
}

fn push_joined(sql: &mut String, parts: impl Iterator<Item = String>) {
    for (idx, part) in parts.enumerate() {
        if idx > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&part);
    }
}
