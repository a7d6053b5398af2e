use crate::{
    core::value::Value,
    sync::entity::{SyncEntity, TargetTable},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{table}: column '{column}' is not part of the table")]
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("{table}: column '{column}' was not set")]
    Unset {
        table: &'static str,
        column: &'static str,
    },
}

/// Composite business-key values of a target row, in key-column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusinessKey(pub Vec<Value>);

impl std::fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, v) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("|")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// A target-shaped row; `values` follow `entity.target().columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    entity: SyncEntity,
    values: Vec<Value>,
}

impl MappedRecord {
    /// Builds a record from named values. Every target column must be
    /// assigned exactly by name; order of `pairs` does not matter.
    pub fn from_pairs(
        entity: SyncEntity,
        pairs: Vec<(&'static str, Value)>,
    ) -> Result<Self, ShapeError> {
        let table = entity.target();
        let mut slots: Vec<Option<Value>> = vec![None; table.columns.len()];
        for (column, value) in pairs {
            let idx = table.position(column).ok_or(ShapeError::UnknownColumn {
                table: table.name,
                column,
            })?;
            slots[idx] = Some(value);
        }

        let values = slots
            .into_iter()
            .zip(table.columns)
            .map(|(slot, column)| {
                slot.ok_or(ShapeError::Unset {
                    table: table.name,
                    column,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entity, values })
    }

    pub fn entity(&self) -> SyncEntity {
        self.entity
    }

    pub fn table(&self) -> &'static TargetTable {
        self.entity.target()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.table().position(column).map(|idx| &self.values[idx])
    }

    pub fn business_key(&self) -> BusinessKey {
        BusinessKey(
            self.table()
                .key_positions()
                .into_iter()
                .map(|idx| self.values[idx].clone())
                .collect(),
        )
    }
}
