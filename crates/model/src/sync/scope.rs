use crate::sync::entity::SyncEntity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Which legacy database a run reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ticketing,
    City,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Ticketing => "ticketing",
            SourceKind::City => "city",
        }
    }

    /// Subtype under which the source is registered in the target store.
    pub fn registry_subtype(&self) -> &'static str {
        match self {
            SourceKind::Ticketing => "main_ticketing_database",
            SourceKind::City => "city_ticketing_database",
        }
    }

    /// Target column that remembers the legacy id from this source.
    pub fn legacy_id_column(&self) -> &'static str {
        match self {
            SourceKind::Ticketing => "legacy_ticketing_id",
            SourceKind::City => "legacy_city_id",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ticketing" | "main" | "main_ticketing_database" => Ok(SourceKind::Ticketing),
            "city" | "city_ticketing_database" => Ok(SourceKind::City),
            other => Err(format!("unknown legacy source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeFilter {
    All,
    Date { date: NaiveDate },
    DateAndLines { date: NaiveDate, lines: Vec<String> },
    Group { group_id: i64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("{entity} cannot be filtered by {filter}")]
    Unsupported {
        entity: SyncEntity,
        filter: &'static str,
    },

    #[error("line filter for {0} is empty")]
    NoLines(SyncEntity),
}

/// The subset of legacy data one run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScope {
    pub source: SourceKind,
    pub entity: SyncEntity,
    pub filter: ScopeFilter,
}

impl SyncScope {
    pub fn new(source: SourceKind, entity: SyncEntity, filter: ScopeFilter) -> Self {
        Self {
            source,
            entity,
            filter,
        }
    }

    pub fn validate(&self) -> Result<(), ScopeError> {
        let unsupported = |filter| ScopeError::Unsupported {
            entity: self.entity,
            filter,
        };
        match &self.filter {
            ScopeFilter::All => Ok(()),
            ScopeFilter::Date { .. } => self
                .entity
                .date_column()
                .map(|_| ())
                .ok_or_else(|| unsupported("date")),
            ScopeFilter::DateAndLines { lines, .. } => {
                self.entity.line_column().ok_or_else(|| unsupported("lines"))?;
                if lines.iter().all(|l| l.trim().is_empty()) {
                    return Err(ScopeError::NoLines(self.entity));
                }
                Ok(())
            }
            ScopeFilter::Group { .. } => self
                .entity
                .group_link()
                .map(|_| ())
                .ok_or_else(|| unsupported("group")),
        }
    }

    /// Canonical identity of the scope; runs over equal keys supersede each other.
    pub fn key(&self) -> String {
        let filter = match &self.filter {
            ScopeFilter::All => "all".to_string(),
            ScopeFilter::Date { date } => format!("date={date}"),
            ScopeFilter::DateAndLines { date, lines } => {
                let mut lines: Vec<&str> = lines
                    .iter()
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .collect();
                lines.sort_unstable();
                lines.dedup();
                format!("date={date};lines={}", lines.join(","))
            }
            ScopeFilter::Group { group_id } => format!("group={group_id}"),
        };
        format!("{}/{}/{}", self.source, self.entity, filter)
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 8, 31).unwrap()
    }

    #[test]
    fn key_is_insensitive_to_line_order_and_duplicates() {
        let a = SyncScope::new(
            SourceKind::Ticketing,
            SyncEntity::Departures,
            ScopeFilter::DateAndLines {
                date: day(),
                lines: vec!["7".into(), "12A".into(), "7".into()],
            },
        );
        let b = SyncScope::new(
            SourceKind::Ticketing,
            SyncEntity::Departures,
            ScopeFilter::DateAndLines {
                date: day(),
                lines: vec![" 12A".into(), "7".into()],
            },
        );
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "ticketing/departures/date=2023-08-31;lines=12A,7");
    }

    #[test]
    fn filters_must_fit_the_entity() {
        let scope = SyncScope::new(
            SourceKind::City,
            SyncEntity::ShiftDays,
            ScopeFilter::Date { date: day() },
        );
        assert_eq!(
            scope.validate(),
            Err(ScopeError::Unsupported {
                entity: SyncEntity::ShiftDays,
                filter: "date"
            })
        );

        let scope = SyncScope::new(
            SourceKind::City,
            SyncEntity::ShiftDays,
            ScopeFilter::Group { group_id: 3 },
        );
        assert!(scope.validate().is_ok());

        let scope = SyncScope::new(
            SourceKind::City,
            SyncEntity::Departures,
            ScopeFilter::DateAndLines {
                date: day(),
                lines: vec![" ".into()],
            },
        );
        assert_eq!(scope.validate(), Err(ScopeError::NoLines(SyncEntity::Departures)));
    }

    #[test]
    fn source_kinds_map_to_registry_subtypes() {
        assert_eq!("city".parse(), Ok(SourceKind::City));
        assert_eq!(
            SourceKind::Ticketing.registry_subtype(),
            "main_ticketing_database"
        );
        assert_eq!(SourceKind::City.legacy_id_column(), "legacy_city_id");
    }
}
