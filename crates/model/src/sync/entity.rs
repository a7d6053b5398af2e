use crate::records::legacy::{
    Departure, ShiftAssignment, ShiftDay, ShiftDeparture, ShiftGroup, StationTimetable, Stop,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Shape of a table in the target store that an entity is merged into.
#[derive(Debug, PartialEq, Eq)]
pub struct TargetTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    /// Columns covered by the unique business-key constraint.
    pub key: &'static [&'static str],
    /// Columns whose stored value survives an incoming `NULL`.
    pub keep_existing_on_null: &'static [&'static str],
    /// Column refreshed with the store's clock on every upsert.
    pub touch_column: Option<&'static str>,
}

impl TargetTable {
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.key.contains(&column)
    }

    pub fn key_positions(&self) -> Vec<usize> {
        self.key.iter().filter_map(|k| self.position(k)).collect()
    }

    /// Non-key columns, in column order.
    pub fn update_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().copied().filter(|c| !self.is_key(c))
    }
}

/// How a group-id scope reaches an entity's legacy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLink {
    /// The legacy table carries `group_id` itself.
    Column(&'static str),
    /// Rows are linked through `turnus_groups_assign.turnus_id`.
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntity {
    Departures,
    StationTimetables,
    ShiftDepartures,
    ShiftGroups,
    ShiftAssignments,
    ShiftDays,
    Stops,
}

static DEPARTURES: TargetTable = TargetTable {
    name: "vremena_polaska",
    columns: &[
        "datum",
        "idlinije",
        "smer",
        "pon",
        "uto",
        "sre",
        "cet",
        "pet",
        "sub",
        "ned",
        "dk1",
        "dk1naziv",
        "dk2",
        "dk2naziv",
        "dk3",
        "dk3naziv",
        "dk4",
        "dk4naziv",
        "variation",
        "datetime_from",
        "datetime_to",
        "variation_description",
        "legacy_ticketing_id",
        "legacy_city_id",
    ],
    key: &["datum", "idlinije", "smer", "datetime_from"],
    keep_existing_on_null: &["legacy_ticketing_id", "legacy_city_id"],
    touch_column: Some("updated_at"),
};

static STATION_TIMETABLES: TargetTable = TargetTable {
    name: "vremena_polaska_st",
    columns: &[
        "datum",
        "idlinije",
        "smer",
        "dan",
        "vreme",
        "stanice",
        "opis",
        "central_point",
        "pauza",
        "default_times",
        "day_before",
        "default_peron",
        "num_departures",
        "default_num_seats",
        "timetable_short_comments_id",
        "vehicle_chassis_types_id",
        "gtfs_trip_id",
        "service_id",
        "not_official",
        "comp_code",
        "vehicle_group_types_id",
        "turage_no",
        "departure_no_in_turage",
        "legacy_ticketing_id",
        "legacy_city_id",
    ],
    key: &["idlinije", "smer", "dan", "vreme", "central_point"],
    keep_existing_on_null: &["legacy_ticketing_id", "legacy_city_id"],
    touch_column: Some("updated_at"),
};

static SHIFT_DEPARTURES: TargetTable = TargetTable {
    name: "changes_codes_tours",
    columns: ShiftDeparture::COLUMNS,
    key: &[
        "turnus_id",
        "day_number",
        "line_no",
        "direction",
        "start_time",
        "departure_no_in_turage",
    ],
    keep_existing_on_null: &[],
    touch_column: None,
};

static SHIFT_GROUPS: TargetTable = TargetTable {
    name: "turnus_groups_names",
    columns: ShiftGroup::COLUMNS,
    key: &["id"],
    keep_existing_on_null: &[],
    touch_column: None,
};

static SHIFT_ASSIGNMENTS: TargetTable = TargetTable {
    name: "turnus_groups_assign",
    columns: ShiftAssignment::COLUMNS,
    key: &["turnus_id", "group_id", "date_from"],
    keep_existing_on_null: &[],
    touch_column: None,
};

static SHIFT_DAYS: TargetTable = TargetTable {
    name: "turnus_days",
    columns: ShiftDay::COLUMNS,
    key: &["turnus_id", "dayname"],
    keep_existing_on_null: &[],
    touch_column: None,
};

static STOPS: TargetTable = TargetTable {
    name: "unique_station_id_local",
    columns: &[
        "unique_id",
        "station_name",
        "gpsx",
        "gpsy",
        "description",
        "range",
        "range_for_driver_console",
        "range_for_validators",
        "changed",
        "main_operator",
        "group_id",
        "ready_for_booking",
        "used_in_booking",
        "date_valid_from",
        "legacy_ticketing_id",
        "legacy_city_id",
    ],
    key: &["unique_id"],
    keep_existing_on_null: &["legacy_ticketing_id", "legacy_city_id"],
    touch_column: None,
};

impl SyncEntity {
    pub const ALL: [SyncEntity; 7] = [
        SyncEntity::Departures,
        SyncEntity::StationTimetables,
        SyncEntity::ShiftDepartures,
        SyncEntity::ShiftGroups,
        SyncEntity::ShiftAssignments,
        SyncEntity::ShiftDays,
        SyncEntity::Stops,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEntity::Departures => "departures",
            SyncEntity::StationTimetables => "station_timetables",
            SyncEntity::ShiftDepartures => "shift_departures",
            SyncEntity::ShiftGroups => "shift_groups",
            SyncEntity::ShiftAssignments => "shift_assignments",
            SyncEntity::ShiftDays => "shift_days",
            SyncEntity::Stops => "stops",
        }
    }

    pub fn legacy_table(&self) -> &'static str {
        match self {
            SyncEntity::Departures => "vremena_polaska",
            SyncEntity::StationTimetables => "vremena_polaska_st",
            SyncEntity::ShiftDepartures => "changes_codes_tours",
            SyncEntity::ShiftGroups => "turnus_groups_names",
            SyncEntity::ShiftAssignments => "turnus_groups_assign",
            SyncEntity::ShiftDays => "turnus_days",
            SyncEntity::Stops => "unique_station_id_local",
        }
    }

    pub fn legacy_columns(&self) -> &'static [&'static str] {
        match self {
            SyncEntity::Departures => Departure::COLUMNS,
            SyncEntity::StationTimetables => StationTimetable::COLUMNS,
            SyncEntity::ShiftDepartures => ShiftDeparture::COLUMNS,
            SyncEntity::ShiftGroups => ShiftGroup::COLUMNS,
            SyncEntity::ShiftAssignments => ShiftAssignment::COLUMNS,
            SyncEntity::ShiftDays => ShiftDay::COLUMNS,
            SyncEntity::Stops => Stop::COLUMNS,
        }
    }

    /// Stable ordering used for extraction so chunk boundaries are reproducible.
    pub fn legacy_order(&self) -> &'static [&'static str] {
        match self {
            SyncEntity::Departures | SyncEntity::StationTimetables | SyncEntity::ShiftGroups => {
                &["id"]
            }
            SyncEntity::ShiftDepartures => SHIFT_DEPARTURES.key,
            SyncEntity::ShiftAssignments => SHIFT_ASSIGNMENTS.key,
            SyncEntity::ShiftDays => SHIFT_DAYS.key,
            SyncEntity::Stops => &["unique_id"],
        }
    }

    pub fn target(&self) -> &'static TargetTable {
        match self {
            SyncEntity::Departures => &DEPARTURES,
            SyncEntity::StationTimetables => &STATION_TIMETABLES,
            SyncEntity::ShiftDepartures => &SHIFT_DEPARTURES,
            SyncEntity::ShiftGroups => &SHIFT_GROUPS,
            SyncEntity::ShiftAssignments => &SHIFT_ASSIGNMENTS,
            SyncEntity::ShiftDays => &SHIFT_DAYS,
            SyncEntity::Stops => &STOPS,
        }
    }

    /// Legacy column a single-day scope filters on.
    pub fn date_column(&self) -> Option<&'static str> {
        match self {
            SyncEntity::Departures | SyncEntity::StationTimetables => Some("datum"),
            SyncEntity::ShiftGroups | SyncEntity::Stops => Some("date_valid_from"),
            _ => None,
        }
    }

    /// Legacy column holding the line id, for line-restricted scopes.
    pub fn line_column(&self) -> Option<&'static str> {
        match self {
            SyncEntity::Departures | SyncEntity::StationTimetables => Some("idlinije"),
            _ => None,
        }
    }

    pub fn group_link(&self) -> Option<GroupLink> {
        match self {
            SyncEntity::ShiftAssignments => Some(GroupLink::Column("group_id")),
            SyncEntity::ShiftGroups => Some(GroupLink::Column("id")),
            SyncEntity::ShiftDepartures | SyncEntity::ShiftDays => Some(GroupLink::Assignment),
            _ => None,
        }
    }
}

impl fmt::Display for SyncEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        SyncEntity::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| format!("unknown entity '{s}'"))
    }
}
