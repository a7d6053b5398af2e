//! Typed views over legacy rows, one struct per legacy table.
//!
//! Parsing only checks column shapes. Defaults and canonicalization happen
//! in the record mapper, so every nullable column stays an `Option` (or a
//! raw [`Value`] for temporals) here.

use crate::{
    core::value::Value,
    records::row::LegacyRow,
    sync::entity::SyncEntity,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowShapeError {
    #[error("column '{0}' is missing or null")]
    Missing(&'static str),

    #[error("column '{column}' holds {found}, expected {expected}")]
    Invalid {
        column: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// Column accessors that tolerate the loose typing of legacy schemas
/// (numbers stored as text, empty strings standing in for `NULL`).
struct Fields<'a>(&'a LegacyRow);

impl Fields<'_> {
    fn raw(&self, column: &'static str) -> Value {
        self.0.value(column)
    }

    fn text(&self, column: &'static str) -> Result<Option<String>, RowShapeError> {
        match self.0.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Bytes(b)) => String::from_utf8(b.clone())
                .map(Some)
                .map_err(|_| invalid(column, "utf-8 text", "non utf-8 bytes")),
            Some(other) => Ok(other.as_text()),
        }
    }

    fn int(&self, column: &'static str) -> Result<Option<i64>, RowShapeError> {
        let value = match self.0.get(column) {
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v,
        };
        if let Value::String(s) = value {
            if s.trim().is_empty() {
                return Ok(None);
            }
        }
        if let Value::Bytes(b) = value {
            if b.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
        }
        value
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(column, "integer", &value.to_string()))
    }

    fn float(&self, column: &'static str) -> Result<Option<f64>, RowShapeError> {
        let value = match self.0.get(column) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
            Some(v) => v,
        };
        value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(column, "number", &value.to_string()))
    }

    fn required_int(&self, column: &'static str) -> Result<i64, RowShapeError> {
        self.int(column)?.ok_or(RowShapeError::Missing(column))
    }
}

fn invalid(column: &'static str, expected: &'static str, found: &str) -> RowShapeError {
    RowShapeError::Invalid {
        column,
        expected,
        found: found.chars().take(64).collect(),
    }
}

pub const WEEKDAY_COLUMNS: [&str; 7] = ["pon", "uto", "sre", "cet", "pet", "sub", "ned"];

pub const DK_COLUMNS: [(&str, &str); 4] = [
    ("dk1", "dk1naziv"),
    ("dk2", "dk2naziv"),
    ("dk3", "dk3naziv"),
    ("dk4", "dk4naziv"),
];

/// `vremena_polaska`: one timetable departure per line, direction and validity window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Departure {
    pub id: i64,
    pub datum: Value,
    pub idlinije: Option<String>,
    pub smer: Option<i64>,
    /// Per-weekday flags, Monday first.
    pub weekdays: [Option<String>; 7],
    /// Carrier code and carrier name pairs.
    pub carriers: [(Option<String>, Option<String>); 4],
    pub variation: Option<i64>,
    pub datetime_from: Value,
    pub datetime_to: Value,
    pub variation_description: Option<String>,
}

impl Departure {
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
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
    ];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        let mut weekdays: [Option<String>; 7] = Default::default();
        for (slot, column) in weekdays.iter_mut().zip(WEEKDAY_COLUMNS) {
            *slot = f.text(column)?;
        }
        let mut carriers: [(Option<String>, Option<String>); 4] = Default::default();
        for (slot, (code, name)) in carriers.iter_mut().zip(DK_COLUMNS) {
            *slot = (f.text(code)?, f.text(name)?);
        }
        Ok(Self {
            id: f.required_int("id")?,
            datum: f.raw("datum"),
            idlinije: f.text("idlinije")?,
            smer: f.int("smer")?,
            weekdays,
            carriers,
            variation: f.int("variation")?,
            datetime_from: f.raw("datetime_from"),
            datetime_to: f.raw("datetime_to"),
            variation_description: f.text("variation_description")?,
        })
    }
}

/// `vremena_polaska_st`: station-level departure times of a line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationTimetable {
    pub id: i64,
    pub datum: Value,
    pub idlinije: Option<String>,
    pub smer: Option<i64>,
    pub dan: Option<String>,
    pub vreme: Option<String>,
    pub stanice: Option<String>,
    pub opis: Option<String>,
    pub central_point: Option<i64>,
    pub pauza: Option<String>,
    pub default_times: Option<String>,
    pub day_before: Option<i64>,
    pub default_peron: Option<String>,
    pub num_departures: Option<i64>,
    pub default_num_seats: Option<i64>,
    pub timetable_short_comments_id: Option<i64>,
    pub vehicle_chassis_types_id: Option<i64>,
    pub gtfs_trip_id: Option<String>,
    pub service_id: Option<String>,
    pub not_official: Option<i64>,
    pub comp_code: Option<i64>,
    pub vehicle_group_types_id: Option<i64>,
    pub turage_no: Option<i64>,
    pub departure_no_in_turage: Option<i64>,
}

impl StationTimetable {
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
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
    ];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        Ok(Self {
            id: f.required_int("id")?,
            datum: f.raw("datum"),
            idlinije: f.text("idlinije")?,
            smer: f.int("smer")?,
            dan: f.text("dan")?,
            vreme: f.text("vreme")?,
            stanice: f.text("stanice")?,
            opis: f.text("opis")?,
            central_point: f.int("central_point")?,
            pauza: f.text("pauza")?,
            default_times: f.text("default_times")?,
            day_before: f.int("day_before")?,
            default_peron: f.text("default_peron")?,
            num_departures: f.int("num_departures")?,
            default_num_seats: f.int("default_num_seats")?,
            timetable_short_comments_id: f.int("timetable_short_comments_id")?,
            vehicle_chassis_types_id: f.int("vehicle_chassis_types_id")?,
            gtfs_trip_id: f.text("gtfs_trip_id")?,
            service_id: f.text("service_id")?,
            not_official: f.int("not_official")?,
            comp_code: f.int("comp_code")?,
            vehicle_group_types_id: f.int("vehicle_group_types_id")?,
            turage_no: f.int("turage_no")?,
            departure_no_in_turage: f.int("departure_no_in_turage")?,
        })
    }
}

/// `changes_codes_tours`: one departure of a bus shift (turnus).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftDeparture {
    pub turnus_id: i64,
    pub turnus_name: Option<String>,
    pub line_no: Option<String>,
    pub start_time: Value,
    pub direction: Option<i64>,
    pub duration: Value,
    pub central_point: Option<String>,
    pub change_code: Option<i64>,
    pub job_id: Option<i64>,
    pub new_start_time: Value,
    pub new_duration: Value,
    pub start_station: Option<i64>,
    pub end_station: Option<i64>,
    pub day_number: Option<i64>,
    pub line_type_id: Option<i64>,
    pub rezijski: Option<String>,
    pub print_id: Option<String>,
    pub between_rez: Option<i64>,
    pub bus_number: Option<i64>,
    pub start_station_id: Option<i64>,
    pub end_station_id: Option<i64>,
    pub change_time: Value,
    pub change_user: Option<String>,
    pub active: Option<i64>,
    pub first_day_duration_part: Value,
    pub second_day_duration_part: Value,
    pub custom_id: Option<String>,
    pub transport_id: Option<String>,
    pub departure_number: Option<i64>,
    pub shift_number: Option<i64>,
    pub turage_no: Option<i64>,
    pub departure_no_in_turage: Option<i64>,
}

impl ShiftDeparture {
    pub const COLUMNS: &'static [&'static str] = &[
        "turnus_id",
        "turnus_name",
        "line_no",
        "start_time",
        "direction",
        "duration",
        "central_point",
        "change_code",
        "job_id",
        "new_start_time",
        "new_duration",
        "start_station",
        "end_station",
        "day_number",
        "line_type_id",
        "rezijski",
        "print_id",
        "between_rez",
        "bus_number",
        "start_station_id",
        "end_station_id",
        "change_time",
        "change_user",
        "active",
        "first_day_duration_part",
        "second_day_duration_part",
        "custom_id",
        "transport_id",
        "departure_number",
        "shift_number",
        "turage_no",
        "departure_no_in_turage",
    ];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        Ok(Self {
            turnus_id: f.required_int("turnus_id")?,
            turnus_name: f.text("turnus_name")?,
            line_no: f.text("line_no")?,
            start_time: f.raw("start_time"),
            direction: f.int("direction")?,
            duration: f.raw("duration"),
            central_point: f.text("central_point")?,
            change_code: f.int("change_code")?,
            job_id: f.int("job_id")?,
            new_start_time: f.raw("new_start_time"),
            new_duration: f.raw("new_duration"),
            start_station: f.int("start_station")?,
            end_station: f.int("end_station")?,
            day_number: f.int("day_number")?,
            line_type_id: f.int("line_type_id")?,
            rezijski: f.text("rezijski")?,
            print_id: f.text("print_id")?,
            between_rez: f.int("between_rez")?,
            bus_number: f.int("bus_number")?,
            start_station_id: f.int("start_station_id")?,
            end_station_id: f.int("end_station_id")?,
            change_time: f.raw("change_time"),
            change_user: f.text("change_user")?,
            active: f.int("active")?,
            first_day_duration_part: f.raw("first_day_duration_part"),
            second_day_duration_part: f.raw("second_day_duration_part"),
            custom_id: f.text("custom_id")?,
            transport_id: f.text("transport_id")?,
            departure_number: f.int("departure_number")?,
            shift_number: f.int("shift_number")?,
            turage_no: f.int("turage_no")?,
            departure_no_in_turage: f.int("departure_no_in_turage")?,
        })
    }
}

/// `turnus_groups_names`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftGroup {
    pub id: i64,
    pub name: Option<String>,
    pub active: Option<i64>,
    pub changed_by: Option<i64>,
    pub change_date: Value,
    pub date_valid_from: Value,
}

impl ShiftGroup {
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "active",
        "changed_by",
        "change_date",
        "date_valid_from",
    ];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        Ok(Self {
            id: f.required_int("id")?,
            name: f.text("name")?,
            active: f.int("active")?,
            changed_by: f.int("changed_by")?,
            change_date: f.raw("change_date"),
            date_valid_from: f.raw("date_valid_from"),
        })
    }
}

/// `turnus_groups_assign`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftAssignment {
    pub turnus_id: i64,
    pub group_id: i64,
    pub changed_by: Option<i64>,
    pub change_date: Value,
    pub date_from: Value,
    pub date_to: Value,
}

impl ShiftAssignment {
    pub const COLUMNS: &'static [&'static str] = &[
        "turnus_id",
        "group_id",
        "changed_by",
        "change_date",
        "date_from",
        "date_to",
    ];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        Ok(Self {
            turnus_id: f.required_int("turnus_id")?,
            group_id: f.required_int("group_id")?,
            changed_by: f.int("changed_by")?,
            change_date: f.raw("change_date"),
            date_from: f.raw("date_from"),
            date_to: f.raw("date_to"),
        })
    }
}

/// `turnus_days`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftDay {
    pub turnus_id: i64,
    pub dayname: Option<String>,
}

impl ShiftDay {
    pub const COLUMNS: &'static [&'static str] = &["turnus_id", "dayname"];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        Ok(Self {
            turnus_id: f.required_int("turnus_id")?,
            dayname: f.text("dayname")?,
        })
    }
}

/// `unique_station_id_local`: the stop catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stop {
    /// Numeric text in the legacy schema (`'151'`).
    pub unique_id: Option<String>,
    pub station_name: Option<String>,
    pub gpsx: Option<f64>,
    pub gpsy: Option<f64>,
    pub description: Option<String>,
    pub range: Option<i64>,
    pub range_for_driver_console: Option<i64>,
    pub range_for_validators: Option<i64>,
    pub changed: Option<i64>,
    pub main_operator: Option<i64>,
    pub group_id: Option<i64>,
    pub ready_for_booking: Option<i64>,
    pub used_in_booking: Option<i64>,
    pub date_valid_from: Value,
}

impl Stop {
    pub const COLUMNS: &'static [&'static str] = &[
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
    ];

    fn parse(f: &Fields<'_>) -> Result<Self, RowShapeError> {
        Ok(Self {
            unique_id: f.text("unique_id")?,
            station_name: f.text("station_name")?,
            gpsx: f.float("gpsx")?,
            gpsy: f.float("gpsy")?,
            description: f.text("description")?,
            range: f.int("range")?,
            range_for_driver_console: f.int("range_for_driver_console")?,
            range_for_validators: f.int("range_for_validators")?,
            changed: f.int("changed")?,
            main_operator: f.int("main_operator")?,
            group_id: f.int("group_id")?,
            ready_for_booking: f.int("ready_for_booking")?,
            used_in_booking: f.int("used_in_booking")?,
            date_valid_from: f.raw("date_valid_from"),
        })
    }
}

/// A legacy row whose shape matched its table.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyRecord {
    Departure(Departure),
    StationTimetable(StationTimetable),
    ShiftDeparture(ShiftDeparture),
    ShiftGroup(ShiftGroup),
    ShiftAssignment(ShiftAssignment),
    ShiftDay(ShiftDay),
    Stop(Stop),
}

impl LegacyRecord {
    pub fn from_row(entity: SyncEntity, row: &LegacyRow) -> Result<Self, RowShapeError> {
        let f = Fields(row);
        Ok(match entity {
            SyncEntity::Departures => LegacyRecord::Departure(Departure::parse(&f)?),
            SyncEntity::StationTimetables => {
                LegacyRecord::StationTimetable(StationTimetable::parse(&f)?)
            }
            SyncEntity::ShiftDepartures => LegacyRecord::ShiftDeparture(ShiftDeparture::parse(&f)?),
            SyncEntity::ShiftGroups => LegacyRecord::ShiftGroup(ShiftGroup::parse(&f)?),
            SyncEntity::ShiftAssignments => {
                LegacyRecord::ShiftAssignment(ShiftAssignment::parse(&f)?)
            }
            SyncEntity::ShiftDays => LegacyRecord::ShiftDay(ShiftDay::parse(&f)?),
            SyncEntity::Stops => LegacyRecord::Stop(Stop::parse(&f)?),
        })
    }

    pub fn entity(&self) -> SyncEntity {
        match self {
            LegacyRecord::Departure(_) => SyncEntity::Departures,
            LegacyRecord::StationTimetable(_) => SyncEntity::StationTimetables,
            LegacyRecord::ShiftDeparture(_) => SyncEntity::ShiftDepartures,
            LegacyRecord::ShiftGroup(_) => SyncEntity::ShiftGroups,
            LegacyRecord::ShiftAssignment(_) => SyncEntity::ShiftAssignments,
            LegacyRecord::ShiftDay(_) => SyncEntity::ShiftDays,
            LegacyRecord::Stop(_) => SyncEntity::Stops,
        }
    }
}

/// Short identification of a legacy row for logs and diagnostics.
pub fn describe_row(entity: SyncEntity, row: &LegacyRow) -> String {
    entity
        .legacy_order()
        .iter()
        .map(|col| format!("{col}={}", row.value(col)))
        .collect::<Vec<_>>()
        .join(",")
}
