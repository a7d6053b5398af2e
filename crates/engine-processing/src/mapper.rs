//! Legacy row to target row transform.
//!
//! Every function here is pure. Nullable fields get their defaults, temporals
//! are canonicalized through [`model::core::calendar`], and business-key
//! fields are validated; a bad key field rejects the row.

use crate::error::MappingError;
use model::{
    core::{
        calendar::{date_of, datetime_of, fallback_date, fallback_datetime, time_of},
        value::{ClockTime, Value},
    },
    records::{
        legacy::{
            DK_COLUMNS, Departure, LegacyRecord, ShiftAssignment, ShiftDay, ShiftDeparture,
            ShiftGroup, StationTimetable, Stop, WEEKDAY_COLUMNS,
        },
        mapped::MappedRecord,
        row::LegacyRow,
    },
    sync::{entity::SyncEntity, scope::SourceKind},
};

const DEFAULT_NUM_DEPARTURES: i64 = 1;
const DEFAULT_NUM_SEATS: i64 = 57;

type Pairs = Vec<(&'static str, Value)>;

#[derive(Debug, Clone, Copy)]
pub struct RecordMapper {
    source: SourceKind,
}

impl RecordMapper {
    pub fn new(source: SourceKind) -> Self {
        Self { source }
    }

    pub fn map_row(&self, entity: SyncEntity, row: &LegacyRow) -> Result<MappedRecord, MappingError> {
        let record = LegacyRecord::from_row(entity, row)?;
        self.map(&record)
    }

    pub fn map(&self, record: &LegacyRecord) -> Result<MappedRecord, MappingError> {
        let pairs = match record {
            LegacyRecord::Departure(d) => self.departure(d)?,
            LegacyRecord::StationTimetable(st) => self.station_timetable(st)?,
            LegacyRecord::ShiftDeparture(sd) => shift_departure(sd)?,
            LegacyRecord::ShiftGroup(g) => shift_group(g),
            LegacyRecord::ShiftAssignment(a) => shift_assignment(a)?,
            LegacyRecord::ShiftDay(d) => shift_day(d)?,
            LegacyRecord::Stop(s) => self.stop(s)?,
        };
        Ok(MappedRecord::from_pairs(record.entity(), pairs)?)
    }

    fn departure(&self, d: &Departure) -> Result<Pairs, MappingError> {
        let mut pairs: Pairs = vec![
            ("datum", key_date("datum", &d.datum)?),
            ("idlinije", key_text("idlinije", &d.idlinije)?),
            ("smer", direction("smer", d.smer)?),
            ("datetime_from", key_datetime("datetime_from", &d.datetime_from)?),
            ("datetime_to", datetime(&d.datetime_to)),
            ("variation", int(d.variation)),
            ("variation_description", text(&d.variation_description)),
        ];
        for (column, flag) in WEEKDAY_COLUMNS.into_iter().zip(&d.weekdays) {
            pairs.push((column, text(flag)));
        }
        for ((code_col, name_col), (code, name)) in DK_COLUMNS.into_iter().zip(&d.carriers) {
            pairs.push((code_col, text(code)));
            pairs.push((name_col, text(name)));
        }
        pairs.extend(self.legacy_ids(Some(d.id)));
        Ok(pairs)
    }

    fn station_timetable(&self, st: &StationTimetable) -> Result<Pairs, MappingError> {
        let vreme = st.vreme.clone().map(Value::String).unwrap_or(Value::Null);
        let mut pairs: Pairs = vec![
            ("datum", date(&st.datum)),
            ("idlinije", key_text("idlinije", &st.idlinije)?),
            ("smer", direction("smer", st.smer)?),
            ("dan", key_text("dan", &st.dan)?),
            ("vreme", key_time("vreme", &vreme)?),
            ("central_point", key_int("central_point", st.central_point)?),
            ("stanice", text(&st.stanice)),
            ("opis", text(&st.opis)),
            ("pauza", text(&st.pauza)),
            ("default_times", text(&st.default_times)),
            ("day_before", int(st.day_before)),
            ("default_peron", text(&st.default_peron)),
            (
                "num_departures",
                Value::Int(st.num_departures.unwrap_or(DEFAULT_NUM_DEPARTURES)),
            ),
            (
                "default_num_seats",
                Value::Int(st.default_num_seats.unwrap_or(DEFAULT_NUM_SEATS)),
            ),
            (
                "timetable_short_comments_id",
                int(st.timetable_short_comments_id),
            ),
            ("vehicle_chassis_types_id", int(st.vehicle_chassis_types_id)),
            ("gtfs_trip_id", text(&st.gtfs_trip_id)),
            ("service_id", text(&st.service_id)),
            ("not_official", flag(st.not_official)),
            ("comp_code", int(st.comp_code)),
            ("vehicle_group_types_id", int(st.vehicle_group_types_id)),
            ("turage_no", int(st.turage_no)),
            ("departure_no_in_turage", int(st.departure_no_in_turage)),
        ];
        pairs.extend(self.legacy_ids(Some(st.id)));
        Ok(pairs)
    }

    fn stop(&self, s: &Stop) -> Result<Pairs, MappingError> {
        let unique_id = key_text("unique_id", &s.unique_id)?;
        let legacy_id = unique_id.as_text().and_then(|id| id.parse::<i64>().ok());
        let mut pairs: Pairs = vec![
            ("unique_id", unique_id),
            ("station_name", text(&s.station_name)),
            ("gpsx", Value::Float(s.gpsx.unwrap_or(0.0))),
            ("gpsy", Value::Float(s.gpsy.unwrap_or(0.0))),
            ("description", text(&s.description)),
            ("range", int(s.range)),
            ("range_for_driver_console", int(s.range_for_driver_console)),
            ("range_for_validators", int(s.range_for_validators)),
            ("changed", int(s.changed)),
            ("main_operator", int(s.main_operator)),
            ("group_id", int(s.group_id)),
            ("ready_for_booking", flag(s.ready_for_booking)),
            ("used_in_booking", flag(s.used_in_booking)),
            ("date_valid_from", date(&s.date_valid_from)),
        ];
        pairs.extend(self.legacy_ids(legacy_id));
        Ok(pairs)
    }

    /// Fills the legacy id column of this mapper's source; the other one is
    /// sent as `NULL` so the stored value survives the upsert.
    fn legacy_ids(&self, id: Option<i64>) -> [(&'static str, Value); 2] {
        let ours = self.source.legacy_id_column();
        let value = id.map(Value::Int).unwrap_or(Value::Null);
        match self.source {
            SourceKind::Ticketing => [(ours, value), ("legacy_city_id", Value::Null)],
            SourceKind::City => [("legacy_ticketing_id", Value::Null), (ours, value)],
        }
    }
}

fn shift_departure(sd: &ShiftDeparture) -> Result<Pairs, MappingError> {
    Ok(vec![
        ("turnus_id", Value::Int(sd.turnus_id)),
        ("turnus_name", text(&sd.turnus_name)),
        ("line_no", key_text("line_no", &sd.line_no)?),
        ("start_time", key_time("start_time", &sd.start_time)?),
        ("direction", direction("direction", sd.direction)?),
        ("duration", time(&sd.duration)),
        ("central_point", text(&sd.central_point)),
        ("change_code", int(sd.change_code)),
        ("job_id", int(sd.job_id)),
        ("new_start_time", time(&sd.new_start_time)),
        ("new_duration", time(&sd.new_duration)),
        ("start_station", int(sd.start_station)),
        ("end_station", int(sd.end_station)),
        ("day_number", key_int("day_number", sd.day_number)?),
        ("line_type_id", int(sd.line_type_id)),
        ("rezijski", text(&sd.rezijski)),
        ("print_id", text(&sd.print_id)),
        ("between_rez", int(sd.between_rez)),
        ("bus_number", int(sd.bus_number)),
        ("start_station_id", int(sd.start_station_id)),
        ("end_station_id", int(sd.end_station_id)),
        ("change_time", datetime(&sd.change_time)),
        ("change_user", text(&sd.change_user)),
        ("active", flag(sd.active)),
        ("first_day_duration_part", time(&sd.first_day_duration_part)),
        ("second_day_duration_part", time(&sd.second_day_duration_part)),
        ("custom_id", text(&sd.custom_id)),
        ("transport_id", text(&sd.transport_id)),
        ("departure_number", int(sd.departure_number)),
        ("shift_number", int(sd.shift_number)),
        ("turage_no", int(sd.turage_no)),
        (
            "departure_no_in_turage",
            key_int("departure_no_in_turage", sd.departure_no_in_turage)?,
        ),
    ])
}

fn shift_group(g: &ShiftGroup) -> Pairs {
    vec![
        ("id", Value::Int(g.id)),
        ("name", text(&g.name)),
        ("active", flag(g.active)),
        ("changed_by", int(g.changed_by)),
        ("change_date", datetime(&g.change_date)),
        ("date_valid_from", date(&g.date_valid_from)),
    ]
}

fn shift_assignment(a: &ShiftAssignment) -> Result<Pairs, MappingError> {
    Ok(vec![
        ("turnus_id", Value::Int(a.turnus_id)),
        ("group_id", Value::Int(a.group_id)),
        ("changed_by", int(a.changed_by)),
        ("change_date", datetime(&a.change_date)),
        ("date_from", key_date("date_from", &a.date_from)?),
        ("date_to", date(&a.date_to)),
    ])
}

fn shift_day(d: &ShiftDay) -> Result<Pairs, MappingError> {
    let dayname = match key_text("dayname", &d.dayname)? {
        Value::String(name) => Value::String(name.to_lowercase()),
        other => other,
    };
    Ok(vec![("turnus_id", Value::Int(d.turnus_id)), ("dayname", dayname)])
}

fn text(v: &Option<String>) -> Value {
    Value::String(v.clone().unwrap_or_default())
}

fn int(v: Option<i64>) -> Value {
    Value::Int(v.unwrap_or(0))
}

fn flag(v: Option<i64>) -> Value {
    Value::Int(i64::from(v.unwrap_or(0) != 0))
}

fn date(v: &Value) -> Value {
    Value::Date(date_of(v).unwrap_or_else(fallback_date))
}

fn datetime(v: &Value) -> Value {
    Value::DateTime(datetime_of(v).unwrap_or_else(fallback_datetime))
}

fn time(v: &Value) -> Value {
    Value::Time(time_of(v).unwrap_or(ClockTime::MIDNIGHT))
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn key_err(column: &'static str, v: &Value) -> MappingError {
    if is_blank(v) {
        MappingError::MissingKey(column)
    } else {
        MappingError::InvalidKey {
            column,
            value: v.to_string(),
        }
    }
}

fn key_date(column: &'static str, v: &Value) -> Result<Value, MappingError> {
    date_of(v).map(Value::Date).ok_or_else(|| key_err(column, v))
}

fn key_datetime(column: &'static str, v: &Value) -> Result<Value, MappingError> {
    datetime_of(v)
        .map(Value::DateTime)
        .ok_or_else(|| key_err(column, v))
}

fn key_time(column: &'static str, v: &Value) -> Result<Value, MappingError> {
    time_of(v).map(Value::Time).ok_or_else(|| key_err(column, v))
}

fn key_text(column: &'static str, v: &Option<String>) -> Result<Value, MappingError> {
    match v.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(Value::String(s.to_string())),
        _ => Err(MappingError::MissingKey(column)),
    }
}

fn key_int(column: &'static str, v: Option<i64>) -> Result<Value, MappingError> {
    v.map(Value::Int).ok_or(MappingError::MissingKey(column))
}

fn direction(column: &'static str, v: Option<i64>) -> Result<Value, MappingError> {
    match v {
        Some(d @ (1 | 2)) => Ok(Value::Int(d)),
        Some(value) => Err(MappingError::Direction { column, value }),
        None => Err(MappingError::MissingKey(column)),
    }
}
