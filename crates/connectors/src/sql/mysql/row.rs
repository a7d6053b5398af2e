use chrono::NaiveDate;
use model::{
    core::value::{ClockTime, Value},
    records::row::LegacyRow,
};
use mysql_async::{Row as MySqlRow, Value as MySqlValue, consts::ColumnType};

/// Converts a driver row into a [`LegacyRow`], keeping temporals component-wise.
pub fn legacy_row(row: &MySqlRow) -> LegacyRow {
    let columns = row.columns_ref();
    let mut out = LegacyRow::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value = row
            .as_ref(idx)
            .map(|raw| convert(raw, column.column_type()))
            .unwrap_or(Value::Null);
        out.push(column.name_str().into_owned(), value);
    }
    out
}

fn convert(raw: &MySqlValue, column_type: ColumnType) -> Value {
    match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(text) => Value::String(text),
            Err(_) => Value::Bytes(bytes.clone()),
        },
        MySqlValue::Int(v) => Value::Int(*v),
        MySqlValue::UInt(v) => Value::Uint(*v),
        MySqlValue::Float(v) => Value::Float(f64::from(*v)),
        MySqlValue::Double(v) => Value::Float(*v),
        MySqlValue::Date(y, m, d, hh, mm, ss, _micros) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d));
            match date {
                // Zero and partial dates ('0000-00-00') keep their text so the mapper sees them.
                None => Value::String(format!("{y:04}-{m:02}-{d:02}")),
                Some(date) if column_type == ColumnType::MYSQL_TYPE_DATE => Value::Date(date),
                Some(date) => date
                    .and_hms_opt(u32::from(*hh), u32::from(*mm), u32::from(*ss))
                    .map(Value::DateTime)
                    .unwrap_or(Value::Date(date)),
            }
        }
        MySqlValue::Time(negative, days, hh, mm, ss, _micros) => {
            let hours = days.saturating_mul(24).saturating_add(u32::from(*hh));
            match ClockTime::new(hours, u32::from(*mm), u32::from(*ss)) {
                Some(t) if !negative => Value::Time(t),
                _ => Value::String(format!(
                    "{}{hours:02}:{mm:02}:{ss:02}",
                    if *negative { "-" } else { "" }
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dates_surface_as_text() {
        let v = convert(
            &MySqlValue::Date(0, 0, 0, 0, 0, 0, 0),
            ColumnType::MYSQL_TYPE_DATE,
        );
        assert_eq!(v, Value::String("0000-00-00".into()));
    }

    #[test]
    fn date_columns_stay_dates() {
        let v = convert(
            &MySqlValue::Date(2023, 8, 31, 0, 0, 0, 0),
            ColumnType::MYSQL_TYPE_DATE,
        );
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2023, 8, 31).unwrap()));

        let v = convert(
            &MySqlValue::Date(2023, 8, 31, 23, 10, 0, 0),
            ColumnType::MYSQL_TYPE_DATETIME,
        );
        assert_eq!(v.as_text().as_deref(), Some("2023-08-31 23:10:00"));
    }

    #[test]
    fn negative_intervals_are_not_clock_times() {
        let v = convert(
            &MySqlValue::Time(true, 0, 1, 0, 0, 0),
            ColumnType::MYSQL_TYPE_TIME,
        );
        assert_eq!(v, Value::String("-01:00:00".into()));
        let v = convert(
            &MySqlValue::Time(false, 1, 3, 0, 0, 0),
            ColumnType::MYSQL_TYPE_TIME,
        );
        assert_eq!(v, Value::Time(ClockTime::new(27, 0, 0).unwrap()));
    }
}
