//! Timestamp normalization across the historical CSV layouts.
//!
//! Loggers have written time in several shapes over the years. Detection is an
//! ordered list of strategies and the first one whose predicate matches the
//! frame builds the table; the order is fixed because it encodes which device
//! models use which layout.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use dc_types::{DataError, DcResult, Frame, Row, Table, Timestamp, Value};

/// A named predicate-plus-transform pair. `build` receives the offset given
/// to values that carry none.
pub struct TimestampStrategy {
    pub name: &'static str,
    pub applies: fn(&Frame) -> bool,
    pub build: fn(Frame, FixedOffset) -> DcResult<Table>,
}

impl std::fmt::Debug for TimestampStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampStrategy")
            .field("name", &self.name)
            .finish()
    }
}

/// Detection order; first match wins.
pub static TIMESTAMP_STRATEGIES: &[TimestampStrategy] = &[
    TimestampStrategy {
        name: "timestamp",
        applies: has_timestamp_column,
        build: from_timestamp_column,
    },
    TimestampStrategy {
        name: "TIM",
        applies: has_tim_column,
        build: from_tim_column,
    },
    TimestampStrategy {
        name: "date-parts",
        applies: has_date_part_columns,
        build: from_date_part_columns,
    },
    TimestampStrategy {
        name: "Time",
        applies: has_time_column,
        build: from_time_column,
    },
];

/// Field name variants for the six discrete date/time columns, in pick order.
const DATE_PART_COLUMNS: [[&str; 3]; 6] = [
    ["Year", "YEAR", "year"],
    ["Month", "MONTH", "month"],
    ["Day", "DAY", "day"],
    ["Hour", "HOUR", "hour"],
    ["Minute", "MINUTE", "minute"],
    ["Second", "SECOND", "second"],
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    // hour-only offsets such as `+07`
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
];

const ISO_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Month-first spellings come before day-first ones, so `11/12/2025` reads
/// as November 12th and `18/11/2025` falls through to day-first.
const GENERIC_NAIVE_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%B %d, %Y %H:%M:%S%.f",
    "%B %d, %Y %H:%M",
    "%B %d %Y %H:%M:%S%.f",
    "%d %B %Y %H:%M:%S%.f",
    "%d %B %Y %H:%M",
    "%Y%m%d %H:%M:%S%.f",
    "%Y%m%dT%H%M%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%Y%m%d",
];

/// Time-of-day only; the date is today's in the naive offset.
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Numeric epochs at or above this magnitude are milliseconds, below it seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// The strategy that would handle `frame`, if any.
pub fn detect_strategy(frame: &Frame) -> Option<&'static TimestampStrategy> {
    TIMESTAMP_STRATEGIES.iter().find(|s| (s.applies)(frame))
}

/// Give `frame` a canonical timestamp per row; values without an offset are UTC.
pub fn normalize(frame: Frame) -> DcResult<Table> {
    normalize_with_offset(frame, Utc.fix())
}

/// Like [`normalize`], labelling offset-less values with `naive_offset`.
pub fn normalize_with_offset(frame: Frame, naive_offset: FixedOffset) -> DcResult<Table> {
    match detect_strategy(&frame) {
        Some(strategy) => {
            tracing::trace!(strategy = strategy.name, "Detected timestamp layout");
            (strategy.build)(frame, naive_offset)
        }
        None => Err(DataError::NoTimeColumns.into()),
    }
}

fn has_timestamp_column(frame: &Frame) -> bool {
    frame.has_column("timestamp")
}

fn has_tim_column(frame: &Frame) -> bool {
    frame.has_column("TIM")
}

fn has_date_part_columns(frame: &Frame) -> bool {
    date_part_indices(frame).is_some()
}

fn has_time_column(frame: &Frame) -> bool {
    frame.has_column("Time")
}

/// Adopt an existing `timestamp` column; it leaves the value columns.
fn from_timestamp_column(frame: Frame, naive_offset: FixedOffset) -> DcResult<Table> {
    let index = column(&frame, "timestamp")?;
    let timestamps = frame
        .rows()
        .iter()
        .map(|row| value_to_timestamp(&row[index], naive_offset))
        .collect();
    Ok(into_table(frame, timestamps, Some(index)))
}

fn from_tim_column(frame: Frame, naive_offset: FixedOffset) -> DcResult<Table> {
    let index = column(&frame, "TIM")?;
    let timestamps: Vec<Option<Timestamp>> = frame
        .rows()
        .iter()
        .map(|row| {
            row[index]
                .as_str()
                .and_then(|s| parse_iso8601(s, naive_offset))
        })
        .collect();

    if timestamps.iter().all(Option::is_none) {
        return Err(DataError::TimestampUnparseable {
            column: "TIM".to_string(),
        }
        .into());
    }

    Ok(into_table(frame, timestamps, None))
}

/// Compose from six integer columns; a row that does not form a valid
/// date-time keeps a null timestamp instead of being dropped.
fn from_date_part_columns(frame: Frame, naive_offset: FixedOffset) -> DcResult<Table> {
    let indices = date_part_indices(&frame).ok_or(DataError::NoTimeColumns)?;
    let timestamps = frame
        .rows()
        .iter()
        .map(|row| {
            let mut parts = [0i64; 6];
            for (part, &index) in parts.iter_mut().zip(indices.iter()) {
                *part = row[index].as_i64()?;
            }
            compose_timestamp(parts, naive_offset)
        })
        .collect();

    Ok(into_table(frame, timestamps, None))
}

fn from_time_column(frame: Frame, naive_offset: FixedOffset) -> DcResult<Table> {
    let index = column(&frame, "Time")?;
    let timestamps = frame
        .rows()
        .iter()
        .map(|row| value_to_timestamp(&row[index], naive_offset))
        .collect();
    Ok(into_table(frame, timestamps, None))
}

fn column(frame: &Frame, name: &str) -> DcResult<usize> {
    frame.column_index(name).ok_or_else(|| {
        DataError::ColumnNotFound {
            column: name.to_string(),
        }
        .into()
    })
}

fn date_part_indices(frame: &Frame) -> Option<[usize; 6]> {
    let mut indices = [0usize; 6];
    for (slot, variants) in indices.iter_mut().zip(DATE_PART_COLUMNS.iter()) {
        *slot = variants.iter().find_map(|name| frame.column_index(name))?;
    }
    Some(indices)
}

fn into_table(frame: Frame, timestamps: Vec<Option<Timestamp>>, drop_column: Option<usize>) -> Table {
    let (headers, rows) = frame.into_parts();

    let columns: Vec<String> = headers
        .into_iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != drop_column)
        .map(|(_, h)| h)
        .collect();

    let rows = rows
        .into_iter()
        .zip(timestamps)
        .map(|(values, timestamp)| {
            let values = match drop_column {
                Some(drop) => values
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| *i != drop)
                    .map(|(_, v)| v)
                    .collect(),
                None => values,
            };
            Row::new(timestamp, values)
        })
        .collect();

    Table::from_rows(columns, rows)
}

/// Generic cell conversion: text through [`parse_datetime`], numbers as Unix epochs.
fn value_to_timestamp(value: &Value, naive_offset: FixedOffset) -> Option<Timestamp> {
    match value {
        Value::Text(s) => parse_datetime(s, naive_offset),
        Value::Int(i) => from_epoch(*i as f64, naive_offset),
        Value::Float(f) => from_epoch(*f, naive_offset),
        Value::Null => None,
    }
}

/// Unix epoch in seconds, or milliseconds past [`EPOCH_MILLIS_THRESHOLD`].
fn from_epoch(epoch: f64, offset: FixedOffset) -> Option<Timestamp> {
    if !epoch.is_finite() {
        return None;
    }
    let millis = if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1000.0
    };
    DateTime::<Utc>::from_timestamp_millis(millis.round() as i64).map(|dt| dt.with_timezone(&offset))
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<Timestamp> {
    offset.from_local_datetime(&naive).single()
}

fn compose_timestamp(
    [year, month, day, hour, minute, second]: [i64; 6],
    offset: FixedOffset,
) -> Option<Timestamp> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;
    let naive = date.and_hms_opt(
        u32::try_from(hour).ok()?,
        u32::try_from(minute).ok()?,
        u32::try_from(second).ok()?,
    )?;
    localize(naive, offset)
}

fn parse_naive(s: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// ISO-8601 date-time, with or without a trailing UTC offset. Values without
/// an offset are labelled `naive_offset`.
pub fn parse_iso8601(s: &str, naive_offset: FixedOffset) -> Option<Timestamp> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(s, format).ok())
    {
        return Some(dt);
    }

    parse_naive(s, ISO_NAIVE_FORMATS).and_then(|naive| localize(naive, naive_offset))
}

/// Any supported date-time spelling. Date-only values land at midnight and
/// time-only values on today's date.
pub fn parse_datetime(s: &str, naive_offset: FixedOffset) -> Option<Timestamp> {
    if let Some(dt) = parse_iso8601(s, naive_offset) {
        return Some(dt);
    }

    let s = s.trim();

    if let Some(naive) = parse_naive(s, GENERIC_NAIVE_FORMATS) {
        return localize(naive, naive_offset);
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
    {
        return date
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| localize(naive, naive_offset));
    }

    let time = TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())?;
    let today = Utc::now().with_timezone(&naive_offset).date_naive();
    localize(today.and_time(time), naive_offset)
}

/// UTC offset spelled `Z`, `UTC`, `+07`, `+0700` or `+07:00`.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Some(Utc.fix());
    }

    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::CsvLoader;
    use dc_types::DcError;

    fn frame(csv: &str) -> Frame {
        CsvLoader::new().parse_csv(csv.as_bytes()).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    #[test]
    fn test_tim_wins_over_date_parts() {
        let frame = frame(
            "TIM,Year,Month,Day,Hour,Minute,Second,value\n\
             2025-11-18T14:44:23+07:00,2020,1,1,0,0,0,415\n",
        );
        assert_eq!(detect_strategy(&frame).unwrap().name, "TIM");

        let table = normalize(frame).unwrap();
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2025-11-18T14:44:23+07:00"))
        );
        assert!(table.column_index("TIM").is_some());
        assert!(table.column_index("Year").is_some());
    }

    #[test]
    fn test_existing_timestamp_column_is_adopted() {
        let frame = frame("timestamp,TIM,value\n2025-01-01 00:00:00,garbage,1\n");
        assert_eq!(detect_strategy(&frame).unwrap().name, "timestamp");

        let table = normalize(frame).unwrap();
        assert_eq!(table.columns(), &["TIM", "value"]);
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2025-01-01T00:00:00+00:00"))
        );
    }

    #[test]
    fn test_unparseable_tim_is_distinct_from_absent() {
        let result = normalize(frame("TIM,value\nnot-a-date,1\nalso-bad,2\n"));
        match result {
            Err(DcError::Data(DataError::TimestampUnparseable { column })) => {
                assert_eq!(column, "TIM")
            }
            other => panic!("Expected TimestampUnparseable, got: {:?}", other),
        }

        let result = normalize(frame("value,other\n1,2\n"));
        assert!(matches!(
            result,
            Err(DcError::Data(DataError::NoTimeColumns))
        ));
    }

    #[test]
    fn test_partially_parseable_tim_keeps_rows() {
        let table = normalize(frame(
            "TIM,value\n2025-11-18T14:44:23+07:00,1\nbroken,2\n",
        ))
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.rows()[1].timestamp.is_none());
    }

    #[test]
    fn test_date_parts_with_mixed_case_variants() {
        let frame = frame(
            "YEAR,month,Day,HOUR,Minute,second,COM_1 Wd_1\n\
             2025,11,18,14,44,23,27.5\n\
             2025,13,18,14,44,23,27.6\n",
        );
        assert_eq!(detect_strategy(&frame).unwrap().name, "date-parts");

        let table = normalize(frame).unwrap();
        assert_eq!(table.len(), 2, "invalid rows are retained");
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2025-11-18T14:44:23+00:00"))
        );
        assert!(table.rows()[1].timestamp.is_none());
    }

    #[test]
    fn test_incomplete_date_parts_fall_through_to_time() {
        let frame = frame("Year,Month,Day,Time,value\n2025,11,18,2025-11-18 08:30:00,1\n");
        assert_eq!(detect_strategy(&frame).unwrap().name, "Time");

        let table = normalize(frame).unwrap();
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2025-11-18T08:30:00+00:00"))
        );
    }

    #[test]
    fn test_parse_iso8601_variants() {
        assert_eq!(
            parse_iso8601("2025-11-18T14:44:23+07:00", utc()),
            Some(ts("2025-11-18T14:44:23+07:00"))
        );
        assert_eq!(
            parse_iso8601("2025-11-18 14:44:23+0700", utc()),
            Some(ts("2025-11-18T14:44:23+07:00"))
        );
        assert_eq!(
            parse_iso8601("2025-11-18T14:44:23.250", utc()),
            Some(ts("2025-11-18T14:44:23.250+00:00"))
        );
        assert_eq!(parse_iso8601("18 Nov 2025", utc()), None);
    }

    #[test]
    fn test_hour_only_offset() {
        let parsed = parse_iso8601("2025-11-18T14:44:23+07", utc()).unwrap();
        assert_eq!(parsed, ts("2025-11-18T14:44:23+07:00"));
        assert_eq!(parsed.offset().local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn test_parse_datetime_generic_spellings() {
        let expected = ts("2025-11-18T14:44:23+00:00");
        for spelling in [
            "2025/11/18 14:44:23",
            "11/18/2025 14:44:23",
            "18/11/2025 14:44:23",
            "18-11-2025 14:44:23",
            "18.11.2025 14:44:23",
            "Nov 18, 2025 14:44:23",
            "18 Nov 2025 14:44:23",
            "November 18, 2025 14:44:23",
            "20251118 14:44:23",
        ] {
            assert_eq!(parse_datetime(spelling, utc()), Some(expected), "{}", spelling);
        }

        assert_eq!(
            parse_datetime("18/11/2025 14:44", utc()),
            Some(ts("2025-11-18T14:44:00+00:00"))
        );
        assert_eq!(
            parse_datetime("11/18/2025", utc()),
            Some(ts("2025-11-18T00:00:00+00:00"))
        );
        assert_eq!(
            parse_datetime("18 Nov 2025", utc()),
            Some(ts("2025-11-18T00:00:00+00:00"))
        );
        // month-first wins when both readings are valid
        assert_eq!(
            parse_datetime("11/12/2025 08:00:00", utc()),
            Some(ts("2025-11-12T08:00:00+00:00"))
        );
        assert_eq!(parse_datetime("not a date", utc()), None);
    }

    #[test]
    fn test_time_only_lands_on_today() {
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();
        let parsed = parse_datetime("14:44:23", bangkok).unwrap();
        assert_eq!(parsed.time(), NaiveTime::from_hms_opt(14, 44, 23).unwrap());
        assert_eq!(parsed.offset(), &bangkok);

        let today = Utc::now().with_timezone(&bangkok).date_naive();
        assert!(parsed.date_naive() == today || parsed.date_naive().succ_opt() == Some(today));
    }

    #[test]
    fn test_day_first_time_column() {
        let table = normalize(frame("Time,v
18/11/2025 14:44:23,1
19/11/2025 08:00:00,2
"))
            .unwrap();
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2025-11-18T14:44:23+00:00"))
        );
        assert_eq!(
            table.rows()[1].timestamp,
            Some(ts("2025-11-19T08:00:00+00:00"))
        );
    }

    #[test]
    fn test_numeric_timestamp_column_is_epoch() {
        let table = normalize(frame("timestamp,v
1731940000,1
1731940000500,2
")).unwrap();
        assert_eq!(table.columns(), &["v"]);
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2024-11-18T14:26:40+00:00"))
        );
        assert_eq!(
            table.rows()[1].timestamp,
            Some(ts("2024-11-18T14:26:40.500+00:00"))
        );

        let table = normalize(frame("Time,v
1731940000.25,1
")).unwrap();
        assert_eq!(
            table.rows()[0].timestamp,
            Some(ts("2024-11-18T14:26:40.250+00:00"))
        );
    }

    #[test]
    fn test_naive_values_take_configured_offset() {
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();

        let parts = normalize_with_offset(
            frame("Year,Month,Day,Hour,Minute,Second,v
2025,11,18,14,44,23,1
"),
            bangkok,
        )
        .unwrap();
        let composed = parts.rows()[0].timestamp.unwrap();
        assert_eq!(composed, ts("2025-11-18T14:44:23+07:00"));
        assert_eq!(composed.offset(), &bangkok);

        let mixed = normalize_with_offset(
            frame("TIM,v
2025-11-18T14:44:23,1
2025-11-18T14:44:23+00:00,2
"),
            bangkok,
        )
        .unwrap();
        assert_eq!(mixed.rows()[0].timestamp, Some(ts("2025-11-18T07:44:23+00:00")));
        assert_eq!(mixed.rows()[1].timestamp.unwrap().offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_parse_utc_offset() {
        let seven = FixedOffset::east_opt(7 * 3600);
        assert_eq!(parse_utc_offset("+07:00"), seven);
        assert_eq!(parse_utc_offset("+0700"), seven);
        assert_eq!(parse_utc_offset("+07"), seven);
        assert_eq!(parse_utc_offset("-05:30"), FixedOffset::west_opt(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("Z"), Some(utc()));
        assert_eq!(parse_utc_offset("07:00"), None);
        assert_eq!(parse_utc_offset("+7:75"), None);
    }
}
