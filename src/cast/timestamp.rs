//! Conversion of timestamp strings to typed timestamp columns.
//!
//! An ISO-8601-oriented fast path is tried first; only when it does not
//! cover the whole column does the converter fall back to trialling a
//! prioritized list of explicit formats. Fractional seconds are extracted
//! up front (the explicit formats don't carry them) and re-added to the
//! parsed result. The format that parses the first sampled value is resolved
//! once and tried before the rest, memoized in a small bounded cache.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{Conversion, Converter};
use crate::types::{Column, TimeUnit, TimestampColumn};

/// Timezone assumed for values without explicit offset information.
const DEFAULT_TZ: &str = "UTC";

/// Extract-and-re-add kicks in when more than this proportion of values
/// carries a fractional-seconds suffix.
const MIN_PROP_FRACTIONAL: f64 = 0.1;

/// Entries kept in the first-value format cache before eviction.
const FORMAT_CACHE_SIZE: usize = 128;

static RE_FRACTIONAL_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\d+").expect("fractional seconds regex compiles"));

/// Trailing timezone tokens in the form `Z`, `+0100` or `+01:00`.
static RE_TZ_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Z|[+-]\d{2}:?\d{2})\s*$").expect("tz offset regex compiles"));

/// How a format string is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatKind {
    /// Date and time with an explicit UTC offset (`%z`).
    DateTimeTz,
    /// Date and time without offset information.
    DateTime,
    /// Date only; midnight is assumed.
    Date,
}

/// One candidate format in trial order.
#[derive(Debug, Clone, Copy)]
struct TsFormat {
    fmt: &'static str,
    kind: FormatKind,
}

/// Base timestamp formats without timezone tokens, most common first.
const TIMESTAMP_FORMATS: [&str; 18] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%I:%M:%S %p",
    "%Y-%m-%dT%I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %I:%M:%S %p",
    "%a %b %d %H:%M:%S %Y",
    "%a %b %d %I:%M:%S %p %Y",
    "%a %d %b %H:%M:%S %Y",
    "%a %d %b %I:%M:%S %p %Y",
    "%a, %b %d %H:%M:%S %Y",
    "%a, %b %d %I:%M:%S %p %Y",
    "%a, %d %b %H:%M:%S %Y",
    "%a, %d %b %I:%M:%S %p %Y",
    "%a %d %b %Y %H:%M:%S",
    "%a %d %b %Y %I:%M:%S %p",
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d %b %Y %I:%M:%S %p",
];

/// Date-only formats. Two-digit years come first: they fail on four-digit
/// years, while `%Y` happily accepts two-digit ones.
const DATE_FORMATS: [&str; 9] = [
    "%d-%m-%y",
    "%d/%m/%y",
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%a %d %b %Y",
    "%a, %d %b %Y",
];

/// All formats tried by default: each timestamp format with its timezone
/// variants, then the date formats.
static ALL_FORMATS: Lazy<Vec<TsFormat>> = Lazy::new(|| {
    let mut formats = Vec::new();
    for fmt in TIMESTAMP_FORMATS {
        formats.push(TsFormat {
            fmt,
            kind: FormatKind::DateTime,
        });
        formats.push(TsFormat {
            fmt: Box::leak(format!("{fmt} %z").into_boxed_str()),
            kind: FormatKind::DateTimeTz,
        });
        formats.push(TsFormat {
            fmt: Box::leak(format!("{fmt} Z").into_boxed_str()),
            kind: FormatKind::DateTime,
        });
        formats.push(TsFormat {
            fmt: Box::leak(format!("{fmt} UTC").into_boxed_str()),
            kind: FormatKind::DateTime,
        });
    }
    for fmt in DATE_FORMATS {
        formats.push(TsFormat {
            fmt,
            kind: FormatKind::Date,
        });
    }
    formats
});

/// Parse one value with one format, producing epoch nanoseconds.
fn parse_one(value: &str, fmt: &str, kind: FormatKind) -> Option<i64> {
    match kind {
        FormatKind::DateTimeTz => DateTime::parse_from_str(value, fmt)
            .ok()?
            .timestamp_nanos_opt(),
        FormatKind::DateTime => NaiveDateTime::parse_from_str(value, fmt)
            .ok()?
            .and_utc()
            .timestamp_nanos_opt(),
        FormatKind::Date => NaiveDate::parse_from_str(value, fmt)
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
            .timestamp_nanos_opt(),
    }
}

/// ISO-8601-oriented fast path: RFC 3339, `T`- or space-separated datetimes
/// with optional fractional seconds, and bare dates.
pub(crate) fn parse_iso(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.timestamp_nanos_opt();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return dt.and_utc().timestamp_nanos_opt();
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_nanos_opt();
    }
    None
}

/// Extract a single consistent timezone offset from string timestamps.
///
/// `Z` and `+0000` are considered the same; multiple distinct offsets yield
/// `None`.
fn extract_timezone(values: &[Option<String>]) -> Option<String> {
    let mut offsets: Vec<String> = Vec::new();
    for v in values.iter().flatten() {
        if let Some(m) = RE_TZ_OFFSET.captures(v).and_then(|c| c.get(1)) {
            let normalized = m.as_str().replace(':', "").replace('Z', "+0000");
            if !offsets.contains(&normalized) {
                offsets.push(normalized);
            }
        }
    }

    if offsets.len() != 1 {
        return None;
    }
    let offset = &offsets[0];
    Some(format!(
        "{}:{}",
        &offset[..offset.len() - 2],
        &offset[offset.len() - 2..]
    ))
}

/// Proportion of non-null values carrying a fractional-seconds suffix.
fn proportion_fractional_seconds(values: &[Option<String>]) -> f64 {
    super::stats::proportion_matching(values, |v| RE_FRACTIONAL_SECONDS.is_match(v))
}

/// Fractional seconds of one value as nanoseconds.
fn fraction_nanos(value: &str) -> i64 {
    let Some(m) = RE_FRACTIONAL_SECONDS.find(value) else {
        return 0;
    };
    let frac: f64 = format!("0{}", m.as_str()).parse().unwrap_or(0.0);
    (frac * 1e9).trunc() as i64
}

/// Bounded memoization of "first value → matching format index".
#[derive(Debug, Default)]
struct FormatCache {
    entries: HashMap<String, Option<usize>>,
}

impl FormatCache {
    fn find_format(&mut self, value: &str) -> Option<usize> {
        if let Some(hit) = self.entries.get(value) {
            return *hit;
        }

        let found = ALL_FORMATS
            .iter()
            .position(|format| parse_one(value, format.fmt, format.kind).is_some());

        if self.entries.len() >= FORMAT_CACHE_SIZE {
            self.entries.clear();
        }
        self.entries.insert(value.to_string(), found);
        found
    }
}

/// Convert string columns to timestamps; typed timestamp columns pass
/// through with unit/timezone normalization only.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timestamp {
    /// Minimum fraction of non-null values that must parse. At exactly 1.0
    /// a format is accepted all-or-nothing.
    pub threshold: f64,
    /// Explicit format override; when `None` the default formats are tried
    /// in order.
    pub format: Option<String>,
    /// Resolution the timestamps are stored with.
    pub unit: TimeUnit,
    /// Desired timezone of the result.
    pub tz: Option<String>,
    #[serde(skip)]
    cache: Mutex<FormatCache>,
}

impl Default for Timestamp {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            format: None,
            unit: TimeUnit::Nanosecond,
            tz: None,
            cache: Mutex::new(FormatCache::default()),
        }
    }
}

impl Timestamp {
    fn meta(&self, tz: &Option<String>) -> String {
        match tz {
            Some(tz) => format!("date[{}, {tz}]", self.unit.abbrev()),
            None => format!("date[{}]", self.unit.abbrev()),
        }
    }

    fn to_unit(&self, nanos: Vec<Option<i64>>) -> Vec<Option<i64>> {
        let per_unit = self.unit.nanos();
        if per_unit == 1 {
            return nanos;
        }
        nanos
            .into_iter()
            .map(|v| v.map(|v| v.div_euclid(per_unit)))
            .collect()
    }

    /// All-or-nothing ISO parse of the whole column.
    fn convert_iso(&self, values: &[Option<String>]) -> Option<Conversion> {
        let mut nanos = Vec::with_capacity(values.len());
        for v in values {
            match v {
                None => nanos.push(None),
                Some(v) => nanos.push(Some(parse_iso(v)?)),
            }
        }

        let tz = self
            .tz
            .clone()
            .or_else(|| extract_timezone(values))
            .or_else(|| Some(DEFAULT_TZ.to_string()));
        let result = Column::Timestamp(TimestampColumn {
            values: self.to_unit(nanos),
            unit: self.unit,
            tz: tz.clone(),
        });
        Some(
            Conversion::new(result)
                .with_meta("semantic", self.meta(&tz))
                .with_meta("format", "iso8601"),
        )
    }

    /// Try one explicit format over the whole column.
    fn parse_with_format(
        &self,
        values: &[Option<String>],
        fractions: Option<&[i64]>,
        fmt: &str,
        kind: FormatKind,
    ) -> Option<Vec<Option<i64>>> {
        let mut nanos = Vec::with_capacity(values.len());
        let mut valid = 0usize;
        let mut parsed_count = 0usize;

        for (i, v) in values.iter().enumerate() {
            let Some(v) = v.as_deref() else {
                nanos.push(None);
                continue;
            };
            valid += 1;
            match parse_one(v, fmt, kind) {
                Some(parsed) => {
                    parsed_count += 1;
                    let frac = fractions.map_or(0, |f| f[i]);
                    nanos.push(Some(parsed + frac));
                }
                None => {
                    if self.threshold >= 1.0 {
                        return None; // exact match required
                    }
                    nanos.push(None);
                }
            }
        }

        if valid == 0 || (parsed_count as f64 / valid as f64) < self.threshold {
            return None;
        }
        Some(nanos)
    }

    fn convert_strings(&self, values: &[Option<String>]) -> Option<Conversion> {
        if let Some(conversion) = self.convert_iso(values) {
            return Some(conversion);
        }

        // The explicit formats carry no fractional seconds; extract them
        // once and re-add after parsing.
        let (stripped, fractions) = if proportion_fractional_seconds(values) > MIN_PROP_FRACTIONAL {
            let fractions: Vec<i64> = values
                .iter()
                .map(|v| v.as_deref().map_or(0, fraction_nanos))
                .collect();
            let stripped: Vec<Option<String>> = values
                .iter()
                .map(|v| {
                    v.as_deref()
                        .map(|v| RE_FRACTIONAL_SECONDS.replace_all(v, "").into_owned())
                })
                .collect();
            (stripped, Some(fractions))
        } else {
            (values.to_vec(), None)
        };

        let candidates: Vec<(String, FormatKind)> = match &self.format {
            // Explicit override: the caller's format string, tried with
            // every interpretation.
            Some(fmt) => [
                FormatKind::DateTimeTz,
                FormatKind::DateTime,
                FormatKind::Date,
            ]
            .iter()
            .map(|&kind| (fmt.clone(), kind))
            .collect(),
            None => {
                let mut order: Vec<usize> = (0..ALL_FORMATS.len()).collect();
                if let Some(first) = stripped.iter().flatten().next() {
                    let found = {
                        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                        cache.find_format(first)
                    };
                    if let Some(found) = found {
                        order.retain(|&i| i != found);
                        order.insert(0, found);
                    }
                }
                order
                    .into_iter()
                    .map(|i| (ALL_FORMATS[i].fmt.to_string(), ALL_FORMATS[i].kind))
                    .collect()
            }
        };

        for (fmt, kind) in candidates {
            if let Some(nanos) =
                self.parse_with_format(&stripped, fractions.as_deref(), &fmt, kind)
            {
                let tz = match kind {
                    FormatKind::DateTimeTz => Some(DEFAULT_TZ.to_string()),
                    _ => self.tz.clone(),
                };
                let result = Column::Timestamp(TimestampColumn {
                    values: self.to_unit(nanos),
                    unit: self.unit,
                    tz: tz.clone(),
                });
                return Some(
                    Conversion::new(result)
                        .with_meta("semantic", self.meta(&tz))
                        .with_meta("format", fmt),
                );
            }
        }

        None
    }

    /// Normalize an already-typed timestamp column (unit and timezone).
    fn convert_timestamp(&self, column: &TimestampColumn) -> Conversion {
        let factor_from = column.unit.nanos();
        let values: Vec<Option<i64>> = if column.unit == self.unit {
            column.values.clone()
        } else {
            self.to_unit(
                column
                    .values
                    .iter()
                    .map(|v| v.map(|v| v.saturating_mul(factor_from)))
                    .collect(),
            )
        };

        let tz = self
            .tz
            .clone()
            .or_else(|| column.tz.clone())
            .or_else(|| Some(DEFAULT_TZ.to_string()));
        let result = Column::Timestamp(TimestampColumn {
            values,
            unit: self.unit,
            tz: tz.clone(),
        });
        Conversion::new(result).with_meta("semantic", self.meta(&tz))
    }
}

impl Converter for Timestamp {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        match column {
            Column::Utf8(values) => self.convert_strings(values),
            Column::Timestamp(t) => Some(self.convert_timestamp(t)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(values: &[&str]) -> Column {
        Column::Utf8(values.iter().map(|v| Some((*v).to_string())).collect())
    }

    fn nanos_of(conv: &Conversion) -> Vec<Option<i64>> {
        match &conv.result {
            Column::Timestamp(t) => t.values.clone(),
            other => panic!("expected timestamp, got {:?}", other.data_type()),
        }
    }

    #[test]
    fn iso_datetimes_use_fast_path() {
        let col = utf8(&["2022-06-17T10:31:40.000746", "2022-06-17T10:31:40.000000"]);
        let conv = Timestamp::default().convert(&col).unwrap();
        assert_eq!(conv.meta.get("format").unwrap(), "iso8601");
        assert_eq!(conv.meta.get("semantic").unwrap(), "date[ns, UTC]");

        let nanos = nanos_of(&conv);
        assert_eq!(nanos[0].unwrap() - nanos[1].unwrap(), 746_000);
    }

    #[test]
    fn iso_dates_use_fast_path() {
        let conv = Timestamp::default()
            .convert(&utf8(&["2022-06-17", "2022-05-03"]))
            .unwrap();
        assert_eq!(conv.meta.get("format").unwrap(), "iso8601");
        // 2022-06-17T00:00:00Z
        assert_eq!(nanos_of(&conv)[0], Some(1_655_424_000 * 1_000_000_000));
    }

    #[test]
    fn explicit_offsets_are_honored() {
        let conv = Timestamp::default()
            .convert(&utf8(&["2022-06-17T12:00:00+02:00"]))
            .unwrap();
        // Noon at +02:00 is 10:00 UTC.
        assert_eq!(
            nanos_of(&conv)[0],
            Some((1_655_424_000 + 10 * 3600) * 1_000_000_000)
        );
        assert_eq!(conv.meta.get("semantic").unwrap(), "date[ns, +02:00]");
    }

    #[test]
    fn slash_dates_resolve_via_format_list() {
        let conv = Timestamp::default()
            .convert(&utf8(&["17/06/2022", "03/05/2022"]))
            .unwrap();
        assert_eq!(conv.meta.get("format").unwrap(), "%d/%m/%Y");
        assert_eq!(nanos_of(&conv)[0], Some(1_655_424_000 * 1_000_000_000));
    }

    #[test]
    fn two_digit_years_win_over_four_digit_formats() {
        let conv = Timestamp::default()
            .convert(&utf8(&["17-06-22", "03-05-21"]))
            .unwrap();
        assert_eq!(conv.meta.get("format").unwrap(), "%d-%m-%y");
    }

    #[test]
    fn exact_match_required_at_full_threshold() {
        let col = utf8(&["17/06/2022", "definitely not a date"]);
        assert!(Timestamp::default().convert(&col).is_none());
    }

    #[test]
    fn partial_matches_accepted_below_full_threshold() {
        let ts = Timestamp {
            threshold: 0.5,
            ..Timestamp::default()
        };
        let conv = ts
            .convert(&utf8(&["17/06/2022", "not a date"]))
            .unwrap();
        let nanos = nanos_of(&conv);
        assert!(nanos[0].is_some());
        assert!(nanos[1].is_none());
    }

    #[test]
    fn nulls_are_preserved() {
        let col = Column::Utf8(vec![Some("2022-06-17".to_string()), None]);
        let conv = Timestamp::default().convert(&col).unwrap();
        assert_eq!(nanos_of(&conv)[1], None);
    }

    #[test]
    fn typed_timestamps_pass_through_unchanged() {
        let col = Column::Timestamp(TimestampColumn {
            values: vec![Some(1), Some(2)],
            unit: TimeUnit::Nanosecond,
            tz: Some("UTC".to_string()),
        });
        let conv = Timestamp::default().convert(&col).unwrap();
        assert_eq!(conv.result, col);
    }

    #[test]
    fn non_strings_refused() {
        assert!(
            Timestamp::default()
                .convert(&Column::Int64(vec![Some(1)]))
                .is_none()
        );
    }
}
