//! Parsing and downcasting of numeric data.
//!
//! Integer parsing runs first: native integer parsing rejects an explicit
//! leading `+`, so the sign is stripped beforehand. Failing that, the decimal
//! separator is inferred from representative value substrings, thousands
//! separators are stripped and the result parsed as floats. Either way the
//! result is narrowed: floats are truncated to integers when that loses
//! nothing, and integers are downcast to the smallest sufficient width.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::stats::{downcast_signed, downcast_unsigned, integers_as_i64, min_max, proportion_matching};
use super::{Conversion, Converter};
use crate::types::Column;

/// Minimum support for the winning decimal separator (fraction of values).
const DECIMAL_SUPPORT_MIN: f64 = 0.2;

/// The winning separator must occur this many times more often than the
/// runner-up.
const DECIMAL_CONFIDENCE_MIN: f64 = 1.5;

/// Long strings without any separator are unlikely to represent numbers.
const DECIMAL_CHARS_MAX: usize = 20;

static RE_IS_INT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("int regex compiles"));

/// Float representations parseable after cleaning. Allows ints too, but
/// those are tried before floats anyway.
static RE_IS_FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?[0-9]*\.?[0-9]*(?:e[+-]?[0-9]+)?$").expect("float regex compiles")
});

/// How the decimal separator is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalMode {
    /// Infer from value substrings; refuse when ambiguous.
    Infer,
    /// Try both separators and keep whichever parses more values.
    Compare,
    /// The period is the decimal separator.
    Dot,
    /// The comma is the decimal separator.
    Comma,
}

/// Infer the decimal delimiter from the string representation of one number.
///
/// Returns `None` if not unambiguously inferrable from this value alone.
fn decimal_delimiter(s: &str) -> Option<char> {
    let n = s.chars().count();
    let starts_with_zero = s.starts_with('0');

    let mut n_commas = 0usize;
    let mut n_dots = 0usize;
    let mut n_delims = 0usize;
    let mut first_comma: Option<usize> = None;
    let mut first_dot: Option<usize> = None;

    for (i, c) in s.chars().enumerate() {
        if i > DECIMAL_CHARS_MAX && n_delims == 0 {
            return None;
        }
        if c != '.' && c != ',' {
            continue;
        }

        if i == 0 || (i == 1 && starts_with_zero) {
            return Some(c); // ".123" or "0.123": can only be decimal
        }
        if i >= 4 && n_delims == 0 {
            return Some(c); // first separator at 5th position: cannot be thousands
        }
        if i + 3 >= n {
            return Some(c); // fewer than 3 characters after it: cannot be thousands
        }

        n_delims += 1;
        if c == '.' {
            n_dots += 1;
            first_dot.get_or_insert(i);
        } else {
            n_commas += 1;
            first_comma.get_or_insert(i);
        }
    }

    if n_dots == 1 && n_commas == 0 {
        return Some('.');
    }
    if n_dots > 0 && n_commas > 0 {
        return Some(if first_comma < first_dot { '.' } else { ',' });
    }
    if n_commas == 1 && n_dots == 0 {
        return Some(',');
    }
    if n_commas > 1 {
        return Some('.');
    }
    if n_dots > 1 {
        return Some(',');
    }

    None
}

/// The most frequent decimal delimiter over all non-null values.
///
/// Refuses when the winner lacks support or does not beat the runner-up by a
/// sufficient margin.
fn infer_decimal_delimiter(values: &[Option<String>]) -> Option<char> {
    let mut n = 0usize;
    let mut dots = 0usize;
    let mut commas = 0usize;

    for v in values.iter().flatten() {
        n += 1;
        match decimal_delimiter(v) {
            Some('.') => dots += 1,
            Some(',') => commas += 1,
            _ => {}
        }
    }

    let (winner, best, other) = if dots >= commas {
        ('.', dots, commas)
    } else {
        (',', commas, dots)
    };

    if best == 0 {
        return None;
    }
    if other > 0 {
        if (best as f64 / n as f64) < DECIMAL_SUPPORT_MIN {
            return None;
        }
        if (best as f64 / other as f64) < DECIMAL_CONFIDENCE_MIN {
            return None;
        }
    }

    Some(winner)
}

/// Clean one string so the native float parser accepts it, given a decimal
/// separator: strip the thousands separator and a leading `+`, canonicalize
/// the decimal separator and lower-case any exponent.
fn clean_float(s: &str, decimal: char) -> Option<f64> {
    let thousands = if decimal == '.' { ',' } else { '.' };
    let mut cleaned: String = s.chars().filter(|&c| c != thousands).collect();
    if cleaned.starts_with('+') {
        cleaned.remove(0);
    }
    if decimal == ',' {
        cleaned = cleaned.replacen(',', ".", 1);
    }
    let cleaned = cleaned.to_lowercase();

    if cleaned.is_empty() || !RE_IS_FLOAT.is_match(&cleaned) {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parse strings as integers; all-or-nothing over the values matching the
/// integer pattern.
fn maybe_parse_ints(
    values: &[Option<String>],
    threshold: f64,
    allow_unsigned: bool,
) -> Option<Column> {
    let prop = proportion_matching(values, |v| RE_IS_INT.is_match(v));
    if prop <= 0.0 || prop < threshold {
        return None;
    }

    let matching: Vec<Option<&str>> = values
        .iter()
        .map(|v| {
            v.as_deref()
                .filter(|v| RE_IS_INT.is_match(v))
                .map(|v| v.strip_prefix('+').unwrap_or(v))
        })
        .collect();

    let mut signed: Vec<Option<i64>> = Vec::with_capacity(matching.len());
    let mut overflow = false;
    for v in &matching {
        match v {
            None => signed.push(None),
            Some(v) => match v.parse::<i64>() {
                Ok(parsed) => signed.push(Some(parsed)),
                Err(_) => {
                    overflow = true;
                    break;
                }
            },
        }
    }
    if !overflow {
        return Some(Column::Int64(signed));
    }

    if allow_unsigned {
        let mut unsigned: Vec<Option<u64>> = Vec::with_capacity(matching.len());
        for v in &matching {
            match v {
                None => unsigned.push(None),
                Some(v) => match v.parse::<u64>() {
                    Ok(parsed) => unsigned.push(Some(parsed)),
                    Err(_) => return None,
                },
            }
        }
        return Some(Column::UInt64(unsigned));
    }

    None
}

/// Parse strings as floats with a known or inferred decimal separator.
fn maybe_parse_floats(
    values: &[Option<String>],
    threshold: f64,
    decimal: DecimalMode,
) -> Option<Column> {
    let separator = match decimal {
        DecimalMode::Dot => '.',
        DecimalMode::Comma => ',',
        DecimalMode::Infer => infer_decimal_delimiter(values)?,
        DecimalMode::Compare => {
            let (_, valid_dot) = parse_floats(values, '.');
            let (_, valid_comma) = parse_floats(values, ',');
            if valid_dot >= valid_comma { '.' } else { ',' }
        }
    };

    let (parsed, prop_valid) = parse_floats(values, separator);
    if prop_valid < threshold {
        return None;
    }
    Some(Column::Float64(parsed))
}

fn parse_floats(values: &[Option<String>], decimal: char) -> (Vec<Option<f64>>, f64) {
    let mut valid = 0usize;
    let mut parsed_count = 0usize;
    let parsed: Vec<Option<f64>> = values
        .iter()
        .map(|v| {
            let v = v.as_deref()?;
            valid += 1;
            let f = clean_float(v, decimal)?;
            parsed_count += 1;
            Some(f)
        })
        .collect();

    let prop = if valid == 0 {
        0.0
    } else {
        parsed_count as f64 / valid as f64
    };
    (parsed, prop)
}

/// Float to integer conversion, accepted only when (a sufficient proportion
/// of) values survive truncation unchanged.
fn maybe_truncate_floats(values: &[Option<f64>], threshold: f64) -> Option<Column> {
    let mut valid = 0usize;
    let mut unchanged = 0usize;
    for v in values.iter().flatten() {
        valid += 1;
        if v.trunc() == *v {
            unchanged += 1;
        }
    }
    if valid == 0 || (unchanged as f64 / valid as f64) < threshold {
        return None;
    }

    let (vmin, _) = min_max(values)?;

    if vmin >= 0.0 {
        let mut out: Vec<Option<u64>> = Vec::with_capacity(values.len());
        for v in values {
            match v {
                None => out.push(None),
                Some(v) => {
                    let t = v.trunc();
                    if t < 0.0 || t >= u64::MAX as f64 {
                        return None;
                    }
                    out.push(Some(t as u64));
                }
            }
        }
        Some(Column::UInt64(out))
    } else {
        let mut out: Vec<Option<i64>> = Vec::with_capacity(values.len());
        for v in values {
            match v {
                None => out.push(None),
                Some(v) => {
                    let t = v.trunc();
                    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
                        return None;
                    }
                    out.push(Some(t as i64));
                }
            }
        }
        Some(Column::Int64(out))
    }
}

/// Narrow an integer column to its smallest sufficient width.
///
/// Shared by [`Number`] and the list converter; plain composition instead of
/// a converter of its own.
pub(crate) fn downcast_integers(column: Column) -> Column {
    match column {
        Column::UInt64(v) => {
            if v.iter().flatten().any(|&x| x > i64::MAX as u64) {
                downcast_unsigned(v)
            } else {
                let widened = v.iter().map(|x| x.map(|x| x as i64)).collect();
                downcast_signed(widened)
            }
        }
        other => match integers_as_i64(&other) {
            Some(widened) => downcast_signed(widened),
            None => other,
        },
    }
}

/// Attempts to parse strings into integers or floats, followed by
/// downcasting; already-numeric columns are truncated/downcast directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Number {
    /// Minimum fraction of non-null values that must parse.
    pub threshold: f64,
    /// Decimal separator handling for the float path.
    pub decimal: DecimalMode,
    /// Whether integers too large for i64 may parse as u64.
    pub allow_unsigned_int: bool,
    /// Refuse integer results whose maximum exceeds this bound.
    pub max_int: Option<i64>,
}

impl Default for Number {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            decimal: DecimalMode::Infer,
            allow_unsigned_int: true,
            max_int: None,
        }
    }
}

impl Number {
    fn convert_strings(&self, values: &[Option<String>]) -> Option<Column> {
        if let Some(ints) = maybe_parse_ints(values, self.threshold, self.allow_unsigned_int) {
            return Some(downcast_integers(ints));
        }

        let floats = maybe_parse_floats(values, self.threshold, self.decimal)?;
        let Column::Float64(raw) = &floats else {
            return Some(floats);
        };
        match maybe_truncate_floats(raw, self.threshold) {
            Some(ints) => Some(downcast_integers(ints)),
            None => Some(floats),
        }
    }

    fn convert_numeric(&self, column: &Column) -> Option<Column> {
        match column {
            Column::Float64(v) => {
                let ints = maybe_truncate_floats(v, self.threshold)?;
                Some(downcast_integers(ints))
            }
            other if other.data_type().is_integer() => Some(downcast_integers(other.clone())),
            _ => None,
        }
    }

    fn exceeds_max_int(&self, column: &Column) -> bool {
        let Some(max_int) = self.max_int else {
            return false;
        };
        if !column.data_type().is_integer() {
            return false;
        }
        match integers_as_i64(column).and_then(|v| min_max(&v)) {
            Some((_, vmax)) => vmax > max_int,
            // u64 values beyond i64 range exceed any configurable bound.
            None => true,
        }
    }
}

impl Converter for Number {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        let result = match column {
            Column::Utf8(values) => self.convert_strings(values)?,
            other => self.convert_numeric(other)?,
        };

        if self.exceeds_max_int(&result) {
            return None;
        }

        let semantic = format!("number[{}]", result.data_type().name());
        Some(Conversion::new(result).with_meta("semantic", semantic))
    }
}
