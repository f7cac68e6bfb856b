//! List parsing and casting.
//!
//! Bracket-delimited values are parsed as JSON first (much cheaper), falling
//! back to quote-aware comma splitting. Flattened elements are then cast
//! progressively: integers, floats, timestamps, else strings.
//!
//! Not supported inside list strings: floats with a comma decimal separator
//! or thousands separators.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::number::downcast_integers;
use super::stats::proportion_matching;
use super::strings::proportion_url;
use super::{Conversion, Converter};
use crate::types::{Column, DataType, ListColumn, TimeUnit, TimestampColumn};

/// Lists start and end with parenthesis-like characters.
pub(crate) static RE_LIST_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\(\[\|\{<].*[\)\]\|>\}]$").expect("list regex compiles"));

/// Timestamps inside lists are stored at millisecond resolution.
const LIST_TIME_UNIT: TimeUnit = TimeUnit::Millisecond;

/// Per-row parse result: null, or a list of nullable elements.
type RawLists = Vec<Option<Vec<Option<String>>>>;

/// Parse one value as a JSON array; scalars become strings, nested
/// structures are kept as their raw JSON text.
fn parse_json(value: &str) -> Option<Vec<Option<String>>> {
    let parsed: serde_json::Value = serde_json::from_str(value).ok()?;
    let serde_json::Value::Array(items) = parsed else {
        return None;
    };

    Some(
        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                nested => Some(nested.to_string()),
            })
            .collect(),
    )
}

/// Quote-aware splitting of one bracket-stripped value.
fn parse_csv(value: &str, delimiter: char, quote_char: char) -> Option<Vec<Option<String>>> {
    let content = value.trim();
    let content = content.strip_prefix(['(', '[', '{', '|', '<']).unwrap_or(content);
    let content = content.strip_suffix([')', ']', '}', '|', '>']).unwrap_or(content);
    if content.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .quote(quote_char as u8)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Some(
            record
                .iter()
                .map(|elem| Some(elem.trim_matches(['\'', ' ']).to_string()))
                .collect(),
        ),
        Ok(false) => Some(Vec::new()),
        Err(_) => None,
    }
}

/// Assemble per-row lists into list storage with a string child.
fn to_list_column(rows: RawLists) -> ListColumn {
    let mut offsets = vec![0usize];
    let mut validity = Vec::with_capacity(rows.len());
    let mut child: Vec<Option<String>> = Vec::new();

    for row in rows {
        match row {
            None => {
                validity.push(false);
                offsets.push(child.len());
            }
            Some(elements) => {
                validity.push(true);
                child.extend(elements);
                offsets.push(child.len());
            }
        }
    }

    ListColumn {
        offsets,
        validity,
        child: Box::new(Column::Utf8(child)),
    }
}

fn cast_elements_int(elements: &[Option<String>]) -> Option<Column> {
    let mut out = Vec::with_capacity(elements.len());
    for e in elements {
        match e {
            None => out.push(None),
            Some(e) => out.push(Some(e.parse::<i64>().ok()?)),
        }
    }
    Some(downcast_integers(Column::Int64(out)))
}

fn cast_elements_float(elements: &[Option<String>]) -> Option<Column> {
    let mut out = Vec::with_capacity(elements.len());
    for e in elements {
        match e {
            None => out.push(None),
            Some(e) => out.push(Some(e.parse::<f64>().ok()?)),
        }
    }
    Some(Column::Float64(out))
}

fn cast_elements_timestamp(elements: &[Option<String>]) -> Option<Column> {
    let mut out = Vec::with_capacity(elements.len());
    for e in elements {
        match e {
            None => out.push(None),
            Some(e) => {
                let nanos = super::timestamp::parse_iso(e)?;
                out.push(Some(nanos.div_euclid(LIST_TIME_UNIT.nanos())));
            }
        }
    }
    Some(Column::Timestamp(TimestampColumn {
        values: out,
        unit: LIST_TIME_UNIT,
        tz: None,
    }))
}

/// Cast flattened string elements to the first matching element type.
fn cast_child(list: ListColumn) -> ListColumn {
    let Column::Utf8(elements) = list.child.as_ref() else {
        return list;
    };

    let cast = cast_elements_int(elements)
        .or_else(|| cast_elements_float(elements))
        .or_else(|| cast_elements_timestamp(elements));

    match cast {
        Some(child) => ListColumn {
            offsets: list.offsets,
            validity: list.validity,
            child: Box::new(child),
        },
        None => list,
    }
}

/// Recognizes bracket-delimited list values and parses them into typed
/// list columns.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct List {
    /// Minimum proportion of non-null values that must look like lists.
    pub threshold: f64,
    /// Whether string elements should be checked for URL-likeness.
    pub infer_urls: bool,
    /// Minimum proportion of URL-shaped elements for `list[url]`.
    pub threshold_urls: f64,
    /// Element separator for the splitting fallback.
    pub delimiter: char,
    /// Quote character for the splitting fallback.
    pub quote_char: char,
}

impl Default for List {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            infer_urls: true,
            threshold_urls: 1.0,
            delimiter: ',',
            quote_char: '"',
        }
    }
}

impl List {
    fn parse_strings(&self, values: &[Option<String>]) -> Option<ListColumn> {
        if proportion_matching(values, |v| RE_LIST_LIKE.is_match(v)) < self.threshold {
            return None;
        }

        // JSON first; only when some value is not valid JSON fall back to
        // splitting for the whole column.
        let json: Option<RawLists> = values
            .iter()
            .map(|v| match v {
                None => Some(None),
                Some(v) => parse_json(v).map(Some),
            })
            .collect();

        let rows: RawLists = match json {
            Some(rows) => rows,
            None => values
                .iter()
                .map(|v| {
                    v.as_deref()
                        .and_then(|v| parse_csv(v, self.delimiter, self.quote_char))
                })
                .collect(),
        };

        Some(cast_child(to_list_column(rows)))
    }

    fn semantic(&self, list: &ListColumn) -> String {
        match list.child.data_type() {
            DataType::Utf8 => {
                let flat = list.child.as_utf8().unwrap_or(&[]);
                if self.infer_urls && proportion_url(flat) >= self.threshold_urls {
                    "list[url]".to_string()
                } else {
                    "list[category]".to_string()
                }
            }
            DataType::Timestamp(_, _) => "list[date]".to_string(),
            element => format!("list[number[{}]]", element.name()),
        }
    }
}

impl Converter for List {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        let list = match column {
            Column::Utf8(values) => self.parse_strings(values)?,
            Column::List(list) => list.clone(),
            _ => return None,
        };

        let semantic = self.semantic(&list);
        Some(Conversion::new(Column::List(list)).with_meta("semantic", semantic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(values: &[Option<&str>]) -> Column {
        Column::Utf8(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    fn as_list(conv: &Conversion) -> &ListColumn {
        match &conv.result {
            Column::List(l) => l,
            other => panic!("expected list column, got {:?}", other.data_type()),
        }
    }

    #[test]
    fn json_int_lists_downcast_to_uint8() {
        let col = utf8(&[Some("[0,1,2]"), Some("[7,8,9]"), Some("[]")]);
        let conv = List::default().convert(&col).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "list[number[uint8]]");

        let list = as_list(&conv);
        assert_eq!(list.offsets, vec![0, 3, 6, 6]);
        assert_eq!(list.validity, vec![true, true, true]);
        assert_eq!(
            *list.child,
            Column::UInt8(vec![Some(0), Some(1), Some(2), Some(7), Some(8), Some(9)])
        );
    }

    #[test]
    fn null_rows_and_empty_lists_are_distinct() {
        let col = utf8(&[Some("[1]"), None, Some("[]")]);
        let conv = List::default().convert(&col).unwrap();
        let list = as_list(&conv);
        assert_eq!(list.validity, vec![true, false, true]);
        assert_eq!(list.span(0), Some(0..1));
        assert_eq!(list.span(1), None);
        assert_eq!(list.span(2), Some(1..1));
    }

    #[test]
    fn unquoted_strings_fall_back_to_splitting() {
        // `[a,b,c]` is not valid JSON; the quote-aware splitter handles it.
        let col = utf8(&[Some("[a,b,c]"), Some("[x,y,z]"), Some("[]")]);
        let conv = List::default().convert(&col).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "list[category]");

        let list = as_list(&conv);
        assert_eq!(
            *list.child,
            Column::Utf8(vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string()),
                Some("x".to_string()),
                Some("y".to_string()),
                Some("z".to_string()),
            ])
        );
    }

    #[test]
    fn quoted_elements_keep_embedded_delimiters() {
        let col = utf8(&[Some("[\"a,b\",c]")]);
        let conv = List::default().convert(&col).unwrap();
        let list = as_list(&conv);
        assert_eq!(
            *list.child,
            Column::Utf8(vec![Some("a,b".to_string()), Some("c".to_string())])
        );
    }

    #[test]
    fn float_elements_stay_float() {
        let col = utf8(&[Some("[1.5,2.5]"), Some("[3.25]")]);
        let conv = List::default().convert(&col).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "list[number[float64]]");
    }

    #[test]
    fn iso_date_elements_become_timestamps() {
        let col = utf8(&[Some("[\"2022-06-17\",\"2022-05-03\"]")]);
        let conv = List::default().convert(&col).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "list[date]");
        let list = as_list(&conv);
        assert!(matches!(*list.child, Column::Timestamp(_)));
    }

    #[test]
    fn url_elements_classified() {
        let col = utf8(&[Some("[\"https://a.com\",\"https://b.org/x\"]")]);
        let conv = List {
            threshold_urls: 0.8,
            ..List::default()
        }
        .convert(&col)
        .unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "list[url]");
    }

    #[test]
    fn non_list_strings_refused() {
        let col = utf8(&[Some("plain"), Some("text")]);
        assert!(List::default().convert(&col).is_none());
    }

    #[test]
    fn typed_list_columns_pass_through() {
        let col = utf8(&[Some("[0,1]")]);
        let conv = List::default().convert(&col).unwrap();
        let again = List::default().convert(&conv.result).unwrap();
        assert_eq!(again.result, conv.result);
        assert_eq!(again.meta, conv.meta);
    }
}
