//! End-to-end reading: bytes → format detection → tokenization → typed table.
//!
//! The tokenizer is the `csv` crate, configured from a detected (or
//! overridden) [`Format`]. Rows whose field count disagrees with the header
//! are skipped individually with bounded diagnostics rather than aborting
//! the read; a fixed missing-value vocabulary maps placeholder strings to
//! null before casting.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::cast::{Autocast, CastConfig, default_registry};
use crate::error::{ReadError, ReadResult};
use crate::format::{self, Dialect, Format, FormatDetection};
use crate::format::encoding;
use crate::observe::ReadObserver;
use crate::types::{Column, Field, Table};

/// Literal strings treated as null, independent of locale.
///
/// Extension of the usual spreadsheet/statistics placeholder vocabularies.
pub const MISSING_STRINGS: [&str; 23] = [
    "#N/A",
    "#N/A N/A",
    "#NA",
    "-1.#IND",
    "-1.#INF",
    "-1.#QNAN",
    "1.#IND",
    "1.#INF",
    "1.#INF000000",
    "1.#QNAN",
    "-NaN",
    "-nan",
    "<NA>",
    "N/A",
    "n/a",
    "NA",
    "NAN",
    "NaN",
    "nan",
    "NULL",
    "Null",
    "null",
    "",
];

/// Diagnostic text for one skipped row is truncated to this many characters.
const MAX_DIAGNOSTIC_CHARS: usize = 100;

/// Options controlling reading behavior. Use [`Default`] for common cases.
pub struct ReadOptions {
    /// Encoding override; `None` detects it.
    pub encoding: Option<String>,
    /// Dialect override; `None` sniffs it.
    pub dialect: Option<Dialect>,
    /// Preamble override (line count to skip); `None` detects it.
    pub preamble: Option<usize>,
    /// Whether to run type inference on the raw string table.
    pub autocast: bool,
    /// Conversion configuration; `None` uses the default order.
    pub cast: Option<CastConfig>,
    /// Cast columns on a worker pool instead of sequentially.
    pub parallel_cast: bool,
    /// Strings treated as null.
    pub missing_values: Vec<String>,
    /// Per-row diagnostics stop after this many messages; skipping is still
    /// counted afterwards.
    pub max_row_messages: usize,
    /// Optional observer for diagnostics.
    pub observer: Option<Arc<dyn ReadObserver>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            dialect: None,
            preamble: None,
            autocast: true,
            cast: None,
            parallel_cast: false,
            missing_values: MISSING_STRINGS.iter().map(|s| s.to_string()).collect(),
            max_row_messages: 50,
            observer: None,
        }
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("encoding", &self.encoding)
            .field("dialect", &self.dialect)
            .field("preamble", &self.preamble)
            .field("autocast", &self.autocast)
            .field("cast_set", &self.cast.is_some())
            .field("parallel_cast", &self.parallel_cast)
            .field("max_row_messages", &self.max_row_messages)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

/// Infer the format of a byte source, honoring per-step overrides.
pub fn analyze(bytes: &[u8], options: &ReadOptions) -> ReadResult<Format> {
    if bytes.is_empty() {
        return Err(ReadError::EmptyInput);
    }

    let detection = FormatDetection::default();
    let head = &bytes[..bytes.len().min(detection.encoding.n_bytes)];

    let encoding = match &options.encoding {
        Some(encoding) => encoding.clone(),
        None => detection.encoding.detect(head),
    };
    let sample = encoding::decode(head, &encoding);

    let (preamble, footer) = match options.preamble {
        Some(lines) => (lines, 0),
        None => {
            let detected = detection.preambles.detect(&sample);
            (detected.lines, detected.footer)
        }
    };

    let body = format::skip_lines(&sample, preamble);
    let dialect = match &options.dialect {
        Some(dialect) => dialect.clone(),
        None => detection.sniffer.detect(body),
    };
    let columns = format::header_columns(body, &dialect);

    Ok(Format {
        encoding,
        preamble,
        footer,
        dialect,
        columns,
    })
}

/// Read a delimited file into a typed [`Table`].
pub fn read_path(path: impl AsRef<Path>, options: &ReadOptions) -> ReadResult<Table> {
    let bytes = std::fs::read(path)?;
    read_bytes(&bytes, options)
}

/// Read delimited bytes into a typed [`Table`].
pub fn read_bytes(bytes: &[u8], options: &ReadOptions) -> ReadResult<Table> {
    let format = analyze(bytes, options)?;
    if let Some(observer) = &options.observer {
        observer.on_format(&format);
    }

    let raw = tokenize(bytes, &format, options)?;
    if !options.autocast {
        return Ok(raw);
    }

    let mut autocast = match &options.cast {
        Some(config) => Autocast::new(config, default_registry())?,
        None => Autocast::default(),
    };
    autocast.parallel = options.parallel_cast;

    let table = autocast.cast_table(raw);
    if let Some(observer) = &options.observer {
        for i in 0..table.n_columns() {
            let field = table.field(i);
            if let Some(semantic) = field.metadata.get("semantic") {
                observer.on_column_cast(&field.name, semantic);
            }
        }
    }

    Ok(table)
}

/// Tokenize the body into a raw table of nullable string columns.
fn tokenize(bytes: &[u8], format: &Format, options: &ReadOptions) -> ReadResult<Table> {
    let text = encoding::decode(bytes, &format.encoding);
    let body = format::skip_lines(&text, format.preamble);

    let opts = format.dialect.to_tokenizer_options();
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(opts.delimiter)
        .double_quote(opts.double_quote)
        .escape(opts.escape);
    match opts.quote {
        Some(q) => {
            builder.quote(q);
        }
        None => {
            builder.quoting(false);
        }
    }
    if opts.trim_leading_space {
        builder.trim(csv::Trim::All);
    }

    let n_columns = format.columns.len();
    let mut reader = builder.from_reader(body.as_bytes());
    let mut records: Vec<csv::StringRecord> = Vec::new();
    let mut skipped = 0usize;
    let mut messages = 0usize;

    for (i, result) in reader.records().enumerate() {
        if i == 0 {
            continue; // header row, already consumed into format.columns
        }

        let (keep, line, diagnostic) = match result {
            Ok(record) if record.len() == n_columns => (Some(record), 0, String::new()),
            Ok(record) => {
                let line = record.position().map_or(0, |p| p.line());
                let diagnostic = format!(
                    "expected {n_columns} fields, got {}: {}",
                    record.len(),
                    truncate(&record.iter().collect::<Vec<_>>().join(","), MAX_DIAGNOSTIC_CHARS),
                );
                (None, line, diagnostic)
            }
            Err(err) => (None, 0, truncate(&err.to_string(), MAX_DIAGNOSTIC_CHARS)),
        };

        match keep {
            Some(record) => records.push(record),
            None => {
                skipped += 1;
                if let Some(observer) = &options.observer {
                    if messages < options.max_row_messages {
                        observer.on_invalid_row(format.preamble as u64 + line, &diagnostic);
                        messages += 1;
                        if messages == options.max_row_messages {
                            observer.on_invalid_rows_suppressed(skipped);
                        }
                    }
                }
            }
        }
    }

    records.truncate(records.len().saturating_sub(format.footer));

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(records.len()); n_columns];
    for record in &records {
        for (i, column) in columns.iter_mut().enumerate() {
            let value = record.get(i).unwrap_or("");
            if options.missing_values.iter().any(|m| m == value) {
                column.push(None);
            } else {
                column.push(Some(value.to_string()));
            }
        }
    }

    let fields = format
        .columns
        .iter()
        .map(|name| Field::new(name.as_str()))
        .collect();
    let columns = columns.into_iter().map(Column::Utf8).collect();
    Ok(Table::new(fields, columns))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn empty_input_refused() {
        assert!(matches!(
            read_bytes(b"", &ReadOptions::default()),
            Err(ReadError::EmptyInput)
        ));
    }

    #[test]
    fn missing_value_vocabulary_maps_to_null() {
        let bytes = b"a,b\nNA,1\n#N/A,2\n,3\nx,NULL\n";
        let options = ReadOptions {
            autocast: false,
            ..ReadOptions::default()
        };
        let table = read_bytes(bytes, &options).unwrap();
        assert_eq!(
            table.column(0),
            &Column::Utf8(vec![None, None, None, Some("x".to_string())])
        );
        assert_eq!(table.column(1).null_count(), 1);
    }

    #[test]
    fn invalid_rows_are_skipped_not_fatal() {
        let bytes = b"a,b\n1,2\nonly-one-field\n3,4,5,6\n7,8\n";
        let options = ReadOptions {
            autocast: false,
            ..ReadOptions::default()
        };
        let table = read_bytes(bytes, &options).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.column(0),
            &Column::Utf8(vec![Some("1".to_string()), Some("7".to_string())])
        );
    }

    #[test]
    fn zero_data_rows_is_not_empty_input() {
        let table = read_bytes(b"a,b\n", &ReadOptions::default()).unwrap();
        assert_eq!(table.n_columns(), 2);
        assert_eq!(table.n_rows(), 0);
    }

    #[test]
    fn preamble_override_wins_over_detection() {
        let bytes = b"x,y\n1,2\n";
        let options = ReadOptions {
            preamble: Some(0),
            autocast: false,
            ..ReadOptions::default()
        };
        let table = read_bytes(bytes, &options).unwrap();
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn embedded_newlines_stay_in_field() {
        let bytes = b"a,b\n\"line one\nline two\",2\n";
        let options = ReadOptions {
            autocast: false,
            ..ReadOptions::default()
        };
        let table = read_bytes(bytes, &options).unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(
            table.column(0),
            &Column::Utf8(vec![Some("line one\nline two".to_string())])
        );
    }

    #[test]
    fn autocast_types_columns_end_to_end() {
        let bytes = b"n,flag,when\n1,true,2022-06-17\n2,false,2022-05-03\nNA,true,NA\n";
        let table = read_bytes(bytes, &ReadOptions::default()).unwrap();
        assert_eq!(table.column(0).data_type(), DataType::UInt8);
        assert_eq!(table.column(1).data_type(), DataType::Bool);
        assert!(matches!(
            table.column(2).data_type(),
            DataType::Timestamp(_, _)
        ));
    }
}
