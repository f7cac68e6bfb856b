//! Format detection: encoding, preamble, dialect and header columns.
//!
//! [`FormatDetection::detect`] sequences the three detectors over one bounded
//! byte sample and produces a [`Format`] holding everything needed to
//! configure a tokenizer for the file.

pub mod dialect;
pub mod encoding;
pub mod preamble;

pub use dialect::{Dialect, Quoting, Sniffer, TokenizerOptions};
pub use encoding::EncodingDetector;
pub use preamble::{CampaignReport, Fieldless, MarkerRow, Preamble, PreambleChain, PreambleDetector};

use crate::error::{ReadError, ReadResult};

/// Holds all parameters needed to successfully read a delimited text file.
///
/// Created once per file and consumed by the tokenizer configuration;
/// immutable after detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    /// Character encoding name (lowercase).
    pub encoding: String,
    /// Leading lines to discard before the header row.
    pub preamble: usize,
    /// Trailing rows flagged for exclusion (exporter totals etc.).
    pub footer: usize,
    /// Delimiter/quoting convention of the body.
    pub dialect: Dialect,
    /// Column names from the header row, de-duplicated and never empty.
    pub columns: Vec<String>,
}

/// Configurable format detection pipeline.
#[derive(Default)]
pub struct FormatDetection {
    /// Encoding detector (step 1).
    pub encoding: EncodingDetector,
    /// Preamble detector chain (step 2, on decoded text).
    pub preambles: PreambleChain,
    /// Dialect sniffer (step 3, on text after the preamble).
    pub sniffer: Sniffer,
}

impl FormatDetection {
    /// Infer all parameters required for reading a delimited file.
    ///
    /// The only error condition is an empty byte source; every detection
    /// ambiguity resolves to a deterministic fallback instead.
    pub fn detect(&self, bytes: &[u8]) -> ReadResult<Format> {
        if bytes.is_empty() {
            return Err(ReadError::EmptyInput);
        }

        let head = &bytes[..bytes.len().min(self.encoding.n_bytes)];
        let encoding = self.encoding.detect(head);
        let text = encoding::decode(head, &encoding);

        let preamble = self.preambles.detect(&text);
        let body = skip_lines(&text, preamble.lines);
        let dialect = self.sniffer.detect(body);
        let columns = header_columns(body, &dialect);

        Ok(Format {
            encoding,
            preamble: preamble.lines,
            footer: preamble.footer,
            dialect,
            columns,
        })
    }
}

/// Detect the format of a byte source with default detectors.
pub fn detect_format(bytes: &[u8]) -> ReadResult<Format> {
    FormatDetection::default().detect(bytes)
}

/// The remainder of `text` after `n` lines.
pub(crate) fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Extract column names from the header row at the start of `body`.
///
/// Empty names are rewritten to positional placeholders and all names are
/// de-duplicated with numeric suffixes, so the result contains no empty and
/// no duplicate names.
pub(crate) fn header_columns(body: &str, dialect: &Dialect) -> Vec<String> {
    let opts = dialect.to_tokenizer_options();
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

    let mut reader = builder.from_reader(body.as_bytes());
    let mut record = csv::StringRecord::new();
    let names: Vec<String> = match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(|name| name.trim().to_string()).collect(),
        _ => Vec::new(),
    };

    let named: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                format!("column_{i}")
            } else {
                name.clone()
            }
        })
        .collect();

    uniquify(&named)
}

/// Add numeric suffixes where necessary so every name is unique.
fn uniquify(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 0;
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_an_error_and_yields_no_format() {
        assert!(matches!(detect_format(b""), Err(ReadError::EmptyInput)));
    }

    #[test]
    fn plain_csv_detects_header_and_defaults() {
        let format = detect_format(b"a,b,c\n1,2,3\n4,5,6\n").unwrap();
        assert_eq!(format.encoding, "utf-8");
        assert_eq!(format.preamble, 0);
        assert_eq!(format.dialect.delimiter, ',');
        assert_eq!(format.columns, vec!["a", "b", "c"]);
    }

    #[test]
    fn preamble_skipped_before_dialect_detection() {
        // The banner contains commas; the table itself is semicolons.
        let bytes = b"Export: a, very messy, banner\n\nid;name\n1;x\n2;y\n";
        let format = detect_format(bytes).unwrap();
        assert_eq!(format.preamble, 2);
        assert_eq!(format.dialect.delimiter, ';');
        assert_eq!(format.columns, vec!["id", "name"]);
    }

    #[test]
    fn empty_header_names_get_stable_placeholders() {
        let format = detect_format(b"col1,,col3,,col5\n1,2,3,4,5\n").unwrap();
        assert_eq!(
            format.columns,
            vec!["col1", "column_1", "col3", "column_3", "col5"]
        );
    }

    #[test]
    fn duplicate_header_names_are_uniquified() {
        let format = detect_format(b"x,x,x\n1,2,3\n").unwrap();
        assert_eq!(format.columns, vec!["x", "x_1", "x_2"]);
    }

    #[test]
    fn skip_lines_walks_newlines() {
        assert_eq!(skip_lines("a\nb\nc", 0), "a\nb\nc");
        assert_eq!(skip_lines("a\nb\nc", 2), "c");
        assert_eq!(skip_lines("a\nb\nc", 5), "");
    }
}
