//! Dialect detection (separator, quoting, escaping) over a text sample.
//!
//! The baseline [`Sniffer`] is deliberately conservative: delimiter
//! candidates are restricted to a fixed set to avoid false positives on free
//! text, and the result is post-processed so the dialect is always safe to
//! re-parse with, even where the raw sniff disagrees (see
//! [`Sniffer::detect`]).

use serde::{Deserialize, Serialize};

/// Allowed delimiters for dialect detection.
pub const DELIMITER_CANDIDATES: [char; 4] = [',', ';', '\t', '|'];

/// How many lines to use for dialect detection.
pub const SNIFF_LINES_DEFAULT: usize = 100;

/// Quoting style of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quoting {
    /// Fields are quoted only when they contain special characters.
    Minimal,
    /// All fields are quoted.
    All,
    /// No quoting.
    None,
    /// Non-numeric fields are quoted.
    NonNumeric,
}

/// The syntactic convention of a delimited text file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    /// Field separator.
    pub delimiter: char,
    /// Quote character, if any.
    pub quote_char: Option<char>,
    /// Escape character, if any.
    pub escape_char: Option<char>,
    /// Whether a quote inside a quoted field is written doubled.
    ///
    /// Invariant: when `escape_char` is `None` this must be `true`, or the
    /// file cannot be re-parsed reliably. Detectors enforce this.
    pub double_quote: bool,
    /// Whether whitespace right after the delimiter is ignored.
    pub skip_initial_space: bool,
    /// Line terminator. Not reliably detectable from a light sample; fixed
    /// to CRLF, which tokenizers treat as "CRLF or LF" anyway.
    pub line_terminator: String,
    /// Apparent quoting style.
    pub quoting: Quoting,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_char: Some('"'),
            escape_char: None,
            double_quote: true,
            skip_initial_space: false,
            line_terminator: "\r\n".to_string(),
            quoting: Quoting::Minimal,
        }
    }
}

/// Tokenizer-facing dialect configuration (byte-oriented).
///
/// This is the exchange format consumed by the external tokenizer; see
/// [`crate::reader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerOptions {
    /// Field separator byte.
    pub delimiter: u8,
    /// Quote byte, if quoting is enabled.
    pub quote: Option<u8>,
    /// Escape byte, if any.
    pub escape: Option<u8>,
    /// Whether doubled quotes are a literal quote.
    pub double_quote: bool,
    /// Whether whitespace right after the delimiter is ignored.
    pub trim_leading_space: bool,
}

impl Dialect {
    /// Convert to tokenizer options.
    ///
    /// Delimiter candidates are all ASCII, so the char → byte narrowing is
    /// lossless for any dialect a detector can produce.
    pub fn to_tokenizer_options(&self) -> TokenizerOptions {
        TokenizerOptions {
            delimiter: self.delimiter as u8,
            quote: self.quote_char.map(|c| c as u8),
            escape: self.escape_char.map(|c| c as u8),
            double_quote: self.double_quote,
            trim_leading_space: self.skip_initial_space,
        }
    }

    /// Rebuild a dialect from tokenizer options, restoring defaults for the
    /// fields the tokenizer does not carry.
    pub fn from_tokenizer_options(opts: &TokenizerOptions) -> Self {
        // Reliable re-parsing needs one of escape_char or double_quote.
        let double_quote = opts.double_quote || opts.escape.is_none();
        Self {
            delimiter: opts.delimiter as char,
            quote_char: opts.quote.map(|b| b as char),
            escape_char: opts.escape.map(|b| b as char),
            double_quote,
            skip_initial_space: opts.trim_leading_space,
            line_terminator: "\r\n".to_string(),
            quoting: Quoting::Minimal,
        }
    }
}

/// Count delimiter occurrences outside quoted spans.
///
/// Doubled quotes inside a quoted span are handled by the in/out toggle:
/// `""` flips out and straight back in.
pub(crate) fn count_outside_quotes(line: &str, delimiter: char, quote: char) -> usize {
    let mut count = 0;
    let mut in_quotes = false;
    for c in line.chars() {
        if c == quote {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Baseline dialect sniffer. Never fails: falls back to the default dialect.
#[derive(Debug, Clone)]
pub struct Sniffer {
    /// Delimiter candidates, tried against the sample.
    pub delimiters: Vec<char>,
    /// How many lines of the sample to look at.
    pub n_lines: usize,
}

impl Default for Sniffer {
    fn default() -> Self {
        Self {
            delimiters: DELIMITER_CANDIDATES.to_vec(),
            n_lines: SNIFF_LINES_DEFAULT,
        }
    }
}

impl Sniffer {
    /// Detect a dialect the sample can be reliably re-parsed with.
    ///
    /// Retries with a single line when sniffing the full sample fails, and
    /// falls back to [`Dialect::default`] when both attempts fail. The raw
    /// sniff result is post-processed: `double_quote` is forced on when no
    /// escape character was found, "no quoting" is normalized to minimal
    /// quoting, and the line terminator is fixed to CRLF.
    pub fn detect(&self, sample: &str) -> Dialect {
        for n_lines in [self.n_lines, 1] {
            if let Some(dialect) = self.sniff(sample, n_lines) {
                return dialect;
            }
        }

        Dialect::default()
    }

    fn sniff(&self, sample: &str, n_lines: usize) -> Option<Dialect> {
        let lines: Vec<&str> = sample
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(n_lines)
            .collect();
        if lines.is_empty() {
            return None;
        }

        let delimiter = self.score_delimiters(&lines)?;
        let quote_char = infer_quote_char(&lines, delimiter);
        let quoting = infer_quoting(&lines, delimiter, quote_char);
        let escape_char = infer_escape_char(&lines, delimiter, quote_char);
        let skip_initial_space = infer_skip_initial_space(&lines, delimiter, quote_char);

        let dialect = Dialect {
            delimiter,
            quote_char,
            escape_char,
            double_quote: escape_char.is_none(),
            skip_initial_space,
            line_terminator: "\r\n".to_string(),
            quoting: match quoting {
                Quoting::None => Quoting::Minimal,
                other => other,
            },
        };

        Some(dialect)
    }

    /// Score candidates by frequency and per-line consistency; the winner
    /// must actually occur in the sample.
    fn score_delimiters(&self, lines: &[&str]) -> Option<char> {
        let mut best: Option<(char, f64)> = None;

        for &delimiter in &self.delimiters {
            let counts: Vec<usize> = lines
                .iter()
                .map(|l| count_outside_quotes(l, delimiter, '"'))
                .collect();
            let total: usize = counts.iter().sum();
            if total == 0 {
                continue;
            }

            let mean = total as f64 / counts.len() as f64;
            let variance = counts
                .iter()
                .map(|&c| (c as f64 - mean).powi(2))
                .sum::<f64>()
                / counts.len() as f64;
            let score = mean / (1.0 + variance.sqrt());

            if best.map_or(true, |(_, s)| score > s) {
                best = Some((delimiter, score));
            }
        }

        best.map(|(delimiter, _)| delimiter)
    }
}

fn split_fields(line: &str, delimiter: char, quote: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        if c == quote {
            in_quotes = !in_quotes;
            field.push(c);
        } else if c == delimiter && !in_quotes {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }
    fields.push(field);
    fields
}

fn infer_quote_char(lines: &[&str], delimiter: char) -> Option<char> {
    let mut double = 0usize;
    let mut single = 0usize;

    for line in lines {
        for candidate in ['"', '\''] {
            for field in split_fields(line, delimiter, candidate) {
                let field = field.trim();
                if field.len() >= 2 && field.starts_with(candidate) && field.ends_with(candidate) {
                    match candidate {
                        '"' => double += 1,
                        _ => single += 1,
                    }
                }
            }
        }
    }

    if single > double && single > 0 {
        Some('\'')
    } else {
        // The double quote is near-universal; assume it even when the sample
        // contains no quoted field at all.
        Some('"')
    }
}

fn infer_quoting(lines: &[&str], delimiter: char, quote_char: Option<char>) -> Quoting {
    let Some(quote) = quote_char else {
        return Quoting::None;
    };

    let mut quoted = 0usize;
    let mut unquoted = 0usize;
    for line in lines {
        for field in split_fields(line, delimiter, quote) {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            if field.len() >= 2 && field.starts_with(quote) && field.ends_with(quote) {
                quoted += 1;
            } else {
                unquoted += 1;
            }
        }
    }

    match (quoted, unquoted) {
        (0, _) => Quoting::None,
        (_, 0) => Quoting::All,
        _ => Quoting::Minimal,
    }
}

fn infer_escape_char(lines: &[&str], delimiter: char, quote_char: Option<char>) -> Option<char> {
    let quote = quote_char.unwrap_or('"');
    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        let mut in_quotes = false;
        for i in 0..chars.len() {
            let c = chars[i];
            if c == quote {
                in_quotes = !in_quotes;
            } else if c == '\\' && !in_quotes {
                if let Some(&next) = chars.get(i + 1) {
                    if next == delimiter || next == quote {
                        return Some('\\');
                    }
                }
            }
        }
    }
    None
}

fn infer_skip_initial_space(lines: &[&str], delimiter: char, quote_char: Option<char>) -> bool {
    let quote = quote_char.unwrap_or('"');
    let mut total = 0usize;
    let mut spaced = 0usize;

    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        let mut in_quotes = false;
        for i in 0..chars.len() {
            let c = chars[i];
            if c == quote {
                in_quotes = !in_quotes;
            } else if c == delimiter && !in_quotes {
                total += 1;
                if chars.get(i + 1) == Some(&' ') {
                    spaced += 1;
                }
            }
        }
    }

    total > 0 && spaced == total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_delimiters() {
        for (sample, expected) in [
            ("a,b,c\n1,2,3\n4,5,6", ','),
            ("a;b;c\n1;2;3\n4;5;6", ';'),
            ("a\tb\tc\n1\t2\t3", '\t'),
            ("a|b|c\n1|2|3", '|'),
        ] {
            let dialect = Sniffer::default().detect(sample);
            assert_eq!(dialect.delimiter, expected, "sample: {sample:?}");
            assert!(dialect.double_quote);
            assert_eq!(dialect.quoting, Quoting::Minimal);
            assert_eq!(dialect.line_terminator, "\r\n");
        }
    }

    #[test]
    fn quoted_delimiters_do_not_count() {
        let sample = "name;note\n\"a;b;c\";x\n\"d;e\";y";
        let dialect = Sniffer::default().detect(sample);
        assert_eq!(dialect.delimiter, ';');
    }

    #[test]
    fn no_delimiter_falls_back_to_default() {
        let dialect = Sniffer::default().detect("just some words\nand some more");
        assert_eq!(dialect, Dialect::default());
    }

    #[test]
    fn all_fields_quoted_detected() {
        let sample = "\"a\",\"b\"\n\"1\",\"2\"";
        let dialect = Sniffer::default().detect(sample);
        assert_eq!(dialect.quoting, Quoting::All);
        assert_eq!(dialect.quote_char, Some('"'));
    }

    #[test]
    fn skip_initial_space_requires_consistency() {
        let spaced = Sniffer::default().detect("a, b, c\n1, 2, 3");
        assert!(spaced.skip_initial_space);

        let mixed = Sniffer::default().detect("a, b,c\n1,2, 3");
        assert!(!mixed.skip_initial_space);
    }

    #[test]
    fn escape_char_disables_double_quote() {
        let sample = "a,b\n1,value \\\" with escape\\,still";
        let dialect = Sniffer::default().detect(sample);
        assert_eq!(dialect.escape_char, Some('\\'));
        assert!(!dialect.double_quote);
    }

    #[test]
    fn tokenizer_options_roundtrip() {
        for dialect in [
            Dialect::default(),
            Dialect {
                delimiter: '\t',
                quote_char: Some('"'),
                escape_char: None,
                double_quote: true,
                skip_initial_space: false,
                line_terminator: "\r\n".to_string(),
                quoting: Quoting::Minimal,
            },
            Dialect {
                delimiter: ';',
                quote_char: Some('\''),
                escape_char: Some('\\'),
                double_quote: false,
                skip_initial_space: true,
                line_terminator: "\r\n".to_string(),
                quoting: Quoting::Minimal,
            },
        ] {
            let roundtripped = Dialect::from_tokenizer_options(&dialect.to_tokenizer_options());
            assert_eq!(roundtripped.delimiter, dialect.delimiter);
            assert_eq!(roundtripped.quote_char, dialect.quote_char);
            assert_eq!(roundtripped.escape_char, dialect.escape_char);
            assert_eq!(roundtripped.double_quote, dialect.double_quote);
            assert_eq!(roundtripped.skip_initial_space, dialect.skip_initial_space);
        }
    }

    #[test]
    fn double_quote_restored_when_escape_missing() {
        let opts = TokenizerOptions {
            delimiter: b',',
            quote: Some(b'"'),
            escape: None,
            double_quote: false,
            trim_leading_space: false,
        };
        assert!(Dialect::from_tokenizer_options(&opts).double_quote);
    }
}
