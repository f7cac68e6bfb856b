//! Detection of preambles (initial junk lines) in delimited text.
//!
//! This is a chicken-and-egg situation: to detect generic preambles robustly
//! it would help to know the dialect, but to detect the dialect correctly the
//! preamble must already be skipped. Detectors therefore rely on heuristics
//! that implicitly assume certain dialect conventions.
//!
//! Every detector receives its own independent view of the decoded sample;
//! there is no shared cursor to save and restore between attempts.

use super::dialect::DELIMITER_CANDIDATES;

/// How many lines detectors look at by default.
pub const PREAMBLE_LINES_DEFAULT: usize = 100;

/// Result of preamble detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preamble {
    /// Leading lines to discard. Zero means "no preamble detected".
    pub lines: usize,
    /// Trailing rows flagged for exclusion (exporter totals etc.).
    pub footer: usize,
}

impl Preamble {
    /// A no-match result.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this result matches any preamble at all.
    pub fn is_none(&self) -> bool {
        self.lines == 0
    }
}

/// A single preamble heuristic.
pub trait PreambleDetector: Send + Sync {
    /// Detect a preamble in the sample; `Preamble::none()` when not matching.
    fn detect(&self, sample: &str) -> Preamble;
}

/// Ordered chain of detectors; the first non-zero result wins.
pub struct PreambleChain {
    detectors: Vec<Box<dyn PreambleDetector>>,
}

impl Default for PreambleChain {
    /// Exporter-specific detection runs before the generic fieldless
    /// heuristic so validated matches can carry their footer flag.
    fn default() -> Self {
        Self::new(vec![
            Box::new(MarkerRow::default()),
            Box::new(CampaignReport::default()),
            Box::new(Fieldless::default()),
        ])
    }
}

impl PreambleChain {
    /// Build a chain from an ordered detector list.
    pub fn new(detectors: Vec<Box<dyn PreambleDetector>>) -> Self {
        Self { detectors }
    }

    /// Run detectors in order against independent views of the sample.
    pub fn detect(&self, sample: &str) -> Preamble {
        for detector in &self.detectors {
            let preamble = detector.detect(sample);
            if !preamble.is_none() {
                return preamble;
            }
        }
        Preamble::none()
    }
}

/// Detects a marker row: a line consisting of delimiter characters only.
///
/// Some exporters separate preamble text from the table with a row of bare
/// delimiters (e.g. `,,,,`); everything up to and including that row is
/// preamble.
#[derive(Debug, Clone)]
pub struct MarkerRow {
    /// How many lines to scan.
    pub n_lines: usize,
    /// Characters that count as delimiters.
    pub delimiters: Vec<char>,
}

impl Default for MarkerRow {
    fn default() -> Self {
        Self {
            n_lines: PREAMBLE_LINES_DEFAULT,
            delimiters: DELIMITER_CANDIDATES.to_vec(),
        }
    }
}

impl PreambleDetector for MarkerRow {
    fn detect(&self, sample: &str) -> Preamble {
        for (i, line) in sample.lines().take(self.n_lines).enumerate() {
            let line = line.trim();
            if !line.is_empty() && line.chars().all(|c| self.delimiters.contains(&c)) {
                return Preamble {
                    lines: i + 1,
                    footer: 0,
                };
            }
        }
        Preamble::none()
    }
}

/// Outcome of parsing one logical record for the fieldless heuristic.
struct RecordShape {
    /// Number of fields in the record.
    n_fields: usize,
    /// Physical lines the record spans.
    n_lines: usize,
    /// False when the sample ended inside an open quoted field.
    terminated: bool,
}

/// Parse one logical record starting at `lines[start]`.
///
/// Quote handling follows the usual delimited-text conventions: a quote is
/// only special at the start of a field, a doubled quote inside a quoted
/// span is a literal quote, and a quoted span may run across physical lines.
fn parse_record(lines: &[&str], start: usize, delimiter: char) -> RecordShape {
    #[derive(PartialEq)]
    enum State {
        FieldStart,
        Unquoted,
        Quoted,
        // Saw a quote while inside a quoted span; the next char decides
        // between a literal doubled quote and the end of the span.
        QuoteInQuoted,
    }

    let mut state = State::FieldStart;
    let mut n_fields = 1;
    let mut n_lines = 0;

    for line in &lines[start..] {
        n_lines += 1;
        for c in line.chars() {
            match state {
                State::FieldStart => {
                    if c == '"' {
                        state = State::Quoted;
                    } else if c == delimiter {
                        n_fields += 1;
                    } else if c != ' ' {
                        state = State::Unquoted;
                    }
                }
                State::Unquoted => {
                    if c == delimiter {
                        n_fields += 1;
                        state = State::FieldStart;
                    }
                }
                State::Quoted => {
                    if c == '"' {
                        state = State::QuoteInQuoted;
                    }
                }
                State::QuoteInQuoted => {
                    if c == '"' {
                        state = State::Quoted;
                    } else if c == delimiter {
                        n_fields += 1;
                        state = State::FieldStart;
                    } else {
                        state = State::Unquoted;
                    }
                }
            }
        }

        if state != State::Quoted {
            return RecordShape {
                n_fields,
                n_lines,
                terminated: true,
            };
        }
        // Open quoted span: the newline is part of the field, the record
        // continues on the next physical line.
    }

    RecordShape {
        n_fields,
        n_lines,
        terminated: false,
    }
}

/// Detects initial rows that don't contain any delimited fields.
///
/// Dialect-independent: assumes as delimiter the most frequent character
/// among the configured candidates, then counts consecutive leading logical
/// records containing a single field only, stopping at the first record with
/// multiple fields. A record left unterminated by an open quote at the end
/// of the sample is never counted as multi-field.
#[derive(Debug, Clone)]
pub struct Fieldless {
    /// Delimiter candidates ranked by frequency in the sample.
    pub delimiters: Vec<char>,
    /// How many lines to scan.
    pub n_lines: usize,
}

impl Default for Fieldless {
    fn default() -> Self {
        Self {
            delimiters: vec![',', ';', '\t'],
            n_lines: PREAMBLE_LINES_DEFAULT,
        }
    }
}

impl Fieldless {
    /// Count leading fieldless physical lines given a specific delimiter.
    pub fn detect_with_delimiter(&self, sample: &str, delimiter: char) -> usize {
        let lines: Vec<&str> = sample.lines().take(self.n_lines).collect();

        let mut consumed = 0;
        while consumed < lines.len() {
            let record = parse_record(&lines, consumed, delimiter);
            if record.terminated && record.n_fields > 1 {
                return consumed;
            }
            consumed += record.n_lines;
        }

        // Every sampled record was fieldless: a single-column file, not a
        // file that is all preamble.
        0
    }

    fn most_frequent_delimiter(&self, sample: &str) -> char {
        let text: String = sample
            .lines()
            .take(self.n_lines)
            .collect::<Vec<_>>()
            .join("\n");

        let mut best = (self.delimiters[0], 0usize);
        for &candidate in &self.delimiters {
            let count = text.matches(candidate).count();
            if count > best.1 {
                best = (candidate, count);
            }
        }
        best.0
    }
}

impl PreambleDetector for Fieldless {
    fn detect(&self, sample: &str) -> Preamble {
        let delimiter = self.most_frequent_delimiter(sample);
        Preamble {
            lines: self.detect_with_delimiter(sample, delimiter),
            footer: 0,
        }
    }
}

/// Detects ad-platform campaign report exports.
///
/// These put a localized report banner in the garbage lines and always name
/// a campaign column in the real header. Builds on [`Fieldless`] and keeps
/// its count only when both markers validate; such exports also append two
/// trailing totals rows, flagged for exclusion downstream.
#[derive(Debug, Clone)]
pub struct CampaignReport {
    fieldless: Fieldless,
    /// Phrase expected (case-insensitively) somewhere in the skipped lines.
    pub report_marker: String,
    /// Column name fragment expected in the first real header row.
    pub header_marker: String,
    /// Trailing totals rows to exclude.
    pub footer_rows: usize,
}

impl Default for CampaignReport {
    fn default() -> Self {
        Self {
            fieldless: Fieldless::default(),
            report_marker: "informe de".to_string(),
            header_marker: "Campaña".to_string(),
            footer_rows: 2,
        }
    }
}

impl PreambleDetector for CampaignReport {
    fn detect(&self, sample: &str) -> Preamble {
        let skip = self.fieldless.detect(sample).lines;
        if skip == 0 {
            return Preamble::none();
        }

        let lines: Vec<&str> = sample.lines().take(self.fieldless.n_lines).collect();
        let is_report = lines[..skip.min(lines.len())]
            .iter()
            .any(|l| l.to_lowercase().contains(&self.report_marker));
        let has_campaign_col = lines
            .get(skip)
            .map(|l| l.split(',').any(|col| col.contains(&self.header_marker)))
            .unwrap_or(false);

        if is_report && has_campaign_col {
            Preamble {
                lines: skip,
                footer: self.footer_rows,
            }
        } else {
            // Unverified counts are worse than no preamble at all.
            Preamble::none()
        }
    }
}
