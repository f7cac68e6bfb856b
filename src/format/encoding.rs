//! Character encoding detection over a bounded byte sample.
//!
//! Opinionated: assumes UTF-8 as the most common encoding, falls back on
//! statistical detection (`chardetng`), and if all else fails on
//! windows-1250 as a superset single-byte Latin encoding.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1250};

/// Cannot use more than this many bytes at once to detect an encoding.
pub const MAX_SAMPLE_BYTES: usize = i32::MAX as usize;

/// Encoding assumed when nothing else can be established.
pub const FALLBACK_ENCODING: &str = "windows-1250";

/// Character substituted for non-decodable bytes.
const SUBSTITUTION: char = '\u{FFFD}';

/// Detect the encoding name by looking for a byte-order mark.
pub fn detect_bom(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some("utf-8-sig")
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some("utf-16le")
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some("utf-16be")
    } else {
        None
    }
}

/// The proportion of characters that couldn't be decoded correctly.
fn substitution_rate(bytes: &[u8], encoding: &'static Encoding) -> f64 {
    let (decoded, _, _) = encoding.decode(bytes);
    let mut chars = 0usize;
    let mut errors = 0usize;
    for c in decoded.chars() {
        chars += 1;
        if c == SUBSTITUTION {
            errors += 1;
        }
    }
    if chars == 0 {
        return 0.0;
    }
    errors as f64 / chars as f64
}

/// Detects the character encoding of a byte sample. Never fails.
#[derive(Debug, Clone)]
pub struct EncodingDetector {
    /// Use at most this many bytes of the sample (default 10 MB).
    pub n_bytes: usize,
    /// A greater proportion of substitution characters than this counts as a
    /// failed UTF-8 trial decode.
    pub error_threshold: f64,
    /// Minimum confidence to accept a statistically detected encoding.
    ///
    /// The statistical detector reports a binary high/low assessment, mapped
    /// here to 1.0/0.5; with the 0.6 default only high-confidence guesses
    /// are accepted.
    pub confidence_threshold: f64,
}

impl Default for EncodingDetector {
    fn default() -> Self {
        Self {
            n_bytes: 10_000_000,
            error_threshold: 0.05,
            confidence_threshold: 0.6,
        }
    }
}

impl EncodingDetector {
    /// Detect the encoding of `sample`, returning a lowercase encoding name.
    pub fn detect(&self, sample: &[u8]) -> String {
        let head = &sample[..sample.len().min(self.n_bytes).min(MAX_SAMPLE_BYTES)];

        if let Some(name) = detect_bom(head) {
            return name.to_string();
        }

        if substitution_rate(head, UTF_8) <= self.error_threshold {
            return "utf-8".to_string();
        }

        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(head, true);
        let (guess, high_confidence) = detector.guess_assess(None, true);
        let confidence = if high_confidence { 1.0 } else { 0.5 };

        if confidence > self.confidence_threshold {
            return guess.name().to_ascii_lowercase();
        }

        // Low confidence: for Latin-like guesses windows-1250 is a safe
        // superset for special characters, and it is also the unconditional
        // fallback.
        FALLBACK_ENCODING.to_string()
    }
}

/// Resolve a detected encoding name to an `encoding_rs` decoder.
///
/// Unknown labels resolve to the fallback encoding, so decoding never fails.
pub fn resolve(name: &str) -> &'static Encoding {
    match name {
        // No WHATWG label; BOM handling in decode() strips the marker.
        "utf-8-sig" => UTF_8,
        other => Encoding::for_label(other.as_bytes()).unwrap_or(WINDOWS_1250),
    }
}

/// Decode bytes with the named encoding, substituting malformed sequences.
///
/// A leading BOM matching the encoding is removed.
pub fn decode(bytes: &[u8], name: &str) -> String {
    let encoding = resolve(name);
    // Encoding::decode sniffs and strips a BOM for the UTF family.
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}
