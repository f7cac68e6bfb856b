//! Converters for types that logically remain strings: free text, URLs and
//! categoricals.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::list::RE_LIST_LIKE;
use super::stats::{proportion_matching, proportion_unique};
use super::{Conversion, Converter};
use crate::types::{Column, DictionaryColumn};

/// Strings need at least this many spaces to be considered text.
const TEXT_MIN_SPACES: usize = 2;

/// Strings need to be at least this long to be considered text.
const TEXT_MIN_LENGTH: usize = 15;

/// Default maximum cardinality for categoricals (proportional).
const MAX_CARDINALITY: f64 = 0.1;

/// Web-URL-shaped strings: optional scheme, domain/localhost/IP, optional
/// port, optional path.
pub(crate) static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(http://www\.|https://www\.|http://|https://)?(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
    )
    .expect("url regex compiles")
});

/// Natural-language likeness: long, containing spaces, not list-shaped.
fn is_text(value: &str) -> bool {
    value.chars().count() >= TEXT_MIN_LENGTH
        && value.matches(' ').count() >= TEXT_MIN_SPACES
        && !RE_LIST_LIKE.is_match(value)
}

/// Proportion of non-null values that are (web) URL-like.
pub(crate) fn proportion_url(values: &[Option<String>]) -> f64 {
    proportion_matching(values, |v| RE_URL.is_match(v))
}

/// Dictionary-encode depending on cardinality.
///
/// A cap above one is an absolute distinct-value count; a cap in (0, 1] is
/// relative to the number of non-null values; no cap always encodes.
fn maybe_cast_category(
    values: &[Option<String>],
    max_cardinality: Option<f64>,
) -> Option<DictionaryColumn> {
    let dict = DictionaryColumn::encode(values);
    let Some(cap) = max_cardinality else {
        return Some(dict);
    };

    let n_unique = dict.cardinality() as f64;
    let do_cast = if cap > 1.0 {
        n_unique <= cap
    } else if cap > 0.0 {
        let n_valid = values.iter().filter(|v| v.is_some()).count();
        n_valid > 0 && n_unique / n_valid as f64 <= cap
    } else {
        false
    };

    do_cast.then_some(dict)
}

/// Anything could be text; this enforces text-likeness and uniqueness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Text {
    /// Minimum proportion of text-like values.
    pub threshold: f64,
    /// Minimum proportion of unique values.
    pub min_unique: f64,
}

impl Default for Text {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            min_unique: 0.1,
        }
    }
}

impl Converter for Text {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        let values = column.as_utf8()?;

        if proportion_unique(values) >= self.min_unique
            && proportion_matching(values, is_text) >= self.threshold
        {
            return Some(Conversion::new(column.clone()).with_meta("semantic", "text"));
        }

        None
    }
}

/// URL-shaped strings, dictionary-encoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Url {
    /// Minimum proportion of URL-shaped values.
    pub threshold: f64,
}

impl Default for Url {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl Converter for Url {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        let values = column.as_utf8()?;

        if proportion_url(values) >= self.threshold {
            let result = Column::Dictionary(DictionaryColumn::encode(values));
            return Some(Conversion::new(result).with_meta("semantic", "url"));
        }

        None
    }
}

/// Dictionary-encodes string columns below a cardinality cap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Category {
    /// Unused for matching; kept so configurations can carry it uniformly.
    pub threshold: f64,
    /// Cardinality cap; `None` always encodes.
    pub max_cardinality: Option<f64>,
}

impl Default for Category {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            max_cardinality: Some(MAX_CARDINALITY),
        }
    }
}

impl Category {
    /// The unconditional variant used as the autocast fallback.
    pub fn unbounded() -> Self {
        Self {
            threshold: 0.0,
            max_cardinality: None,
        }
    }
}

impl Converter for Category {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        let values = column.as_utf8()?;
        let result = maybe_cast_category(values, self.max_cardinality)?;
        Some(Conversion::new(Column::Dictionary(result)).with_meta("semantic", "category"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(values: &[&str]) -> Column {
        Column::Utf8(values.iter().map(|v| Some((*v).to_string())).collect())
    }

    #[test]
    fn prose_is_text() {
        let col = utf8(&[
            "Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
            "No one rejects, dislikes, or avoids pleasure itself.",
            "Nor again is there anyone who loves or pursues pain.",
        ]);
        let text = Text {
            threshold: 0.8,
            ..Text::default()
        };
        let conv = text.convert(&col).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "text");
        assert_eq!(conv.result, col);
    }

    #[test]
    fn short_or_repeated_values_are_not_text() {
        let text = Text {
            threshold: 0.8,
            ..Text::default()
        };
        assert!(text.convert(&utf8(&["one", "two", "three"])).is_none());

        // High text-likeness but almost no uniqueness.
        let repeated: Vec<&str> = std::iter::repeat_n("the same long sentence, again", 30).collect();
        assert!(text.convert(&utf8(&repeated)).is_none());
    }

    #[test]
    fn url_shapes_accepted_and_dictionary_encoded() {
        let col = utf8(&[
            "https://www.example.com/path?q=1",
            "http://localhost:8080/",
            "example.org",
            "10.0.0.1/admin",
        ]);
        let url = Url { threshold: 0.8 };
        let conv = url.convert(&col).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "url");
        assert!(matches!(conv.result, Column::Dictionary(_)));
    }

    #[test]
    fn free_text_is_not_url() {
        let url = Url { threshold: 0.8 };
        assert!(url.convert(&utf8(&["hello world", "not a url"])).is_none());
    }

    #[test]
    fn category_respects_absolute_cap() {
        let col = utf8(&["a", "b", "a", "b", "c"]);
        let capped = Category {
            threshold: 0.0,
            max_cardinality: Some(3.0),
        };
        assert!(capped.convert(&col).is_some());

        let tight = Category {
            threshold: 0.0,
            max_cardinality: Some(2.0),
        };
        assert!(tight.convert(&col).is_none());
    }

    #[test]
    fn category_respects_proportional_cap() {
        let values: Vec<&str> = std::iter::repeat_n(["a", "b"], 10).flatten().collect();
        let col = utf8(&values);
        let category = Category::default(); // 10% proportional cap
        assert!(category.convert(&col).is_some());

        let unique = utf8(&["a", "b", "c", "d"]);
        assert!(category.convert(&unique).is_none());
    }

    #[test]
    fn unbounded_category_always_encodes() {
        let col = utf8(&["a", "b", "c"]);
        let conv = Category::unbounded().convert(&col).unwrap();
        match conv.result {
            Column::Dictionary(d) => assert_eq!(d.cardinality(), 3),
            other => panic!("expected dictionary, got {:?}", other.data_type()),
        }
    }
}
