//! Conversion of stringy booleans to the boolean type.

use serde::Deserialize;

use super::{Conversion, Converter};
use crate::types::Column;

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Converts stringy booleans ("true" / "False", 0/1, yes/no) to booleans.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Boolean {
    /// Minimum fraction of non-null values that must parse.
    pub threshold: f64,
}

impl Default for Boolean {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl Converter for Boolean {
    fn convert(&self, column: &Column) -> Option<Conversion> {
        let values = column.as_utf8()?;
        let valid_before = values.iter().filter(|v| v.is_some()).count();
        if valid_before == 0 {
            return None;
        }

        let parsed: Vec<Option<bool>> = values
            .iter()
            .map(|v| v.as_deref().and_then(parse_bool))
            .collect();
        let valid_after = parsed.iter().filter(|v| v.is_some()).count();

        if (valid_after as f64 / valid_before as f64) < self.threshold {
            return None;
        }

        Some(Conversion::new(Column::Bool(parsed)).with_meta("semantic", "boolean"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(values: &[Option<&str>]) -> Column {
        Column::Utf8(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn boolean_vocabulary_converts() {
        let col = utf8(&[
            Some("true"),
            Some("False"),
            Some("1"),
            Some("0"),
            Some("yes"),
            Some("N"),
            None,
        ]);
        let conv = Boolean::default().convert(&col).unwrap();
        assert_eq!(
            conv.result,
            Column::Bool(vec![
                Some(true),
                Some(false),
                Some(true),
                Some(false),
                Some(true),
                Some(false),
                None,
            ])
        );
        assert_eq!(conv.meta.get("semantic").unwrap(), "boolean");
    }

    #[test]
    fn mixed_values_refused_at_full_threshold() {
        let col = utf8(&[Some("true"), Some("maybe")]);
        assert!(Boolean::default().convert(&col).is_none());
    }

    #[test]
    fn all_null_refused() {
        assert!(Boolean::default().convert(&utf8(&[None, None])).is_none());
    }
}
