//! Semantic type inference and casting for raw string columns.
//!
//! Converters are pure recognizers: [`Converter::convert`] returns `None`
//! when the type does not apply or the configured threshold is unmet, never
//! an error. [`Autocast`] tries converters in configuration order per
//! column, using a cheap sample pre-check to reject non-matching types
//! before committing to a full-column conversion.

pub mod boolean;
pub mod list;
pub mod number;
pub(crate) mod stats;
pub mod strings;
pub mod timestamp;

pub use boolean::Boolean;
pub use list::List;
pub use number::{DecimalMode, Number};
pub use strings::{Category, Text, Url};
pub use timestamp::Timestamp;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{ReadError, ReadResult};
use crate::types::{Column, DataType, Table};

/// Result of a successful conversion: the replacement column plus semantic
/// metadata to merge into the owning field.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// The typed replacement column.
    pub result: Column,
    /// Key/value annotations (e.g. `semantic` → `number[uint8]`).
    pub meta: BTreeMap<String, String>,
}

impl Conversion {
    /// A conversion with empty metadata.
    pub fn new(result: Column) -> Self {
        Self {
            result,
            meta: BTreeMap::new(),
        }
    }

    /// Attach one metadata pair.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// A pluggable semantic-type recognizer.
///
/// Implementations must be pure and refuse (return `None`) when their type
/// does not apply or the configured threshold is not met.
pub trait Converter: Send + Sync {
    /// Convert the column, or refuse.
    fn convert(&self, column: &Column) -> Option<Conversion>;
}

type BuilderFn = fn(serde_json::Value) -> Result<Box<dyn Converter>, serde_json::Error>;

fn build<T: DeserializeOwned + Converter + 'static>(
    params: serde_json::Value,
) -> Result<Box<dyn Converter>, serde_json::Error> {
    Ok(Box::new(serde_json::from_value::<T>(params)?))
}

/// Name → converter builder map, immutable after construction.
///
/// The default instance is built once at first use and injected into
/// [`Autocast`]; converters never reach through ambient globals.
pub struct Registry {
    builders: BTreeMap<String, BuilderFn>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// The built-in converters under their canonical names.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("number", build::<Number>);
        registry.register("boolean", build::<Boolean>);
        registry.register("list", build::<List>);
        registry.register("timestamp", build::<Timestamp>);
        registry.register("text", build::<Text>);
        registry.register("url", build::<Url>);
        registry.register("category", build::<Category>);
        registry
    }

    /// Register a builder under a (case-insensitive) name.
    pub fn register(&mut self, name: &str, builder: BuilderFn) {
        self.builders.insert(name.to_lowercase(), builder);
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(&name.to_lowercase())
    }

    /// Build a converter instance from its parameters.
    pub fn build(&self, name: &str, params: serde_json::Value) -> ReadResult<Box<dyn Converter>> {
        let builder = self
            .builders
            .get(&name.to_lowercase())
            .ok_or_else(|| ReadError::UnknownConverter {
                name: name.to_string(),
            })?;
        builder(params).map_err(|source| ReadError::ConverterParams {
            name: name.to_string(),
            source,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::with_defaults);

/// The process-wide default registry, built once and read-only after.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// An ordered list of converter names and parameters. The order doubles as
/// the trial priority during autocasting.
pub type CastConfig = Vec<(String, serde_json::Value)>;

/// The default conversion order and parameters.
pub fn default_cast_config() -> CastConfig {
    vec![
        (
            "number".to_string(),
            json!({"threshold": 0.95, "allow_unsigned_int": true, "decimal": "infer"}),
        ),
        ("boolean".to_string(), json!({"threshold": 1.0})),
        (
            "list".to_string(),
            json!({"threshold": 0.95, "threshold_urls": 0.8}),
        ),
        ("timestamp".to_string(), json!({"threshold": 0.95})),
        (
            "text".to_string(),
            json!({"threshold": 0.8, "min_unique": 0.1}),
        ),
        ("url".to_string(), json!({"threshold": 0.8})),
        (
            "category".to_string(),
            json!({"threshold": 0.0, "max_cardinality": null}),
        ),
    ]
}

/// Turn a conversion config into converter instances, preserving order.
pub fn ensure_converters(
    config: &CastConfig,
    registry: &Registry,
) -> ReadResult<Vec<Box<dyn Converter>>> {
    config
        .iter()
        .map(|(name, params)| registry.build(name, params.clone()))
        .collect()
}

/// Casts every column of a table by trying converters in priority order.
///
/// As a performance optimization with a large effect on execution time,
/// converters are first tested on a small sample of non-null values for
/// fast rejection before running over the full column.
pub struct Autocast {
    converters: Vec<Box<dyn Converter>>,
    /// Sample size for the pre-check.
    pub n_samples: usize,
    /// Converter applied to all-null columns and to string columns no
    /// regular converter accepted.
    pub fallback: Option<Box<dyn Converter>>,
    /// Cast columns on a worker pool. Column results are identical either
    /// way; per-column trial order is always sequential.
    pub parallel: bool,
}

impl Default for Autocast {
    fn default() -> Self {
        let converters = ensure_converters(&default_cast_config(), default_registry())
            .expect("default converter configuration is valid");
        Self {
            converters,
            n_samples: 100,
            fallback: Some(Box::new(Category::unbounded())),
            parallel: false,
        }
    }
}

impl Autocast {
    /// Build from a configuration against a registry.
    pub fn new(config: &CastConfig, registry: &Registry) -> ReadResult<Self> {
        let converters = ensure_converters(config, registry)?;
        Ok(Self {
            converters,
            n_samples: 100,
            fallback: Some(Box::new(Category::unbounded())),
            parallel: false,
        })
    }

    /// Cast a single column; `None` leaves the column untouched.
    pub fn cast_column(&self, column: &Column) -> Option<Conversion> {
        if column.valid_count() == 0 {
            return self.fallback.as_ref().and_then(|f| f.convert(column));
        }

        for converter in &self.converters {
            let sample = column.sample_valid(self.n_samples);
            if sample.is_empty() {
                continue;
            }
            if converter.convert(&sample).is_some() {
                if let Some(conversion) = converter.convert(column) {
                    return Some(conversion);
                }
            }
        }

        if matches!(column.data_type(), DataType::Utf8) {
            return self.fallback.as_ref().and_then(|f| f.convert(column));
        }

        None
    }

    /// Cast all columns of a table, merging metadata into its fields.
    ///
    /// Columns are independent; order never affects the result.
    pub fn cast_table(&self, mut table: Table) -> Table {
        let conversions: Vec<Option<Conversion>> = if self.parallel {
            (0..table.n_columns())
                .into_par_iter()
                .map(|i| self.cast_column(table.column(i)))
                .collect()
        } else {
            (0..table.n_columns())
                .map(|i| self.cast_column(table.column(i)))
                .collect()
        };

        for (i, conversion) in conversions.into_iter().enumerate() {
            if let Some(conversion) = conversion {
                let mut field = table.field(i).clone();
                field.metadata.extend(conversion.meta);
                table.set_column(i, field, conversion.result);
            }
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn utf8(values: &[Option<&str>]) -> Column {
        Column::Utf8(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn registry_rejects_unknown_names_and_bad_params() {
        let registry = default_registry();
        assert!(matches!(
            registry.build("no_such_type", json!({})),
            Err(ReadError::UnknownConverter { .. })
        ));
        assert!(matches!(
            registry.build("number", json!({"threshold": "not a number"})),
            Err(ReadError::ConverterParams { .. })
        ));
    }

    #[test]
    fn registry_names_are_case_insensitive() {
        assert!(default_registry().contains("Number"));
        assert!(default_registry().build("NUMBER", json!({})).is_ok());
    }

    #[test]
    fn config_order_is_trial_order() {
        // With category first, numbers never get a chance.
        let config: CastConfig = vec![
            ("category".to_string(), json!({"max_cardinality": null})),
            ("number".to_string(), json!({})),
        ];
        let autocast = Autocast::new(&config, default_registry()).unwrap();
        let conv = autocast
            .cast_column(&utf8(&[Some("1"), Some("2")]))
            .unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "category");
    }

    #[test]
    fn all_null_columns_take_the_fallback() {
        let autocast = Autocast::default();
        let conv = autocast.cast_column(&utf8(&[None, None])).unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "category");
    }

    #[test]
    fn unmatched_strings_take_the_fallback() {
        let autocast = Autocast::default();
        // Short, repetitive strings: not numbers, bools, lists, dates, text
        // or urls. The default config still dictionary-encodes them via the
        // trailing category entry.
        let conv = autocast
            .cast_column(&utf8(&[Some("x1"), Some("x2"), Some("x1")]))
            .unwrap();
        assert_eq!(conv.meta.get("semantic").unwrap(), "category");
    }

    #[test]
    fn cast_table_replaces_columns_and_merges_metadata() {
        let table = Table::new(
            vec![Field::new("n"), Field::new("b")],
            vec![
                utf8(&[Some("1"), Some("2"), None]),
                utf8(&[Some("true"), Some("false"), Some("true")]),
            ],
        );

        let cast = Autocast::default().cast_table(table);
        assert_eq!(cast.column(0).data_type(), DataType::UInt8);
        assert_eq!(cast.column(1).data_type(), DataType::Bool);
        assert_eq!(
            cast.field(0).metadata.get("semantic").unwrap(),
            "number[uint8]"
        );
        assert_eq!(cast.field(1).metadata.get("semantic").unwrap(), "boolean");
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let table = Table::new(
            vec![Field::new("n"), Field::new("s"), Field::new("d")],
            vec![
                utf8(&[Some("1"), Some("-2")]),
                utf8(&[Some("cat"), Some("dog")]),
                utf8(&[Some("2022-06-17"), Some("2022-05-03")]),
            ],
        );

        let sequential = Autocast::default().cast_table(table.clone());
        let parallel = Autocast {
            parallel: true,
            ..Autocast::default()
        }
        .cast_table(table);
        assert_eq!(sequential, parallel);
    }
}
