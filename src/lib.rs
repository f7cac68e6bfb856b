//! `tablecast` ingests messy, real-world delimited text files into
//! strongly-typed columnar [`types::Table`]s, without the caller knowing the
//! file's character encoding, delimiter conventions, leading junk lines, or
//! per-column data types in advance.
//!
//! Two engines do the work:
//!
//! - **Format detection** ([`format`]): encoding, dialect and preamble are
//!   each inferred by independent, chainable heuristics over a bounded
//!   sample, producing a [`format::Format`]. Detection never fails — every
//!   ambiguity resolves to a deterministic fallback.
//! - **Type inference / autocast** ([`cast`]): given a table of raw string
//!   columns, pluggable converters infer and apply the narrowest correct
//!   semantic type per column (integers with safe width downcasting, floats
//!   with locale-ambiguous decimal separators, timestamps across dozens of
//!   candidate formats, nested lists, categoricals, free text, URLs,
//!   booleans), using confidence thresholds and cheap-sample pre-filtering.
//!
//! The primary entrypoints are [`reader::read_path`] and
//! [`reader::read_bytes`], which run the full pipeline: bytes → format →
//! tokenization → raw string table → typed table with per-column semantic
//! metadata.
//!
//! ## Quick example: read messy bytes
//!
//! ```rust
//! use tablecast::reader::{read_bytes, ReadOptions};
//!
//! # fn main() -> Result<(), tablecast::ReadError> {
//! // A banner line, a blank line, then the actual table.
//! let bytes = b"Quarterly export\n\nid,name,score\n1,ada,9.5\n2,grace,NA\n";
//!
//! let table = read_bytes(bytes, &ReadOptions::default())?;
//! assert_eq!(table.n_rows(), 2);
//! // `id` was downcast to the smallest sufficient integer width.
//! assert_eq!(
//!     table.field_by_name("id").unwrap().metadata.get("semantic").unwrap(),
//!     "number[uint8]"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick example: detection only
//!
//! ```rust
//! use tablecast::detect_format;
//!
//! # fn main() -> Result<(), tablecast::ReadError> {
//! let format = detect_format(b"a;b\n1;2\n3;4\n")?;
//! assert_eq!(format.encoding, "utf-8");
//! assert_eq!(format.dialect.delimiter, ';');
//! assert_eq!(format.columns, vec!["a", "b"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`format`]: encoding/dialect/preamble detection and [`format::Format`]
//! - [`cast`]: converter registry and [`cast::Autocast`]
//! - [`reader`]: end-to-end reading on top of the `csv` tokenizer
//! - [`types`]: the columnar table model
//! - [`observe`]: observer hooks for diagnostics
//! - [`error`]: error types
//!
//! ## Error model
//!
//! The only fatal input condition is a zero-byte source
//! ([`ReadError::EmptyInput`]). Underdetermined encoding, dialect, preamble
//! or value types never fail: detectors fall back to safe defaults and
//! converters refuse, leaving columns as (categorical) strings.

pub mod cast;
pub mod error;
pub mod format;
pub mod observe;
pub mod reader;
pub mod types;

pub use error::{ReadError, ReadResult};
pub use format::{Dialect, Format, detect_format};
pub use reader::{ReadOptions, read_bytes, read_path};
