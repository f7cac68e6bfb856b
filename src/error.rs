use thiserror::Error;

/// Convenience result type for read operations.
pub type ReadResult<T> = Result<T, ReadError>;

/// Error type returned by format detection and reading.
///
/// Detection heuristics never fail: every detector has a deterministic
/// fallback, and a converter that does not apply simply refuses. This enum
/// covers the genuine failure channel only (empty input, I/O, tokenizer
/// breakage, configuration mistakes).
#[derive(Debug, Error)]
pub enum ReadError {
    /// The byte source contained zero bytes.
    ///
    /// Distinct from a valid header with zero data rows, which yields an
    /// empty table.
    #[error("empty input: byte source contained 0 bytes")]
    EmptyInput,

    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Tokenizer error while reading delimited records.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A converter name in a cast configuration is not registered.
    #[error("unknown converter '{name}'")]
    UnknownConverter { name: String },

    /// Converter parameters could not be deserialized.
    #[error("invalid parameters for converter '{name}': {source}")]
    ConverterParams {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}
