use thiserror::Error;

/// Fatal errors. Record-level problems never surface here; they are
/// carried as data (`IngestIssue`, null fields) so a batch is never aborted
/// by one bad row.
#[derive(Debug, Error)]
pub enum CurateError {
    /// TOML parse / deserialization error.
    #[error("policy parse error: {0}")]
    ConfigParse(String),

    /// Policy validation error (bad threshold, malformed pair, etc.).
    #[error("policy validation error: {0}")]
    ConfigValidation(String),

    /// One alias variant is mapped to two different canonical labels.
    #[error("alias '{variant}' maps to both '{first}' and '{second}'")]
    AliasConflict {
        variant: String,
        first: String,
        second: String,
    },

    /// An alias target is itself rewritten by another rule.
    #[error("alias '{variant}' -> '{canonical}' is chained: '{canonical}' is rewritten to '{next}'")]
    AliasChain {
        variant: String,
        canonical: String,
        next: String,
    },

    /// A no-merge pair references a name that neither the input snapshot
    /// nor the alias table knows about.
    #[error("no-merge constraint references unknown name '{0}'")]
    UnknownNoMergeName(String),

    /// Missing required column in input data.
    #[error("missing column '{column}'")]
    MissingColumn { column: String },

    /// CSV framing error (unbalanced quotes, bad UTF-8, ...).
    #[error("CSV error: {0}")]
    Csv(String),
}

impl From<csv::Error> for CurateError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}
