use thiserror::Error;

pub type Result<T> = std::result::Result<T, LensError>;

/// Every failure the pipeline can surface to its caller.
#[derive(Error, Debug)]
pub enum LensError {
    /// The input bytes could not be decoded in the requested format.
    #[error("Parse error ({context}): {message}")]
    Parse { context: String, message: String },

    /// The decoded input (or a table under construction) has no usable shape.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown column '{column}' referenced by filter")]
    UnknownColumn { column: String },

    #[error("Invalid range on '{column}': min {min} is not <= max {max}")]
    InvalidRange { column: String, min: f64, max: f64 },

    #[error("Column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LensError {
    pub(crate) fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        LensError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }
}
