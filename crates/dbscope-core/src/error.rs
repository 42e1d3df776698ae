use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool '{tool}' execution failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap a failure raised while a named tool was executing
    ///
    /// # Example
    /// ```
    /// use dbscope_core::Error;
    /// let err = Error::tool_failed("db_analysis", anyhow::anyhow!("file missing"));
    /// assert!(err.to_string().ends_with("file missing"));
    /// ```
    pub fn tool_failed(tool: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::ToolFailed {
            tool: tool.into(),
            source: source.into(),
        }
    }
}
