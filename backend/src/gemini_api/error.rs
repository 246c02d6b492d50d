use thiserror::Error;

/// Errors talking to the Gemini API
#[derive(Error, Debug)]
pub enum GeminiError {
    /// `GOOGLE_API_KEY` is not configured
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    /// Transport failure
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Non-success HTTP status
    #[error("Gemini returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for logs only
        body: String,
    },

    /// Response did not have the expected shape
    #[error("Invalid Gemini response: {0}")]
    InvalidResponse(String),

    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GeminiError {
    fn from(error: reqwest::Error) -> Self {
        Self::NetworkError(error.to_string())
    }
}

impl From<reqwest_middleware::Error> for GeminiError {
    fn from(error: reqwest_middleware::Error) -> Self {
        Self::NetworkError(error.to_string())
    }
}
