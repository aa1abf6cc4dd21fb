use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Network(String),
    #[error("still rate limited on {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}
