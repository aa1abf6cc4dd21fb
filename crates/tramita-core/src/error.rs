use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid date window: {0}")]
    InvalidWindow(String),

    #[error("invalid date {input:?}: {source}")]
    InvalidDate {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("cannot read allow-list {}: {source}", path.display())]
    AllowList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot draft a post for {key}: missing {field}")]
    Draft { key: String, field: &'static str },
}
