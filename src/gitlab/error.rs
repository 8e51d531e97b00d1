use thiserror::Error;

/// Classification of a failed API call.
///
/// Messages mirror what the remote reports: `Forbidden` carries the refined
/// scope message when the body identifies an `insufficient_scope` error, and
/// `Client` carries the server-supplied message when one is present.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Client(String),

    #[error("http status {0}")]
    Server(u16),
}
