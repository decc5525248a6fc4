use std::io;

use http::StatusCode;
use thiserror::Error;

/// Fatal configuration errors.
///
/// All of them are detected before any network activity takes place.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("argument invalid: {0}")]
    InvalidArgument(String),
    #[error("host contains no protocol: '{0}'")]
    InvalidHost(String),
    #[error("header format invalid: '{0}'")]
    MalformedHeader(String),
    #[error("request error: {0}")]
    InvalidRequest(String),
    #[error("tls configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

/// Errors occurred while performing a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(io::Error),
    #[error("tls handshake failed: {0}")]
    Tls(io::Error),
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    #[error("failed to decode response body: {0}")]
    Decode(io::Error),
    #[error("request timed out")]
    Timeout,
}

/// A failed benchmark trial.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
}
