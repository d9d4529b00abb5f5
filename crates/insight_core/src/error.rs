use thiserror::Error;

/// Uploaded file could not be decoded into its declared format. The upload is
/// abandoned; no chart pipeline runs for it.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to decode {format} content: {reason}")]
    Decode { format: &'static str, reason: String },

    #[error("unsupported file format: .{0}")]
    UnsupportedFormat(String),

    #[error("unrecognized file format: {0}")]
    UnknownFormat(String),

    #[error("uploaded file is empty")]
    Empty,
}

/// The LLM call failed. Reported with a generic message; never retried.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("no API key configured for {0}")]
    MissingKey(&'static str),
}

/// Any fault raised while running extracted chart code. Caught at the turn
/// boundary and shown to the user; the session keeps going.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ExecutionError(#[from] pub crate::script::ScriptError);
