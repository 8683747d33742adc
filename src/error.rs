use std::fmt;

/// Errors in the input of a registration request.
///
/// Nothing is registered when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// `Callback-Url` or `Callback-Delay` is absent or empty.
    MissingControlHeaders,

    /// A control header holds bytes that are not visible ASCII.
    InvalidHeaderValue(&'static str),

    /// The delay is not a whole, non-negative number of seconds.
    InvalidDelay(String),

    /// The target is not an absolute http(s) URL.
    InvalidUrl(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::MissingControlHeaders =>
                write!(f, "\"Callback-Url\" and \"Callback-Delay\" headers must be provided."),
            InputError::InvalidHeaderValue(name) =>
                write!(f, "Invalid value for header {name}."),
            InputError::InvalidDelay(_) =>
                write!(f, "Invalid callback delay."),
            InputError::InvalidUrl(_) =>
                write!(f, "Invalid callback URL."),
        }
    }
}

impl std::error::Error for InputError {}

/// Errors returned by the engine before a callback is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine has been shut down.
    Shutdown,

    /// Delay exceeds the longest supported wait.
    DelayOutOfRange,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Shutdown =>
                write!(f, "engine is shut down"),
            EngineError::DelayOutOfRange =>
                write!(f, "Invalid callback delay."),
        }
    }
}

impl std::error::Error for EngineError {}

/// Reasons why sending a fired callback failed.
///
/// Only logged. The entry is removed either way and never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The transport gave up waiting for the target.
    Timeout,

    /// Connection, TLS or protocol failure.
    Network(String),

    /// The request could not be built from the stored parts.
    InvalidRequest(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Timeout =>
                write!(f, "request timed out"),
            DispatchError::Network(detail) =>
                write!(f, "network error: {detail}"),
            DispatchError::InvalidRequest(detail) =>
                write!(f, "invalid request: {detail}"),
        }
    }
}

impl std::error::Error for DispatchError {}
