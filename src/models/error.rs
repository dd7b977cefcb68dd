//! Error kinds recorded in the store.

/// Classification of page-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The fetcher could not complete the request.
    NetworkError,
    /// Unhandled failure while processing an item.
    ProcessingError,
    /// The robots gate denied the URL.
    RobotsDisallowed,
    /// Ambient cancellation was observed mid-fetch.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ProcessingError => "processing_error",
            ErrorKind::RobotsDisallowed => "robots_disallowed",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal error captured while processing a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
