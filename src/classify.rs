//! Business-domain errors raised by action code, and their
//! classification into metric kinds.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of reasons attached to client-facing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    GenericError,
    SourceFormatUnsupported,
    RenditionFormatUnsupported,
    SourceUnsupported,
    SourceCorrupt,
    RenditionTooLarge,
    ServiceOverload,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::GenericError => "GenericError",
            Reason::SourceFormatUnsupported => "SourceFormatUnsupported",
            Reason::RenditionFormatUnsupported => "RenditionFormatUnsupported",
            Reason::SourceUnsupported => "SourceUnsupported",
            Reason::SourceCorrupt => "SourceCorrupt",
            Reason::RenditionTooLarge => "RenditionTooLarge",
            Reason::ServiceOverload => "ServiceOverload",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error caused by the request or its input rather than by the action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct ClientError {
    pub reason: Reason,
    pub message: String,
}

impl ClientError {
    pub fn new(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// An internal failure, tagged with where it happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct GenericError {
    pub message: String,
    pub location: Option<String>,
}

impl GenericError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Untyped failure that still knows which HTTP status caused it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HttpStatusError {
    pub message: String,
    pub status_code: u16,
}

impl HttpStatusError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }
}

/// Which metric an error is reported as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClassification {
    Client {
        reason: Reason,
        message: String,
    },
    Generic {
        location: Option<String>,
        message: String,
    },
    Unclassified {
        message: String,
        status_code: Option<u16>,
    },
}

impl ErrorClassification {
    /// Classify an arbitrary error.
    ///
    /// Client errors win over generic errors; anything else is unclassified.
    pub fn of(error: &(dyn StdError + 'static)) -> Self {
        if let Some(err) = error.downcast_ref::<ClientError>() {
            return ErrorClassification::Client {
                reason: err.reason,
                message: err.message.clone(),
            };
        }

        if let Some(err) = error.downcast_ref::<GenericError>() {
            return ErrorClassification::Generic {
                location: err.location.clone(),
                message: err.message.clone(),
            };
        }

        let status_code = error
            .downcast_ref::<HttpStatusError>()
            .map(|err| err.status_code);

        ErrorClassification::Unclassified {
            message: error.to_string(),
            status_code,
        }
    }
}
