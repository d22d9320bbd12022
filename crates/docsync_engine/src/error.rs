//! Error types for the sync engine.

use docsync_protocol::ProtocolError;
use docsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// How a remote failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network blip or unknown failure. Queue and retry later.
    Transient,
    /// The remote store is refusing writes for quota reasons. Trips the breaker.
    QuotaExhausted,
    /// Malformed request. Handled like `Transient`.
    Permanent,
}

/// A failure reported by the remote gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", self.render())]
pub struct GatewayError {
    /// Classification derived from `code` and `message`.
    pub kind: FailureKind,
    /// Backend error code, if the client library exposes one.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
}

const QUOTA_MARKERS: &[&str] = &[
    "resource-exhausted",
    "resource_exhausted",
    "resource exhausted",
    "quota exceeded",
    "quota-exceeded",
    "exceeded quota",
];

const PERMANENT_MARKERS: &[&str] = &["invalid-argument", "invalid_argument", "malformed"];

impl GatewayError {
    /// Creates an error and classifies it from its code and message.
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: Self::classify(code, &message),
            code: code.map(str::to_string),
            message,
        }
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            code: None,
            message: message.into(),
        }
    }

    /// Creates a quota-exhaustion error with the standard code.
    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::QuotaExhausted,
            code: Some("resource-exhausted".to_string()),
            message: message.into(),
        }
    }

    /// Classifies a failure signal.
    ///
    /// Quota markers are matched case-insensitively in both code and message.
    /// A bare "exceeded" also counts unless it is a deadline.
    pub fn classify(code: Option<&str>, message: &str) -> FailureKind {
        let signal = format!("{} {}", code.unwrap_or_default(), message).to_lowercase();

        let quota = QUOTA_MARKERS.iter().any(|m| signal.contains(m))
            || (signal.contains("exceeded") && !signal.contains("deadline"));
        if quota {
            return FailureKind::QuotaExhausted;
        }

        if PERMANENT_MARKERS.iter().any(|m| signal.contains(m)) {
            return FailureKind::Permanent;
        }

        FailureKind::Transient
    }

    /// Returns true if this failure should trip the quota breaker.
    pub fn is_quota_exhausted(&self) -> bool {
        self.kind == FailureKind::QuotaExhausted
    }

    fn render(&self) -> String {
        match &self.code {
            Some(code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote gateway call failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Persisting engine state failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding or decoding persisted state failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The local store rejected an operation.
    #[error("local store error: {0}")]
    LocalStore(String),

    /// The collection is not part of the synchronized set.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// `start` was called on an engine that is already running.
    #[error("sync engine already started")]
    AlreadyStarted,

    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}
