// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy and classification.
//!
//! Every failure leaving the resilience layer is an [`AppError`]: a typed,
//! immutable record carrying its kind, severity, whether a retry may help, and
//! a message that is safe to show an end user. [`ErrorClassifier`] builds one
//! from any `std::error::Error`.
//!
//! Classification rules, first match wins:
//!
//! | Condition                   | Kind           | Severity | Retryable |
//! |-----------------------------|----------------|----------|-----------|
//! | status 401                  | Authentication | High     | no        |
//! | status 403                  | Permission     | Medium   | no        |
//! | status 404                  | Api            | Low      | no        |
//! | status >= 500               | Api            | High     | yes       |
//! | other 4xx                   | Api            | Medium   | no        |
//! | transport failure           | Network        | High     | yes       |
//! | anything else               | Unknown        | Medium   | no        |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::StoreError;

/// Free-form key/value context attached to an error for logging.
pub type ErrorContext = BTreeMap<String, String>;

/// Coarse category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Api,
    Validation,
    Authentication,
    Permission,
    Storage,
    /// A circuit breaker refused the call.
    ServiceUnavailable,
    /// Failure reported by an AI content service.
    AiService,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Api => "api",
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Permission => "permission",
            ErrorKind::Storage => "storage",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::AiService => "ai_service",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Message shown to end users for this kind of failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "We couldn't reach the server. Check your internet connection and try again."
            }
            ErrorKind::Api => "Something went wrong on our end. Please try again in a moment.",
            ErrorKind::Validation => "Some of the information entered isn't valid. Please review it and try again.",
            ErrorKind::Authentication => "Your session has expired. Please sign in again.",
            ErrorKind::Permission => "You don't have permission to do that.",
            ErrorKind::Storage => "We couldn't save data on this device. Free up some space and try again.",
            ErrorKind::ServiceUnavailable => {
                "This service is temporarily unavailable. Please try again later."
            }
            ErrorKind::AiService => "The content generator is unavailable right now. Please try again shortly.",
            ErrorKind::Unknown => "An unexpected error occurred. Please try again.",
        }
    }

    /// Suggested follow-up for the UI, if any.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Network => Some("check_connection"),
            ErrorKind::Api | ErrorKind::AiService => Some("retry"),
            ErrorKind::Authentication => Some("sign_in"),
            ErrorKind::Permission => Some("request_access"),
            ErrorKind::ServiceUnavailable => Some("retry_later"),
            ErrorKind::Validation | ErrorKind::Storage | ErrorKind::Unknown => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a failure matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A classified failure.
///
/// `message` is for logs; `user_message` is safe to render directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct AppError {
    pub id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub user_message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    pub timestamp: DateTime<Utc>,
}

static ERROR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate an error ID.
/// Format: err-{hash} where hash is first 8 hex chars of SHA256(message + timestamp + seq)
fn generate_error_id(message: &str, timestamp: &DateTime<Utc>) -> String {
    let seq = ERROR_SEQ.fetch_add(1, Ordering::Relaxed);
    let input = format!("{}{}{}", message, timestamp.to_rfc3339(), seq);
    let hash = Sha256::digest(input.as_bytes());
    format!("err-{}", hex::encode(&hash[..4]))
}

impl AppError {
    /// Build an error of the given kind with the kind's default user message
    /// and action.
    pub fn new(
        kind: ErrorKind,
        severity: Severity,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let timestamp = Utc::now();
        AppError {
            id: generate_error_id(&message, &timestamp),
            kind,
            severity,
            user_message: kind.user_message().to_string(),
            retryable,
            status: None,
            action: kind.action().map(str::to_string),
            context: None,
            message,
            timestamp,
        }
    }

    /// Invalid input raised by domain code. Never retried.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::new(ErrorKind::Validation, Severity::Low, false, message)
    }

    /// Failure of an AI content service. Retryable.
    pub fn ai_service(message: impl Into<String>) -> Self {
        AppError::new(ErrorKind::AiService, Severity::Medium, true, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }
}

/// A failed request as seen by the code issuing it.
///
/// Carries an HTTP status when the server answered, or a transport code
/// (`ECONNREFUSED`, `ENOTFOUND`, `AbortError`, ...) when it could not be
/// reached.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RequestError {
    /// The server answered with a non-success status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        RequestError {
            status: Some(status),
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// The request never reached the server.
    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        RequestError {
            status: None,
            code: Some(code.into()),
            message: message.into(),
            source: None,
        }
    }

    /// Any other failure.
    pub fn other(message: impl Into<String>) -> Self {
        RequestError {
            status: None,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Raised in place of a call when a circuit breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' is open")]
pub struct BreakerOpen {
    pub name: String,
}

/// Error codes and message fragments that mean the request never completed.
const TRANSPORT_MARKERS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "econnaborted",
    "enotfound",
    "etimedout",
    "eai_again",
    "ehostunreach",
    "enetunreach",
    "epipe",
    "aborterror",
    "timeouterror",
    "failed to fetch",
    "networkerror",
    "network error",
    "connection refused",
    "connection reset",
    "dns error",
    "deadline has elapsed",
];

/// Bound on how far down a `source()` chain the classifier looks.
const MAX_CHAIN_DEPTH: usize = 16;

fn has_transport_marker(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    TRANSPORT_MARKERS.iter().any(|marker| text.contains(marker))
}

fn is_transport_io_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind as K;
    matches!(
        kind,
        K::ConnectionRefused
            | K::ConnectionReset
            | K::ConnectionAborted
            | K::NotConnected
            | K::AddrNotAvailable
            | K::BrokenPipe
            | K::TimedOut
            | K::UnexpectedEof
    )
}

/// The error and its sources, at most `MAX_CHAIN_DEPTH` links deep.
fn chain<'a>(
    raw: &'a (dyn std::error::Error + 'static),
) -> impl Iterator<Item = &'a (dyn std::error::Error + 'static)> {
    std::iter::successors(Some(raw), |err| err.source()).take(MAX_CHAIN_DEPTH)
}

/// What one link of the error chain says about the failure.
enum Finding {
    Classified(AppError),
    Status(u16),
    Transport,
    BreakerOpen,
    Storage,
}

fn inspect(err: &(dyn std::error::Error + 'static)) -> Option<Finding> {
    if let Some(app) = err.downcast_ref::<AppError>() {
        return Some(Finding::Classified(app.clone()));
    }
    if let Some(req) = err.downcast_ref::<RequestError>() {
        if let Some(status) = req.status {
            return Some(Finding::Status(status));
        }
        let code_is_transport = req.code.as_deref().is_some_and(has_transport_marker);
        if code_is_transport || has_transport_marker(&req.message) {
            return Some(Finding::Transport);
        }
        return None;
    }
    if err.is::<BreakerOpen>() {
        return Some(Finding::BreakerOpen);
    }
    if err.is::<StoreError>() {
        return Some(Finding::Storage);
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if is_transport_io_kind(io.kind()) {
            return Some(Finding::Transport);
        }
    }
    None
}

/// Maps raw errors onto [`AppError`].
///
/// Stateless; share one instance freely.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        ErrorClassifier
    }

    /// Classify any error.
    ///
    /// Walks the `source()` chain and uses the first link that says something
    /// definite. An error that is already an [`AppError`] is returned as is
    /// (with `context` filled in if it had none), so classifying twice is
    /// harmless. Never fails: unrecognised input becomes `Unknown`.
    pub fn classify(
        &self,
        raw: &(dyn std::error::Error + 'static),
        context: Option<ErrorContext>,
    ) -> AppError {
        let message = raw.to_string();

        // Typed errors anywhere in the chain win over message markers.
        let finding = chain(raw).find_map(inspect).or_else(|| {
            chain(raw)
                .any(|err| has_transport_marker(&err.to_string()))
                .then_some(Finding::Transport)
        });

        let classified = match finding {
            Some(Finding::Classified(app)) => {
                return match context {
                    Some(context) if app.context.is_none() => app.with_context(context),
                    _ => app,
                };
            }
            Some(Finding::Status(status)) => Self::from_status(status, message),
            Some(Finding::Transport) => {
                AppError::new(ErrorKind::Network, Severity::High, true, message)
            }
            Some(Finding::BreakerOpen) => AppError::new(
                ErrorKind::ServiceUnavailable,
                Severity::High,
                false,
                message,
            ),
            Some(Finding::Storage) => {
                AppError::new(ErrorKind::Storage, Severity::Medium, false, message)
            }
            None => AppError::new(ErrorKind::Unknown, Severity::Medium, false, message),
        };

        match context {
            Some(context) => classified.with_context(context),
            None => classified,
        }
    }

    /// Classify a bare HTTP status.
    pub fn classify_status(&self, status: u16, message: impl Into<String>) -> AppError {
        Self::from_status(status, message.into())
    }

    fn from_status(status: u16, message: String) -> AppError {
        let (kind, severity, retryable) = match status {
            401 => (ErrorKind::Authentication, Severity::High, false),
            403 => (ErrorKind::Permission, Severity::Medium, false),
            404 => (ErrorKind::Api, Severity::Low, false),
            500..=u16::MAX => (ErrorKind::Api, Severity::High, true),
            400..=499 => (ErrorKind::Api, Severity::Medium, false),
            _ => (ErrorKind::Unknown, Severity::Medium, false),
        };
        AppError::new(kind, severity, retryable, message).with_status(status)
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
