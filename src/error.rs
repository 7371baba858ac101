//! Error types used by the deployer and its collaborators.
//!
//! This module defines two main error enums:
//!
//! - [`PlatformError`]: errors raised by a [`PlatformClient`](crate::PlatformClient) call.
//! - [`DeployError`]: errors that abort a whole deployment run.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging,
//! and [`PlatformError::is_retryable`] drives the watcher's retry loop.

use thiserror::Error;

/// # Errors produced by the remote platform.
///
/// Watchers never propagate these: they are converted into an attempt
/// (retryable) or a terminal [`Outcome`](crate::Outcome) at the watcher boundary.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Network or service hiccup; the same request may succeed later.
    #[error("transient platform error: {error}")]
    Transient {
        /// The underlying error message.
        error: String,
    },

    /// The addressed environment (or application) does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
    },

    /// The platform refused the request (e.g. unknown application version).
    #[error("request rejected: {reason}")]
    Rejected {
        /// Rejection reason reported by the platform.
        reason: String,
    },
}

impl PlatformError {
    /// Shorthand for [`PlatformError::Transient`].
    pub fn transient(error: impl Into<String>) -> Self {
        PlatformError::Transient {
            error: error.into(),
        }
    }

    /// Shorthand for [`PlatformError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        PlatformError::NotFound { what: what.into() }
    }

    /// Shorthand for [`PlatformError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        PlatformError::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use beanstalk_deployer::PlatformError;
    ///
    /// let err = PlatformError::transient("connection reset");
    /// assert_eq!(err.as_label(), "platform_transient");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PlatformError::Transient { .. } => "platform_transient",
            PlatformError::NotFound { .. } => "platform_not_found",
            PlatformError::Rejected { .. } => "platform_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PlatformError::Transient { error } => format!("error: {error}"),
            PlatformError::NotFound { what } => format!("missing: {what}"),
            PlatformError::Rejected { reason } => format!("rejected: {reason}"),
        }
    }

    /// Indicates whether the failed call is safe to retry.
    ///
    /// # Example
    /// ```
    /// use beanstalk_deployer::PlatformError;
    ///
    /// assert!(PlatformError::transient("throttled").is_retryable());
    /// assert!(!PlatformError::rejected("No Application Version named 'v9'").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlatformError::Transient { .. })
    }
}

/// # Errors that abort a deployment run.
///
/// Per-environment failures are *not* errors: they are reported through
/// [`DeployReport`](crate::DeployReport). Only problems that make the whole run
/// meaningless end up here.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeployError {
    /// Missing or invalid region, credentials, application, or target.
    /// Fails immediately, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A platform call outside the watchers failed (resolution, version registration).
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Object storage failure while publishing the artifact.
    #[error("artifact storage error: {0}")]
    Storage(String),

    /// The local archive could not be produced.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// Local filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use beanstalk_deployer::DeployError;
    ///
    /// let err = DeployError::Configuration("missing region".into());
    /// assert_eq!(err.as_label(), "deploy_configuration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DeployError::Configuration(_) => "deploy_configuration",
            DeployError::Platform(_) => "deploy_platform",
            DeployError::Storage(_) => "deploy_storage",
            DeployError::Packaging(_) => "deploy_packaging",
            DeployError::Io(_) => "deploy_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DeployError::Configuration(msg) => format!("invalid configuration: {msg}"),
            DeployError::Platform(e) => e.as_message(),
            DeployError::Storage(msg) => format!("storage: {msg}"),
            DeployError::Packaging(msg) => format!("packaging: {msg}"),
            DeployError::Io(e) => format!("io: {e}"),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        DeployError::Configuration(msg.into())
    }
}

/// Result alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;
