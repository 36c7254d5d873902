//! Error handling for toolup
//!
//! The self-update pipeline fails in a small number of well-understood ways, and
//! each one needs a different message for the person at the terminal. This
//! module provides:
//!
//! - [`ToolupError`] - the typed failure taxonomy of the update pipeline
//! - [`ErrorContext`] - a wrapper that adds details and a suggestion
//! - [`user_friendly_error`] - converts any [`anyhow::Error`] into an [`ErrorContext`]
//!
//! # Error Categories
//!
//! - **Network**: [`ToolupError::NetworkError`] (no retry, the run aborts)
//! - **Parsing**: [`ToolupError::ParseError`] for malformed descriptors and versions
//! - **Integrity**: [`ToolupError::IntegrityError`] when a digest does not match its sidecar
//! - **File system**: [`ToolupError::FileSystemError`], [`ToolupError::ArchiveEntryRejected`]
//! - **Helper**: [`ToolupError::HelperFailure`], only ever written to the helper log
//!
//! Library code returns `anyhow::Result` and raises these variants with
//! `Err(ToolupError::... .into())`, so callers can still `downcast_ref` to the
//! typed error when they need to branch on it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use toolup_cli::core::{ToolupError, user_friendly_error};
//!
//! let err = anyhow::Error::from(ToolupError::IntegrityError {
//!     artifact: "toolup.zip".to_string(),
//!     reason: "digest mismatch".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// The failure taxonomy of the self-update pipeline.
#[derive(Error, Debug, Clone)]
pub enum ToolupError {
    /// A transfer failed at the transport level or returned a non-success status.
    #[error("Network error: {operation}")]
    NetworkError {
        operation: String,
        reason: String,
    },

    /// Remote content or a version string could not be parsed.
    #[error("Failed to parse {subject}")]
    ParseError {
        subject: String,
        reason: String,
    },

    /// A downloaded artifact does not match its checksum sidecar.
    #[error("Integrity check failed for {artifact}")]
    IntegrityError {
        artifact: String,
        reason: String,
    },

    /// Copying, extracting, archiving or removing files failed. The
    /// underlying I/O error stays in the `anyhow` chain below this one.
    #[error("File system error: {operation}")]
    FileSystemError {
        operation: String,
        path: String,
    },

    /// An archive entry would resolve outside the extraction root.
    #[error("Archive entry '{entry}' escapes the destination directory")]
    ArchiveEntryRejected {
        entry: String,
    },

    #[error("Replace helper failed during {state}: {reason}")]
    HelperFailure {
        state: String,
        reason: String,
    },

    #[error("{message}")]
    Other {
        message: String,
    },
}

impl ToolupError {
    /// A [`ToolupError::FileSystemError`] for `operation` on `path`.
    ///
    /// Meant for `.with_context(|| ToolupError::file_system(..))`, which keeps
    /// the I/O cause underneath.
    pub fn file_system(operation: impl Into<String>, path: &Path) -> Self {
        Self::FileSystemError {
            operation: operation.into(),
            path: path.display().to_string(),
        }
    }
}

/// An error paired with optional details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: ToolupError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: ToolupError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colours.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-facing [`ErrorContext`].
///
/// Typed [`ToolupError`]s anywhere in the chain get a tailored suggestion. Everything
/// else is reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let outer = error.to_string();

    let typed = error
        .downcast_ref::<ToolupError>()
        .or_else(|| error.chain().find_map(|cause| cause.downcast_ref::<ToolupError>()));
    if let Some(typed) = typed {
        let mut ctx = create_error_context(typed.clone());
        // Keep the caller's context line when it adds something
        if ctx.details.is_none() && outer != typed.to_string() {
            ctx = ctx.with_details(outer);
        }
        if let Some(root) = error.chain().last().map(ToString::to_string)
            && root != typed.to_string()
        {
            let details = match ctx.details.take() {
                Some(details) => format!("{details}\ncaused by: {root}"),
                None => format!("caused by: {root}"),
            };
            ctx = ctx.with_details(details);
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(ToolupError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion(
                    "Run with elevated permissions or check the ownership of the installation directory",
                )
                .with_details("toolup needs write access to its own installation directory");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(ToolupError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    let mut message = outer;
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(ToolupError::Other {
        message,
    })
}

fn create_error_context(error: ToolupError) -> ErrorContext {
    match &error {
        ToolupError::NetworkError { operation, reason } => ErrorContext::new(error.clone())
            .with_suggestion("Check your internet connection and run the command again later")
            .with_details(format!("{operation} failed: {reason}")),

        ToolupError::ParseError { subject, reason } => ErrorContext::new(error.clone())
            .with_suggestion("The update server returned unexpected content. Try again later or report the problem")
            .with_details(format!("{subject}: {reason}")),

        ToolupError::IntegrityError { artifact, reason } => ErrorContext::new(error.clone())
            .with_suggestion("The download may be corrupted or tampered with. Nothing was installed; run the upgrade again")
            .with_details(format!("{artifact}: {reason}")),

        ToolupError::FileSystemError { operation, path } => ErrorContext::new(error.clone())
            .with_suggestion(match cfg!(windows) {
                true => "Close other programs using the installation directory, or run as Administrator",
                false => "Check permissions on the installation directory with 'ls -la'",
            })
            .with_details(format!("Could not {operation} at {path}")),

        ToolupError::ArchiveEntryRejected { entry } => ErrorContext::new(error.clone())
            .with_suggestion("Do not install this build; report the artifact to the publisher")
            .with_details(format!("Entry '{entry}' uses an absolute path or '..' components")),

        _ => ErrorContext::new(error.clone()),
    }
}
