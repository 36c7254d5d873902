//! Core types for toolup
//!
//! Currently this is the error system shared by every stage of the update
//! pipeline. See [`error`] for the taxonomy and the user-facing rendering.

pub mod error;

pub use error::{ErrorContext, ToolupError, user_friendly_error};
