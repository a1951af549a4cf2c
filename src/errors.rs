//! Error Types
//!
//! This module defines the error types used by the fixed-function emulation layer.
//!
//! # Overview
//!
//! The main error type [`FfpError`] covers every failure the variant selector can
//! surface to its caller:
//! - The shader compiler service could not be started
//! - A synthesized program failed to compile
//! - The hardware program registrar rejected a program or a blend link
//! - Invalid configuration
//!
//! Cache overflow and persistent-store misses are deliberately absent: eviction and
//! falling back to compilation are ordinary control flow, not failures.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, FfpError>`.
//!
//! ```rust,ignore
//! use myth_ffp::errors::{FfpError, Result};
//!
//! fn draw(ctx: &mut Context) -> Result<()> {
//!     ctx.prepare_draw()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::backend::ShaderStage;

/// The main error type for the fixed-function emulation layer.
#[derive(Error, Debug)]
pub enum FfpError {
    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The shader compiler service could not be started.
    ///
    /// Fatal for any *new* variant; variants that are already cached (or that can
    /// be served from the persistent store) keep working.
    #[error("Shader compiler unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A synthesized program failed to compile.
    ///
    /// For reachable masks this indicates a template bug rather than a transient
    /// condition, so it is never retried automatically.
    #[error("Failed to compile {stage:?} program: {message}")]
    CompileFailure {
        /// The stage that failed
        stage: ShaderStage,
        /// Diagnostic reported by the compiler service
        message: String,
    },

    /// The hardware program registrar rejected a compiled program.
    #[error("Program registration failed: {0}")]
    RegistrationFailure(String),

    /// Linking a program pair against a blend configuration failed.
    #[error("Program link failed: {0}")]
    LinkFailure(String),

    // ========================================================================
    // Synthesis Errors
    // ========================================================================
    /// A stage template could not be loaded or rendered.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    // ========================================================================
    // API Errors
    // ========================================================================
    /// A state mutator received an out-of-range index. The state is unchanged.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings could not be parsed.
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_json::Error),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error (persistent store setup).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FfpError {
    /// Returns `true` for failures that are tied to a specific mask combination
    /// rather than to the environment.
    #[must_use]
    pub fn is_variant_specific(&self) -> bool {
        matches!(
            self,
            Self::CompileFailure { .. } | Self::Template(_) | Self::LinkFailure(_)
        )
    }
}

/// Alias for `Result<T, FfpError>`.
pub type Result<T> = std::result::Result<T, FfpError>;
