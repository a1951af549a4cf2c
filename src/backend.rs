//! Collaborator Seams
//!
//! The variant compiler sits between two external services it does not own:
//!
//! - [`ShaderCompiler`] turns synthesized source into a compiled program blob.
//!   It may need a one-time, possibly failing, startup.
//! - [`ProgramRegistrar`] makes compiled blobs executable on the GPU, links a
//!   vertex/fragment pair against a blend configuration and exposes uniform
//!   parameter handles.
//!
//! Handles are thin `Copy` newtypes so program, parameter and link handles cannot
//! be mixed up.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::state::BlendConfig;

// ─── Stages & Blobs ──────────────────────────────────────────────────────────

/// Programmable stage a program runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Entry point name used by synthesized programs.
    #[inline]
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::Vertex => "vs_main",
            Self::Fragment => "fs_main",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

/// Raw compiled program as produced by the compiler service.
///
/// The payload is shared (`Arc<[u8]>`) so the variant, the persistent store and
/// the registrar can hold it without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBlob {
    stage: ShaderStage,
    bytes: Arc<[u8]>,
}

impl CompiledBlob {
    #[must_use]
    pub fn new(stage: ShaderStage, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            stage,
            bytes: bytes.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Views the blob as WGSL text, for backends whose "compiled" form is source.
    #[must_use]
    pub fn as_wgsl(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Shader source suitable for `wgpu::Device::create_shader_module`.
    #[must_use]
    pub fn wgpu_source(&self) -> Option<wgpu::ShaderSource<'_>> {
        self.as_wgsl()
            .map(|text| wgpu::ShaderSource::Wgsl(Cow::Borrowed(text)))
    }
}

/// Compiled vertex and fragment programs of one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPair {
    pub vertex: CompiledBlob,
    pub fragment: CompiledBlob,
}

// ─── Handles ─────────────────────────────────────────────────────────────────

/// Handle to a program registered with the [`ProgramRegistrar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Handle to a uniform parameter of a registered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterHandle(pub u32);

/// A GPU-bindable program pair linked against one blend configuration.
///
/// Handed to the draw-submission layer verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkedProgramPair {
    pub vertex: ProgramHandle,
    pub fragment: ProgramHandle,
    /// Registrar-assigned identity of the link.
    pub link: u32,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Diagnostic reported by a [`ShaderCompiler`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by a [`ProgramRegistrar`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    #[error("program rejected: {0}")]
    Rejected(String),
    #[error("link failed: {0}")]
    LinkFailed(String),
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Compiler service turning source text into a compiled blob.
pub trait ShaderCompiler {
    /// Starts the service if needed. Returns `false` if it cannot be started.
    fn ensure_started(&mut self) -> bool;

    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<CompiledBlob, CompileError>;
}

/// Hardware program registrar.
pub trait ProgramRegistrar {
    fn register_program(&mut self, blob: &CompiledBlob) -> Result<ProgramHandle, RegistrarError>;

    fn unregister_program(&mut self, handle: ProgramHandle);

    /// Builds a bindable program pair for `blend`.
    ///
    /// Called again whenever the blend configuration changes, even if neither
    /// program changed.
    fn link_for_blend(
        &mut self,
        vertex: ProgramHandle,
        fragment: ProgramHandle,
        blend: &BlendConfig,
    ) -> Result<LinkedProgramPair, RegistrarError>;

    /// Releases a link that has been superseded by a re-link or an eviction.
    fn release_link(&mut self, _pair: LinkedProgramPair) {}

    /// Resolves a uniform parameter by its field name.
    fn parameter(&self, program: ProgramHandle, name: &str) -> Option<ParameterHandle>;

    /// Writes a uniform value (column-major for matrices).
    fn write_parameter(&mut self, program: ProgramHandle, handle: ParameterHandle, value: &[f32]);
}

// ─── WGSL Pass-through Compiler ──────────────────────────────────────────────

/// Compiler service for backends that consume WGSL text at registration time.
///
/// "Compiling" validates that the source declares the stage's entry point and
/// stores the text as the blob payload. The real front-end (naga inside
/// `wgpu::Device::create_shader_module`) runs when the registrar builds the
/// module.
#[derive(Debug, Default)]
pub struct WgslSourceCompiler {
    started: bool,
}

impl WgslSourceCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShaderCompiler for WgslSourceCompiler {
    fn ensure_started(&mut self) -> bool {
        if !self.started {
            log::info!("WGSL pass-through compiler started");
            self.started = true;
        }
        true
    }

    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<CompiledBlob, CompileError> {
        let attribute = match stage {
            ShaderStage::Vertex => "@vertex",
            ShaderStage::Fragment => "@fragment",
        };
        let entry = format!("fn {}(", stage.entry_point());

        if !source.contains(attribute) || !source.contains(&entry) {
            return Err(CompileError::new(format!(
                "missing {attribute} entry point `{}`",
                stage.entry_point()
            )));
        }

        Ok(CompiledBlob::new(stage, source.as_bytes()))
    }
}

// ─── Test Support ────────────────────────────────────────────────────────────
