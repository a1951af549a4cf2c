#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Fixed-function pipeline emulation.
//!
//! Legacy fixed-function state is reduced to a canonical [`VariantKey`]; each
//! distinct key gets one synthesized, compiled and registered program pair,
//! kept in a bounded [`VariantCache`] and optionally persisted to disk.

pub mod backend;
pub mod cache;
pub mod context;
pub mod errors;
pub mod mask;
pub mod selector;
pub mod settings;
pub mod state;
pub mod store;
pub mod synth;
pub mod uniforms;
pub mod variant;

pub use backend::{
    CompileError, CompiledBlob, CompiledPair, LinkedProgramPair, ParameterHandle, ProgramHandle,
    ProgramRegistrar, RegistrarError, ShaderCompiler, ShaderStage, WgslSourceCompiler,
};
pub use cache::{CacheSlot, CacheStats, VariantCache};
pub use context::{Capability, FixedFunctionContext};
pub use errors::{FfpError, Result};
pub use mask::{CombinerMask, FeatureMask, VariantKey};
pub use selector::{BindState, Prepared, SelectorStats, VariantSelector};
pub use settings::FfpSettings;
pub use state::FixedFunctionState;
pub use store::{DiskVariantStore, StoreError, VariantStore};
pub use synth::{SynthesizedSource, synthesize};
pub use uniforms::{DirtyFlags, UniformUploadTracker};
pub use variant::ShaderVariant;
