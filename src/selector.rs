//! Variant Selector
//!
//! Per-draw entry point that keeps the bound variant in sync with the live
//! fixed-function state.
//!
//! # State Machine
//!
//! ```text
//!            ┌─────────── key unchanged: no-op (blend re-link / upload if dirty)
//!            ▼
//! Unbound ─► Bound(key) ──key changed──► cache lookup
//!                ▲                         │ hit ──► re-link if blend differs ──┐
//!                │                         │ miss                               │
//!                │                         ▼                                    │
//!                │        store ─► Synthesizing ─► Compiling                    │
//!                │                         │           │ failure ──► Failed     │
//!                │                         ▼           ▼   (previous binding    │
//!                │                   Registering ─► Linking ─► Inserting  kept) │
//!                └──────────────────────────────────────────┴──────────────────┘
//! ```
//!
//! The key is recomputed from scratch on every call, so state mutations between
//! draws are always observed. A failure never leaves a partial variant behind
//! and never replaces the previous binding, so the caller can still submit the
//! frame with degraded output.
//!
//! # Compiler Startup
//!
//! The compiler service is started lazily by the first variant that actually
//! needs compilation. A failed startup is remembered: later misses fail fast
//! with [`FfpError::CapabilityUnavailable`] while cached and persisted variants
//! keep working.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::backend::{
    CompiledPair, LinkedProgramPair, ProgramRegistrar, ShaderCompiler, ShaderStage,
};
use crate::cache::{CacheSlot, CacheStats, VariantCache};
use crate::errors::{FfpError, Result};
use crate::mask::VariantKey;
use crate::settings::FfpSettings;
use crate::state::{FixedFunctionState, VertexAttribute};
use crate::store::{DiskVariantStore, VariantStore};
use crate::synth::{SynthesizedSource, synthesize};
use crate::uniforms::UniformUploadTracker;
use crate::variant::ShaderVariant;

// ─── States ──────────────────────────────────────────────────────────────────

/// Persistent selector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindState {
    #[default]
    Unbound,
    Bound { key: VariantKey, slot: CacheSlot },
}

/// Transient steps of building a variant on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStep {
    Synthesizing,
    Compiling,
    Registering,
    Linking,
    Inserting,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Synthesizing => "synthesizing",
            Self::Compiling => "compiling",
            Self::Registering => "registering",
            Self::Linking => "linking",
            Self::Inserting => "inserting",
        };
        f.write_str(name)
    }
}

/// How [`VariantSelector::prepare`] satisfied a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    /// The bound variant already matched.
    Unchanged,
    /// A cached variant was rebound.
    CacheHit,
    /// A new variant was built; `from_store` if compilation was skipped.
    Built { from_store: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CompilerState {
    #[default]
    NotStarted,
    Running,
    Failed,
}

/// Why a key could not be built. Replayed on later draws of the same key
/// instead of rebuilding.
#[derive(Debug, Clone)]
enum BuildFailure {
    Compile { stage: ShaderStage, message: String },
    Registration(String),
    Link(String),
}

impl BuildFailure {
    fn from_error(err: &FfpError) -> Option<Self> {
        match err {
            FfpError::CompileFailure { stage, message } => Some(Self::Compile {
                stage: *stage,
                message: message.clone(),
            }),
            FfpError::RegistrationFailure(message) => Some(Self::Registration(message.clone())),
            FfpError::LinkFailure(message) => Some(Self::Link(message.clone())),
            _ => None,
        }
    }

    fn to_error(&self) -> FfpError {
        match self {
            Self::Compile { stage, message } => FfpError::CompileFailure {
                stage: *stage,
                message: message.clone(),
            },
            Self::Registration(message) => FfpError::RegistrationFailure(message.clone()),
            Self::Link(message) => FfpError::LinkFailure(message.clone()),
        }
    }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectorStats {
    pub prepares: u64,
    pub fast_paths: u64,
    pub rebinds: u64,
    pub syntheses: u64,
    pub compilations: u64,
    pub store_hits: u64,
    pub store_saves: u64,
    pub relinks: u64,
    pub failures: u64,
}

impl fmt::Display for SelectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prepares={} fast={} rebinds={} syntheses={} compilations={} store_hits={} relinks={} failures={}",
            self.prepares,
            self.fast_paths,
            self.rebinds,
            self.syntheses,
            self.compilations,
            self.store_hits,
            self.relinks,
            self.failures
        )
    }
}

// ─── Selector ────────────────────────────────────────────────────────────────

pub struct VariantSelector {
    cache: VariantCache,
    store: Option<Box<dyn VariantStore>>,
    bound: BindState,
    compiler: CompilerState,
    failed: FxHashMap<VariantKey, BuildFailure>,
    build_id: String,
    dump_source: bool,
    stats: SelectorStats,
}

impl VariantSelector {
    /// Creates a selector, opening the persistent store if one is configured.
    ///
    /// A store directory that cannot be opened disables the store.
    pub fn new(settings: &FfpSettings) -> Result<Self> {
        settings.validate()?;
        let store = settings.persistent_store_dir.as_ref().and_then(|dir| {
            match DiskVariantStore::open(dir) {
                Ok(store) => Some(Box::new(store) as Box<dyn VariantStore>),
                Err(e) => {
                    log::warn!(
                        "Persistent variant store at {} disabled: {e}",
                        dir.display()
                    );
                    None
                }
            }
        });
        Ok(Self::with_store(settings, store))
    }

    /// Creates a selector with an explicit store (or none).
    #[must_use]
    pub fn with_store(settings: &FfpSettings, store: Option<Box<dyn VariantStore>>) -> Self {
        Self {
            cache: VariantCache::new(settings.cache_capacity),
            store,
            bound: BindState::Unbound,
            compiler: CompilerState::NotStarted,
            failed: FxHashMap::default(),
            build_id: settings.build_id.clone(),
            dump_source: settings.dump_generated_source,
            stats: SelectorStats::default(),
        }
    }

    /// Brings the bound variant in line with `state` and uploads dirty uniforms.
    ///
    /// On error the previous binding (if any) stays active.
    pub fn prepare<C, R>(
        &mut self,
        state: &FixedFunctionState,
        tracker: &mut UniformUploadTracker,
        compiler: &mut C,
        registrar: &mut R,
    ) -> Result<Prepared>
    where
        C: ShaderCompiler + ?Sized,
        R: ProgramRegistrar + ?Sized,
    {
        self.stats.prepares += 1;
        let key = VariantKey::compute(state);

        if let BindState::Bound { key: bound, slot } = self.bound
            && bound == key
        {
            self.stats.fast_paths += 1;
            if tracker.is_blend_dirty() {
                self.sync_blend(slot, state, registrar)?;
                tracker.clear_blend();
            }
            self.upload(slot, state, tracker, registrar);
            return Ok(Prepared::Unchanged);
        }

        if let Some(failed) = self.failed.get(&key) {
            self.stats.failures += 1;
            return Err(failed.to_error());
        }

        if let Some(slot) = self.cache.lookup(&key) {
            log::debug!("Variant cache hit for {key}");
            self.sync_blend(slot, state, registrar)?;
            tracker.clear_blend();
            self.bind(key, slot, tracker);
            self.upload(slot, state, tracker, registrar);
            return Ok(Prepared::CacheHit);
        }

        log::debug!("Variant cache miss for {key}");
        let (blobs, from_store) = match self.obtain_blobs(&key, compiler) {
            Ok(result) => result,
            Err(e) => {
                self.stats.failures += 1;
                return Err(e);
            }
        };

        log::trace!("{key}: {}", BuildStep::Registering);
        let variant = match ShaderVariant::register(key, blobs, &state.blend, registrar) {
            Ok(variant) => variant,
            Err(e) => {
                log::error!("Failed to register variant {key}: {e}");
                self.stats.failures += 1;
                if let Some(failed) = BuildFailure::from_error(&e) {
                    self.failed.insert(key, failed);
                }
                return Err(e);
            }
        };
        tracker.clear_blend();

        log::trace!("{key}: {}", BuildStep::Inserting);
        let inserted = self.cache.insert(variant, registrar);
        if let Some(evicted) = inserted.evicted {
            log::debug!("Inserting {key} evicted {evicted}");
        }

        self.bind(key, inserted.slot, tracker);
        self.upload(inserted.slot, state, tracker, registrar);
        Ok(Prepared::Built { from_store })
    }

    /// Re-links the variant in `slot` if it was linked for a different blend.
    fn sync_blend<R: ProgramRegistrar + ?Sized>(
        &mut self,
        slot: CacheSlot,
        state: &FixedFunctionState,
        registrar: &mut R,
    ) -> Result<()> {
        let Some(variant) = self.cache.get_mut(slot) else {
            return Ok(());
        };
        if variant.linked_blend() == &state.blend {
            return Ok(());
        }

        log::trace!("{}: {} for new blend state", variant.key(), BuildStep::Linking);
        if let Err(e) = variant.relink(&state.blend, registrar) {
            log::error!("Failed to re-link variant {}: {e}", variant.key());
            self.stats.failures += 1;
            return Err(e);
        }
        self.stats.relinks += 1;
        Ok(())
    }

    fn bind(&mut self, key: VariantKey, slot: CacheSlot, tracker: &mut UniformUploadTracker) {
        match self.bound {
            BindState::Bound { key: previous, .. } => {
                log::trace!("Bound({previous}) -> Bound({key})");
            }
            BindState::Unbound => log::trace!("Unbound -> Bound({key})"),
        }
        self.bound = BindState::Bound { key, slot };
        self.stats.rebinds += 1;
        tracker.mark_rebound();
    }

    fn upload<R: ProgramRegistrar + ?Sized>(
        &self,
        slot: CacheSlot,
        state: &FixedFunctionState,
        tracker: &mut UniformUploadTracker,
        registrar: &mut R,
    ) {
        if let Some(variant) = self.cache.get(slot) {
            tracker.upload_if_needed(state, variant, registrar);
        }
    }

    /// Compiled programs for `key`, from the persistent store or freshly built.
    fn obtain_blobs<C: ShaderCompiler + ?Sized>(
        &mut self,
        key: &VariantKey,
        compiler: &mut C,
    ) -> Result<(CompiledPair, bool)> {
        let hash = key.persistent_hash(&self.build_id);

        if let Some(store) = self.store.as_mut() {
            match store.try_load(hash) {
                Ok(Some(blobs)) => {
                    log::debug!("Persistent store hit for {key}");
                    self.stats.store_hits += 1;
                    return Ok((blobs, true));
                }
                Ok(None) => {}
                Err(e) => log::warn!("Ignoring persistent entry for {key}: {e}"),
            }
        }

        self.ensure_compiler(compiler)?;

        log::trace!("{key}: {}", BuildStep::Synthesizing);
        let source = synthesize(key).inspect_err(|e| {
            log::error!("Failed to synthesize variant {key}: {e}");
        })?;
        self.stats.syntheses += 1;
        if self.dump_source {
            log::debug!(
                "Synthesized variant {key}\n--- vertex ---\n{}\n--- fragment ---\n{}",
                source.vertex,
                source.fragment
            );
        }

        log::trace!("{key}: {}", BuildStep::Compiling);
        let blobs = self.compile(key, &source, compiler)?;
        self.stats.compilations += 1;

        if let Some(store) = self.store.as_mut() {
            match store.save(hash, &blobs) {
                Ok(()) => self.stats.store_saves += 1,
                Err(e) => log::warn!("Failed to persist variant {key}: {e}"),
            }
        }

        Ok((blobs, false))
    }

    fn ensure_compiler<C: ShaderCompiler + ?Sized>(&mut self, compiler: &mut C) -> Result<()> {
        match self.compiler {
            CompilerState::Running => Ok(()),
            CompilerState::Failed => Err(FfpError::CapabilityUnavailable(
                "shader compiler failed to start".into(),
            )),
            CompilerState::NotStarted => {
                if compiler.ensure_started() {
                    log::info!("Shader compiler service started");
                    self.compiler = CompilerState::Running;
                    Ok(())
                } else {
                    log::error!("Shader compiler service could not be started");
                    self.compiler = CompilerState::Failed;
                    Err(FfpError::CapabilityUnavailable(
                        "shader compiler failed to start".into(),
                    ))
                }
            }
        }
    }

    fn compile<C: ShaderCompiler + ?Sized>(
        &mut self,
        key: &VariantKey,
        source: &SynthesizedSource,
        compiler: &mut C,
    ) -> Result<CompiledPair> {
        let mut compile_stage = |stage: ShaderStage| {
            compiler.compile(source.get(stage), stage).map_err(|e| {
                log::error!("Failed to compile {stage} program of {key}: {e}");
                FfpError::CompileFailure {
                    stage,
                    message: e.message,
                }
            })
        };

        let result = compile_stage(ShaderStage::Vertex).and_then(|vertex| {
            compile_stage(ShaderStage::Fragment).map(|fragment| CompiledPair { vertex, fragment })
        });

        result.inspect_err(|err| {
            if let Some(failed) = BuildFailure::from_error(err) {
                self.failed.insert(*key, failed);
            }
        })
    }

    /// Releases every cached variant and returns to `Unbound`.
    pub fn release_all<R: ProgramRegistrar + ?Sized>(&mut self, registrar: &mut R) {
        self.cache.clear(registrar);
        self.bound = BindState::Unbound;
    }

    /// Forgets remembered compile failures, e.g. after the compiler was replaced.
    pub fn clear_failures(&mut self) {
        self.failed.clear();
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn bind_state(&self) -> BindState {
        self.bound
    }

    #[must_use]
    pub fn bound_key(&self) -> Option<VariantKey> {
        match self.bound {
            BindState::Bound { key, .. } => Some(key),
            BindState::Unbound => None,
        }
    }

    #[must_use]
    pub fn bound_variant(&self) -> Option<&ShaderVariant> {
        match self.bound {
            BindState::Bound { slot, .. } => self.cache.get(slot),
            BindState::Unbound => None,
        }
    }

    /// Program pair to hand to the draw-submission layer.
    #[must_use]
    pub fn linked_program(&self) -> Option<LinkedProgramPair> {
        self.bound_variant().map(ShaderVariant::linked)
    }

    /// Vertex attributes the bound variant consumes, in binding order.
    #[must_use]
    pub fn bound_attributes(&self) -> &[VertexAttribute] {
        self.bound_variant().map_or(&[], ShaderVariant::attributes)
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &VariantCache {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> SelectorStats {
        self.stats
    }

    /// `None` until startup was attempted.
    #[must_use]
    pub fn compiler_available(&self) -> Option<bool> {
        match self.compiler {
            CompilerState::NotStarted => None,
            CompilerState::Running => Some(true),
            CompilerState::Failed => Some(false),
        }
    }
}

impl fmt::Debug for VariantSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantSelector")
            .field("bound", &self.bound)
            .field("cache", &self.cache)
            .field("store", &self.store.is_some())
            .field("compiler", &self.compiler)
            .field("failed", &self.failed.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{CountingCompiler, RecordingRegistrar};
    use crate::state::{BlendFactor, TexEnvMode};

    struct Harness {
        selector: VariantSelector,
        tracker: UniformUploadTracker,
        compiler: CountingCompiler,
        registrar: RecordingRegistrar,
    }

    impl Harness {
        fn new(capacity: usize) -> Self {
            let settings = FfpSettings {
                cache_capacity: capacity,
                ..Default::default()
            };
            Self {
                selector: VariantSelector::new(&settings).unwrap(),
                tracker: UniformUploadTracker::new(),
                compiler: CountingCompiler::default(),
                registrar: RecordingRegistrar::default(),
            }
        }

        fn with_settings(settings: &FfpSettings) -> Result<Self> {
            Ok(Self {
                selector: VariantSelector::new(settings)?,
                tracker: UniformUploadTracker::new(),
                compiler: CountingCompiler::default(),
                registrar: RecordingRegistrar::default(),
            })
        }

        fn prepare(&mut self, state: &FixedFunctionState) -> Result<Prepared> {
            self.selector.prepare(
                state,
                &mut self.tracker,
                &mut self.compiler,
                &mut self.registrar,
            )
        }
    }

    fn textured() -> FixedFunctionState {
        let mut state = FixedFunctionState::new();
        state.texture_units[0].enabled = true;
        state.texture_units[0].env_mode = TexEnvMode::Modulate;
        state
    }

    #[test]
    fn first_draw_builds_second_is_noop() {
        let mut h = Harness::new(4);
        let state = textured();

        assert_eq!(h.prepare(&state).unwrap(), Prepared::Built { from_store: false });
        assert_eq!(h.selector.stats().syntheses, 1);
        let lookups = h.selector.cache_stats().lookups;
        let uploads = h.tracker.stats();

        assert_eq!(h.prepare(&state).unwrap(), Prepared::Unchanged);
        assert_eq!(h.selector.cache_stats().lookups, lookups);
        assert_eq!(h.tracker.stats(), uploads);
        assert_eq!(h.selector.stats().syntheses, 1);
    }

    #[test]
    fn compiler_starts_lazily_once() {
        let mut h = Harness::new(4);
        assert_eq!(h.selector.compiler_available(), None);
        h.prepare(&textured()).unwrap();
        h.prepare(&FixedFunctionState::new()).unwrap();
        assert_eq!(h.compiler.start_calls, 1);
        assert_eq!(h.selector.compiler_available(), Some(true));
    }

    #[test]
    fn failed_startup_is_not_retried() {
        let mut h = Harness::new(4);
        h.compiler.fail_start = true;

        let err = h.prepare(&textured()).unwrap_err();
        assert!(matches!(err, FfpError::CapabilityUnavailable(_)));
        let err = h.prepare(&FixedFunctionState::new()).unwrap_err();
        assert!(matches!(err, FfpError::CapabilityUnavailable(_)));
        assert_eq!(h.compiler.start_calls, 1);
        assert_eq!(h.selector.bind_state(), BindState::Unbound);
    }

    #[test]
    fn unusable_store_dir_disables_store() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let settings = FfpSettings {
            persistent_store_dir: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let mut h = Harness::with_settings(&settings).unwrap();
        assert_eq!(h.prepare(&textured()).unwrap(), Prepared::Built { from_store: false });
        assert_eq!(h.selector.stats().store_saves, 0);
    }

    #[test]
    fn failed_startup_skips_synthesis() {
        let mut h = Harness::new(4);
        h.compiler.fail_start = true;

        for _ in 0..5 {
            assert!(h.prepare(&textured()).is_err());
        }
        assert_eq!(h.selector.stats().syntheses, 0);
        assert_eq!(h.compiler.start_calls, 1);
    }

    #[test]
    fn registration_failure_is_not_rebuilt() {
        let mut h = Harness::new(4);
        h.registrar.fail_register = true;

        for _ in 0..5 {
            let err = h.prepare(&textured()).unwrap_err();
            assert!(matches!(err, FfpError::RegistrationFailure(_)));
        }
        assert_eq!(h.selector.stats().syntheses, 1);
        assert_eq!(h.compiler.compile_calls, 2);
        assert_eq!(h.selector.stats().failures, 5);
        assert_eq!(h.registrar.live_programs(), 0);

        h.registrar.fail_register = false;
        assert!(h.prepare(&textured()).is_err());
        h.selector.clear_failures();
        assert_eq!(h.prepare(&textured()).unwrap(), Prepared::Built { from_store: false });
    }

    #[test]
    fn link_failure_is_not_rebuilt() {
        let mut h = Harness::new(4);
        h.registrar.fail_link = true;

        for _ in 0..3 {
            let err = h.prepare(&textured()).unwrap_err();
            assert!(matches!(err, FfpError::LinkFailure(_)));
        }
        assert_eq!(h.selector.stats().syntheses, 1);
        assert_eq!(h.compiler.compile_calls, 2);
        assert_eq!(h.registrar.live_programs(), 0);
        assert_eq!(h.selector.bind_state(), BindState::Unbound);
    }

    #[test]
    fn compile_failure_keeps_previous_binding() {
        let mut h = Harness::new(4);
        let first = textured();
        h.prepare(&first).unwrap();
        let bound = h.selector.linked_program();

        h.compiler.fail_compile = true;
        let mut second = first.clone();
        second.fog.enabled = true;
        let err = h.prepare(&second).unwrap_err();
        assert!(matches!(err, FfpError::CompileFailure { stage: ShaderStage::Vertex, .. }));
        assert_eq!(h.selector.linked_program(), bound);
        assert_eq!(h.selector.bound_key(), Some(VariantKey::compute(&first)));

        // Remembered: no second compile attempt.
        let compiles = h.compiler.compile_calls;
        assert!(h.prepare(&second).is_err());
        assert_eq!(h.compiler.compile_calls, compiles);
        assert!(h.selector.cache().len() == 1);
    }

    #[test]
    fn blend_change_relinks_without_rebuild() {
        let mut h = Harness::new(4);
        let mut state = textured();
        h.prepare(&state).unwrap();
        let compiles = h.compiler.compile_calls;

        state.blend.enabled = true;
        state.blend.src = BlendFactor::SrcAlpha;
        state.blend.dst = BlendFactor::OneMinusSrcAlpha;
        h.tracker.mark_blend_dirty();

        assert_eq!(h.prepare(&state).unwrap(), Prepared::Unchanged);
        assert_eq!(h.selector.stats().relinks, 1);
        assert_eq!(h.selector.stats().syntheses, 1);
        assert_eq!(h.compiler.compile_calls, compiles);
        assert_eq!(h.registrar.links.last().map(|(_, blend)| *blend), Some(state.blend));
        assert!(!h.tracker.is_blend_dirty());
    }

    #[test]
    fn cache_hit_relinks_stale_blend() {
        let mut h = Harness::new(4);
        let a = textured();
        let b = FixedFunctionState::new();
        h.prepare(&a).unwrap();
        h.prepare(&b).unwrap();

        let mut a_blended = a.clone();
        a_blended.blend.enabled = true;
        assert_eq!(h.prepare(&a_blended).unwrap(), Prepared::CacheHit);
        assert_eq!(h.selector.stats().relinks, 1);
        assert_eq!(h.selector.bound_variant().unwrap().linked_blend(), &a_blended.blend);
    }

    #[test]
    fn release_all_unbinds() {
        let mut h = Harness::new(2);
        h.prepare(&textured()).unwrap();
        h.selector.release_all(&mut h.registrar);
        assert_eq!(h.selector.bind_state(), BindState::Unbound);
        assert!(h.selector.bound_attributes().is_empty());
        assert_eq!(h.registrar.live_programs(), 0);
    }
}
