//! Recording collaborators shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;

use myth_ffp::state::BlendConfig;
use myth_ffp::{
    CompileError, CompiledBlob, FfpSettings, FixedFunctionContext, LinkedProgramPair,
    ParameterHandle, ProgramHandle, ProgramRegistrar, RegistrarError, ShaderCompiler, ShaderStage,
    WgslSourceCompiler,
};
use rustc_hash::FxHashMap;

pub type TestContext = FixedFunctionContext<MockCompiler, MockRegistrar>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn context(settings: &FfpSettings) -> TestContext {
    init_logger();
    FixedFunctionContext::new(settings, MockCompiler::default(), MockRegistrar::default())
        .expect("context")
}

pub fn context_with_capacity(capacity: usize) -> TestContext {
    context(&FfpSettings {
        cache_capacity: capacity,
        ..Default::default()
    })
}

// ============================================================================
// Compiler
// ============================================================================

#[derive(Debug, Default)]
pub struct MockCompiler {
    inner: WgslSourceCompiler,
    pub starts: usize,
    pub compiles: usize,
    pub refuse_start: bool,
    /// Fails every compile of this stage.
    pub fail_stage: Option<ShaderStage>,
}

impl MockCompiler {
    pub fn failing(stage: ShaderStage) -> Self {
        let mut compiler = Self::default();
        compiler.fail_stage = Some(stage);
        compiler
    }

    pub fn unstartable() -> Self {
        let mut compiler = Self::default();
        compiler.refuse_start = true;
        compiler
    }
}

impl ShaderCompiler for MockCompiler {
    fn ensure_started(&mut self) -> bool {
        self.starts += 1;
        !self.refuse_start && self.inner.ensure_started()
    }

    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<CompiledBlob, CompileError> {
        self.compiles += 1;
        if self.fail_stage == Some(stage) {
            return Err(CompileError::new(format!("{stage} rejected")));
        }
        self.inner.compile(source, stage)
    }
}

// ============================================================================
// Registrar
// ============================================================================

#[derive(Debug, Default)]
pub struct MockRegistrar {
    next: u32,
    names: RefCell<Vec<String>>,
    pub live: FxHashMap<ProgramHandle, CompiledBlob>,
    pub registrations: usize,
    pub links: Vec<BlendConfig>,
    pub released_links: usize,
    pub writes: Vec<(ProgramHandle, String, Vec<f32>)>,
    /// Rejects every program registration.
    pub refuse_register: bool,
}

impl MockRegistrar {
    pub fn writes_named(&self, name: &str) -> Vec<&[f32]> {
        self.writes
            .iter()
            .filter(|(_, n, _)| n == name)
            .map(|(_, _, v)| v.as_slice())
            .collect()
    }

    pub fn last_write(&self, name: &str) -> Option<&[f32]> {
        self.writes_named(name).last().copied()
    }
}

impl ProgramRegistrar for MockRegistrar {
    fn register_program(&mut self, blob: &CompiledBlob) -> Result<ProgramHandle, RegistrarError> {
        if self.refuse_register {
            return Err(RegistrarError::Rejected("registration refused".into()));
        }
        self.next += 1;
        self.registrations += 1;
        let handle = ProgramHandle(self.next);
        self.live.insert(handle, blob.clone());
        Ok(handle)
    }

    fn unregister_program(&mut self, handle: ProgramHandle) {
        self.live.remove(&handle);
    }

    fn link_for_blend(
        &mut self,
        vertex: ProgramHandle,
        fragment: ProgramHandle,
        blend: &BlendConfig,
    ) -> Result<LinkedProgramPair, RegistrarError> {
        self.next += 1;
        self.links.push(*blend);
        Ok(LinkedProgramPair {
            vertex,
            fragment,
            link: self.next,
        })
    }

    fn release_link(&mut self, _pair: LinkedProgramPair) {
        self.released_links += 1;
    }

    fn parameter(&self, program: ProgramHandle, name: &str) -> Option<ParameterHandle> {
        let source = self.live.get(&program)?.as_wgsl()?;
        if !source.contains(&format!("    {name}: ")) {
            return None;
        }
        let mut names = self.names.borrow_mut();
        let index = names.iter().position(|n| n == name).unwrap_or_else(|| {
            names.push(name.to_string());
            names.len() - 1
        });
        Some(ParameterHandle(index as u32))
    }

    fn write_parameter(&mut self, program: ProgramHandle, handle: ParameterHandle, value: &[f32]) {
        let name = self.names.borrow()[handle.0 as usize].clone();
        self.writes.push((program, name, value.to_vec()));
    }
}
