//! Shader Variants
//!
//! A [`ShaderVariant`] is the fully built realization of one [`VariantKey`]: both
//! compiled blobs, their registered program handles, the program pair linked
//! against a blend configuration, every resolved uniform parameter and the vertex
//! attributes the vertex program consumes.
//!
//! Variants are only ever constructed complete. [`ShaderVariant::register`]
//! unwinds every registrar call it made if a later step fails, so a partially
//! built variant never exists.

use smallvec::SmallVec;

use crate::backend::{
    CompiledPair, LinkedProgramPair, ParameterHandle, ProgramHandle, ProgramRegistrar,
    ShaderStage,
};
use crate::errors::{FfpError, Result};
use crate::mask::VariantKey;
use crate::state::{BlendConfig, VertexAttribute};
use crate::synth::{ParamId, ParameterManifest, vertex_attributes};

/// A uniform parameter resolved against a registered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedParam {
    pub id: ParamId,
    pub program: ProgramHandle,
    pub handle: ParameterHandle,
}

#[derive(Debug)]
pub struct ShaderVariant {
    key: VariantKey,
    blobs: CompiledPair,
    vertex_program: ProgramHandle,
    fragment_program: ProgramHandle,
    linked: LinkedProgramPair,
    linked_blend: BlendConfig,
    params: SmallVec<[ResolvedParam; 32]>,
    attributes: SmallVec<[VertexAttribute; 12]>,
}

impl ShaderVariant {
    /// Registers both programs, resolves the key's parameters and links the pair
    /// against `blend`.
    pub fn register<R: ProgramRegistrar + ?Sized>(
        key: VariantKey,
        blobs: CompiledPair,
        blend: &BlendConfig,
        registrar: &mut R,
    ) -> Result<Self> {
        let vertex_program = registrar
            .register_program(&blobs.vertex)
            .map_err(|e| FfpError::RegistrationFailure(format!("vertex program: {e}")))?;

        let fragment_program = match registrar.register_program(&blobs.fragment) {
            Ok(handle) => handle,
            Err(e) => {
                registrar.unregister_program(vertex_program);
                return Err(FfpError::RegistrationFailure(format!(
                    "fragment program: {e}"
                )));
            }
        };

        let linked = match registrar.link_for_blend(vertex_program, fragment_program, blend) {
            Ok(pair) => pair,
            Err(e) => {
                registrar.unregister_program(fragment_program);
                registrar.unregister_program(vertex_program);
                return Err(FfpError::LinkFailure(e.to_string()));
            }
        };

        let manifest = ParameterManifest::for_key(&key);
        let mut params = SmallVec::new();
        for (id, stage) in manifest.iter() {
            let program = match stage {
                ShaderStage::Vertex => vertex_program,
                ShaderStage::Fragment => fragment_program,
            };
            match registrar.parameter(program, &id.name()) {
                Some(handle) => params.push(ResolvedParam {
                    id,
                    program,
                    handle,
                }),
                None => log::warn!("Variant {key}: {stage} program does not expose `{id}`"),
            }
        }

        Ok(Self {
            key,
            blobs,
            vertex_program,
            fragment_program,
            linked,
            linked_blend: *blend,
            params,
            attributes: vertex_attributes(&key),
        })
    }

    /// Re-links the program pair against a new blend configuration.
    ///
    /// Only the linked pair is replaced; on failure the previous link stays.
    pub fn relink<R: ProgramRegistrar + ?Sized>(
        &mut self,
        blend: &BlendConfig,
        registrar: &mut R,
    ) -> Result<()> {
        let linked = registrar
            .link_for_blend(self.vertex_program, self.fragment_program, blend)
            .map_err(|e| FfpError::LinkFailure(e.to_string()))?;
        registrar.release_link(self.linked);
        self.linked = linked;
        self.linked_blend = *blend;
        Ok(())
    }

    /// Releases the link and unregisters both programs.
    pub fn release<R: ProgramRegistrar + ?Sized>(self, registrar: &mut R) {
        log::debug!("Releasing variant {}", self.key);
        registrar.release_link(self.linked);
        registrar.unregister_program(self.fragment_program);
        registrar.unregister_program(self.vertex_program);
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> VariantKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn blobs(&self) -> &CompiledPair {
        &self.blobs
    }

    #[inline]
    #[must_use]
    pub fn program(&self, stage: ShaderStage) -> ProgramHandle {
        match stage {
            ShaderStage::Vertex => self.vertex_program,
            ShaderStage::Fragment => self.fragment_program,
        }
    }

    #[inline]
    #[must_use]
    pub fn linked(&self) -> LinkedProgramPair {
        self.linked
    }

    /// Blend configuration the current link was built for.
    #[inline]
    #[must_use]
    pub fn linked_blend(&self) -> &BlendConfig {
        &self.linked_blend
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &[ResolvedParam] {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }
}
