//! Fixed-Function Context
//!
//! [`FixedFunctionContext`] is the inbound surface of the emulation layer. It owns
//! the live [`FixedFunctionState`], the uniform upload tracker, the variant
//! selector and both backend collaborators.
//!
//! State mutators never touch programs. They update the state and mark which
//! uniform blocks became stale; all program work happens in
//! [`prepare_draw`](FixedFunctionContext::prepare_draw), once per draw call.
//!
//! Light positions, spot directions and clip planes are transformed into eye
//! space with the model-view matrix current at the time they are set.
//!
//! ```rust,ignore
//! let mut ctx = FixedFunctionContext::new(&FfpSettings::default(), compiler, registrar)?;
//! ctx.enable(Capability::Texture2D(0))?;
//! ctx.set_tex_env_mode(0, TexEnvMode::Modulate)?;
//!
//! ctx.prepare_draw()?;
//! let program = ctx.linked_program();
//! let attributes = ctx.bound_attributes();
//! ```

use glam::{Mat4, Vec4};

use crate::backend::{LinkedProgramPair, ProgramRegistrar, ShaderCompiler};
use crate::errors::{FfpError, Result};
use crate::selector::{Prepared, VariantSelector};
use crate::settings::FfpSettings;
use crate::state::{
    AttribFormat, BlendEquation, BlendFactor, ClientArray, CombineConfig, CompareFunc,
    FixedFunctionState, FogMode, Light, MAX_CLIP_PLANES, MAX_LIGHTS, MAX_TEXTURE_UNITS, Material,
    MatrixMode, ShadeModel, TexEnvMode, VertexAttribute,
};
use crate::store::VariantStore;
use crate::uniforms::UniformUploadTracker;

/// Switchable pipeline capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Lighting,
    Light(usize),
    Fog,
    AlphaTest,
    Texture2D(usize),
    ClipPlane(usize),
    Blend,
    Normalize,
}

pub struct FixedFunctionContext<C: ShaderCompiler, R: ProgramRegistrar> {
    state: FixedFunctionState,
    tracker: UniformUploadTracker,
    selector: VariantSelector,
    compiler: C,
    registrar: R,
}

fn check_index(kind: &str, index: usize, limit: usize) -> Result<()> {
    if index < limit {
        Ok(())
    } else {
        Err(FfpError::InvalidArgument(format!(
            "{kind} index {index} out of range (limit {limit})"
        )))
    }
}

impl<C: ShaderCompiler, R: ProgramRegistrar> FixedFunctionContext<C, R> {
    pub fn new(settings: &FfpSettings, compiler: C, registrar: R) -> Result<Self> {
        Ok(Self::from_parts(
            VariantSelector::new(settings)?,
            compiler,
            registrar,
        ))
    }

    /// Uses `store` instead of the directory configured in `settings`.
    pub fn with_store(
        settings: &FfpSettings,
        store: Option<Box<dyn VariantStore>>,
        compiler: C,
        registrar: R,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self::from_parts(
            VariantSelector::with_store(settings, store),
            compiler,
            registrar,
        ))
    }

    fn from_parts(selector: VariantSelector, compiler: C, registrar: R) -> Self {
        Self {
            state: FixedFunctionState::new(),
            tracker: UniformUploadTracker::new(),
            selector,
            compiler,
            registrar,
        }
    }

    // ========================================================================
    // Draw
    // ========================================================================

    /// Makes the bound variant match the current state and uploads dirty
    /// uniforms. Call once before every draw.
    ///
    /// On error the previously bound variant stays bound.
    pub fn prepare_draw(&mut self) -> Result<Prepared> {
        self.selector.prepare(
            &self.state,
            &mut self.tracker,
            &mut self.compiler,
            &mut self.registrar,
        )
    }

    /// Program pair to submit the draw with.
    #[must_use]
    pub fn linked_program(&self) -> Option<LinkedProgramPair> {
        self.selector.linked_program()
    }

    /// Vertex attributes the bound variant consumes, in binding order.
    ///
    /// [`VertexAttribute::Diffuse`], [`VertexAttribute::Specular`] and
    /// [`VertexAttribute::Emissive`] have no client array. Feed them as
    /// constant attributes from [`Self::constant_attribute`].
    #[must_use]
    pub fn bound_attributes(&self) -> &[VertexAttribute] {
        self.selector.bound_attributes()
    }

    /// Constant value for an attribute that is sourced from state rather than
    /// a client array. `None` for attributes that read vertex data.
    #[must_use]
    pub fn constant_attribute(&self, attribute: VertexAttribute) -> Option<Vec4> {
        let material = &self.state.lighting.material;
        match attribute {
            VertexAttribute::Diffuse => Some(material.diffuse),
            VertexAttribute::Specular => Some(material.specular),
            VertexAttribute::Emissive => Some(material.emission),
            VertexAttribute::Position
            | VertexAttribute::TexCoord(_)
            | VertexAttribute::Color
            | VertexAttribute::Normal => None,
        }
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    pub fn enable(&mut self, cap: Capability) -> Result<()> {
        self.set_capability(cap, true)
    }

    pub fn disable(&mut self, cap: Capability) -> Result<()> {
        self.set_capability(cap, false)
    }

    #[must_use]
    pub fn is_enabled(&self, cap: Capability) -> bool {
        let s = &self.state;
        match cap {
            Capability::Lighting => s.lighting.enabled,
            Capability::Light(i) => s.lighting.lights.get(i).is_some_and(|l| l.enabled),
            Capability::Fog => s.fog.enabled,
            Capability::AlphaTest => s.alpha_test.enabled,
            Capability::Texture2D(i) => s.texture_units.get(i).is_some_and(|u| u.enabled),
            Capability::ClipPlane(i) => s.clip_planes.get(i).is_some_and(|p| p.enabled),
            Capability::Blend => s.blend.enabled,
            Capability::Normalize => s.normalize,
        }
    }

    fn set_capability(&mut self, cap: Capability, on: bool) -> Result<()> {
        let s = &mut self.state;
        match cap {
            Capability::Lighting => s.lighting.enabled = on,
            Capability::Light(i) => {
                check_index("light", i, MAX_LIGHTS)?;
                s.lighting.lights[i].enabled = on;
            }
            Capability::Fog => s.fog.enabled = on,
            Capability::AlphaTest => s.alpha_test.enabled = on,
            Capability::Texture2D(i) => {
                check_index("texture unit", i, MAX_TEXTURE_UNITS)?;
                s.texture_units[i].enabled = on;
            }
            Capability::ClipPlane(i) => {
                check_index("clip plane", i, MAX_CLIP_PLANES)?;
                s.clip_planes[i].enabled = on;
            }
            Capability::Blend => {
                s.blend.enabled = on;
                self.tracker.mark_blend_dirty();
                return Ok(());
            }
            Capability::Normalize => s.normalize = on,
        }
        // Toggling a feature reshuffles compacted slots.
        self.tracker.mark_vertex_dirty();
        self.tracker.mark_fragment_dirty();
        Ok(())
    }

    // ========================================================================
    // Lighting
    // ========================================================================

    /// Sets every parameter of light `index`. `enabled` is left untouched.
    ///
    /// `position` and `spot_direction` are given in object space.
    pub fn set_light(&mut self, index: usize, light: Light) -> Result<()> {
        check_index("light", index, MAX_LIGHTS)?;
        let model_view = self.state.transforms.model_view;
        let slot = &mut self.state.lighting.lights[index];
        *slot = Light {
            enabled: slot.enabled,
            position: model_view * light.position,
            spot_direction: model_view.transform_vector3(light.spot_direction),
            ..light
        };
        // Lighting parameters upload with the fragment block.
        self.tracker.mark_fragment_dirty();
        Ok(())
    }

    pub fn set_light_model_ambient(&mut self, ambient: Vec4) {
        self.state.lighting.model_ambient = ambient;
        self.tracker.mark_fragment_dirty();
    }

    /// Only shininess is a uniform. The material colors reach the shader as
    /// vertex attributes, see [`Self::constant_attribute`].
    pub fn set_material(&mut self, material: Material) {
        self.state.lighting.material = material;
        self.tracker.mark_fragment_dirty();
    }

    pub fn set_shade_model(&mut self, model: ShadeModel) {
        self.state.shade_model = model;
    }

    // ========================================================================
    // Fragment Operations
    // ========================================================================

    pub fn set_fog(&mut self, mode: FogMode, color: Vec4, start: f32, end: f32, density: f32) {
        let fog = &mut self.state.fog;
        fog.mode = mode;
        fog.color = color;
        fog.start = start;
        fog.end = end;
        fog.density = density;
        self.tracker.mark_fragment_dirty();
    }

    pub fn set_alpha_func(&mut self, func: CompareFunc, reference: f32) {
        self.state.alpha_test.func = func;
        self.state.alpha_test.reference = reference.clamp(0.0, 1.0);
        self.tracker.mark_fragment_dirty();
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.state.color = color;
        self.tracker.mark_fragment_dirty();
    }

    pub fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.state.blend.src = src;
        self.state.blend.dst = dst;
        self.tracker.mark_blend_dirty();
    }

    pub fn set_blend_equation(&mut self, equation: BlendEquation) {
        self.state.blend.equation = equation;
        self.tracker.mark_blend_dirty();
    }

    // ========================================================================
    // Texture Environment
    // ========================================================================

    pub fn set_tex_env_mode(&mut self, unit: usize, mode: TexEnvMode) -> Result<()> {
        check_index("texture unit", unit, MAX_TEXTURE_UNITS)?;
        self.state.texture_units[unit].env_mode = mode;
        self.tracker.mark_fragment_dirty();
        Ok(())
    }

    pub fn set_tex_env_color(&mut self, unit: usize, color: Vec4) -> Result<()> {
        check_index("texture unit", unit, MAX_TEXTURE_UNITS)?;
        self.state.texture_units[unit].env_color = color;
        self.tracker.mark_fragment_dirty();
        Ok(())
    }

    /// Combiner output scales. Only 1, 2 and 4 are meaningful.
    pub fn set_tex_env_scale(&mut self, unit: usize, rgb: f32, alpha: f32) -> Result<()> {
        check_index("texture unit", unit, MAX_TEXTURE_UNITS)?;
        let tex = &mut self.state.texture_units[unit];
        tex.rgb_scale = rgb;
        tex.alpha_scale = alpha;
        self.tracker.mark_fragment_dirty();
        Ok(())
    }

    pub fn set_combine(&mut self, unit: usize, combine: CombineConfig) -> Result<()> {
        check_index("texture unit", unit, MAX_TEXTURE_UNITS)?;
        self.state.texture_units[unit].combine = combine;
        self.tracker.mark_fragment_dirty();
        Ok(())
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    /// Sets clip plane `index` from an object-space plane equation.
    pub fn set_clip_plane(&mut self, index: usize, equation: Vec4) -> Result<()> {
        check_index("clip plane", index, MAX_CLIP_PLANES)?;
        // Planes transform by the inverse transpose.
        let eye = self.state.transforms.model_view.inverse().transpose() * equation;
        self.state.clip_planes[index].equation = eye;
        self.tracker.mark_vertex_dirty();
        Ok(())
    }

    /// Enables (`Some`) or disables (`None`) a client vertex array.
    pub fn set_vertex_array(
        &mut self,
        array: ClientArray,
        format: Option<AttribFormat>,
    ) -> Result<()> {
        let arrays = &mut self.state.vertex_arrays;
        match array {
            ClientArray::Position => arrays.position = format.unwrap_or_default(),
            ClientArray::Normal => arrays.normal = format,
            ClientArray::Color => arrays.color = format,
            ClientArray::TexCoord(unit) => {
                check_index("texture unit", unit, MAX_TEXTURE_UNITS)?;
                arrays.texcoords[unit] = format;
            }
        }
        Ok(())
    }

    pub fn load_matrix(&mut self, mode: MatrixMode, matrix: Mat4) {
        *self.state.transforms.get_mut(mode) = matrix;
        self.tracker.mark_transform_stale();
    }

    /// Post-multiplies the current matrix of `mode`.
    pub fn mult_matrix(&mut self, mode: MatrixMode, matrix: Mat4) {
        let current = self.state.transforms.get_mut(mode);
        *current *= matrix;
        self.tracker.mark_transform_stale();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn state(&self) -> &FixedFunctionState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &UniformUploadTracker {
        &self.tracker
    }

    #[inline]
    #[must_use]
    pub fn selector(&self) -> &VariantSelector {
        &self.selector
    }

    #[inline]
    #[must_use]
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    #[inline]
    pub fn compiler_mut(&mut self) -> &mut C {
        &mut self.compiler
    }

    #[inline]
    #[must_use]
    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    #[inline]
    pub fn registrar_mut(&mut self) -> &mut R {
        &mut self.registrar
    }
}

impl<C: ShaderCompiler, R: ProgramRegistrar> Drop for FixedFunctionContext<C, R> {
    fn drop(&mut self) {
        self.selector.release_all(&mut self.registrar);
    }
}
