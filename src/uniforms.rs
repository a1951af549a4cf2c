//! Uniform Upload Tracker
//!
//! Decides which uniform data has to be written to the bound variant before the
//! next draw:
//!
//! - `VERTEX` / `FRAGMENT`: the corresponding parameter block changed. Each flag
//!   is cleared only by its own upload.
//! - `TRANSFORM_STALE` / `NORMAL_STALE`: the cached world-view-projection and
//!   normal matrices need recomputing. The normal matrix is only recomputed while
//!   a lit variant is bound.
//! - `BLEND`: the blend configuration changed. This never causes an upload; the
//!   selector consumes it to re-link the bound program pair.

use bitflags::bitflags;
use glam::{Mat4, Vec4};
use smallvec::SmallVec;

use crate::backend::ProgramRegistrar;
use crate::state::{ClipPlane, FixedFunctionState, Light};
use crate::synth::{LightField, ParamBlock, ParamId};
use crate::variant::ShaderVariant;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const VERTEX          = 1 << 0;
        const FRAGMENT        = 1 << 1;
        const TRANSFORM_STALE = 1 << 2;
        const NORMAL_STALE    = 1 << 3;
        const BLEND           = 1 << 4;
    }
}

/// A uniform value ready to be written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Vec4([f32; 4]),
    Mat4([f32; 16]),
}

impl ParamValue {
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        match self {
            Self::Vec4(v) => v,
            Self::Mat4(m) => m,
        }
    }
}

impl From<Vec4> for ParamValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v.to_array())
    }
}

impl From<Mat4> for ParamValue {
    fn from(m: Mat4) -> Self {
        Self::Mat4(m.to_cols_array())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub vertex_uploads: u64,
    pub fragment_uploads: u64,
    pub wvp_recomputes: u64,
    pub normal_recomputes: u64,
    pub values_written: u64,
}

/// What a single [`UniformUploadTracker::upload_if_needed`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub vertex: bool,
    pub fragment: bool,
}

impl UploadReport {
    #[inline]
    #[must_use]
    pub fn any(self) -> bool {
        self.vertex || self.fragment
    }
}

#[derive(Debug)]
pub struct UniformUploadTracker {
    flags: DirtyFlags,
    wvp: Mat4,
    normal_matrix: Mat4,
    stats: UploadStats,
}

impl Default for UniformUploadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformUploadTracker {
    /// A fresh tracker considers everything dirty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: DirtyFlags::VERTEX
                | DirtyFlags::FRAGMENT
                | DirtyFlags::TRANSFORM_STALE
                | DirtyFlags::NORMAL_STALE,
            wvp: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
            stats: UploadStats::default(),
        }
    }

    #[inline]
    pub fn mark_vertex_dirty(&mut self) {
        self.flags |= DirtyFlags::VERTEX;
    }

    #[inline]
    pub fn mark_fragment_dirty(&mut self) {
        self.flags |= DirtyFlags::FRAGMENT;
    }

    /// A transform changed: derived matrices are stale and the vertex block dirty.
    #[inline]
    pub fn mark_transform_stale(&mut self) {
        self.flags |=
            DirtyFlags::TRANSFORM_STALE | DirtyFlags::NORMAL_STALE | DirtyFlags::VERTEX;
    }

    #[inline]
    pub fn mark_blend_dirty(&mut self) {
        self.flags |= DirtyFlags::BLEND;
    }

    /// Both blocks must be rewritten after binding a different variant.
    #[inline]
    pub fn mark_rebound(&mut self) {
        self.flags |= DirtyFlags::VERTEX | DirtyFlags::FRAGMENT;
    }

    #[inline]
    pub(crate) fn clear_blend(&mut self) {
        self.flags.remove(DirtyFlags::BLEND);
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> DirtyFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn is_vertex_dirty(&self) -> bool {
        self.flags.contains(DirtyFlags::VERTEX)
    }

    #[inline]
    #[must_use]
    pub fn is_fragment_dirty(&self) -> bool {
        self.flags.contains(DirtyFlags::FRAGMENT)
    }

    #[inline]
    #[must_use]
    pub fn is_blend_dirty(&self) -> bool {
        self.flags.contains(DirtyFlags::BLEND)
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Writes every dirty block of `variant`'s parameters.
    pub fn upload_if_needed<R: ProgramRegistrar + ?Sized>(
        &mut self,
        state: &FixedFunctionState,
        variant: &ShaderVariant,
        registrar: &mut R,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        if !self
            .flags
            .intersects(DirtyFlags::VERTEX | DirtyFlags::FRAGMENT)
        {
            return report;
        }

        let sources = ValueSources {
            state,
            lights: state.lighting.active_lights().collect(),
            clip_planes: state.active_clip_planes().collect(),
        };

        if self.flags.contains(DirtyFlags::VERTEX) {
            self.refresh_matrices(state, variant.key().feature.is_lit());
            self.write_block(ParamBlock::Vertex, &sources, variant, registrar);
            self.flags.remove(DirtyFlags::VERTEX);
            self.stats.vertex_uploads += 1;
            report.vertex = true;
        }

        if self.flags.contains(DirtyFlags::FRAGMENT) {
            self.write_block(ParamBlock::Fragment, &sources, variant, registrar);
            self.flags.remove(DirtyFlags::FRAGMENT);
            self.stats.fragment_uploads += 1;
            report.fragment = true;
        }

        log::trace!("Uniform upload for {}: {report:?}", variant.key());
        report
    }

    fn refresh_matrices(&mut self, state: &FixedFunctionState, lit: bool) {
        let model_view = state.transforms.model_view;

        if self.flags.contains(DirtyFlags::TRANSFORM_STALE) {
            self.wvp = state.transforms.projection * model_view;
            self.flags.remove(DirtyFlags::TRANSFORM_STALE);
            self.stats.wvp_recomputes += 1;
        }

        if lit && self.flags.contains(DirtyFlags::NORMAL_STALE) {
            self.normal_matrix = normal_matrix(&model_view);
            self.flags.remove(DirtyFlags::NORMAL_STALE);
            self.stats.normal_recomputes += 1;
        }
    }

    fn write_block<R: ProgramRegistrar + ?Sized>(
        &mut self,
        block: ParamBlock,
        sources: &ValueSources<'_>,
        variant: &ShaderVariant,
        registrar: &mut R,
    ) {
        for param in variant.params().iter().filter(|p| p.id.block() == block) {
            let value = sources.value(param.id, &self.wvp, &self.normal_matrix);
            registrar.write_parameter(param.program, param.handle, value.as_slice());
            self.stats.values_written += 1;
        }
    }
}

/// Inverse-transpose of the model-view matrix. Falls back to the matrix itself
/// when it is singular.
fn normal_matrix(model_view: &Mat4) -> Mat4 {
    if model_view.determinant().abs() <= f32::EPSILON {
        *model_view
    } else {
        model_view.inverse().transpose()
    }
}

/// Live state with active lights and clip planes compacted into slot order.
struct ValueSources<'a> {
    state: &'a FixedFunctionState,
    lights: SmallVec<[&'a Light; 8]>,
    clip_planes: SmallVec<[&'a ClipPlane; 6]>,
}

impl ValueSources<'_> {
    fn value(&self, id: ParamId, wvp: &Mat4, normal_matrix: &Mat4) -> ParamValue {
        let state = self.state;
        match id {
            ParamId::Wvp => (*wvp).into(),
            ParamId::ModelView => state.transforms.model_view.into(),
            ParamId::NormalMatrix => (*normal_matrix).into(),
            ParamId::ClipPlane(slot) => self
                .clip_planes
                .get(usize::from(slot))
                .map_or(Vec4::ZERO, |plane| plane.equation)
                .into(),
            ParamId::LightModelAmbient => state.lighting.model_ambient.into(),
            ParamId::Light(slot, field) => self
                .lights
                .get(usize::from(slot))
                .map_or(Vec4::ZERO, |light| light_value(light, field))
                .into(),
            ParamId::MaterialShininess => {
                Vec4::new(state.lighting.material.shininess, 0.0, 0.0, 0.0).into()
            }
            ParamId::FogColor => state.fog.color.into(),
            ParamId::FogParams => state.fog.packed_params().into(),
            ParamId::AlphaRef => {
                Vec4::new(state.alpha_test.reference.clamp(0.0, 1.0), 0.0, 0.0, 0.0).into()
            }
            ParamId::TexEnvColor(unit) => state.texture_units[usize::from(unit)].env_color.into(),
            ParamId::TexEnvScale(unit) => {
                let unit = &state.texture_units[usize::from(unit)];
                Vec4::new(unit.rgb_scale, unit.alpha_scale, 0.0, 0.0).into()
            }
            ParamId::TintColor => state.color.into(),
        }
    }
}

fn light_value(light: &Light, field: LightField) -> Vec4 {
    match field {
        LightField::Ambient => light.ambient,
        LightField::Diffuse => light.diffuse,
        LightField::Specular => light.specular,
        LightField::Position => light.position,
        LightField::SpotDirection => light.spot_direction.extend(light.spot_exponent),
        LightField::Attenuation => light.attenuation.extend(light.spot_cos_cutoff()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{CountingCompiler, RecordingRegistrar};
    use crate::backend::{CompiledPair, ShaderCompiler, ShaderStage};
    use crate::mask::VariantKey;
    use crate::state::BlendConfig;
    use crate::synth::synthesize;

    fn bound_variant(
        state: &FixedFunctionState,
        registrar: &mut RecordingRegistrar,
    ) -> ShaderVariant {
        let key = VariantKey::compute(state);
        let source = synthesize(&key).unwrap();
        let mut compiler = CountingCompiler::default();
        let blobs = CompiledPair {
            vertex: compiler.compile(&source.vertex, ShaderStage::Vertex).unwrap(),
            fragment: compiler.compile(&source.fragment, ShaderStage::Fragment).unwrap(),
        };
        ShaderVariant::register(key, blobs, &BlendConfig::default(), registrar).unwrap()
    }

    fn fogged_state() -> FixedFunctionState {
        let mut state = FixedFunctionState::new();
        state.fog.enabled = true;
        state
    }

    #[test]
    fn first_upload_writes_both_blocks_then_nothing() {
        let state = fogged_state();
        let mut registrar = RecordingRegistrar::default();
        let variant = bound_variant(&state, &mut registrar);
        let mut tracker = UniformUploadTracker::new();

        let report = tracker.upload_if_needed(&state, &variant, &mut registrar);
        assert!(report.vertex && report.fragment);
        let written = registrar.writes.len();
        assert_eq!(written, variant.params().len());

        let report = tracker.upload_if_needed(&state, &variant, &mut registrar);
        assert!(!report.any());
        assert_eq!(registrar.writes.len(), written);
    }

    #[test]
    fn fragment_change_leaves_vertex_clean() {
        let mut state = fogged_state();
        let mut registrar = RecordingRegistrar::default();
        let variant = bound_variant(&state, &mut registrar);
        let mut tracker = UniformUploadTracker::new();
        tracker.upload_if_needed(&state, &variant, &mut registrar);
        registrar.writes.clear();

        state.fog.color = Vec4::new(0.5, 0.5, 0.5, 1.0);
        tracker.mark_fragment_dirty();
        assert!(!tracker.is_vertex_dirty());

        let report = tracker.upload_if_needed(&state, &variant, &mut registrar);
        assert_eq!(report, UploadReport {
            vertex: false,
            fragment: true
        });
        assert_eq!(registrar.writes_named("wvp"), 0);
        assert_eq!(registrar.writes_named("fog_color"), 1);
        let (_, _, value) = registrar
            .writes
            .iter()
            .find(|(_, name, _)| name == "fog_color")
            .unwrap();
        assert_eq!(value.as_slice(), &[0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn wvp_is_recomputed_lazily() {
        let mut state = fogged_state();
        let mut registrar = RecordingRegistrar::default();
        let variant = bound_variant(&state, &mut registrar);
        let mut tracker = UniformUploadTracker::new();
        tracker.upload_if_needed(&state, &variant, &mut registrar);
        assert_eq!(tracker.stats().wvp_recomputes, 1);
        // Unlit variant: the normal matrix is never computed.
        assert_eq!(tracker.stats().normal_recomputes, 0);

        state.transforms.projection = Mat4::from_scale(glam::Vec3::splat(2.0));
        state.transforms.model_view = Mat4::from_translation(glam::Vec3::X);
        tracker.mark_transform_stale();
        tracker.mark_transform_stale();
        tracker.upload_if_needed(&state, &variant, &mut registrar);
        assert_eq!(tracker.stats().wvp_recomputes, 2);

        let expected = (state.transforms.projection * state.transforms.model_view).to_cols_array();
        let (_, _, value) = registrar
            .writes
            .iter()
            .rev()
            .find(|(_, name, _)| name == "wvp")
            .unwrap();
        assert_eq!(value.as_slice(), expected.as_slice());
    }

    #[test]
    fn normal_matrix_only_for_lit_variants() {
        let mut state = FixedFunctionState::new();
        state.lighting.enabled = true;
        state.lighting.lights[0].enabled = true;
        state.transforms.model_view = Mat4::from_scale(glam::Vec3::new(2.0, 2.0, 2.0));

        let mut registrar = RecordingRegistrar::default();
        let variant = bound_variant(&state, &mut registrar);
        let mut tracker = UniformUploadTracker::new();
        tracker.upload_if_needed(&state, &variant, &mut registrar);

        assert_eq!(tracker.stats().normal_recomputes, 1);
        assert_eq!(registrar.writes_named("normal_matrix"), 1);
        assert_eq!(registrar.writes_named("light0_diffuse"), 1);
    }

    #[test]
    fn blend_flag_does_not_upload() {
        let state = fogged_state();
        let mut registrar = RecordingRegistrar::default();
        let variant = bound_variant(&state, &mut registrar);
        let mut tracker = UniformUploadTracker::new();
        tracker.upload_if_needed(&state, &variant, &mut registrar);

        tracker.mark_blend_dirty();
        assert!(!tracker.upload_if_needed(&state, &variant, &mut registrar).any());
        assert!(tracker.is_blend_dirty());
    }

    #[test]
    fn light_fields_pack_spot_and_attenuation() {
        let light = Light {
            spot_exponent: 8.0,
            spot_cutoff: 60.0,
            ..Light::default()
        };
        let spot = light_value(&light, LightField::SpotDirection);
        assert_eq!(spot, Vec4::new(0.0, 0.0, -1.0, 8.0));
        let attenuation = light_value(&light, LightField::Attenuation);
        assert!((attenuation.w - 0.5).abs() < 1e-6);
    }
}
