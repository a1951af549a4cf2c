//! Live Fixed-Function State
//!
//! [`FixedFunctionState`] is the single explicit configuration struct holding the
//! current value of every fixed-function setting. Mask computation reads it by
//! shared reference and never mutates it, so two reads of an unchanged state
//! always produce the same variant key.
//!
//! The state itself is plain data. Dirty tracking happens one level up in
//! [`FixedFunctionContext`](crate::context::FixedFunctionContext), whose mutators
//! update this struct and mark the relevant upload flags.

pub mod blend;
pub mod lighting;
pub mod texture;

use bitflags::bitflags;
use glam::{Mat4, Vec4};

pub use blend::{BlendConfig, BlendEquation, BlendFactor};
pub use lighting::{Light, LightingState, MAX_LIGHTS, Material};
pub use texture::{
    Channel, CombineChannel, CombineConfig, CombineFunc, CombineOperand, CombineSource,
    MAX_TEXTURE_UNITS, TexEnvMode, TextureUnit,
};

/// Number of user clip planes exposed by the emulated pipeline.
pub const MAX_CLIP_PLANES: usize = 6;

// ============================================================================
// Alpha Test
// ============================================================================

/// Comparison function of the alpha test.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    #[default]
    Always = 7,
}

impl CompareFunc {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Never,
            1 => Self::Less,
            2 => Self::Equal,
            3 => Self::LessEqual,
            4 => Self::Greater,
            5 => Self::NotEqual,
            6 => Self::GreaterEqual,
            _ => Self::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaTestState {
    pub enabled: bool,
    pub func: CompareFunc,
    pub reference: f32,
}

impl Default for AlphaTestState {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunc::Always,
            reference: 0.0,
        }
    }
}

impl AlphaTestState {
    /// The comparison the fragment program has to perform.
    /// A disabled test is equivalent to `Always`.
    #[inline]
    #[must_use]
    pub fn effective_func(&self) -> CompareFunc {
        if self.enabled {
            self.func
        } else {
            CompareFunc::Always
        }
    }
}

// ============================================================================
// Fog
// ============================================================================

/// Fog equation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogMode {
    Linear = 1,
    #[default]
    Exp = 2,
    Exp2 = 3,
}

impl FogMode {
    pub(crate) fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Linear),
            2 => Some(Self::Exp),
            3 => Some(Self::Exp2),
            _ => None,
        }
    }

    /// Fog blend factor for eye distance `z`, clamped into `[0, 1]`.
    ///
    /// `1` keeps the fragment color, `0` yields the fog color.
    #[must_use]
    pub fn blend_factor(self, start: f32, end: f32, density: f32, z: f32) -> f32 {
        let f = match self {
            Self::Linear => {
                if end == start {
                    1.0
                } else {
                    (end - z) / (end - start)
                }
            }
            Self::Exp => (-density * z).exp(),
            Self::Exp2 => {
                let dz = density * z;
                (-(dz * dz)).exp()
            }
        };
        f.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogState {
    pub enabled: bool,
    pub mode: FogMode,
    pub color: Vec4,
    pub start: f32,
    pub end: f32,
    pub density: f32,
}

impl Default for FogState {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: FogMode::Exp,
            color: Vec4::ZERO,
            start: 0.0,
            end: 1.0,
            density: 1.0,
        }
    }
}

impl FogState {
    #[inline]
    #[must_use]
    pub fn effective_mode(&self) -> Option<FogMode> {
        self.enabled.then_some(self.mode)
    }

    /// Packed `(start, end, density, 1 / (end - start))` as uploaded to the GPU.
    #[must_use]
    pub fn packed_params(&self) -> Vec4 {
        let range = self.end - self.start;
        let scale = if range == 0.0 { 0.0 } else { 1.0 / range };
        Vec4::new(self.start, self.end, self.density, scale)
    }
}

// ============================================================================
// Clip Planes, Shading, Transforms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipPlane {
    pub enabled: bool,
    /// Eye-space plane equation.
    pub equation: Vec4,
}

/// Where lighting is evaluated.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadeModel {
    /// Per-vertex lighting, interpolated.
    #[default]
    Smooth = 0,
    /// Per-fragment lighting.
    PerPixel = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    ModelView,
    Projection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
    pub model_view: Mat4,
    pub projection: Mat4,
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl Transforms {
    #[inline]
    #[must_use]
    pub fn get(&self, mode: MatrixMode) -> &Mat4 {
        match mode {
            MatrixMode::ModelView => &self.model_view,
            MatrixMode::Projection => &self.projection,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, mode: MatrixMode) -> &mut Mat4 {
        match mode {
            MatrixMode::ModelView => &mut self.model_view,
            MatrixMode::Projection => &mut self.projection,
        }
    }
}

// ============================================================================
// Vertex Arrays
// ============================================================================

/// Component encoding of a client vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttribFormat {
    #[default]
    Float,
    /// 16.16 signed fixed point.
    Fixed,
}

/// Client vertex arrays that can be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientArray {
    Position,
    Normal,
    Color,
    TexCoord(usize),
}

bitflags! {
    /// Vertex attributes that arrive as fixed point rather than floating point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FixedPointAttributes: u8 {
        const POSITION  = 1 << 0;
        const NORMAL    = 1 << 1;
        const COLOR     = 1 << 2;
        const TEXCOORD0 = 1 << 3;
        const TEXCOORD1 = 1 << 4;
        const TEXCOORD2 = 1 << 5;
        const TEXCOORD3 = 1 << 6;
    }
}

impl FixedPointAttributes {
    #[inline]
    #[must_use]
    pub fn texcoord(unit: usize) -> Self {
        debug_assert!(unit < MAX_TEXTURE_UNITS);
        Self::from_bits_truncate(Self::TEXCOORD0.bits() << unit)
    }
}

/// Format of every client array; `None` means the array is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexArrays {
    pub position: AttribFormat,
    pub normal: Option<AttribFormat>,
    pub color: Option<AttribFormat>,
    pub texcoords: [Option<AttribFormat>; MAX_TEXTURE_UNITS],
}

impl VertexArrays {
    #[must_use]
    pub fn get(&self, array: ClientArray) -> Option<AttribFormat> {
        match array {
            ClientArray::Position => Some(self.position),
            ClientArray::Normal => self.normal,
            ClientArray::Color => self.color,
            ClientArray::TexCoord(unit) => self.texcoords.get(unit).copied().flatten(),
        }
    }
}

/// A vertex attribute consumed by a variant's vertex program, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    TexCoord(u8),
    Color,
    Diffuse,
    Specular,
    Emissive,
    Normal,
}

impl VertexAttribute {
    /// Identifier used for the attribute in synthesized source.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Position => "position".to_string(),
            Self::TexCoord(unit) => format!("texcoord{unit}"),
            Self::Color => "color".to_string(),
            Self::Diffuse => "mat_diffuse".to_string(),
            Self::Specular => "mat_specular".to_string(),
            Self::Emissive => "mat_emissive".to_string(),
            Self::Normal => "normal".to_string(),
        }
    }
}

// ============================================================================
// FixedFunctionState
// ============================================================================

/// The complete live fixed-function configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    pub alpha_test: AlphaTestState,
    pub fog: FogState,
    pub lighting: LightingState,
    pub shade_model: ShadeModel,
    /// `GL_NORMALIZE`.
    pub normalize: bool,
    pub clip_planes: [ClipPlane; MAX_CLIP_PLANES],
    pub texture_units: [TextureUnit; MAX_TEXTURE_UNITS],
    pub vertex_arrays: VertexArrays,
    /// Current color, used as the tint when no color array is enabled.
    pub color: Vec4,
    pub transforms: Transforms,
    pub blend: BlendConfig,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            alpha_test: AlphaTestState::default(),
            fog: FogState::default(),
            lighting: LightingState::default(),
            shade_model: ShadeModel::Smooth,
            normalize: false,
            clip_planes: [ClipPlane::default(); MAX_CLIP_PLANES],
            texture_units: [TextureUnit::default(); MAX_TEXTURE_UNITS],
            vertex_arrays: VertexArrays::default(),
            color: Vec4::ONE,
            transforms: Transforms::default(),
            blend: BlendConfig::default(),
        }
    }
}

impl FixedFunctionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contiguous enabled texture units starting at unit 0.
    #[must_use]
    pub fn active_stage_count(&self) -> usize {
        self.texture_units
            .iter()
            .take_while(|unit| unit.enabled)
            .count()
    }

    /// Enabled clip planes in index order. These occupy shader slots `0..n`.
    pub fn active_clip_planes(&self) -> impl Iterator<Item = &ClipPlane> {
        self.clip_planes.iter().filter(|plane| plane.enabled)
    }

    #[must_use]
    pub fn active_clip_plane_count(&self) -> usize {
        self.active_clip_planes().count()
    }

    #[inline]
    #[must_use]
    pub fn has_vertex_color(&self) -> bool {
        self.vertex_arrays.color.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_fog_at_unit_distance() {
        let f = FogMode::Exp.blend_factor(0.0, 1.0, 1.0, 1.0);
        assert!((f - (-1.0f32).exp()).abs() < 1e-6);
        assert!((f - 0.3679).abs() < 1e-4);
    }

    #[test]
    fn fog_factor_is_clamped() {
        assert_eq!(FogMode::Linear.blend_factor(10.0, 20.0, 1.0, 0.0), 1.0);
        assert_eq!(FogMode::Linear.blend_factor(10.0, 20.0, 1.0, 30.0), 0.0);
        assert!((FogMode::Linear.blend_factor(10.0, 20.0, 1.0, 15.0) - 0.5).abs() < 1e-6);
        assert_eq!(FogMode::Exp.blend_factor(0.0, 1.0, -1.0, 5.0), 1.0);
    }

    #[test]
    fn exp2_fog() {
        let f = FogMode::Exp2.blend_factor(0.0, 1.0, 0.5, 2.0);
        assert!((f - (-1.0f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn stage_count_stops_at_first_disabled_unit() {
        let mut state = FixedFunctionState::new();
        state.texture_units[0].enabled = true;
        state.texture_units[2].enabled = true;
        assert_eq!(state.active_stage_count(), 1);

        state.texture_units[1].enabled = true;
        assert_eq!(state.active_stage_count(), 3);
    }

    #[test]
    fn fixed_point_texcoord_bits() {
        assert_eq!(
            FixedPointAttributes::texcoord(0),
            FixedPointAttributes::TEXCOORD0
        );
        assert_eq!(
            FixedPointAttributes::texcoord(3),
            FixedPointAttributes::TEXCOORD3
        );
    }
}
