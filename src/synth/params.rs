//! Uniform Parameter Manifest
//!
//! Every uniform a synthesized program can declare is named by a [`ParamId`].
//! [`ParameterManifest::for_key`] decides, purely from the variant key, which
//! program declares which parameter. The synthesizer emits exactly the manifest's
//! parameters and the variant resolves exactly these through the registrar, so the
//! two can never disagree.

use std::fmt;

use smallvec::SmallVec;

use crate::backend::ShaderStage;
use crate::mask::VariantKey;
use crate::state::{CombineSource, CompareFunc, TexEnvMode, VertexAttribute};

/// Component of a light source uploaded as one `vec4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightField {
    Ambient,
    Diffuse,
    Specular,
    /// Eye-space position.
    Position,
    /// `xyz` direction, `w` spot exponent.
    SpotDirection,
    /// `xyz` constant/linear/quadratic attenuation, `w` cosine of the spot cutoff.
    Attenuation,
}

impl LightField {
    pub const ALL: [Self; 6] = [
        Self::Ambient,
        Self::Diffuse,
        Self::Specular,
        Self::Position,
        Self::SpotDirection,
        Self::Attenuation,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Diffuse => "diffuse",
            Self::Specular => "specular",
            Self::Position => "position",
            Self::SpotDirection => "spot_direction",
            Self::Attenuation => "attenuation",
        }
    }
}

/// Dirty-tracking block a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamBlock {
    /// Transforms and clip planes.
    Vertex,
    /// Colors, lights, fog, alpha reference and texture environment.
    Fragment,
}

/// A uniform parameter of a synthesized program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    Wvp,
    ModelView,
    NormalMatrix,
    ClipPlane(u8),
    LightModelAmbient,
    Light(u8, LightField),
    MaterialShininess,
    FogColor,
    /// `(start, end, density, 1 / (end - start))`.
    FogParams,
    AlphaRef,
    TexEnvColor(u8),
    /// `(rgb_scale, alpha_scale, 0, 0)`.
    TexEnvScale(u8),
    TintColor,
}

impl ParamId {
    /// Stable field name in the synthesized uniform struct.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Wvp => "wvp".to_string(),
            Self::ModelView => "model_view".to_string(),
            Self::NormalMatrix => "normal_matrix".to_string(),
            Self::ClipPlane(i) => format!("clip_plane{i}"),
            Self::LightModelAmbient => "light_model_ambient".to_string(),
            Self::Light(i, field) => format!("light{i}_{}", field.suffix()),
            Self::MaterialShininess => "material_shininess".to_string(),
            Self::FogColor => "fog_color".to_string(),
            Self::FogParams => "fog_params".to_string(),
            Self::AlphaRef => "alpha_ref".to_string(),
            Self::TexEnvColor(i) => format!("tex_env_color{i}"),
            Self::TexEnvScale(i) => format!("tex_env_scale{i}"),
            Self::TintColor => "tint_color".to_string(),
        }
    }

    #[must_use]
    pub fn block(self) -> ParamBlock {
        match self {
            Self::Wvp | Self::ModelView | Self::NormalMatrix | Self::ClipPlane(_) => {
                ParamBlock::Vertex
            }
            _ => ParamBlock::Fragment,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_matrix(self) -> bool {
        matches!(self, Self::Wvp | Self::ModelView | Self::NormalMatrix)
    }

    #[must_use]
    pub fn wgsl_type(self) -> &'static str {
        if self.is_matrix() {
            "mat4x4<f32>"
        } else {
            "vec4<f32>"
        }
    }

    /// Number of floats the value occupies.
    #[inline]
    #[must_use]
    pub fn float_count(self) -> usize {
        if self.is_matrix() { 16 } else { 4 }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Which program declares each parameter of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterManifest {
    entries: SmallVec<[(ParamId, ShaderStage); 32]>,
}

impl ParameterManifest {
    #[must_use]
    pub fn for_key(key: &VariantKey) -> Self {
        let feature = key.feature;
        let mut entries: SmallVec<[(ParamId, ShaderStage); 32]> = SmallVec::new();
        let mut push = |id: ParamId, stage: ShaderStage| entries.push((id, stage));

        // Vertex program
        push(ParamId::Wvp, ShaderStage::Vertex);
        if feature.needs_eye_space() {
            push(ParamId::ModelView, ShaderStage::Vertex);
        }
        if feature.is_lit() {
            push(ParamId::NormalMatrix, ShaderStage::Vertex);
        }
        for i in 0..feature.clip_plane_count() {
            push(ParamId::ClipPlane(i as u8), ShaderStage::Vertex);
        }

        // Lighting lives where it is evaluated.
        if feature.is_lit() {
            let stage = if feature.per_pixel_lighting() {
                ShaderStage::Fragment
            } else {
                ShaderStage::Vertex
            };
            push(ParamId::LightModelAmbient, stage);
            for i in 0..feature.light_count() {
                for field in LightField::ALL {
                    push(ParamId::Light(i as u8, field), stage);
                }
            }
            push(ParamId::MaterialShininess, stage);
        }

        // Fragment program
        if feature.fog_mode().is_some() {
            push(ParamId::FogColor, ShaderStage::Fragment);
            push(ParamId::FogParams, ShaderStage::Fragment);
        }
        if !matches!(feature.alpha_func(), CompareFunc::Always | CompareFunc::Never) {
            push(ParamId::AlphaRef, ShaderStage::Fragment);
        }
        for stage in 0..feature.stage_count() {
            let unit = stage as u8;
            match feature.env_mode(stage) {
                TexEnvMode::Blend => push(ParamId::TexEnvColor(unit), ShaderStage::Fragment),
                TexEnvMode::Combine => {
                    if key.combiner.stage(stage).reads(CombineSource::Constant) {
                        push(ParamId::TexEnvColor(unit), ShaderStage::Fragment);
                    }
                    push(ParamId::TexEnvScale(unit), ShaderStage::Fragment);
                }
                _ => {}
            }
        }
        push(ParamId::TintColor, ShaderStage::Fragment);

        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, ShaderStage)> + '_ {
        self.entries.iter().copied()
    }

    /// Parameters declared by `stage`, in declaration order.
    pub fn for_stage(&self, stage: ShaderStage) -> impl Iterator<Item = ParamId> + '_ {
        self.entries
            .iter()
            .filter(move |(_, s)| *s == stage)
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn stage_of(&self, id: ParamId) -> Option<ShaderStage> {
        self.entries
            .iter()
            .find_map(|&(param, stage)| (param == id).then_some(stage))
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: ParamId) -> bool {
        self.stage_of(id).is_some()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered vertex attributes a variant's vertex program consumes.
///
/// Position, one texcoord set per active stage, the color array when present, and
/// the material colors and normal when lighting is active.
#[must_use]
pub fn vertex_attributes(key: &VariantKey) -> SmallVec<[VertexAttribute; 12]> {
    let feature = key.feature;
    let mut attributes = SmallVec::new();
    attributes.push(VertexAttribute::Position);
    for unit in 0..feature.stage_count() {
        attributes.push(VertexAttribute::TexCoord(unit as u8));
    }
    if feature.has_vertex_color() {
        attributes.push(VertexAttribute::Color);
    }
    if feature.is_lit() {
        attributes.extend([
            VertexAttribute::Diffuse,
            VertexAttribute::Specular,
            VertexAttribute::Emissive,
            VertexAttribute::Normal,
        ]);
    }
    attributes
}
