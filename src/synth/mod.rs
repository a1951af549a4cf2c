//! Source Synthesizer
//!
//! Turns a [`VariantKey`] into WGSL source for the vertex and fragment stages.
//!
//! The stage templates (`src/shaders/ffp_vertex.wgsl`, `ffp_fragment.wgsl`) hold
//! the fixed skeleton. Everything that varies per key is computed here into a
//! serializable context: the uniform struct from the [`ParameterManifest`], the
//! vertex inputs and varyings, and per-stage code blocks built by
//! [`fragments`].
//!
//! Synthesis is a pure function of the key: identical keys produce byte-identical
//! source, which is what makes the persistent store's hash meaningful.

pub mod fragments;
pub mod params;
pub mod template;

use serde::Serialize;

use crate::backend::ShaderStage;
use crate::errors::Result;
use crate::mask::VariantKey;
use crate::state::{AttribFormat, FixedPointAttributes, TexEnvMode, VertexAttribute};

pub use params::{LightField, ParamBlock, ParamId, ParameterManifest, vertex_attributes};

const VERTEX_TEMPLATE: &str = "ffp_vertex";
const FRAGMENT_TEMPLATE: &str = "ffp_fragment";

/// Synthesized source text of both stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSource {
    pub vertex: String,
    pub fragment: String,
}

impl SynthesizedSource {
    #[must_use]
    pub fn get(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }
}

// ─── Template Contexts ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct UniformDecl {
    name: String,
    ty: &'static str,
}

#[derive(Serialize)]
struct AttributeDecl {
    location: usize,
    name: String,
    ty: String,
    read: String,
}

#[derive(Serialize)]
struct VaryingDecl {
    location: usize,
    name: &'static str,
    ty: &'static str,
}

#[derive(Serialize)]
struct VertexContext<'a> {
    uniforms: &'a [UniformDecl],
    attributes: Vec<AttributeDecl>,
    varyings: &'a [VaryingDecl],
    fixed_point: bool,
    clip_count: usize,
    eye_space: bool,
    lit: bool,
    normalize: bool,
    vertex_lighting: bool,
    per_pixel: bool,
    lights: &'a [String],
    has_color: bool,
    stage_count: usize,
    fog: bool,
}

#[derive(Serialize)]
struct FragmentContext<'a> {
    uniforms: &'a [UniformDecl],
    varyings: &'a [VaryingDecl],
    stage_count: usize,
    pixel_lighting: bool,
    normalize: bool,
    lights: &'a [String],
    color_varying: bool,
    stages: Vec<Vec<String>>,
    fog_factor: Option<String>,
    alpha_discard: Option<String>,
}

// ─── Synthesis ───────────────────────────────────────────────────────────────

/// Synthesizes both stages for `key`.
pub fn synthesize(key: &VariantKey) -> Result<SynthesizedSource> {
    let feature = key.feature;
    let manifest = ParameterManifest::for_key(key);

    let uniforms_for = |stage: ShaderStage| -> Vec<UniformDecl> {
        manifest
            .for_stage(stage)
            .map(|id| UniformDecl {
                name: id.name(),
                ty: id.wgsl_type(),
            })
            .collect()
    };
    let vertex_uniforms = uniforms_for(ShaderStage::Vertex);
    let fragment_uniforms = uniforms_for(ShaderStage::Fragment);

    let varyings = varyings(key);
    let lights: Vec<String> = (0..feature.light_count())
        .map(fragments::light_constructor)
        .collect();

    let fixed = feature.fixed_point();
    let attributes = vertex_attributes(key)
        .into_iter()
        .enumerate()
        .map(|(location, attribute)| {
            let format = if fixed.intersects(fixed_point_bit(attribute)) {
                AttribFormat::Fixed
            } else {
                AttribFormat::Float
            };
            AttributeDecl {
                location,
                name: attribute.name(),
                ty: fragments::attribute_type(attribute, format),
                read: fragments::attribute_read(attribute, format),
            }
        })
        .collect();

    let vertex_lighting = feature.is_lit() && !feature.per_pixel_lighting();

    let vertex_ctx = VertexContext {
        uniforms: &vertex_uniforms,
        attributes,
        varyings: &varyings,
        fixed_point: !fixed.is_empty(),
        clip_count: feature.clip_plane_count(),
        eye_space: feature.needs_eye_space(),
        lit: feature.is_lit(),
        normalize: feature.normalize(),
        vertex_lighting,
        per_pixel: feature.per_pixel_lighting(),
        lights: &lights,
        has_color: feature.has_vertex_color(),
        stage_count: feature.stage_count(),
        fog: feature.fog_mode().is_some(),
    };

    let stages = (0..feature.stage_count())
        .map(|stage| match feature.env_mode(stage) {
            TexEnvMode::Combine => fragments::combine_block(stage, &key.combiner.stage(stage)),
            mode => fragments::env_mode_block(stage, mode),
        })
        .collect();

    let fragment_ctx = FragmentContext {
        uniforms: &fragment_uniforms,
        varyings: &varyings,
        stage_count: feature.stage_count(),
        pixel_lighting: feature.per_pixel_lighting(),
        normalize: feature.normalize(),
        lights: &lights,
        color_varying: vertex_lighting || feature.has_vertex_color(),
        stages,
        fog_factor: feature.fog_mode().map(fragments::fog_factor_expr),
        alpha_discard: fragments::alpha_discard_condition(feature.alpha_func()),
    };

    let env = template::environment();
    let vertex = env.get_template(VERTEX_TEMPLATE)?.render(&vertex_ctx)?;
    let fragment = env.get_template(FRAGMENT_TEMPLATE)?.render(&fragment_ctx)?;

    Ok(SynthesizedSource {
        vertex: format!("// === Fixed-function vertex program {key} ===\n{vertex}"),
        fragment: format!("// === Fixed-function fragment program {key} ===\n{fragment}"),
    })
}

/// Interpolants passed from the vertex to the fragment program, in location order.
fn varyings(key: &VariantKey) -> Vec<VaryingDecl> {
    const TEXCOORD_NAMES: [&str; 4] = ["texcoord0", "texcoord1", "texcoord2", "texcoord3"];

    let feature = key.feature;
    let mut out = Vec::new();
    let mut push = |name: &'static str, ty: &'static str| {
        let location = out.len();
        out.push(VaryingDecl { location, name, ty });
    };

    if (feature.is_lit() && !feature.per_pixel_lighting()) || feature.has_vertex_color() {
        push("color", "vec4<f32>");
    }
    for name in TEXCOORD_NAMES.into_iter().take(feature.stage_count()) {
        push(name, "vec4<f32>");
    }
    if feature.fog_mode().is_some() {
        push("fog_distance", "f32");
    }
    if feature.per_pixel_lighting() {
        push("eye_position", "vec3<f32>");
        push("eye_normal", "vec3<f32>");
        push("mat_diffuse", "vec4<f32>");
        push("mat_specular", "vec4<f32>");
        push("mat_emissive", "vec4<f32>");
    }
    out
}

fn fixed_point_bit(attribute: VertexAttribute) -> FixedPointAttributes {
    match attribute {
        VertexAttribute::Position => FixedPointAttributes::POSITION,
        VertexAttribute::Normal => FixedPointAttributes::NORMAL,
        VertexAttribute::Color => FixedPointAttributes::COLOR,
        VertexAttribute::TexCoord(unit) => FixedPointAttributes::texcoord(usize::from(unit)),
        VertexAttribute::Diffuse | VertexAttribute::Specular | VertexAttribute::Emissive => {
            FixedPointAttributes::empty()
        }
    }
}
