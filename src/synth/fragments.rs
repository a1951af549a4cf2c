//! Typed WGSL Fragments
//!
//! Small functions returning source segments for the parts of a variant that
//! depend on per-stage or per-mode data: attribute reads, texture environment
//! blocks, combiner passes, the fog factor and the alpha-test condition. The
//! stage templates only splice these segments in.
//!
//! Names used by the segments (`previous`, `primary`, `texN`, `u`, `in`) are
//! the locals and bindings declared by `ffp_fragment.wgsl`.

use crate::state::{
    AttribFormat, Channel, CombineChannel, CombineConfig, CombineFunc, CombineOperand,
    CombineSource, CompareFunc, FogMode, TexEnvMode, VertexAttribute,
};

const FIXED_SCALE: &str = "FFP_FIXED_SCALE";

// ─── Vertex Inputs ───────────────────────────────────────────────────────────

/// Component count of an attribute stream.
fn attribute_width(attribute: VertexAttribute) -> usize {
    match attribute {
        VertexAttribute::Normal => 3,
        _ => 4,
    }
}

fn vector_type(width: usize, scalar: &str) -> String {
    format!("vec{width}<{scalar}>")
}

/// WGSL type of the vertex input for `attribute`.
#[must_use]
pub fn attribute_type(attribute: VertexAttribute, format: AttribFormat) -> String {
    let scalar = match format {
        AttribFormat::Float => "f32",
        AttribFormat::Fixed => "i32",
    };
    vector_type(attribute_width(attribute), scalar)
}

/// Expression converting the raw input into a float vector.
#[must_use]
pub fn attribute_read(attribute: VertexAttribute, format: AttribFormat) -> String {
    let name = attribute.name();
    match format {
        AttribFormat::Float => format!("in.{name}"),
        AttribFormat::Fixed => format!(
            "{}(in.{name}) * {FIXED_SCALE}",
            vector_type(attribute_width(attribute), "f32")
        ),
    }
}

// ─── Lighting ────────────────────────────────────────────────────────────────

/// `FfpLight` constructor reading light slot `slot` from the uniform block.
#[must_use]
pub fn light_constructor(slot: usize) -> String {
    format!(
        "FfpLight(u.light{slot}_ambient, u.light{slot}_diffuse, u.light{slot}_specular, \
         u.light{slot}_position, u.light{slot}_spot_direction, u.light{slot}_attenuation)"
    )
}

// ─── Texture Environment ─────────────────────────────────────────────────────

/// Statements applying a classic environment mode to `previous`.
#[must_use]
pub fn env_mode_block(stage: usize, mode: TexEnvMode) -> Vec<String> {
    let tex = format!("tex{stage}");
    let line = match mode {
        TexEnvMode::Modulate => format!("previous = previous * {tex};"),
        TexEnvMode::Decal => {
            format!("previous = vec4<f32>(mix(previous.rgb, {tex}.rgb, {tex}.a), previous.a);")
        }
        TexEnvMode::Blend => format!(
            "previous = vec4<f32>(mix(previous.rgb, u.tex_env_color{stage}.rgb, {tex}.rgb), \
             previous.a * {tex}.a);"
        ),
        TexEnvMode::Add => format!(
            "previous = vec4<f32>(min(previous.rgb + {tex}.rgb, vec3<f32>(1.0)), previous.a * {tex}.a);"
        ),
        TexEnvMode::Replace => format!("previous = {tex};"),
        TexEnvMode::Combine => return combine_block(stage, &CombineConfig::default()),
    };
    vec![line]
}

// ─── Combiner ────────────────────────────────────────────────────────────────

/// Expression naming a combiner source for `stage`.
#[must_use]
pub fn source_expr(source: CombineSource, stage: usize) -> String {
    match source {
        CombineSource::Texture => format!("tex{stage}"),
        CombineSource::Constant => format!("u.tex_env_color{stage}"),
        CombineSource::PrimaryColor => "primary".to_string(),
        CombineSource::Previous => "previous".to_string(),
    }
}

/// Applies an operand read-mode to a source expression.
#[must_use]
pub fn operand_expr(operand: CombineOperand, source: &str, channel: Channel) -> String {
    match (channel, operand) {
        (Channel::Rgb, CombineOperand::SrcColor) => format!("{source}.rgb"),
        (Channel::Rgb, CombineOperand::OneMinusSrcColor) => {
            format!("(vec3<f32>(1.0) - {source}.rgb)")
        }
        (Channel::Rgb, CombineOperand::SrcAlpha) => format!("vec3<f32>({source}.a)"),
        (Channel::Rgb, CombineOperand::OneMinusSrcAlpha) => {
            format!("vec3<f32>(1.0 - {source}.a)")
        }
        (Channel::Alpha, CombineOperand::SrcColor | CombineOperand::SrcAlpha) => {
            format!("{source}.a")
        }
        (Channel::Alpha, CombineOperand::OneMinusSrcColor | CombineOperand::OneMinusSrcAlpha) => {
            format!("(1.0 - {source}.a)")
        }
    }
}

/// Substitutes operand expressions into the combine function's formula.
#[must_use]
pub fn combine_expr(func: CombineFunc, args: &[String; 3]) -> String {
    let [a, b, c] = args;
    match func {
        CombineFunc::Replace => a.clone(),
        CombineFunc::Modulate => format!("({a} * {b})"),
        CombineFunc::Add => format!("({a} + {b})"),
        CombineFunc::AddSigned => format!("({a} + {b} - 0.5)"),
        // a * c + b * (1 - c)
        CombineFunc::Interpolate => format!("mix({b}, {a}, {c})"),
        CombineFunc::Subtract => format!("({a} - {b})"),
    }
}

fn channel_expr(stage: usize, channel: &CombineChannel, kind: Channel) -> String {
    let mut args: [String; 3] = Default::default();
    for (arg, slot) in args.iter_mut().enumerate().take(channel.func.arg_count()) {
        let source = source_expr(channel.sources[arg], stage);
        *slot = operand_expr(channel.operands[arg], &source, kind);
    }
    combine_expr(channel.func, &args)
}

/// Statements evaluating one combiner pass into `previous`, followed by the
/// stage's RGB/alpha scale and a clamp to `[0, 1]`.
#[must_use]
pub fn combine_block(stage: usize, config: &CombineConfig) -> Vec<String> {
    let rgb = channel_expr(stage, &config.rgb, Channel::Rgb);
    let alpha = channel_expr(stage, &config.alpha, Channel::Alpha);
    vec![
        format!(
            "let rgb{stage} = clamp({rgb} * u.tex_env_scale{stage}.x, vec3<f32>(0.0), vec3<f32>(1.0));"
        ),
        format!("let alpha{stage} = clamp({alpha} * u.tex_env_scale{stage}.y, 0.0, 1.0);"),
        format!("previous = vec4<f32>(rgb{stage}, alpha{stage});"),
    ]
}

// ─── Fog ─────────────────────────────────────────────────────────────────────

/// Fog blend factor expression over the `fog_distance` varying.
///
/// `u.fog_params` packs `(start, end, density, 1 / (end - start))`; a zero scale
/// means `start == end`, for which linear fog is a no-op.
#[must_use]
pub fn fog_factor_expr(mode: FogMode) -> String {
    let d = "in.fog_distance";
    let f = match mode {
        FogMode::Linear => format!(
            "select((u.fog_params.y - {d}) * u.fog_params.w, 1.0, u.fog_params.w == 0.0)"
        ),
        FogMode::Exp => format!("exp(-u.fog_params.z * {d})"),
        FogMode::Exp2 => format!("exp(-(u.fog_params.z * {d}) * (u.fog_params.z * {d}))"),
    };
    format!("clamp({f}, 0.0, 1.0)")
}

// ─── Alpha Test ──────────────────────────────────────────────────────────────

/// Condition under which a fragment is discarded, `None` if it never is.
#[must_use]
pub fn alpha_discard_condition(func: CompareFunc) -> Option<String> {
    let op = match func {
        CompareFunc::Always => return None,
        CompareFunc::Never => return Some("true".to_string()),
        CompareFunc::Less => "<",
        CompareFunc::Equal => "==",
        CompareFunc::LessEqual => "<=",
        CompareFunc::Greater => ">",
        CompareFunc::NotEqual => "!=",
        CompareFunc::GreaterEqual => ">=",
    };
    Some(format!("!(color.a {op} u.alpha_ref.x)"))
}
