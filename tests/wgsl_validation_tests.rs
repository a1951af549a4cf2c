//! Generated WGSL Validation Tests
//!
//! Parses and validates both synthesized stages with naga across a sweep of
//! fixed-function states:
//! - Texture environment modes and combiner functions, sources and operands
//! - Fog modes
//! - Lighting with smooth and per-pixel shading, normalize and spot lights
//! - User clip planes
//! - Alpha test functions
//! - Fixed-point vertex attributes

use glam::Vec4;
use myth_ffp::state::{
    AttribFormat, CombineFunc, CombineOperand, CombineSource, CompareFunc, FogMode,
    MAX_CLIP_PLANES, MAX_LIGHTS, MAX_TEXTURE_UNITS, ShadeModel, TexEnvMode,
};
use myth_ffp::{FixedFunctionState, VariantKey, synthesize};

fn validate(label: &str, state: &FixedFunctionState) {
    let key = VariantKey::compute(state);
    let source = synthesize(&key).unwrap_or_else(|e| panic!("{label}: synthesis failed: {e}"));

    for (stage, wgsl) in [("vertex", &source.vertex), ("fragment", &source.fragment)] {
        let module = naga::front::wgsl::parse_str(wgsl)
            .unwrap_or_else(|e| panic!("{label} {stage}: {}\n{wgsl}", e.emit_to_string(wgsl)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("{label} {stage}: {e:?}\n{wgsl}"));
    }
}

fn textured(units: usize) -> FixedFunctionState {
    let mut state = FixedFunctionState::new();
    for unit in 0..units {
        state.texture_units[unit].enabled = true;
        state.vertex_arrays.texcoords[unit] = Some(AttribFormat::Float);
    }
    state
}

fn lit(lights: usize) -> FixedFunctionState {
    let mut state = FixedFunctionState::new();
    state.lighting.enabled = true;
    state.vertex_arrays.normal = Some(AttribFormat::Float);
    for light in &mut state.lighting.lights[..lights] {
        light.enabled = true;
    }
    state
}

// ============================================================================
// Texturing
// ============================================================================

#[test]
fn default_state_validates() {
    validate("default", &FixedFunctionState::new());
}

#[test]
fn every_env_mode_validates() {
    let modes = [
        TexEnvMode::Modulate,
        TexEnvMode::Decal,
        TexEnvMode::Blend,
        TexEnvMode::Add,
        TexEnvMode::Replace,
        TexEnvMode::Combine,
    ];
    for mode in modes {
        let mut state = textured(1);
        state.texture_units[0].env_mode = mode;
        validate(&format!("env {mode:?}"), &state);

        // Same mode on every unit, with a vertex color to modulate.
        let mut state = textured(MAX_TEXTURE_UNITS);
        state.vertex_arrays.color = Some(AttribFormat::Float);
        for unit in &mut state.texture_units {
            unit.env_mode = mode;
        }
        validate(&format!("env {mode:?} x{MAX_TEXTURE_UNITS}"), &state);
    }
}

#[test]
fn every_combine_function_validates() {
    let funcs = [
        CombineFunc::Replace,
        CombineFunc::Modulate,
        CombineFunc::Add,
        CombineFunc::AddSigned,
        CombineFunc::Interpolate,
        CombineFunc::Subtract,
    ];
    for rgb in funcs {
        for alpha in funcs {
            let mut state = textured(2);
            for unit in &mut state.texture_units[..2] {
                unit.env_mode = TexEnvMode::Combine;
                unit.combine.rgb.func = rgb;
                unit.combine.alpha.func = alpha;
            }
            validate(&format!("combine {rgb:?}/{alpha:?}"), &state);
        }
    }
}

#[test]
fn every_combine_source_and_operand_validates() {
    let sources = [
        CombineSource::Texture,
        CombineSource::Constant,
        CombineSource::PrimaryColor,
        CombineSource::Previous,
    ];
    let operands = [
        CombineOperand::SrcColor,
        CombineOperand::OneMinusSrcColor,
        CombineOperand::SrcAlpha,
        CombineOperand::OneMinusSrcAlpha,
    ];
    for source in sources {
        for operand in operands {
            let mut state = textured(2);
            let unit = &mut state.texture_units[1];
            unit.env_mode = TexEnvMode::Combine;
            unit.combine.rgb.func = CombineFunc::Interpolate;
            unit.combine.rgb.sources = [source; 3];
            unit.combine.rgb.operands = [operand; 3];
            unit.combine.alpha.func = CombineFunc::Interpolate;
            unit.combine.alpha.sources = [source; 3];
            unit.combine.alpha.operands = [operand; 3];
            unit.env_color = Vec4::new(0.25, 0.5, 0.75, 1.0);
            unit.rgb_scale = 2.0;
            unit.alpha_scale = 4.0;
            validate(&format!("source {source:?} operand {operand:?}"), &state);
        }
    }
}

// ============================================================================
// Fog
// ============================================================================

#[test]
fn every_fog_mode_validates() {
    for mode in [FogMode::Linear, FogMode::Exp, FogMode::Exp2] {
        let mut state = textured(1);
        state.fog.enabled = true;
        state.fog.mode = mode;
        validate(&format!("fog {mode:?}"), &state);
    }
}

// ============================================================================
// Lighting
// ============================================================================

#[test]
fn lighting_validates_in_both_shade_models() {
    for shade_model in [ShadeModel::Smooth, ShadeModel::PerPixel] {
        for lights in [1, 3, MAX_LIGHTS] {
            for normalize in [false, true] {
                let mut state = lit(lights);
                state.shade_model = shade_model;
                state.normalize = normalize;
                state.lighting.lights[0].position = Vec4::new(1.0, 2.0, 3.0, 1.0);
                state.lighting.lights[0].spot_cutoff = 30.0;
                validate(
                    &format!("{shade_model:?} lights={lights} normalize={normalize}"),
                    &state,
                );
            }
        }
    }
}

#[test]
fn lit_textured_fogged_state_validates() {
    let mut state = lit(2);
    state.shade_model = ShadeModel::PerPixel;
    for unit in 0..2 {
        state.texture_units[unit].enabled = true;
        state.vertex_arrays.texcoords[unit] = Some(AttribFormat::Float);
    }
    state.texture_units[1].env_mode = TexEnvMode::Combine;
    state.fog.enabled = true;
    state.fog.mode = FogMode::Exp2;
    state.alpha_test.enabled = true;
    state.alpha_test.func = CompareFunc::GreaterEqual;
    validate("lit textured fogged", &state);
}

// ============================================================================
// Clipping and Alpha Test
// ============================================================================

#[test]
fn clip_plane_counts_validate() {
    for count in 1..=MAX_CLIP_PLANES {
        let mut state = FixedFunctionState::new();
        for plane in &mut state.clip_planes[..count] {
            plane.enabled = true;
            plane.equation = Vec4::new(0.0, 1.0, 0.0, -0.5);
        }
        validate(&format!("clip planes={count}"), &state);
    }

    // A sparse set compacts to the lowest slots.
    let mut state = FixedFunctionState::new();
    state.clip_planes[1].enabled = true;
    state.clip_planes[MAX_CLIP_PLANES - 1].enabled = true;
    validate("sparse clip planes", &state);
}

#[test]
fn every_alpha_func_validates() {
    let funcs = [
        CompareFunc::Never,
        CompareFunc::Less,
        CompareFunc::Equal,
        CompareFunc::LessEqual,
        CompareFunc::Greater,
        CompareFunc::NotEqual,
        CompareFunc::GreaterEqual,
        CompareFunc::Always,
    ];
    for func in funcs {
        let mut state = textured(1);
        state.alpha_test.enabled = true;
        state.alpha_test.func = func;
        state.alpha_test.reference = 0.5;
        validate(&format!("alpha {func:?}"), &state);
    }
}

// ============================================================================
// Vertex Formats
// ============================================================================

#[test]
fn fixed_point_attributes_validate() {
    let mut state = lit(1);
    state.vertex_arrays.position = AttribFormat::Fixed;
    state.vertex_arrays.normal = Some(AttribFormat::Fixed);
    for unit in 0..MAX_TEXTURE_UNITS {
        state.texture_units[unit].enabled = true;
        state.vertex_arrays.texcoords[unit] = Some(AttribFormat::Fixed);
    }
    validate("fixed lit", &state);

    // Vertex color only reaches unlit variants.
    let mut state = textured(1);
    state.vertex_arrays.position = AttribFormat::Fixed;
    state.vertex_arrays.color = Some(AttribFormat::Fixed);
    state.vertex_arrays.texcoords[0] = Some(AttribFormat::Fixed);
    validate("fixed unlit", &state);
}
