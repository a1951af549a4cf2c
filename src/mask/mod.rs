//! Feature / Combiner Masks
//!
//! Reduces the combinatorial fixed-function configuration space to a compact,
//! hashable variant key.
//!
//! - [`FeatureMask`]: a packed `u64` describing which fixed-function features
//!   are active (alpha test, stages, fog, clip planes, lights, env modes, …).
//! - [`CombinerMask`]: a packed `u128` holding the `COMBINE` configuration of
//!   every stage that uses it.
//! - [`VariantKey`]: the pair, used by the variant cache and, hashed together
//!   with a build identifier, by the persistent store.
//!
//! # Canonical encoding
//!
//! Masks are always derived from scratch from the live state and every
//! don't-care field is zeroed at encode time:
//!
//! - env modes of stages beyond the active stage count
//! - light count, shade model and normalize flag when lighting is off
//! - the vertex color flag when lighting replaces the primary color
//! - fixed-point bits of attributes the variant does not consume
//! - combiner bits of stages not in `Combine` mode and of operand slots the
//!   combine function never reads
//!
//! A disabled alpha test is encoded as `Always`. Plain bitwise equality of the
//! packed integers is therefore exact variant equality.

use std::fmt;

use xxhash_rust::xxh3::xxh3_128;

use crate::state::{
    AttribFormat, Channel, CombineChannel, CombineConfig, CombineFunc, CombineOperand,
    CombineSource, CompareFunc, FixedFunctionState, FixedPointAttributes, FogMode,
    MAX_LIGHTS, MAX_TEXTURE_UNITS, ShadeModel, TexEnvMode,
};

// ─── Feature Mask Layout ─────────────────────────────────────────────────────

const ALPHA_SHIFT: u32 = 0; // 3 bits
const STAGES_SHIFT: u32 = 3; // 3 bits
const COLOR_SHIFT: u32 = 6; // 1 bit
const FOG_SHIFT: u32 = 7; // 2 bits
const CLIP_SHIFT: u32 = 9; // 3 bits
const LIGHTS_SHIFT: u32 = 12; // 4 bits
const ENV_SHIFT: u32 = 16; // 3 bits per stage
const SHADE_SHIFT: u32 = 28; // 1 bit
const NORMALIZE_SHIFT: u32 = 29; // 1 bit
const FIXED_SHIFT: u32 = 30; // 7 bits

const ENV_BITS: u32 = 3;

#[inline]
fn field(bits: u64, shift: u32, width: u32) -> u8 {
    ((bits >> shift) & ((1 << width) - 1)) as u8
}

/// Packed descriptor of the active fixed-function features.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureMask(u64);

impl FeatureMask {
    /// Derives the mask from live state. Pure and total.
    #[must_use]
    pub fn compute(state: &FixedFunctionState) -> Self {
        let stage_count = state.active_stage_count();
        let light_count = state.lighting.active_count().min(MAX_LIGHTS);
        let lit = light_count > 0;

        let mut bits = 0u64;
        bits |= u64::from(state.alpha_test.effective_func() as u8) << ALPHA_SHIFT;
        bits |= (stage_count as u64) << STAGES_SHIFT;
        if state.has_vertex_color() && !lit {
            bits |= 1 << COLOR_SHIFT;
        }
        bits |= u64::from(state.fog.effective_mode().map_or(0, |mode| mode as u8)) << FOG_SHIFT;
        bits |= (state.active_clip_plane_count() as u64) << CLIP_SHIFT;
        bits |= (light_count as u64) << LIGHTS_SHIFT;

        for (stage, unit) in state.texture_units[..stage_count].iter().enumerate() {
            bits |= u64::from(unit.env_mode as u8) << (ENV_SHIFT + ENV_BITS * stage as u32);
        }

        if lit {
            bits |= u64::from(state.shade_model as u8) << SHADE_SHIFT;
            bits |= u64::from(state.normalize) << NORMALIZE_SHIFT;
        }

        bits |= u64::from(consumed_fixed_point(state, stage_count, lit).bits()) << FIXED_SHIFT;

        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn alpha_func(self) -> CompareFunc {
        CompareFunc::from_bits(field(self.0, ALPHA_SHIFT, 3))
    }

    #[inline]
    #[must_use]
    pub fn stage_count(self) -> usize {
        usize::from(field(self.0, STAGES_SHIFT, 3)).min(MAX_TEXTURE_UNITS)
    }

    #[inline]
    #[must_use]
    pub fn has_vertex_color(self) -> bool {
        field(self.0, COLOR_SHIFT, 1) != 0
    }

    #[inline]
    #[must_use]
    pub fn fog_mode(self) -> Option<FogMode> {
        FogMode::from_bits(field(self.0, FOG_SHIFT, 2))
    }

    #[inline]
    #[must_use]
    pub fn clip_plane_count(self) -> usize {
        usize::from(field(self.0, CLIP_SHIFT, 3))
    }

    #[inline]
    #[must_use]
    pub fn light_count(self) -> usize {
        usize::from(field(self.0, LIGHTS_SHIFT, 4))
    }

    #[inline]
    #[must_use]
    pub fn is_lit(self) -> bool {
        self.light_count() > 0
    }

    /// Env mode of an active stage. Stages beyond the active count read as `Modulate`.
    #[inline]
    #[must_use]
    pub fn env_mode(self, stage: usize) -> TexEnvMode {
        if stage >= self.stage_count() {
            return TexEnvMode::Modulate;
        }
        TexEnvMode::from_bits(field(
            self.0,
            ENV_SHIFT + ENV_BITS * stage as u32,
            ENV_BITS,
        ))
    }

    #[inline]
    #[must_use]
    pub fn shade_model(self) -> ShadeModel {
        if field(self.0, SHADE_SHIFT, 1) == 0 {
            ShadeModel::Smooth
        } else {
            ShadeModel::PerPixel
        }
    }

    #[inline]
    #[must_use]
    pub fn normalize(self) -> bool {
        field(self.0, NORMALIZE_SHIFT, 1) != 0
    }

    #[inline]
    #[must_use]
    pub fn fixed_point(self) -> FixedPointAttributes {
        FixedPointAttributes::from_bits_truncate(field(self.0, FIXED_SHIFT, 7))
    }

    /// `true` when lighting runs in the fragment program.
    #[inline]
    #[must_use]
    pub fn per_pixel_lighting(self) -> bool {
        self.is_lit() && self.shade_model() == ShadeModel::PerPixel
    }

    /// `true` when the vertex program needs eye-space position.
    #[inline]
    #[must_use]
    pub fn needs_eye_space(self) -> bool {
        self.is_lit() || self.fog_mode().is_some() || self.clip_plane_count() > 0
    }
}

impl fmt::Debug for FeatureMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureMask")
            .field("bits", &format_args!("{:#011x}", self.0))
            .field("alpha_func", &self.alpha_func())
            .field("stages", &self.stage_count())
            .field("vertex_color", &self.has_vertex_color())
            .field("fog", &self.fog_mode())
            .field("clip_planes", &self.clip_plane_count())
            .field("lights", &self.light_count())
            .finish_non_exhaustive()
    }
}

fn consumed_fixed_point(
    state: &FixedFunctionState,
    stage_count: usize,
    lit: bool,
) -> FixedPointAttributes {
    let arrays = &state.vertex_arrays;
    let is_fixed = |format: Option<AttribFormat>| format == Some(AttribFormat::Fixed);

    let mut fixed = FixedPointAttributes::empty();
    if arrays.position == AttribFormat::Fixed {
        fixed |= FixedPointAttributes::POSITION;
    }
    if lit && is_fixed(arrays.normal) {
        fixed |= FixedPointAttributes::NORMAL;
    }
    if !lit && is_fixed(arrays.color) {
        fixed |= FixedPointAttributes::COLOR;
    }
    for (unit, &format) in arrays.texcoords[..stage_count].iter().enumerate() {
        if is_fixed(format) {
            fixed |= FixedPointAttributes::texcoord(unit);
        }
    }
    fixed
}

// ─── Combiner Mask Layout ────────────────────────────────────────────────────

const CHANNEL_BITS: u32 = 15;
const STAGE_BITS: u32 = CHANNEL_BITS * 2;
const FUNC_BITS: u32 = 3;
const SOURCE_SHIFT: u32 = FUNC_BITS;
const OPERAND_SHIFT: u32 = SOURCE_SHIFT + 6;

/// Packed descriptor of the per-stage `COMBINE` configuration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CombinerMask(u128);

impl CombinerMask {
    /// Derives the mask from live state. Pure and total.
    #[must_use]
    pub fn compute(state: &FixedFunctionState) -> Self {
        let stage_count = state.active_stage_count();
        let mut bits = 0u128;

        for (stage, unit) in state.texture_units[..stage_count].iter().enumerate() {
            if unit.env_mode != TexEnvMode::Combine {
                continue;
            }
            bits |= u128::from(encode_stage(&unit.combine)) << (STAGE_BITS * stage as u32);
        }

        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u128 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Decodes the combiner configuration of `stage`.
    ///
    /// Operand slots the function does not read decode as `Texture` / `SrcColor`.
    #[must_use]
    pub fn stage(self, stage: usize) -> CombineConfig {
        let bits = (self.0 >> (STAGE_BITS * stage as u32)) as u32 & ((1 << STAGE_BITS) - 1);
        CombineConfig {
            rgb: decode_channel(bits & ((1 << CHANNEL_BITS) - 1)),
            alpha: decode_channel(bits >> CHANNEL_BITS),
        }
    }
}

impl fmt::Debug for CombinerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CombinerMask({:#032x})", self.0)
    }
}

fn encode_stage(config: &CombineConfig) -> u32 {
    encode_channel(&config.rgb, Channel::Rgb)
        | (encode_channel(&config.alpha, Channel::Alpha) << CHANNEL_BITS)
}

fn encode_channel(channel: &CombineChannel, kind: Channel) -> u32 {
    let mut bits = u32::from(channel.func as u8);
    for arg in 0..channel.func.arg_count() {
        let operand = canonical_operand(channel.operands[arg], kind);
        bits |= u32::from(channel.sources[arg] as u8) << (SOURCE_SHIFT + 2 * arg as u32);
        bits |= u32::from(operand as u8) << (OPERAND_SHIFT + 2 * arg as u32);
    }
    bits
}

fn decode_channel(bits: u32) -> CombineChannel {
    let func = CombineFunc::from_bits((bits & ((1 << FUNC_BITS) - 1)) as u8);
    let mut sources = [CombineSource::Texture; 3];
    let mut operands = [CombineOperand::SrcColor; 3];
    for arg in 0..3 {
        sources[arg] = CombineSource::from_bits(((bits >> (SOURCE_SHIFT + 2 * arg as u32)) & 3) as u8);
        operands[arg] =
            CombineOperand::from_bits(((bits >> (OPERAND_SHIFT + 2 * arg as u32)) & 3) as u8);
    }
    CombineChannel {
        func,
        sources,
        operands,
    }
}

/// The alpha channel can only read alpha; color read-modes collapse onto their
/// alpha counterparts.
fn canonical_operand(operand: CombineOperand, kind: Channel) -> CombineOperand {
    match (kind, operand) {
        (Channel::Alpha, CombineOperand::SrcColor) => CombineOperand::SrcAlpha,
        (Channel::Alpha, CombineOperand::OneMinusSrcColor) => CombineOperand::OneMinusSrcAlpha,
        (_, operand) => operand,
    }
}

// ─── Variant Key ─────────────────────────────────────────────────────────────

/// Cache key of a shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariantKey {
    pub feature: FeatureMask,
    pub combiner: CombinerMask,
}

impl VariantKey {
    /// Computes both masks from live state.
    #[must_use]
    pub fn compute(state: &FixedFunctionState) -> Self {
        Self {
            feature: FeatureMask::compute(state),
            combiner: CombinerMask::compute(state),
        }
    }

    /// Stable 128-bit hash of the key and a build identifier, used to name
    /// persistent-store entries.
    #[must_use]
    pub fn persistent_hash(&self, build_id: &str) -> u128 {
        let mut bytes = Vec::with_capacity(24 + build_id.len());
        bytes.extend_from_slice(&self.feature.bits().to_le_bytes());
        bytes.extend_from_slice(&self.combiner.bits().to_le_bytes());
        bytes.extend_from_slice(build_id.as_bytes());
        xxh3_128(&bytes)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:010x}:{:030x}",
            self.feature.bits(),
            self.combiner.bits()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClientArray, CompareFunc};

    fn textured_state() -> FixedFunctionState {
        let mut state = FixedFunctionState::new();
        state.texture_units[0].enabled = true;
        state
    }

    #[test]
    fn compute_is_deterministic() {
        let mut state = textured_state();
        state.fog.enabled = true;
        state.lighting.enabled = true;
        state.lighting.lights[1].enabled = true;

        let a = VariantKey::compute(&state);
        let b = VariantKey::compute(&state.clone());
        assert_eq!(a, b);
        assert_eq!(a.feature.bits(), b.feature.bits());
    }

    #[test]
    fn fields_round_trip_through_getters() {
        let mut state = textured_state();
        state.texture_units[1].enabled = true;
        state.texture_units[1].env_mode = TexEnvMode::Decal;
        state.alpha_test.enabled = true;
        state.alpha_test.func = CompareFunc::Greater;
        state.fog.enabled = true;
        state.fog.mode = FogMode::Exp2;
        state.clip_planes[4].enabled = true;
        state.lighting.enabled = true;
        state.lighting.lights[0].enabled = true;
        state.lighting.lights[5].enabled = true;
        state.shade_model = ShadeModel::PerPixel;
        state.normalize = true;
        state.vertex_arrays.normal = Some(AttribFormat::Fixed);

        let mask = FeatureMask::compute(&state);
        assert_eq!(mask.alpha_func(), CompareFunc::Greater);
        assert_eq!(mask.stage_count(), 2);
        assert_eq!(mask.env_mode(0), TexEnvMode::Modulate);
        assert_eq!(mask.env_mode(1), TexEnvMode::Decal);
        assert_eq!(mask.fog_mode(), Some(FogMode::Exp2));
        assert_eq!(mask.clip_plane_count(), 1);
        assert_eq!(mask.light_count(), 2);
        assert_eq!(mask.shade_model(), ShadeModel::PerPixel);
        assert!(mask.normalize());
        assert_eq!(mask.fixed_point(), FixedPointAttributes::NORMAL);
    }

    #[test]
    fn inactive_stage_modes_are_dont_care() {
        let mut a = textured_state();
        let mut b = textured_state();
        a.texture_units[2].env_mode = TexEnvMode::Replace;
        b.texture_units[2].env_mode = TexEnvMode::Combine;
        b.texture_units[3].combine.rgb.func = CombineFunc::Subtract;
        assert_eq!(VariantKey::compute(&a), VariantKey::compute(&b));
    }

    #[test]
    fn light_count_changes_mask() {
        let mut state = FixedFunctionState::new();
        state.lighting.enabled = true;
        state.lighting.lights[0].enabled = true;
        state.lighting.lights[1].enabled = true;
        let two = FeatureMask::compute(&state);

        state.lighting.lights[2].enabled = true;
        let three = FeatureMask::compute(&state);

        assert_ne!(two, three);
        assert_eq!(two.light_count(), 2);
        assert_eq!(three.light_count(), 3);
    }

    #[test]
    fn lighting_only_fields_are_masked_when_unlit() {
        let mut a = FixedFunctionState::new();
        let mut b = FixedFunctionState::new();
        b.shade_model = ShadeModel::PerPixel;
        b.normalize = true;
        b.lighting.lights[0].enabled = true;
        b.vertex_arrays.normal = Some(AttribFormat::Fixed);
        assert_eq!(FeatureMask::compute(&a), FeatureMask::compute(&b));

        a.alpha_test.func = CompareFunc::Less;
        assert_eq!(FeatureMask::compute(&a).alpha_func(), CompareFunc::Always);
    }

    #[test]
    fn vertex_color_is_ignored_when_lit() {
        let mut state = FixedFunctionState::new();
        state.vertex_arrays.color = Some(AttribFormat::Float);
        assert!(FeatureMask::compute(&state).has_vertex_color());

        state.lighting.enabled = true;
        state.lighting.lights[0].enabled = true;
        assert!(!FeatureMask::compute(&state).has_vertex_color());
    }

    #[test]
    fn fixed_point_bits_only_for_consumed_attributes() {
        let mut state = textured_state();
        state.vertex_arrays.texcoords[0] = Some(AttribFormat::Fixed);
        state.vertex_arrays.texcoords[2] = Some(AttribFormat::Fixed);
        let mask = FeatureMask::compute(&state);
        assert_eq!(mask.fixed_point(), FixedPointAttributes::TEXCOORD0);
        assert_eq!(state.vertex_arrays.get(ClientArray::TexCoord(2)), Some(AttribFormat::Fixed));
    }

    #[test]
    fn combiner_mask_is_empty_without_combine_stages() {
        let mut state = textured_state();
        state.texture_units[0].combine.rgb.func = CombineFunc::Add;
        assert!(CombinerMask::compute(&state).is_empty());

        state.texture_units[0].env_mode = TexEnvMode::Combine;
        let mask = CombinerMask::compute(&state);
        assert!(!mask.is_empty());
        assert_eq!(mask.stage(0).rgb.func, CombineFunc::Add);
    }

    #[test]
    fn unread_combiner_operands_are_dont_care() {
        let mut a = textured_state();
        a.texture_units[0].env_mode = TexEnvMode::Combine;
        a.texture_units[0].combine.rgb.func = CombineFunc::Replace;
        let mut b = a.clone();
        b.texture_units[0].combine.rgb.sources[1] = CombineSource::Constant;
        b.texture_units[0].combine.rgb.operands[2] = CombineOperand::OneMinusSrcAlpha;
        assert_eq!(CombinerMask::compute(&a), CombinerMask::compute(&b));

        b.texture_units[0].combine.rgb.sources[0] = CombineSource::Constant;
        assert_ne!(CombinerMask::compute(&a), CombinerMask::compute(&b));
    }

    #[test]
    fn combiner_stage_decodes_per_channel() {
        let mut state = textured_state();
        state.texture_units[1].enabled = true;
        state.texture_units[1].env_mode = TexEnvMode::Combine;
        let combine = &mut state.texture_units[1].combine;
        combine.rgb.func = CombineFunc::Interpolate;
        combine.rgb.sources = [
            CombineSource::Texture,
            CombineSource::Previous,
            CombineSource::PrimaryColor,
        ];
        combine.rgb.operands = [
            CombineOperand::SrcColor,
            CombineOperand::OneMinusSrcColor,
            CombineOperand::SrcAlpha,
        ];
        combine.alpha.func = CombineFunc::Subtract;
        combine.alpha.operands[0] = CombineOperand::OneMinusSrcColor;

        let mask = CombinerMask::compute(&state);
        assert_eq!(mask.stage(0), CombineConfig {
            rgb: decode_channel(0),
            alpha: decode_channel(0),
        });
        let stage = mask.stage(1);
        assert_eq!(stage.rgb, state.texture_units[1].combine.rgb);
        assert_eq!(stage.alpha.func, CombineFunc::Subtract);
        assert_eq!(stage.alpha.operands[0], CombineOperand::OneMinusSrcAlpha);
    }

    #[test]
    fn persistent_hash_depends_on_build_id() {
        let key = VariantKey::compute(&textured_state());
        assert_eq!(key.persistent_hash("a"), key.persistent_hash("a"));
        assert_ne!(key.persistent_hash("a"), key.persistent_hash("b"));
    }
}
