//! Texture Environment State
//!
//! Per-unit texture environment configuration: the classic environment modes and
//! the `COMBINE` arithmetic (function, three sources, three operand read-modes per
//! channel).

use glam::Vec4;

/// Number of texture units exposed by the emulated pipeline.
pub const MAX_TEXTURE_UNITS: usize = 4;

/// Texture environment mode of a single unit.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TexEnvMode {
    #[default]
    Modulate = 0,
    Decal = 1,
    Blend = 2,
    Add = 3,
    Replace = 4,
    Combine = 5,
}

impl TexEnvMode {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Decal,
            2 => Self::Blend,
            3 => Self::Add,
            4 => Self::Replace,
            5 => Self::Combine,
            _ => Self::Modulate,
        }
    }
}

/// Arithmetic applied by a combiner pass.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombineFunc {
    Replace = 0,
    #[default]
    Modulate = 1,
    Add = 2,
    AddSigned = 3,
    Interpolate = 4,
    Subtract = 5,
}

impl CombineFunc {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Modulate,
            2 => Self::Add,
            3 => Self::AddSigned,
            4 => Self::Interpolate,
            5 => Self::Subtract,
            _ => Self::Replace,
        }
    }

    /// Number of operand slots the function reads.
    #[inline]
    #[must_use]
    pub fn arg_count(self) -> usize {
        match self {
            Self::Replace => 1,
            Self::Interpolate => 3,
            _ => 2,
        }
    }

    /// Evaluates the function on already read-mode-adjusted operands.
    #[must_use]
    pub fn evaluate(self, a: Vec4, b: Vec4, c: Vec4) -> Vec4 {
        match self {
            Self::Replace => a,
            Self::Modulate => a * b,
            Self::Add => a + b,
            Self::AddSigned => a + b - Vec4::splat(0.5),
            Self::Interpolate => a * c + b * (Vec4::ONE - c),
            Self::Subtract => a - b,
        }
    }
}

/// Where a combiner operand is read from.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombineSource {
    #[default]
    Texture = 0,
    Constant = 1,
    PrimaryColor = 2,
    Previous = 3,
}

impl CombineSource {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Constant,
            2 => Self::PrimaryColor,
            3 => Self::Previous,
            _ => Self::Texture,
        }
    }
}

/// How a combiner operand is read from its source.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombineOperand {
    #[default]
    SrcColor = 0,
    OneMinusSrcColor = 1,
    SrcAlpha = 2,
    OneMinusSrcAlpha = 3,
}

impl CombineOperand {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::OneMinusSrcColor,
            2 => Self::SrcAlpha,
            3 => Self::OneMinusSrcAlpha,
            _ => Self::SrcColor,
        }
    }

    /// Applies the read-mode to a source value.
    #[must_use]
    pub fn apply(self, src: Vec4) -> Vec4 {
        match self {
            Self::SrcColor => src,
            Self::OneMinusSrcColor => Vec4::ONE - src,
            Self::SrcAlpha => Vec4::splat(src.w),
            Self::OneMinusSrcAlpha => Vec4::splat(1.0 - src.w),
        }
    }
}

/// Which half of a combiner a setting applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Rgb,
    Alpha,
}

/// One channel of a combiner pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombineChannel {
    pub func: CombineFunc,
    pub sources: [CombineSource; 3],
    pub operands: [CombineOperand; 3],
}

impl CombineChannel {
    /// Evaluates the channel on concrete source values
    /// (`texture`, `constant`, `primary`, `previous`).
    #[must_use]
    pub fn evaluate(&self, texture: Vec4, constant: Vec4, primary: Vec4, previous: Vec4) -> Vec4 {
        let read = |i: usize| {
            let src = match self.sources[i] {
                CombineSource::Texture => texture,
                CombineSource::Constant => constant,
                CombineSource::PrimaryColor => primary,
                CombineSource::Previous => previous,
            };
            self.operands[i].apply(src)
        };
        self.func.evaluate(read(0), read(1), read(2))
    }
}

/// Full combiner configuration of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombineConfig {
    pub rgb: CombineChannel,
    pub alpha: CombineChannel,
}

impl Default for CombineConfig {
    fn default() -> Self {
        let sources = [
            CombineSource::Texture,
            CombineSource::Previous,
            CombineSource::Constant,
        ];
        Self {
            rgb: CombineChannel {
                func: CombineFunc::Modulate,
                sources,
                operands: [
                    CombineOperand::SrcColor,
                    CombineOperand::SrcColor,
                    CombineOperand::SrcAlpha,
                ],
            },
            alpha: CombineChannel {
                func: CombineFunc::Modulate,
                sources,
                operands: [CombineOperand::SrcAlpha; 3],
            },
        }
    }
}

impl CombineConfig {
    #[inline]
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &CombineChannel {
        match channel {
            Channel::Rgb => &self.rgb,
            Channel::Alpha => &self.alpha,
        }
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: Channel) -> &mut CombineChannel {
        match channel {
            Channel::Rgb => &mut self.rgb,
            Channel::Alpha => &mut self.alpha,
        }
    }

    /// Returns `true` if any operand slot the functions actually read uses `source`.
    #[must_use]
    pub fn reads(&self, source: CombineSource) -> bool {
        [&self.rgb, &self.alpha].into_iter().any(|ch| {
            ch.sources[..ch.func.arg_count()]
                .iter()
                .any(|&s| s == source)
        })
    }
}

/// State of one texture unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureUnit {
    pub enabled: bool,
    pub env_mode: TexEnvMode,
    pub combine: CombineConfig,
    /// `TEXTURE_ENV_COLOR`, also the `Constant` combiner source.
    pub env_color: Vec4,
    pub rgb_scale: f32,
    pub alpha_scale: f32,
}

impl Default for TextureUnit {
    fn default() -> Self {
        Self {
            enabled: false,
            env_mode: TexEnvMode::Modulate,
            combine: CombineConfig::default(),
            env_color: Vec4::ZERO,
            rgb_scale: 1.0,
            alpha_scale: 1.0,
        }
    }
}
