//! Blend Configuration
//!
//! Legacy framebuffer blend state. It is not part of the variant key: a blend
//! change only requires re-linking the bound program pair, never resynthesis.
//!
//! `wgpu` descriptor types do not implement `Hash` / `Eq`, so the configuration is
//! kept in its own hashable form and converted on demand with
//! [`BlendConfig::to_wgpu`].

/// Legacy blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
    ConstantColor,
    OneMinusConstantColor,
}

/// Legacy blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Complete blend configuration a program pair is linked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendConfig {
    pub enabled: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub equation: BlendEquation,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            equation: BlendEquation::Add,
        }
    }
}

impl BlendConfig {
    /// Converts into the `wgpu` blend state a WebGPU-backed registrar links against.
    ///
    /// Returns `None` when blending is disabled.
    #[must_use]
    pub fn to_wgpu(&self) -> Option<wgpu::BlendState> {
        if !self.enabled {
            return None;
        }

        let operation = match self.equation {
            BlendEquation::Add => wgpu::BlendOperation::Add,
            BlendEquation::Subtract => wgpu::BlendOperation::Subtract,
            BlendEquation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendEquation::Min => wgpu::BlendOperation::Min,
            BlendEquation::Max => wgpu::BlendOperation::Max,
        };

        // Min / Max ignore the factors; wgpu requires them to be `One`.
        let component = |alpha: bool| {
            if matches!(self.equation, BlendEquation::Min | BlendEquation::Max) {
                wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation,
                }
            } else {
                wgpu::BlendComponent {
                    src_factor: factor_to_wgpu(self.src, alpha),
                    dst_factor: factor_to_wgpu(self.dst, alpha),
                    operation,
                }
            }
        };

        Some(wgpu::BlendState {
            color: component(false),
            alpha: component(true),
        })
    }
}

fn factor_to_wgpu(factor: BlendFactor, alpha: bool) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        // The saturate factor is defined as 1 for the alpha component.
        BlendFactor::SrcAlphaSaturate if alpha => wgpu::BlendFactor::One,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
    }
}
