//! Lighting State
//!
//! Light sources, light model and material, with OpenGL default values.
//! Positions and spot directions are stored in eye space; the inbound API
//! transforms them by the model-view matrix current at the time they are set.

use glam::{Vec3, Vec4};

/// Number of light sources exposed by the emulated pipeline.
pub const MAX_LIGHTS: usize = 8;

/// A single light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub enabled: bool,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    /// Eye-space position; `w == 0` marks a directional light.
    pub position: Vec4,
    /// Eye-space spot direction.
    pub spot_direction: Vec3,
    pub spot_exponent: f32,
    /// Spot cutoff angle in degrees; `180` disables the cone.
    pub spot_cutoff: f32,
    /// `(constant, linear, quadratic)` attenuation factors.
    pub attenuation: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            enabled: false,
            ambient: Vec4::new(0.0, 0.0, 0.0, 1.0),
            diffuse: Vec4::new(0.0, 0.0, 0.0, 1.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            position: Vec4::new(0.0, 0.0, 1.0, 0.0),
            spot_direction: Vec3::new(0.0, 0.0, -1.0),
            spot_exponent: 0.0,
            spot_cutoff: 180.0,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
        }
    }
}

impl Light {
    /// Cosine of the spot cutoff, `-1` when the cone is disabled.
    #[must_use]
    pub fn spot_cos_cutoff(&self) -> f32 {
        if self.spot_cutoff >= 180.0 {
            -1.0
        } else {
            self.spot_cutoff.to_radians().cos()
        }
    }
}

/// Surface material. Ambient reflectance tracks the diffuse color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub emission: Vec4,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            emission: Vec4::new(0.0, 0.0, 0.0, 1.0),
            shininess: 0.0,
        }
    }
}

/// Lighting master switch, light sources, light model and material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingState {
    pub enabled: bool,
    pub lights: [Light; MAX_LIGHTS],
    pub model_ambient: Vec4,
    pub material: Material,
}

impl Default for LightingState {
    fn default() -> Self {
        let mut lights = [Light::default(); MAX_LIGHTS];
        lights[0].diffuse = Vec4::ONE;
        lights[0].specular = Vec4::ONE;
        Self {
            enabled: false,
            lights,
            model_ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            material: Material::default(),
        }
    }
}

impl LightingState {
    /// Enabled lights in index order. These occupy shader light slots `0..n`.
    pub fn active_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights
            .iter()
            .filter(|light| self.enabled && light.enabled)
    }

    /// Number of lights a variant has to evaluate (zero when lighting is off).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_lights().count()
    }
}
