//! Capability probing, driver quirks, and the surface shading strategy.
//!
//! The probe runs once in `Renderer::init`. Draw code only ever looks at
//! the resolved [`ShadingStrategy`].

use crate::backend::DeviceCapabilities;

pub const EXT_MULTITEXTURE: &str = "multitexture";
pub const EXT_TEXTURE_ENV_COMBINE: &str = "texture_env_combine";
pub const EXT_REGISTER_COMBINERS: &str = "register_combiners";
pub const EXT_VERTEX_PROGRAM: &str = "vertex_program";
pub const EXT_TEXTURE_CUBE_MAP: &str = "texture_cube_map";
pub const EXT_RESCALE_NORMAL: &str = "rescale_normal";
pub const EXT_BLEND_MINMAX: &str = "blend_minmax";

/// Every optional feature the renderer knows how to use.
pub const ALL_EXTENSIONS: &[&str] = &[
    EXT_MULTITEXTURE,
    EXT_TEXTURE_ENV_COMBINE,
    EXT_REGISTER_COMBINERS,
    EXT_VERTEX_PROGRAM,
    EXT_TEXTURE_CUBE_MAP,
    EXT_RESCALE_NORMAL,
    EXT_BLEND_MINMAX,
];

/// Feature availability, cached at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Texture units usable in one pass.
    pub simultaneous_textures: u32,
    pub tex_env_combine: bool,
    pub register_combiners: bool,
    pub vertex_programs: bool,
    pub cube_maps: bool,
    pub rescale_normal: bool,
    pub blend_minmax: bool,
}

impl Capabilities {
    pub fn probe(device: &DeviceCapabilities) -> Self {
        let simultaneous_textures = if device.has_extension(EXT_MULTITEXTURE) {
            device.max_texture_units.max(1)
        } else {
            1
        };
        Self {
            simultaneous_textures,
            tex_env_combine: device.has_extension(EXT_TEXTURE_ENV_COMBINE),
            register_combiners: device.has_extension(EXT_REGISTER_COMBINERS),
            vertex_programs: device.has_extension(EXT_VERTEX_PROGRAM),
            cube_maps: device.has_extension(EXT_TEXTURE_CUBE_MAP),
            rescale_normal: device.has_extension(EXT_RESCALE_NORMAL),
            blend_minmax: device.has_extension(EXT_BLEND_MINMAX),
        }
    }

    /// Per-pixel combiner shading needs cube maps for normalization.
    pub fn fragment_shaders_supported(&self) -> bool {
        self.cube_maps && self.register_combiners
    }

    pub fn vertex_shaders_supported(&self) -> bool {
        self.vertex_programs
    }
}

/// Workarounds keyed by adapter fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quirks {
    /// The vertex program path cannot output a fog coordinate; haze is
    /// disabled.
    pub buggy_vertex_program_emulation: bool,
    /// Normal rescaling is available even though the driver does not
    /// advertise it.
    pub force_rescale_normal: bool,
}

impl Default for Quirks {
    fn default() -> Self {
        Self {
            buggy_vertex_program_emulation: true,
            force_rescale_normal: false,
        }
    }
}

struct QuirkRule {
    fingerprint: &'static str,
    apply: fn(&mut Quirks),
}

/// Adapters are matched by substring of the reported renderer name.
const QUIRK_TABLE: &[QuirkRule] = &[
    QuirkRule {
        fingerprint: "GeForce3",
        apply: |q| q.buggy_vertex_program_emulation = false,
    },
    QuirkRule {
        fingerprint: "GeForce4",
        apply: |q| q.buggy_vertex_program_emulation = false,
    },
    QuirkRule {
        fingerprint: "Savage4",
        apply: |q| q.force_rescale_normal = true,
    },
];

impl Quirks {
    pub fn detect(renderer: &str) -> Self {
        let mut quirks = Self::default();
        for rule in QUIRK_TABLE.iter().filter(|r| renderer.contains(r.fingerprint)) {
            (rule.apply)(&mut quirks);
            log::info!("applying driver quirk for '{}'", rule.fingerprint);
        }
        quirks
    }
}

/// How sphere surfaces are lit, from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadingStrategy {
    /// Gouraud lighting, one texture, optional night lights pass.
    FixedFunction,
    /// Per-pixel bump mapping through combiners.
    FragmentCombiner,
    /// Per-pixel diffuse and specular with haze and gloss maps.
    VertexAndFragment,
}

impl ShadingStrategy {
    pub fn resolve(fragment_shaders: bool, vertex_shaders: bool) -> Self {
        match (fragment_shaders, vertex_shaders) {
            (true, true) => Self::VertexAndFragment,
            (true, false) => Self::FragmentCombiner,
            _ => Self::FixedFunction,
        }
    }
}

/// Everything the object pipeline needs to pick a shading path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingState {
    pub capabilities: Capabilities,
    pub quirks: Quirks,
    fragment_shaders: bool,
    vertex_shaders: bool,
}

impl ShadingState {
    /// Shaders start enabled wherever they are supported.
    pub fn new(capabilities: Capabilities, quirks: Quirks) -> Self {
        Self {
            capabilities,
            quirks,
            fragment_shaders: capabilities.fragment_shaders_supported(),
            vertex_shaders: capabilities.vertex_shaders_supported(),
        }
    }

    pub fn fragment_shaders(&self) -> bool {
        self.fragment_shaders
    }

    pub fn vertex_shaders(&self) -> bool {
        self.vertex_shaders
    }

    /// Ignored when the device lacks support.
    pub fn set_fragment_shaders(&mut self, enabled: bool) {
        self.fragment_shaders = enabled && self.capabilities.fragment_shaders_supported();
    }

    pub fn set_vertex_shaders(&mut self, enabled: bool) {
        self.vertex_shaders = enabled && self.capabilities.vertex_shaders_supported();
    }

    pub fn strategy(&self) -> ShadingStrategy {
        ShadingStrategy::resolve(self.fragment_shaders, self.vertex_shaders)
    }

    pub fn rescale_normal(&self) -> bool {
        self.capabilities.rescale_normal || self.quirks.force_rescale_normal
    }

    /// Bump maps need per-pixel normals from a cube map.
    pub fn bump_mapping(&self) -> bool {
        self.fragment_shaders && self.capabilities.register_combiners && self.capabilities.cube_maps
    }

    pub fn night_pass(&self) -> bool {
        self.capabilities.tex_env_combine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(renderer: &str, extensions: &[&str]) -> DeviceCapabilities {
        DeviceCapabilities {
            renderer: renderer.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            max_texture_units: 4,
            max_texture_size: 4096,
        }
    }

    #[test]
    fn test_probe_reads_extensions() {
        let caps = Capabilities::probe(&device("x", &[EXT_TEXTURE_CUBE_MAP, EXT_REGISTER_COMBINERS]));
        assert!(caps.fragment_shaders_supported());
        assert!(!caps.vertex_shaders_supported());
        assert_eq!(caps.simultaneous_textures, 1);

        let caps = Capabilities::probe(&device("x", ALL_EXTENSIONS));
        assert_eq!(caps.simultaneous_textures, 4);
        assert!(caps.vertex_shaders_supported());
    }

    #[test]
    fn test_quirks_table() {
        assert!(Quirks::detect("Generic Adapter").buggy_vertex_program_emulation);
        assert!(!Quirks::detect("NVIDIA GeForce4 Ti 4600").buggy_vertex_program_emulation);
        assert!(!Quirks::detect("GeForce3/AGP").buggy_vertex_program_emulation);
        let savage = Quirks::detect("S3 Savage4");
        assert!(savage.force_rescale_normal);
        assert!(savage.buggy_vertex_program_emulation);
    }

    #[test]
    fn test_strategy_resolution() {
        assert_eq!(ShadingStrategy::resolve(false, false), ShadingStrategy::FixedFunction);
        assert_eq!(ShadingStrategy::resolve(false, true), ShadingStrategy::FixedFunction);
        assert_eq!(ShadingStrategy::resolve(true, false), ShadingStrategy::FragmentCombiner);
        assert_eq!(ShadingStrategy::resolve(true, true), ShadingStrategy::VertexAndFragment);
    }

    #[test]
    fn test_enable_flags_are_capability_gated() {
        let caps = Capabilities::probe(&device("x", &[EXT_VERTEX_PROGRAM]));
        let mut state = ShadingState::new(caps, Quirks::default());
        state.set_fragment_shaders(true);
        assert!(!state.fragment_shaders());
        assert_eq!(state.strategy(), ShadingStrategy::FixedFunction);

        let caps = Capabilities::probe(&device("x", ALL_EXTENSIONS));
        let mut state = ShadingState::new(caps, Quirks::default());
        assert_eq!(state.strategy(), ShadingStrategy::VertexAndFragment);
        state.set_vertex_shaders(false);
        assert_eq!(state.strategy(), ShadingStrategy::FragmentCombiner);
    }

    #[test]
    fn test_rescale_normal_quirk() {
        let caps = Capabilities::probe(&device("S3 Savage4", &[]));
        let state = ShadingState::new(caps, Quirks::detect("S3 Savage4"));
        assert!(state.rescale_normal());
        let plain = ShadingState::new(caps, Quirks::default());
        assert!(!plain.rescale_normal());
    }
}
