//! Resources built once in `Renderer::init` and shared by every frame.

use crate::backend::{BackendError, DeviceCapabilities, RenderBackend};
use crate::lod_sphere::LodSphereMesh;
use crate::shading::{Capabilities, Quirks, ShadingState};
use crate::texture::{
    ECLIPSE_SHADOW_BANDS, TextureId, TextureImage, TiledTexture, eclipse_shadow_images,
    galaxy_image, glare_image, shadow_disc_image, star_disc_image,
};
use crate::universe::StarTextureClass;

const STAR_SURFACE_SIZE: u32 = 64;

/// Generic star surface for a texture class.
fn star_surface_image(class: StarTextureClass) -> TextureImage {
    let (label, tint) = match class {
        StarTextureClass::B => ("star-surface-b", [0.80, 0.90, 1.00]),
        StarTextureClass::A => ("star-surface-a", [1.00, 1.00, 1.00]),
        StarTextureClass::G => ("star-surface-g", [1.00, 0.95, 0.70]),
        StarTextureClass::M => ("star-surface-m", [1.00, 0.60, 0.40]),
    };
    TextureImage::procedural(label, STAR_SURFACE_SIZE * 2, STAR_SURFACE_SIZE, move |u, v| {
        // Cheap granulation; seamless in u.
        let cells = (u * std::f32::consts::PI * 12.0).sin() * (v * 23.0).sin();
        let shade = 0.85 + 0.15 * cells;
        let channel = |c: f32| ((c * shade).clamp(0.0, 1.0) * 255.0) as u8;
        [channel(tint[0]), channel(tint[1]), channel(tint[2]), 255]
    })
}

/// Texture ids of the procedural textures.
#[derive(Debug, Clone, Default)]
pub struct StaticTextures {
    pub star_disc: Option<TextureId>,
    pub glare: Option<TextureId>,
    pub galaxy: Option<TextureId>,
    /// Planet shadow on rings.
    pub shadow: Option<TextureId>,
    pub eclipse: [Option<TextureId>; ECLIPSE_SHADOW_BANDS],
    pub(crate) stars: Vec<(StarTextureClass, TiledTexture)>,
}

impl StaticTextures {
    /// Surface texture for stars of `class` without their own texture.
    pub fn star_surface(&self, class: StarTextureClass) -> Option<&TiledTexture> {
        self.stars
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, texture)| texture)
    }
}

/// Device state and shared geometry for the object pipeline.
#[derive(Debug)]
pub struct RenderContext {
    pub device: DeviceCapabilities,
    pub shading: ShadingState,
    pub sphere: LodSphereMesh,
    pub textures: StaticTextures,
}

impl RenderContext {
    /// Probe the backend and upload the procedural textures.
    pub fn new<B: RenderBackend>(backend: &mut B) -> Result<Self, BackendError> {
        let device = backend.capabilities();
        let capabilities = Capabilities::probe(&device);
        let quirks = Quirks::detect(&device.renderer);
        let shading = ShadingState::new(capabilities, quirks);
        log::info!(
            "renderer '{}': {} texture units, combine {}, fragment shaders {}, vertex shaders {}",
            device.renderer,
            capabilities.simultaneous_textures,
            capabilities.tex_env_combine,
            shading.fragment_shaders(),
            shading.vertex_shaders(),
        );
        log::info!("shading strategy {:?}", shading.strategy());

        let textures = Self::create_textures(backend)?;
        Ok(Self {
            device,
            shading,
            sphere: LodSphereMesh::new(),
            textures,
        })
    }

    fn create_textures<B: RenderBackend>(backend: &mut B) -> Result<StaticTextures, BackendError> {
        let mut upload = |image: TextureImage| {
            backend.create_texture(&image).inspect_err(|err| {
                log::warn!("failed to create texture '{}': {err}", image.label);
            })
        };

        let mut textures = StaticTextures {
            star_disc: Some(upload(star_disc_image(128))?),
            glare: Some(upload(glare_image(64))?),
            galaxy: Some(upload(galaxy_image(128))?),
            shadow: Some(upload(shadow_disc_image(256))?),
            ..StaticTextures::default()
        };
        for (slot, image) in textures.eclipse.iter_mut().zip(eclipse_shadow_images()) {
            *slot = Some(upload(image)?);
        }
        for class in [
            StarTextureClass::B,
            StarTextureClass::A,
            StarTextureClass::G,
            StarTextureClass::M,
        ] {
            let id = upload(star_surface_image(class))?;
            let texture = TiledTexture::single(id, STAR_SURFACE_SIZE * 2, STAR_SURFACE_SIZE);
            textures.stars.push((class, texture));
        }
        Ok(textures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::shading::ShadingStrategy;
    use crate::texture::Texture;

    #[test]
    fn test_context_uploads_static_textures() {
        let mut backend = RecordingBackend::full_featured();
        let context = RenderContext::new(&mut backend).unwrap();

        assert!(context.textures.star_disc.is_some());
        assert!(context.textures.eclipse.iter().all(Option::is_some));
        // 4 sprites, 5 eclipse bands, 4 star surfaces
        assert_eq!(backend.textures.len(), 13);
        let g = context.textures.star_surface(StarTextureClass::G).unwrap();
        assert_eq!(g.width(), 128);
        assert!(g.tile(0, 0, 0).id.is_some());
        assert_eq!(context.shading.strategy(), ShadingStrategy::VertexAndFragment);
    }

    #[test]
    fn test_partial_texture_set_has_no_star_surfaces() {
        let textures = StaticTextures {
            glare: Some(TextureId(7)),
            ..StaticTextures::default()
        };
        assert_eq!(textures.glare, Some(TextureId(7)));
        assert!(textures.star_surface(StarTextureClass::G).is_none());
    }

    #[test]
    fn test_context_on_minimal_device_uses_fixed_function() {
        let mut backend = RecordingBackend::default();
        let context = RenderContext::new(&mut backend).unwrap();
        assert_eq!(context.shading.strategy(), ShadingStrategy::FixedFunction);
    }

    #[test]
    fn test_context_fails_when_textures_cannot_be_created() {
        let mut backend = RecordingBackend::full_featured();
        backend.fail_textures = true;
        assert!(RenderContext::new(&mut backend).is_err());
    }
}
