//! GPU texture uploads and the texture bind groups of surface draws.
//!
//! Every draw binds four texture slots plus two samplers. Slots without a
//! texture get a 1x1 white texture so the shader can multiply blindly.
//! Bind groups are cached per slot combination.

use rustc_hash::FxHashMap;

use crate::backend::{BackendError, MAX_SPHERE_TEXTURES};
use crate::texture::{AddressMode, TextureId, TextureImage};

/// Number of mip levels for the given dimensions.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    (width.max(height) as f32).log2().floor() as u32 + 1
}

/// Check that an image can be uploaded as-is.
pub fn validate_image(image: &TextureImage) -> Result<(), BackendError> {
    if image.width == 0 || image.height == 0 {
        return Err(BackendError::ZeroDimensions(image.label));
    }
    let expected = image.width as usize * image.height as usize * 4;
    if image.pixels.len() != expected {
        return Err(BackendError::TextureSize {
            label: image.label,
            expected,
            actual: image.pixels.len(),
        });
    }
    Ok(())
}

/// Halve an RGBA8 image with a 2x2 box filter. Odd edges repeat their last
/// texel.
pub fn downsample(pixels: &[u8], width: u32, height: u32) -> (Vec<u8>, u32, u32) {
    let out_w = (width / 2).max(1);
    let out_h = (height / 2).max(1);
    let mut out = Vec::with_capacity((out_w * out_h * 4) as usize);
    let texel = |x: u32, y: u32, c: usize| -> u32 {
        let x = x.min(width - 1);
        let y = y.min(height - 1);
        u32::from(pixels[((y * width + x) * 4) as usize + c])
    };
    for y in 0..out_h {
        for x in 0..out_w {
            for c in 0..4 {
                let sum = texel(2 * x, 2 * y, c)
                    + texel(2 * x + 1, 2 * y, c)
                    + texel(2 * x, 2 * y + 1, c)
                    + texel(2 * x + 1, 2 * y + 1, c);
                out.push(((sum + 2) / 4) as u8);
            }
        }
    }
    (out, out_w, out_h)
}

/// Texture ids bound to the four slots of a draw.
pub type TextureSlots = [Option<TextureId>; MAX_SPHERE_TEXTURES];

struct GpuTexture {
    view: wgpu::TextureView,
    address_mode: AddressMode,
}

pub struct TextureStore {
    textures: Vec<GpuTexture>,
    white: GpuTexture,
    sampler_repeat: wgpu::Sampler,
    sampler_clamp: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_groups: FxHashMap<TextureSlots, wgpu::BindGroup>,
}

impl TextureStore {
    /// Colors are stored linear; procedural images are authored that way.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let sampler = |label, mode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: mode,
                address_mode_v: mode,
                address_mode_w: mode,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::MipmapFilterMode::Linear,
                ..Default::default()
            })
        };
        let sampler_repeat = sampler("sampler-repeat", wgpu::AddressMode::Repeat);
        let sampler_clamp = sampler("sampler-clamp", wgpu::AddressMode::ClampToEdge);

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surface-texture-layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                sampler_entry(4),
                sampler_entry(5),
            ],
        });

        let white_image = TextureImage::procedural("white", 1, 1, |_, _| [255; 4]).without_mipmaps();
        let white = upload(device, queue, &white_image);

        Self {
            textures: Vec::new(),
            white,
            sampler_repeat,
            sampler_clamp,
            bind_group_layout,
            bind_groups: FxHashMap::default(),
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Upload an image with its mip chain. Ids start at 1.
    pub fn create(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TextureImage,
    ) -> Result<TextureId, BackendError> {
        validate_image(image)?;
        let max = device.limits().max_texture_dimension_2d;
        if image.width > max || image.height > max {
            return Err(BackendError::Unavailable(format!(
                "texture '{}' is {}x{}, device limit is {max}",
                image.label, image.width, image.height
            )));
        }
        self.textures.push(upload(device, queue, image));
        log::debug!(
            "Created texture '{}' ({}x{})",
            image.label,
            image.width,
            image.height
        );
        Ok(TextureId(self.textures.len() as u32))
    }

    fn get(&self, id: Option<TextureId>) -> &GpuTexture {
        id.and_then(|id| self.textures.get((id.0 as usize).checked_sub(1)?))
            .unwrap_or(&self.white)
    }

    /// The bind group for `slots`. Slot 3 holds the projected shadow of
    /// texgen draws and is always sampled clamped.
    pub fn bind_group(&mut self, device: &wgpu::Device, slots: TextureSlots) -> &wgpu::BindGroup {
        if !self.bind_groups.contains_key(&slots) {
            let views = slots.map(|id| &self.get(id).view);
            let sampler = match self.get(slots[0]).address_mode {
                AddressMode::Repeat => &self.sampler_repeat,
                AddressMode::ClampToEdge => &self.sampler_clamp,
            };
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("surface-textures"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(views[0]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(views[1]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(views[2]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(views[3]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::Sampler(&self.sampler_clamp),
                    },
                ],
            });
            self.bind_groups.insert(slots, bind_group);
        }
        &self.bind_groups[&slots]
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

fn upload(device: &wgpu::Device, queue: &wgpu::Queue, image: &TextureImage) -> GpuTexture {
    let mip_levels = if image.mipmaps {
        mip_level_count(image.width, image.height)
    } else {
        1
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(image.label),
        size: wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: mip_levels,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureStore::FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let mut level = image.pixels.clone();
    let (mut width, mut height) = (image.width, image.height);
    for mip_level in 0..mip_levels {
        if mip_level > 0 {
            (level, width, height) = downsample(&level, width, height);
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &level,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    GpuTexture {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        address_mode: image.address_mode,
    }
}
