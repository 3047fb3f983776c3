//! Texture handles, tiled multi-resolution textures, and the procedural
//! textures the renderer builds at init.
//!
//! Bodies hold [`TextureHandle`]s. A [`TextureProvider`] resolves a handle to
//! a [`Texture`], which reports its level-of-detail count and the grid of
//! tiles each level is split into. Tiles carry the [`TextureId`] the backend
//! binds.

use rustc_hash::FxHashMap;

use crate::flags::TextureResolution;

/// Opaque reference to a texture owned by a [`TextureProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// A texture resident in the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Sub-rectangle of a texture level that covers one tile of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTile {
    /// `None` when the tile is not resident.
    pub id: Option<TextureId>,
    pub u: f32,
    pub v: f32,
    pub du: f32,
    pub dv: f32,
}

impl TextureTile {
    /// A tile covering its whole backing texture.
    pub fn whole(id: TextureId) -> Self {
        Self {
            id: Some(id),
            u: 0.0,
            v: 0.0,
            du: 1.0,
            dv: 1.0,
        }
    }

    pub fn missing() -> Self {
        Self {
            id: None,
            u: 0.0,
            v: 0.0,
            du: 1.0,
            dv: 1.0,
        }
    }
}

/// A bindable texture, possibly split into a grid of tiles per level.
pub trait Texture {
    /// Width in texels of the finest level.
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Number of levels of detail; level 0 is the coarsest.
    fn lod_count(&self) -> usize;
    fn u_tile_count(&self, lod: usize) -> usize;
    fn v_tile_count(&self, lod: usize) -> usize;
    fn tile(&self, lod: usize, u: usize, v: usize) -> TextureTile;
}

#[derive(Debug, Clone)]
struct TileGrid {
    u_tiles: usize,
    v_tiles: usize,
    /// Row-major, `v * u_tiles + u`.
    tiles: Vec<Option<TextureId>>,
}

/// A texture stored as one or more levels, each a grid of backend textures.
#[derive(Debug, Clone)]
pub struct TiledTexture {
    width: u32,
    height: u32,
    levels: Vec<TileGrid>,
}

impl TiledTexture {
    /// A texture with one level and a single tile.
    pub fn single(id: TextureId, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            levels: vec![TileGrid {
                u_tiles: 1,
                v_tiles: 1,
                tiles: vec![Some(id)],
            }],
        }
    }

    /// An empty texture; add levels with [`TiledTexture::with_level`].
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            levels: Vec::new(),
        }
    }

    /// Append a level split into `u_tiles × v_tiles`. Missing trailing tiles
    /// are treated as not resident.
    #[must_use]
    pub fn with_level(mut self, u_tiles: usize, v_tiles: usize, ids: Vec<TextureId>) -> Self {
        let mut tiles: Vec<Option<TextureId>> = ids.into_iter().map(Some).collect();
        tiles.resize(u_tiles * v_tiles, None);
        self.levels.push(TileGrid {
            u_tiles: u_tiles.max(1),
            v_tiles: v_tiles.max(1),
            tiles,
        });
        self
    }

    fn level(&self, lod: usize) -> Option<&TileGrid> {
        self.levels.get(lod)
    }
}

impl Texture for TiledTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn lod_count(&self) -> usize {
        self.levels.len().max(1)
    }

    fn u_tile_count(&self, lod: usize) -> usize {
        self.level(lod).map_or(1, |grid| grid.u_tiles)
    }

    fn v_tile_count(&self, lod: usize) -> usize {
        self.level(lod).map_or(1, |grid| grid.v_tiles)
    }

    fn tile(&self, lod: usize, u: usize, v: usize) -> TextureTile {
        let Some(grid) = self.level(lod) else {
            return TextureTile::missing();
        };
        if u >= grid.u_tiles || v >= grid.v_tiles {
            return TextureTile::missing();
        }
        match grid.tiles[v * grid.u_tiles + u] {
            Some(id) => TextureTile::whole(id),
            None => TextureTile::missing(),
        }
    }
}

/// One texture per resolution tier; any tier may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiResTexture {
    pub tiers: [Option<TextureHandle>; TextureResolution::COUNT],
}

impl MultiResTexture {
    /// The same texture at every tier.
    pub fn uniform(handle: TextureHandle) -> Self {
        Self {
            tiers: [Some(handle); TextureResolution::COUNT],
        }
    }

    pub fn is_set(&self, resolution: TextureResolution) -> bool {
        self.tiers[resolution.index()].is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(Option::is_none)
    }

    /// Handle for `resolution`, falling back to coarser tiers and then to
    /// finer ones.
    pub fn handle(&self, resolution: TextureResolution) -> Option<TextureHandle> {
        let wanted = resolution.index();
        (0..=wanted)
            .rev()
            .chain(wanted + 1..TextureResolution::COUNT)
            .find_map(|tier| self.tiers[tier])
    }

    /// Resolve through `provider`; `None` means "draw untextured".
    pub fn find<'a>(
        &self,
        provider: &'a dyn TextureProvider,
        resolution: TextureResolution,
    ) -> Option<&'a dyn Texture> {
        self.handle(resolution)
            .and_then(|handle| provider.texture(handle))
    }
}

/// Resolves texture handles to resident textures.
pub trait TextureProvider {
    fn texture(&self, handle: TextureHandle) -> Option<&dyn Texture>;
}

/// In-memory [`TextureProvider`].
#[derive(Debug, Default)]
pub struct TextureCatalog {
    textures: FxHashMap<TextureHandle, TiledTexture>,
    next_handle: u32,
}

impl TextureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a texture and return its new handle.
    pub fn insert(&mut self, texture: TiledTexture) -> TextureHandle {
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(handle, texture);
        handle
    }

    pub fn remove(&mut self, handle: TextureHandle) -> Option<TiledTexture> {
        self.textures.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl TextureProvider for TextureCatalog {
    fn texture(&self, handle: TextureHandle) -> Option<&dyn Texture> {
        self.textures.get(&handle).map(|t| t as &dyn Texture)
    }
}

// --- Procedural textures ---

/// How a texture is addressed outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    ClampToEdge,
}

/// CPU-side RGBA8 image handed to the backend for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, row-major.
    pub pixels: Vec<u8>,
    pub address_mode: AddressMode,
    pub mipmaps: bool,
}

impl TextureImage {
    /// Evaluate `eval(u, v)` at every texel center, with `u` and `v` in
    /// `[-1, 1]`.
    pub fn procedural(
        label: &'static str,
        width: u32,
        height: u32,
        eval: impl Fn(f32, f32) -> [u8; 4],
    ) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
                let v = (y as f32 + 0.5) / height as f32 * 2.0 - 1.0;
                pixels.extend_from_slice(&eval(u, v));
            }
        }
        Self {
            label,
            width,
            height,
            pixels,
            address_mode: AddressMode::Repeat,
            mipmaps: true,
        }
    }

    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.address_mode = AddressMode::ClampToEdge;
        self
    }

    /// Drop the mip chain so edge texels stay intact.
    #[must_use]
    pub fn without_mipmaps(mut self) -> Self {
        self.mipmaps = false;
        self
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

fn grey(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.99) as u8
}

/// Radius inside which shadow textures are dark; the rim stays white so
/// clamped lookups never leak shadow.
const SHADOW_EDGE: f32 = 15.0 / 16.0;

/// Bright disc with a soft edge, used for star points and particles.
pub fn star_disc_image(size: u32) -> TextureImage {
    TextureImage::procedural("star-disc", size, size, |u, v| {
        let r = 1.0 - (u * u + v * v).sqrt();
        let r = if r < 0.0 {
            0.0
        } else if r < 0.25 {
            4.0 * r
        } else {
            1.0
        };
        let g = grey(r);
        [g, g, g, 255]
    })
    .clamped()
}

/// Radial falloff used for glare around bright stars.
pub fn glare_image(size: u32) -> TextureImage {
    TextureImage::procedural("glare", size, size, |u, v| {
        let r = 0.9 - (u * u + v * v).sqrt();
        let g = grey(r / 0.9);
        [g, g, g, 255]
    })
    .clamped()
}

/// Faint grey blob drawn for each galaxy sample point.
pub fn galaxy_image(size: u32) -> TextureImage {
    TextureImage::procedural("galaxy", size, size, |u, v| {
        let r = 0.9 - (u * u + v * v).sqrt();
        [65, 64, 65, grey(r)]
    })
    .clamped()
}

/// Hard-edged disc for ring shadows and full eclipses.
pub fn shadow_disc_image(size: u32) -> TextureImage {
    TextureImage::procedural("shadow-disc", size, size, |u, v| {
        let r = (u * u + v * v).sqrt();
        let g = if r < SHADOW_EDGE { 0 } else { 255 };
        [g, g, g, 255]
    })
    .clamped()
    .without_mipmaps()
}

/// Penumbra gradient with a dark core of relative radius `umbra`.
pub fn eclipse_shadow_image(size: u32, umbra: f32) -> TextureImage {
    TextureImage::procedural("eclipse-shadow", size, size, move |u, v| {
        let r = (u * u + v * v).sqrt() / SHADOW_EDGE;
        let g = if r >= 1.0 {
            255
        } else if r <= umbra {
            0
        } else {
            grey(((r - umbra) / (1.0 - umbra)).sqrt())
        };
        [g, g, g, 255]
    })
    .clamped()
    .without_mipmaps()
}

/// Number of eclipse shadow bands, the last being the hard shadow disc.
pub const ECLIPSE_SHADOW_BANDS: usize = 5;

/// The five eclipse shadow images, by band: four penumbra gradients with
/// umbra 0, 0.25, 0.5, 0.75, then the hard disc.
pub fn eclipse_shadow_images() -> [TextureImage; ECLIPSE_SHADOW_BANDS] {
    [
        eclipse_shadow_image(128, 0.0),
        eclipse_shadow_image(128, 0.25),
        eclipse_shadow_image(128, 0.5),
        eclipse_shadow_image(128, 0.75),
        shadow_disc_image(256),
    ]
}
