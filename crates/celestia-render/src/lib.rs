//! Celestia's planetary renderer: LOD sphere tessellation, the per-frame
//! render list and depth partition, per-object surface passes, and a wgpu
//! backend that replays recorded frames.

pub mod astro;
pub mod backend;
pub mod body;
pub mod buffer;
pub mod color;
pub mod comet;
pub mod context;
pub mod depth;
pub mod eclipse;
pub mod flags;
pub mod frustum;
pub mod gpu;
pub mod labels;
pub mod lod_sphere;
pub mod observer;
pub mod orbit_cache;
pub mod pipeline;
pub mod render_list;
pub mod render_object;
pub mod renderer;
pub mod shading;
pub mod sky;
pub mod stars;
pub mod texture;
pub mod texture_store;
pub mod traversal;
pub mod trig;
pub mod universe;
pub mod wgpu_backend;

pub use backend::{
    BackendError, BlendMode, Command, CullMode, DeviceCapabilities, Frame, MeshData, PassId,
    PrimitivePass, PrimitiveVertex, RecordingBackend, RenderBackend, ShaderProgram,
    SphereGeometry, SurfacePass, TexGen, Topology,
};
pub use body::{
    AppearanceFlags, Atmosphere, Body, BodyClass, BodyId, FixedOrbit, KeplerOrbit, MeshHandle,
    Orbit, OrbitalElements, PlanetarySystem, RingSystem, RotationElements, Surface,
};
pub use color::Color;
pub use context::{RenderContext, StaticTextures};
pub use flags::{LabelFlags, RenderFlags, TextureResolution};
pub use frustum::{Frustum, Intersection, Plane};
pub use gpu::{GpuContext, GpuContextError, SurfaceError, init_gpu_context_blocking};
pub use labels::Label;
pub use lod_sphere::{LodSphereMesh, SphereAttributes};
pub use observer::{Observer, ObserverMode, Selection};
pub use orbit_cache::{OrbitCache, OrbitHandle};
pub use render_list::{DepthPartition, EntryObject, RenderListEntry};
pub use renderer::{RenderError, Renderer};
pub use shading::{Capabilities, Quirks, ShadingState, ShadingStrategy};
pub use texture::{
    AddressMode, MultiResTexture, Texture, TextureCatalog, TextureHandle, TextureId, TextureImage,
    TextureProvider, TiledTexture,
};
pub use universe::{
    Asterism, ConstellationBoundaries, Galaxy, SolarSystem, SpectralClass, Star, StarId,
    StarTextureClass, StaticUniverse, Universe,
};
pub use wgpu_backend::WgpuBackend;
