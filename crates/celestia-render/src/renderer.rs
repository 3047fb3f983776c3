//! Frame orchestration: sky layers, the star field, orbits, then every
//! render list entry far to near in its own slice of the depth range.

use glam::{DQuat, DVec3, Mat4, Quat, Vec2, Vec3};
use thiserror::Error;

use crate::astro::{KM_PER_AU, KM_PER_LY, km_to_au};
use crate::backend::{BackendError, BlendMode, Frame, PrimitivePass, PrimitiveVertex, RenderBackend};
use crate::body::{AppearanceFlags, Atmosphere, Body, BodyId, PlanetarySystem, Surface};
use crate::color::Color;
use crate::comet::render_comet_tail;
use crate::context::RenderContext;
use crate::eclipse::{EclipseShadow, test_eclipse};
use crate::flags::{LabelFlags, RenderFlags, TextureResolution};
use crate::labels::Label;
use crate::observer::{Observer, Selection};
use crate::orbit_cache::OrbitCache;
use crate::render_list::{
    CORONA_HEIGHT, CullView, DepthPartition, EntryObject, RenderListEntry, cull_render_list,
    sort_render_list,
};
use crate::render_object::{ObjectTextures, ObjectView, RenderProperties, render_object, star_rotation};
use crate::sky::{
    SkyView, label_constellations, label_galaxies, render_asterisms, render_boundaries,
    render_celestial_grid, render_galaxies, sky_lightness,
};
use crate::stars::{
    Brightness, ParticleView, StarFieldParams, StarFieldStats, faintest_planet_mag,
    limiting_magnitudes, render_body_as_particle, render_stars,
};
use crate::texture::{Texture, TextureProvider};
use crate::traversal::{PlanetarySystemTraversal, TraversalParams};
use crate::universe::{SolarSystem, Star, StarId, Universe};

/// Near plane of the sky and pick-ray projection (km).
pub const NEAR_DIST: f32 = 0.5;
pub const FAR_DIST: f32 = 1.0e7;
pub const DEFAULT_FOV_DEGREES: f32 = 45.0;
/// Orbits smaller than this many pixels are neither drawn nor labelled.
pub const DEFAULT_MIN_ORBIT_SIZE: f32 = 20.0;
/// Stars beyond this many light years are skipped.
pub const DEFAULT_DISTANCE_LIMIT: f32 = 1.0e6;
pub const DEFAULT_SATURATION_MAG_NIGHT: f32 = 1.0;
pub const DEFAULT_AMBIENT: f32 = 0.1;

const ORBIT_COLOR: Color = Color::rgb(0.0, 0.4, 1.0);
const SELECTED_ORBIT_COLOR: Color = Color::rgb(1.0, 0.0, 0.0);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer used before init")]
    NotInitialized,
    #[error("invalid viewport {0}x{1}")]
    InvalidViewport(u32, u32),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Angular size of one pixel (radians) for a vertical field of view.
pub fn pixel_size(fov: f32, height: u32) -> f32 {
    2.0 * (fov / 2.0).tan() / height.max(1) as f32
}

pub struct Renderer<B: RenderBackend> {
    backend: B,
    context: Option<RenderContext>,
    frame: Frame,
    render_list: Vec<RenderListEntry>,
    traversal: PlanetarySystemTraversal,
    orbit_cache: OrbitCache,
    partition: Option<DepthPartition>,
    star_stats: StarFieldStats,
    width: u32,
    height: u32,
    /// Vertical field of view (degrees).
    fov: f32,
    render_flags: RenderFlags,
    label_mode: LabelFlags,
    ambient: f32,
    min_orbit_size: f32,
    distance_limit: f32,
    brightness_bias: f32,
    saturation_mag_night: f32,
    texture_resolution: TextureResolution,
    fragment_shaders: bool,
    vertex_shaders: bool,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            context: None,
            frame: Frame::default(),
            render_list: Vec::new(),
            traversal: PlanetarySystemTraversal::new(),
            orbit_cache: OrbitCache::default(),
            partition: None,
            star_stats: StarFieldStats::default(),
            width: 1,
            height: 1,
            fov: DEFAULT_FOV_DEGREES,
            render_flags: RenderFlags::DEFAULT,
            label_mode: LabelFlags::NONE,
            ambient: DEFAULT_AMBIENT,
            min_orbit_size: DEFAULT_MIN_ORBIT_SIZE,
            distance_limit: DEFAULT_DISTANCE_LIMIT,
            brightness_bias: 0.0,
            saturation_mag_night: DEFAULT_SATURATION_MAG_NIGHT,
            texture_resolution: TextureResolution::Medium,
            fragment_shaders: true,
            vertex_shaders: true,
        }
    }

    /// Probe the device and build the shared resources. Must succeed
    /// before the first [`Renderer::render`].
    pub fn init(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidViewport(width, height));
        }
        let mut context = RenderContext::new(&mut self.backend)?;
        context.shading.set_fragment_shaders(self.fragment_shaders);
        context.shading.set_vertex_shaders(self.vertex_shaders);
        log::info!("shading strategy {:?}", context.shading.strategy());
        self.context = Some(context);
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// Vertical field of view in degrees.
    pub fn set_fov(&mut self, degrees: f32) {
        self.fov = degrees;
    }

    pub fn render_flags(&self) -> RenderFlags {
        self.render_flags
    }

    pub fn set_render_flags(&mut self, flags: RenderFlags) {
        self.render_flags = flags;
    }

    pub fn label_mode(&self) -> LabelFlags {
        self.label_mode
    }

    pub fn set_label_mode(&mut self, mode: LabelFlags) {
        self.label_mode = mode;
    }

    pub fn ambient_light_level(&self) -> f32 {
        self.ambient
    }

    pub fn set_ambient_light_level(&mut self, level: f32) {
        self.ambient = level;
    }

    pub fn minimum_orbit_size(&self) -> f32 {
        self.min_orbit_size
    }

    pub fn set_minimum_orbit_size(&mut self, pixels: f32) {
        self.min_orbit_size = pixels;
    }

    pub fn distance_limit(&self) -> f32 {
        self.distance_limit
    }

    pub fn set_distance_limit(&mut self, light_years: f32) {
        self.distance_limit = light_years;
    }

    pub fn brightness_bias(&self) -> f32 {
        self.brightness_bias
    }

    pub fn set_brightness_bias(&mut self, bias: f32) {
        self.brightness_bias = bias;
    }

    pub fn saturation_magnitude(&self) -> f32 {
        self.saturation_mag_night
    }

    pub fn set_saturation_magnitude(&mut self, mag: f32) {
        self.saturation_mag_night = mag;
    }

    pub fn texture_resolution(&self) -> TextureResolution {
        self.texture_resolution
    }

    pub fn set_texture_resolution(&mut self, resolution: TextureResolution) {
        self.texture_resolution = resolution;
    }

    /// Whether fragment shaders are in use; always false on devices
    /// without them.
    pub fn fragment_shaders(&self) -> bool {
        match &self.context {
            Some(context) => context.shading.fragment_shaders(),
            None => self.fragment_shaders,
        }
    }

    pub fn set_fragment_shaders(&mut self, enabled: bool) {
        self.fragment_shaders = enabled;
        if let Some(context) = &mut self.context {
            context.shading.set_fragment_shaders(enabled);
        }
    }

    pub fn vertex_shaders(&self) -> bool {
        match &self.context {
            Some(context) => context.shading.vertex_shaders(),
            None => self.vertex_shaders,
        }
    }

    pub fn set_vertex_shaders(&mut self, enabled: bool) {
        self.vertex_shaders = enabled;
        if let Some(context) = &mut self.context {
            context.shading.set_vertex_shaders(enabled);
        }
    }

    pub fn set_orbit_cache(&mut self, cache: OrbitCache) {
        self.orbit_cache = cache;
    }

    pub fn orbit_cache(&self) -> &OrbitCache {
        &self.orbit_cache
    }

    pub fn context(&self) -> Option<&RenderContext> {
        self.context.as_ref()
    }

    /// Entries of the last frame, nearest first.
    pub fn render_list(&self) -> &[RenderListEntry] {
        &self.render_list
    }

    /// Depth buckets used by the last frame.
    pub fn depth_bucket_count(&self) -> usize {
        self.partition.map_or(0, |p| p.bucket_count())
    }

    pub fn star_stats(&self) -> StarFieldStats {
        self.star_stats
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Eye-space direction through window pixel `(x, y)`, origin at the
    /// top left. Rotate by the observer orientation for a world ray.
    pub fn pick_ray(&self, x: f32, y: f32) -> Vec3 {
        let height = 2.0 * NEAR_DIST * (self.fov.to_radians() / 2.0).tan();
        let width = height * self.width as f32 / self.height as f32;
        Vec3::new(
            width * (x / self.width as f32 - 0.5),
            height * (0.5 - y / self.height as f32),
            -NEAR_DIST,
        )
        .normalize()
    }

    /// Resolve the textures `body` would draw with at the current
    /// resolution, returning how many are resident.
    pub fn load_textures(&self, body: &Body, provider: &dyn TextureProvider) -> usize {
        let bump_mapping = self
            .context
            .as_ref()
            .is_some_and(|context| context.shading.bump_mapping());
        let textures = ObjectTextures::for_body(
            body,
            provider,
            self.texture_resolution,
            self.render_flags,
            bump_mapping,
        );
        let found = [
            textures.base.is_some(),
            textures.bump.is_some(),
            textures.night.is_some(),
            textures.gloss.is_some(),
            textures.clouds.is_some(),
            textures.rings.is_some(),
        ]
        .into_iter()
        .filter(|&present| present)
        .count();
        log::debug!("{}: {found} textures resident", body.name);
        found
    }

    /// Draw one frame seen by `observer` at Julian date `now`.
    pub fn render(
        &mut self,
        observer: &Observer,
        universe: &dyn Universe,
        textures: &dyn TextureProvider,
        faintest_mag_night: f32,
        selection: Selection,
        now: f64,
    ) -> Result<(), RenderError> {
        let ctx = self.context.as_ref().ok_or(RenderError::NotInitialized)?;

        let fov_deg = self.fov;
        let fov = fov_deg.to_radians();
        let viewport = (self.width, self.height);
        let aspect = self.width as f32 / self.height as f32;
        let pixel_size = pixel_size(fov, self.height);
        let camera = observer.orientation.conjugate();
        let flags = self.render_flags;
        let sky_projection = Mat4::perspective_rh(fov, aspect, NEAR_DIST, FAR_DIST);

        self.frame.reset(Color::BLACK, viewport);
        self.render_list.clear();
        let mut labels: Vec<Label> = Vec::new();

        let system = universe.nearest_solar_system(observer.position);
        let sun = system.and_then(|s| universe.star(s.star));
        let observer_helio = sun.map(|star| (observer.position - star.position) * KM_PER_LY);

        let (mut faintest_mag, mut saturation_mag) = limiting_magnitudes(
            faintest_mag_night,
            self.saturation_mag_night,
            fov_deg,
            flags.contains(RenderFlags::SHOW_AUTO_MAG),
        );
        let faintest_planet = faintest_planet_mag(faintest_mag, fov_deg);

        if flags.contains(RenderFlags::SHOW_PLANETS)
            && let Some(system) = system
            && let (Some(star), Some(observer_helio)) = (sun, observer_helio)
        {
            let params = TraversalParams {
                observer: observer_helio,
                camera,
                projection: sky_projection,
                viewport,
                pixel_size,
                faintest_planet_mag: faintest_planet,
                sun_luminosity: star.luminosity(),
                now,
                flags,
                label_mode: self.label_mode,
                min_orbit_size: self.min_orbit_size,
            };
            self.traversal
                .run(&system.planets, &params, &mut self.render_list, &mut labels);
        }

        // Being inside a lit atmosphere washes out the sky.
        if let Some(system) = system {
            for entry in &self.render_list {
                if let EntryObject::Body(id) = entry.object
                    && let Some(body) = system.planets.find(id)
                    && let Some(atmosphere) = &body.atmosphere
                {
                    let lightness = sky_lightness(entry, body.radius, atmosphere);
                    if lightness > 0.0 {
                        self.frame.clear_color = atmosphere.sky_color.scaled(lightness).with_alpha(1.0);
                        faintest_mag -= 10.0 * lightness;
                        saturation_mag -= 10.0 * lightness;
                    }
                }
            }
        }
        let brightness = Brightness::new(faintest_mag, saturation_mag, self.brightness_bias);

        self.frame.set_depth_range(0.0, 1.0);
        self.frame.set_projection(sky_projection);
        let sky = SkyView {
            observer: observer.position,
            camera,
            pixel_size,
            projection: sky_projection,
            viewport,
            smooth_lines: flags.contains(RenderFlags::SHOW_SMOOTH_LINES),
        };
        if flags.contains(RenderFlags::SHOW_CELESTIAL_SPHERE) {
            render_celestial_grid(&mut self.frame, &sky, &mut labels);
        }
        if flags.contains(RenderFlags::SHOW_GALAXIES) {
            render_galaxies(&mut self.frame, &sky, universe.galaxies(), faintest_mag, ctx.textures.galaxy);
        }
        self.star_stats = StarFieldStats::default();
        if flags.contains(RenderFlags::SHOW_STARS) {
            let params = StarFieldParams {
                observer: observer.position,
                orientation: observer.orientation,
                fov_deg,
                aspect,
                pixel_size,
                brightness,
                faintest_mag_night,
                distance_limit: self.distance_limit,
                as_points: flags.contains(RenderFlags::SHOW_STARS_AS_POINTS),
                labels: self.label_mode.contains(LabelFlags::STAR),
                projection: sky_projection,
                viewport,
            };
            self.star_stats = render_stars(
                &mut self.frame,
                universe,
                &params,
                &ctx.textures,
                &mut self.render_list,
                &mut labels,
            );
        }
        if flags.contains(RenderFlags::SHOW_DIAGRAMS) {
            render_asterisms(&mut self.frame, &sky, universe.asterisms());
        }
        if flags.contains(RenderFlags::SHOW_BOUNDARIES)
            && let Some(boundaries) = universe.boundaries()
        {
            render_boundaries(&mut self.frame, &sky, boundaries);
        }
        if self.label_mode.contains(LabelFlags::GALAXY) {
            label_galaxies(&sky, universe.galaxies(), &mut labels);
        }
        if self.label_mode.contains(LabelFlags::CONSTELLATION) {
            label_constellations(&sky, universe.asterisms(), &mut labels);
        }

        if flags.contains(RenderFlags::SHOW_ORBITS)
            && let Some(system) = system
            && let Some(observer_helio) = observer_helio
        {
            let view = OrbitView {
                observer: observer_helio,
                camera,
                fov,
                aspect,
                pixel_size,
                min_orbit_size: self.min_orbit_size,
                selection,
                now,
                smooth: flags.contains(RenderFlags::SHOW_SMOOTH_LINES),
            };
            render_orbits(&mut self.frame, &mut self.orbit_cache, &system.planets, &view);
        }

        cull_render_list(
            &mut self.render_list,
            &CullView {
                fov,
                viewport,
                world_to_eye: camera,
            },
        );
        sort_render_list(&mut self.render_list);
        let partition = DepthPartition::assign(&mut self.render_list);
        self.partition = Some(partition);

        let scene = Scene {
            ctx,
            textures,
            resolution: self.texture_resolution,
            system,
            sun,
            universe,
            traversal: &self.traversal,
            particles: ParticleView {
                fov_deg,
                pixel_size,
                brightness,
            },
            faintest_planet_mag: faintest_planet,
        };
        let mut view = ObjectView {
            camera,
            fov,
            aspect,
            pixel_size,
            near: 1.0,
            far: 10.0,
            flags,
            ambient: self.ambient,
            now,
        };

        let mut bucket = partition.background();
        let (low, high) = partition.range(bucket);
        self.frame.set_depth_range(low, high);
        self.frame
            .set_projection(Mat4::perspective_rh(fov, aspect, view.near, view.far));

        for entry in self.render_list.iter().rev() {
            if entry.is_meshed() {
                (view.near, view.far) = entry.clip_distances();
                if let Some(b) = entry.depth_bucket {
                    bucket = b;
                }
                let (low, high) = partition.range(bucket);
                self.frame.set_depth_range(low, high);
                self.frame
                    .set_projection(Mat4::perspective_rh(fov, aspect, view.near, view.far));
            }

            match entry.object {
                EntryObject::Body(id) => scene.draw_body(&mut self.frame, &view, entry, id),
                EntryObject::CometTail(id) => scene.draw_comet_tail(&mut self.frame, &view, entry, id),
                EntryObject::Star(id) => scene.draw_star(&mut self.frame, &view, entry, id),
            }

            if entry.is_meshed() {
                bucket = bucket.saturating_sub(1);
                let (low, high) = partition.range(bucket);
                self.frame.set_depth_range(low, high);
            }
        }

        self.frame.set_depth_range(0.0, 1.0);
        for label in labels {
            self.frame.add_label(label);
        }
        log::trace!(
            "frame: {} entries, {} buckets, {} sphere patches, {} labels",
            self.render_list.len(),
            partition.bucket_count(),
            self.frame.sphere_patch_count(),
            self.frame.labels().len()
        );
        self.backend.submit(&self.frame);
        Ok(())
    }
}

/// Per-frame state shared by the entry draws.
struct Scene<'a> {
    ctx: &'a RenderContext,
    textures: &'a dyn TextureProvider,
    resolution: TextureResolution,
    system: Option<&'a SolarSystem>,
    sun: Option<&'a Star>,
    universe: &'a dyn Universe,
    traversal: &'a PlanetarySystemTraversal,
    particles: ParticleView,
    faintest_planet_mag: f32,
}

impl Scene<'_> {
    fn render_z(view: &ObjectView) -> f32 {
        (view.near + view.far) / 2.0
    }

    fn draw_body(&self, frame: &mut Frame, view: &ObjectView, entry: &RenderListEntry, id: BodyId) {
        let Some(body) = self.system.and_then(|system| system.planets.find(id)) else {
            return;
        };

        if entry.disc_size > 1.0 {
            let shading = &self.ctx.shading;
            let textures = ObjectTextures::for_body(
                body,
                self.textures,
                self.resolution,
                view.flags,
                shading.bump_mapping(),
            );
            let shadows = if view.flags.contains(RenderFlags::SHOW_ECLIPSE_SHADOWS) {
                self.eclipse_shadows(body)
            } else {
                Vec::new()
            };
            let orientation = self
                .traversal
                .placement(id)
                .map_or_else(|| body.body_orientation(view.now), |p| p.orientation);
            let sun_color = self
                .sun
                .map_or(Color::WHITE, |star| star.spectral_class.light_color());
            let props = RenderProperties {
                radius: body.radius,
                oblateness: body.oblateness,
                orientation,
                surface: &body.surface,
                atmosphere: body.atmosphere.as_ref(),
                rings: body.rings.as_ref(),
                mesh: body.mesh,
                eclipse_shadows: &shadows,
                textures,
            };
            render_object(
                frame,
                self.ctx,
                view,
                entry.position,
                entry.sun.normalize_or_zero(),
                sun_color,
                &props,
            );
        }

        render_body_as_particle(
            frame,
            &self.particles,
            &self.ctx.textures,
            view.camera * entry.position,
            entry.app_mag,
            self.faintest_planet_mag,
            entry.disc_size,
            body.surface.color,
            Self::render_z(view),
            false,
        );
    }

    /// Shadows falling on `body`: a planet tests its satellites, a moon its
    /// parent and sibling moons.
    fn eclipse_shadows(&self, body: &Body) -> Vec<EclipseShadow> {
        let (Some(system), Some(sun)) = (self.system, self.sun) else {
            return Vec::new();
        };
        let Some(placement) = self.traversal.placement(body.id) else {
            return Vec::new();
        };

        let mut casters: Vec<&Body> = Vec::new();
        if let Some(satellites) = body.satellites() {
            casters.extend(satellites.bodies());
        }
        if let Some(parent) = placement.parent.and_then(|id| system.planets.find(id)) {
            casters.push(parent);
            if let Some(siblings) = parent.satellites() {
                casters.extend(siblings.bodies().iter().filter(|b| b.id != body.id));
            }
        }

        casters
            .into_iter()
            .filter_map(|caster| {
                let caster_pos = self.traversal.placement(caster.id)?.position;
                test_eclipse(body, placement.position, caster, caster_pos, f64::from(sun.radius))
            })
            .collect()
    }

    fn draw_comet_tail(&self, frame: &mut Frame, view: &ObjectView, entry: &RenderListEntry, id: BodyId) {
        let Some(body) = self.system.and_then(|system| system.planets.find(id)) else {
            return;
        };
        let Some(placement) = self.traversal.placement(id) else {
            return;
        };
        render_comet_tail(frame, body, placement.position, entry.position, view.camera, view.now);
    }

    fn draw_star(&self, frame: &mut Frame, view: &ObjectView, entry: &RenderListEntry, id: StarId) {
        let Some(star) = self.universe.star(id) else {
            return;
        };
        let color = star.spectral_class.apparent_color();

        if entry.disc_size > 1.0 {
            let surface = Surface {
                color,
                appearance_flags: AppearanceFlags::EMISSIVE,
                ..Surface::default()
            };
            let base: Option<&dyn Texture> = star
                .texture
                .as_ref()
                .and_then(|texture| texture.find(self.textures, self.resolution))
                .or_else(|| {
                    self.ctx
                        .textures
                        .star_surface(star.spectral_class.texture_class())
                        .map(|texture| texture as &dyn Texture)
                });
            let corona = Atmosphere {
                height: star.radius * CORONA_HEIGHT,
                lower_color: color,
                upper_color: color,
                sky_color: color,
                ..Atmosphere::default()
            };
            let props = RenderProperties {
                radius: star.radius,
                oblateness: 0.0,
                orientation: star_rotation(view.now, star.rotation_period),
                surface: &surface,
                atmosphere: Some(&corona),
                rings: None,
                mesh: None,
                eclipse_shadows: &[],
                textures: ObjectTextures {
                    base,
                    ..ObjectTextures::default()
                },
            };
            render_object(frame, self.ctx, view, entry.position, Vec3::X, Color::WHITE, &props);
        }

        render_body_as_particle(
            frame,
            &self.particles,
            &self.ctx.textures,
            view.camera * entry.position,
            entry.app_mag,
            self.particles.brightness.faintest_mag,
            entry.disc_size,
            color,
            Self::render_z(view),
            true,
        );
    }
}

struct OrbitView {
    /// Observer position relative to the star (km).
    observer: DVec3,
    camera: Quat,
    fov: f32,
    aspect: f32,
    pixel_size: f32,
    min_orbit_size: f32,
    selection: Selection,
    now: f64,
    smooth: bool,
}

/// Draw the orbits of `system` large enough to see, each with a
/// projection fitted to it. Returns the number drawn.
fn render_orbits(
    frame: &mut Frame,
    cache: &mut OrbitCache,
    system: &PlanetarySystem,
    view: &OrbitView,
) -> usize {
    cache.begin_frame();
    let mut pass = PrimitivePass::new(Mat4::from_quat(view.camera), BlendMode::Alpha)
        .with_depth(false, false);
    pass.smooth = view.smooth;

    let mut drawn = 0;
    let mut stack = vec![(system, DQuat::IDENTITY, DVec3::ZERO)];
    while let Some((system, orbit_frame, origin)) = stack.pop() {
        for body in system.bodies() {
            let selected = view.selection.is_body(body.id);
            if body.class.shows_orbit() || selected {
                let bound = body.orbit.bounding_radius();
                let distance = (origin - view.observer).length();
                if bound / (distance * f64::from(view.pixel_size)) > f64::from(view.min_orbit_size) {
                    let far = km_to_au(bound + distance) * 1.1;
                    let near = far * 1.0e-6;
                    frame.set_projection(Mat4::perspective_rh(
                        view.fov,
                        view.aspect,
                        near as f32,
                        far as f32,
                    ));

                    let color = if selected { SELECTED_ORBIT_COLOR } else { ORBIT_COLOR };
                    let vertices: Vec<PrimitiveVertex> = cache
                        .lookup(body.id, body.orbit.as_ref(), view.now)
                        .iter()
                        .map(|&point| {
                            let au = (origin + orbit_frame * point - view.observer) / KM_PER_AU;
                            PrimitiveVertex::new(au.as_vec3(), color, Vec2::ZERO)
                        })
                        .collect();
                    frame.draw_line_loop(pass.clone(), &vertices);
                    drawn += 1;
                }
            }

            if let Some(satellites) = body.satellites() {
                let center = origin + orbit_frame * body.orbit.position_at_time(view.now);
                stack.push((satellites, orbit_frame * body.equator_orientation(view.now), center));
            }
        }
    }
    cache.end_frame();
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::{J2000, ly_to_km};
    use crate::backend::{Command, RecordingBackend, Topology};
    use crate::body::{BodyClass, FixedOrbit};
    use crate::orbit_cache::ORBIT_SAMPLE_COUNT;
    use crate::texture::{MultiResTexture, TextureCatalog, TextureId, TiledTexture};
    use crate::universe::{SpectralClass, StaticUniverse};

    const SUN: StarId = StarId(1);
    const PLANET: BodyId = BodyId(1);
    /// Orbit radius and viewing distance (km).
    const D: f64 = 4.5e7;

    fn renderer() -> Renderer<RecordingBackend> {
        let mut renderer = Renderer::new(RecordingBackend::full_featured());
        renderer.init(800, 600).unwrap();
        renderer
    }

    fn fixed(x: f64) -> Box<FixedOrbit> {
        Box::new(FixedOrbit {
            position: DVec3::new(x, 0.0, 0.0),
        })
    }

    /// A small star at the origin with one planet `D` km away.
    fn universe(planet: Body) -> StaticUniverse {
        let mut sun = Star::new(SUN, "Sun", DVec3::ZERO, 4.83, SpectralClass::G);
        sun.radius = 1.0e5;
        let mut universe = StaticUniverse::new();
        universe.add_star(sun);
        universe.add_solar_system(SolarSystem {
            star: SUN,
            planets: PlanetarySystem::new().with(planet),
        });
        universe
    }

    fn planet() -> Body {
        Body::new(PLANET, "Planet", BodyClass::Planet, 7.0e4, fixed(D))
    }

    /// `D` km beyond the planet, looking back at it and the star.
    fn observer() -> Observer {
        let mut observer = Observer::new(DVec3::new(2.0 * D / KM_PER_LY, 0.0, 0.0), Quat::IDENTITY);
        observer.look_at(DVec3::ZERO, Vec3::Y);
        observer
    }

    fn depth_ranges(frame: &Frame) -> Vec<(f32, f32)> {
        frame
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetDepthRange { near, far } => Some((*near, *far)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_render_before_init_fails() {
        let mut renderer = Renderer::new(RecordingBackend::full_featured());
        let result = renderer.render(
            &Observer::default(),
            &StaticUniverse::new(),
            &TextureCatalog::new(),
            6.0,
            Selection::None,
            J2000,
        );
        assert!(matches!(result, Err(RenderError::NotInitialized)));
        assert_eq!(renderer.backend().frames_submitted, 0);
    }

    #[test]
    fn test_init_rejects_empty_viewport_and_failed_uploads() {
        let mut renderer = Renderer::new(RecordingBackend::full_featured());
        assert!(matches!(renderer.init(0, 600), Err(RenderError::InvalidViewport(0, 600))));

        let mut backend = RecordingBackend::full_featured();
        backend.fail_textures = true;
        let mut renderer = Renderer::new(backend);
        assert!(matches!(renderer.init(800, 600), Err(RenderError::Backend(_))));
        assert!(!renderer.is_initialized());
    }

    #[test]
    fn test_pick_ray_through_center_and_corner() {
        let renderer = renderer();
        let center = renderer.pick_ray(400.0, 300.0);
        assert!((center - Vec3::NEG_Z).length() < 1e-6);

        let corner = renderer.pick_ray(0.0, 0.0);
        assert!(corner.x < 0.0 && corner.y > 0.0 && corner.z < 0.0);
        let half_fov = (corner.y / -corner.z).atan();
        assert!((half_fov - 22.5f32.to_radians()).abs() < 1e-4);
        assert!((corner.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_planet_is_meshed_and_star_is_a_point() {
        let mut renderer = renderer();
        let universe = universe(planet());
        renderer
            .render(&observer(), &universe, &TextureCatalog::new(), 6.0, Selection::None, J2000)
            .unwrap();

        let list = renderer.render_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].object, EntryObject::Body(PLANET));
        assert!(list[0].disc_size > 1.0);
        assert_eq!(list[0].depth_bucket, Some(0));
        assert_eq!(renderer.depth_bucket_count(), 2);

        let stats = renderer.star_stats();
        assert_eq!(stats.close, 1);
        assert_eq!(stats.rendered, 1);

        let frame = renderer.frame();
        assert!(frame.sphere_patch_count() > 0);
        assert_eq!(
            depth_ranges(frame),
            vec![(0.0, 1.0), (0.5, 1.0), (0.0, 0.5), (0.0, 0.5), (0.0, 1.0)]
        );
        assert_eq!(renderer.backend().frames_submitted, 1);
    }

    #[test]
    fn test_render_list_is_deterministic() {
        let mut renderer = renderer();
        let universe = universe(planet());
        let textures = TextureCatalog::new();
        renderer
            .render(&observer(), &universe, &textures, 6.0, Selection::None, J2000)
            .unwrap();
        let first = renderer.render_list().to_vec();
        renderer
            .render(&observer(), &universe, &textures, 6.0, Selection::None, J2000)
            .unwrap();
        assert_eq!(renderer.render_list(), first.as_slice());
    }

    #[test]
    fn test_orbits_are_cached_and_selection_is_red() {
        let mut renderer = renderer();
        renderer.set_render_flags(RenderFlags::SHOW_PLANETS | RenderFlags::SHOW_ORBITS);
        let universe = universe(planet());
        let textures = TextureCatalog::new();

        renderer
            .render(&observer(), &universe, &textures, 6.0, Selection::Body(PLANET), J2000)
            .unwrap();
        assert_eq!(renderer.orbit_cache().live_count(), 1);
        assert_eq!(renderer.orbit_cache().samples_taken(), 1);

        let frame = renderer.frame();
        let (range, pass) = frame
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::DrawPrimitives {
                    pass,
                    topology: Topology::LineStrip,
                    vertices,
                } => Some((vertices.clone(), pass.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(range.len(), ORBIT_SAMPLE_COUNT + 1);
        assert!(!pass.depth_test);
        let vertex = frame.primitive_vertices()[range.start as usize];
        assert_eq!(vertex.color, SELECTED_ORBIT_COLOR.to_array());

        renderer
            .render(&observer(), &universe, &textures, 6.0, Selection::None, J2000 + 1.0)
            .unwrap();
        assert_eq!(renderer.orbit_cache().samples_taken(), 1);
    }

    #[test]
    fn test_sky_inside_atmosphere_is_colored() {
        let mut earth = planet();
        earth.radius = 6378.0;
        earth.atmosphere = Some(Atmosphere {
            height: 60.0,
            sky_color: Color::rgb(0.3, 0.6, 0.9),
            ..Atmosphere::default()
        });
        let universe = universe(earth);
        // One kilometre above the sunlit side.
        let eye_km = D - 6379.0;
        let mut observer = Observer::new(DVec3::new(eye_km / KM_PER_LY, 0.0, 0.0), Quat::IDENTITY);
        observer.look_at(DVec3::new(0.0, 1.0e-6, 0.0), Vec3::Z);

        let mut renderer = renderer();
        renderer
            .render(&observer, &universe, &TextureCatalog::new(), 6.0, Selection::None, J2000)
            .unwrap();
        let clear = renderer.frame().clear_color;
        assert!(clear.b > 0.5);
        assert!(clear.b > clear.r);
    }

    #[test]
    fn test_shader_toggles_are_capability_gated() {
        let mut basic = Renderer::new(RecordingBackend::default());
        basic.set_fragment_shaders(true);
        assert!(basic.fragment_shaders());
        basic.init(640, 480).unwrap();
        assert!(!basic.fragment_shaders());
        assert!(!basic.vertex_shaders());

        let mut renderer = renderer();
        renderer.set_vertex_shaders(false);
        assert!(renderer.fragment_shaders());
        assert!(!renderer.vertex_shaders());
        assert_eq!(
            renderer.context().unwrap().shading.strategy(),
            crate::shading::ShadingStrategy::FragmentCombiner
        );
    }

    #[test]
    fn test_load_textures_counts_resident_maps() {
        let mut catalog = TextureCatalog::new();
        let handle = catalog.insert(TiledTexture::single(TextureId(7), 512, 256));
        let mut body = planet();
        body.surface.base_texture = MultiResTexture::uniform(handle);
        body.surface.night_texture = MultiResTexture::uniform(handle);

        let mut renderer = renderer();
        assert_eq!(renderer.load_textures(&body, &catalog), 1);
        renderer.set_render_flags(RenderFlags::DEFAULT | RenderFlags::SHOW_NIGHT_MAPS);
        body.surface.appearance_flags = AppearanceFlags::APPLY_NIGHT_MAP;
        assert_eq!(renderer.load_textures(&body, &catalog), 2);
    }

    #[test]
    fn test_pixel_size_matches_fov() {
        let size = pixel_size(45f32.to_radians(), 600);
        assert!((size - 0.001_380_7).abs() < 1e-6);
        assert!((ly_to_km(1.0) - KM_PER_LY).abs() < 1.0);
    }
}
