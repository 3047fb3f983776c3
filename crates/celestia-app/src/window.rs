//! Window creation and event handling via winit.
//!
//! [`AppState`] implements winit's [`ApplicationHandler`]: it owns the
//! renderer, the scene, the simulation clock and the camera, and draws a
//! frame on every redraw.

use std::sync::Arc;

use celestia_config::{Config, RenderConfig};
use celestia_render::{
    LabelFlags, OrbitCache, RenderBackend, RenderFlags, Renderer, Selection, TextureResolution,
    WgpuBackend,
};
use tracing::{debug, error, info, instrument, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

use crate::camera::{CameraAction, OrbitCamera};
use crate::clock::SimulationClock;
use crate::scene::{self, Scene};

/// Field of view change per key press, as a factor.
pub const FOV_STEP: f32 = 1.1;
pub const MIN_FOV_DEGREES: f32 = 0.01;
pub const MAX_FOV_DEGREES: f32 = 120.0;

pub fn window_attributes_from_config(config: &Config) -> WindowAttributes {
    let attributes = WindowAttributes::default()
        .with_title(config.window.title.clone())
        .with_inner_size(winit::dpi::LogicalSize::new(
            config.window.width as f64,
            config.window.height as f64,
        ));
    if config.window.fullscreen {
        attributes.with_fullscreen(Some(Fullscreen::Borderless(None)))
    } else {
        attributes
    }
}

/// Push every render setting from `config` into `renderer`.
pub fn configure_renderer<B: RenderBackend>(renderer: &mut Renderer<B>, config: &RenderConfig) {
    renderer.set_render_flags(RenderFlags::from_names(&config.render_flags));
    renderer.set_label_mode(LabelFlags::from_names(&config.label_flags));
    renderer.set_fov(config.fov_degrees.clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES));
    renderer.set_ambient_light_level(config.ambient_light);
    renderer.set_minimum_orbit_size(config.min_orbit_size);
    renderer.set_distance_limit(config.distance_limit);
    renderer.set_texture_resolution(TextureResolution::from_name(&config.texture_resolution));
    renderer.set_fragment_shaders(config.fragment_shaders);
    renderer.set_vertex_shaders(config.vertex_shaders);
    let capacity = (config.orbit_cache_capacity > 0).then_some(config.orbit_cache_capacity);
    renderer.set_orbit_cache(OrbitCache::new(capacity, config.invalidate_stale_orbits));
}

/// What a key press asks the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Camera(CameraAction),
    NextTarget,
    Faster,
    Slower,
    ReverseTime,
    TogglePause,
    Toggle(RenderFlags),
    ToggleLabels,
    NarrowerFov,
    WiderFov,
    Quit,
}

pub fn key_command(key: &Key) -> Option<Command> {
    let command = match key {
        Key::Named(NamedKey::ArrowLeft) => Command::Camera(CameraAction::YawLeft),
        Key::Named(NamedKey::ArrowRight) => Command::Camera(CameraAction::YawRight),
        Key::Named(NamedKey::ArrowUp) => Command::Camera(CameraAction::PitchUp),
        Key::Named(NamedKey::ArrowDown) => Command::Camera(CameraAction::PitchDown),
        Key::Named(NamedKey::Home) | Key::Named(NamedKey::PageUp) => {
            Command::Camera(CameraAction::ZoomIn)
        }
        Key::Named(NamedKey::End) | Key::Named(NamedKey::PageDown) => {
            Command::Camera(CameraAction::ZoomOut)
        }
        Key::Named(NamedKey::Tab) => Command::NextTarget,
        Key::Named(NamedKey::Space) => Command::TogglePause,
        Key::Named(NamedKey::Escape) => Command::Quit,
        Key::Character(c) => match c.as_str() {
            "l" => Command::Faster,
            "k" => Command::Slower,
            "j" => Command::ReverseTime,
            "o" => Command::Toggle(RenderFlags::SHOW_ORBITS),
            "i" => Command::Toggle(RenderFlags::SHOW_CLOUD_MAPS),
            "u" => Command::Toggle(RenderFlags::SHOW_GALAXIES),
            "a" => Command::Toggle(RenderFlags::SHOW_ATMOSPHERES),
            "n" => Command::Toggle(RenderFlags::SHOW_NIGHT_MAPS),
            "e" => Command::Toggle(RenderFlags::SHOW_ECLIPSE_SHADOWS),
            "t" => Command::Toggle(RenderFlags::SHOW_COMET_TAILS),
            "b" => Command::Toggle(RenderFlags::SHOW_BOUNDARIES),
            "/" => Command::Toggle(RenderFlags::SHOW_DIAGRAMS),
            ";" => Command::Toggle(RenderFlags::SHOW_CELESTIAL_SPHERE),
            "=" => Command::ToggleLabels,
            "," => Command::NarrowerFov,
            "." => Command::WiderFov,
            _ => return None,
        },
        _ => return None,
    };
    Some(command)
}

/// Application state: window, renderer, scene and view.
pub struct AppState {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuBackend>>,
    scene: Option<Scene>,
    config: Config,
    clock: SimulationClock,
    camera: OrbitCamera,
    focus: usize,
    selection: Selection,
}

impl AppState {
    pub fn with_config(config: Config) -> Self {
        Self {
            window: None,
            renderer: None,
            scene: None,
            config,
            clock: SimulationClock::default(),
            camera: OrbitCamera::new(scene::EARTH, 6378.0),
            focus: 0,
            selection: Selection::Body(scene::EARTH),
        }
    }

    fn initialize_rendering(&mut self, window: Arc<Window>) -> Result<(), String> {
        let size = window.inner_size();
        let backend = WgpuBackend::new(window, self.config.window.vsync)
            .map_err(|e| format!("GPU initialization failed: {e}"))?;
        let mut renderer = Renderer::new(backend);
        configure_renderer(&mut renderer, &self.config.render);
        renderer
            .init(size.width.max(1), size.height.max(1))
            .map_err(|e| format!("renderer initialization failed: {e}"))?;
        let scene = scene::build_scene(renderer.backend_mut())
            .map_err(|e| format!("scene upload failed: {e}"))?;
        info!(
            "Renderer ready at {}x{}, {} bodies in focus rotation",
            size.width,
            size.height,
            scene.focus_order.len()
        );
        self.renderer = Some(renderer);
        self.scene = Some(scene);
        Ok(())
    }

    fn handle_command(&mut self, command: Command, event_loop: &ActiveEventLoop) {
        match command {
            Command::Camera(action) => self.camera.apply(action),
            Command::NextTarget => self.focus_next(),
            Command::Faster => self.clock.faster(),
            Command::Slower => self.clock.slower(),
            Command::ReverseTime => self.clock.reverse(),
            Command::TogglePause => self.clock.toggle_pause(),
            Command::Quit => {
                info!("Quit requested");
                event_loop.exit();
            }
            Command::Toggle(flag) => {
                if let Some(renderer) = &mut self.renderer {
                    let mut flags = renderer.render_flags();
                    flags.set(flag, !flags.contains(flag));
                    renderer.set_render_flags(flags);
                }
            }
            Command::ToggleLabels => {
                if let Some(renderer) = &mut self.renderer {
                    let labels = LabelFlags::PLANET | LabelFlags::MOON | LabelFlags::STAR;
                    let mode = if renderer.label_mode().is_empty() {
                        labels
                    } else {
                        LabelFlags::NONE
                    };
                    renderer.set_label_mode(mode);
                }
            }
            Command::NarrowerFov | Command::WiderFov => {
                if let Some(renderer) = &mut self.renderer {
                    let factor = if command == Command::WiderFov {
                        FOV_STEP
                    } else {
                        1.0 / FOV_STEP
                    };
                    let fov = (renderer.fov() * factor).clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES);
                    renderer.set_fov(fov);
                }
            }
        }
        if matches!(
            command,
            Command::Faster | Command::Slower | Command::ReverseTime | Command::TogglePause
        ) {
            info!(
                "Time rate {:.3e}x{}",
                self.clock.time_rate(),
                if self.clock.is_paused() { " (paused)" } else { "" }
            );
        }
    }

    fn focus_next(&mut self) {
        let Some(scene) = &self.scene else {
            return;
        };
        if scene.focus_order.is_empty() {
            return;
        }
        self.focus = (self.focus + 1) % scene.focus_order.len();
        let id = scene.focus_order[self.focus];
        if let Some(body) = scene.body(id) {
            self.camera.retarget(id, body.radius);
            self.selection = Selection::Body(id);
            info!("Focused {}", body.name);
        }
    }

    fn redraw(&mut self) {
        let now = self.clock.tick();
        let (Some(renderer), Some(scene)) = (&mut self.renderer, &self.scene) else {
            return;
        };
        let Some(target) = scene.body_position_ly(self.camera.target, now) else {
            warn!("Camera target {:?} is not in the scene", self.camera.target);
            return;
        };
        let observer = self.camera.observer(target);
        if let Err(e) = renderer.render(
            &observer,
            &scene.universe,
            &scene.textures,
            self.config.render.faintest_magnitude,
            self.selection,
            now,
        ) {
            error!("Frame failed: {e}");
            return;
        }
        if self.config.debug.log_render_list {
            debug!(
                entries = renderer.render_list().len(),
                buckets = renderer.depth_bucket_count(),
                "render list"
            );
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(width, height);
            renderer.backend_mut().resize(width, height);
        }
        info!("Window resized to {}x{}", width, height);
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = window_attributes_from_config(&self.config);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .expect("Failed to create window"),
        );

        if let Err(e) = self.initialize_rendering(window.clone()) {
            error!("{e}");
            event_loop.exit();
            return;
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && let Some(command) = key_command(&event.logical_key)
                {
                    self.handle_command(command, event_loop);
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Creates an event loop and runs the viewer until the window closes.
#[instrument(skip(config))]
pub fn run_with_config(config: Config) {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = AppState::with_config(config);
    event_loop.run_app(&mut app).expect("Event loop failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestia_render::RecordingBackend;

    #[test]
    fn test_configure_renderer_applies_settings() {
        let mut config = Config::default();
        config.render.render_flags = vec!["stars".into(), "orbits".into(), "bogus".into()];
        config.render.label_flags = vec!["planet".into()];
        config.render.fov_degrees = 30.0;
        config.render.ambient_light = 0.25;
        config.render.texture_resolution = "high".into();
        config.render.fragment_shaders = false;

        let mut renderer = Renderer::new(RecordingBackend::full_featured());
        configure_renderer(&mut renderer, &config.render);

        assert_eq!(
            renderer.render_flags(),
            RenderFlags::SHOW_STARS | RenderFlags::SHOW_ORBITS
        );
        assert_eq!(renderer.label_mode(), LabelFlags::PLANET);
        assert_eq!(renderer.fov(), 30.0);
        assert_eq!(renderer.ambient_light_level(), 0.25);
        assert_eq!(renderer.texture_resolution(), TextureResolution::High);
        assert!(!renderer.fragment_shaders());
    }

    #[test]
    fn test_configure_renderer_clamps_fov() {
        let mut config = Config::default();
        config.render.fov_degrees = 500.0;
        let mut renderer = Renderer::new(RecordingBackend::full_featured());
        configure_renderer(&mut renderer, &config.render);
        assert_eq!(renderer.fov(), MAX_FOV_DEGREES);
    }

    #[test]
    fn test_key_commands() {
        assert_eq!(
            key_command(&Key::Named(NamedKey::ArrowLeft)),
            Some(Command::Camera(CameraAction::YawLeft))
        );
        assert_eq!(
            key_command(&Key::Character("o".into())),
            Some(Command::Toggle(RenderFlags::SHOW_ORBITS))
        );
        assert_eq!(key_command(&Key::Character("l".into())), Some(Command::Faster));
        assert_eq!(key_command(&Key::Named(NamedKey::Tab)), Some(Command::NextTarget));
        assert_eq!(key_command(&Key::Character("z".into())), None);
        assert_eq!(key_command(&Key::Named(NamedKey::F1)), None);
    }

    #[test]
    fn test_configured_renderer_draws_scene() {
        let config = Config::default();
        let mut renderer = Renderer::new(RecordingBackend::full_featured());
        configure_renderer(&mut renderer, &config.render);
        renderer.init(800, 600).expect("init");
        let scene = scene::build_scene(renderer.backend_mut()).expect("scene");

        let now = celestia_render::astro::J2000;
        let camera = OrbitCamera::new(scene::EARTH, 6378.0);
        let target = scene.body_position_ly(scene::EARTH, now).expect("earth");
        renderer
            .render(
                &camera.observer(target),
                &scene.universe,
                &scene.textures,
                config.render.faintest_magnitude,
                Selection::Body(scene::EARTH),
                now,
            )
            .expect("render");

        assert_eq!(renderer.backend().frames_submitted, 1);
        assert!(renderer.backend().last_frame.as_ref().expect("frame").sphere_patch_count() > 0);
    }

    #[test]
    fn test_app_state_starts_on_earth() {
        let state = AppState::with_config(Config::default());
        assert!(state.window.is_none());
        assert_eq!(state.camera.target, scene::EARTH);
        assert_eq!(state.selection, Selection::Body(scene::EARTH));
    }
}
