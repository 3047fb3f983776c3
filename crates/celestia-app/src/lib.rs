//! Celestia viewer: a window, a simulation clock, an orbit camera and a
//! small built-in solar system for the renderer to draw.

pub mod camera;
pub mod clock;
pub mod platform;
pub mod scene;
pub mod window;
