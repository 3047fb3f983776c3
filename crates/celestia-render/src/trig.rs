//! Sine/cosine lookup tables for sphere tessellation.
//!
//! Longitude (theta) runs over `[0, 2π]` and latitude (phi) over
//! `[-π/2, π/2]`. Both tables carry one extra sample so that the last index
//! of a patch can be looked up without wrapping.

use std::f64::consts::PI;

/// Precomputed trig values at a fixed angular resolution.
#[derive(Debug, Clone)]
pub struct TrigTables {
    theta_divisions: usize,
    phi_divisions: usize,
    sin_theta: Vec<f32>,
    cos_theta: Vec<f32>,
    sin_phi: Vec<f32>,
    cos_phi: Vec<f32>,
}

impl TrigTables {
    /// Build tables with `theta_divisions + 1` longitude samples and
    /// `phi_divisions + 1` latitude samples.
    ///
    /// Values at the poles, the equator and the quarter turns are exact, and
    /// each table is filled symmetrically so that opposite samples agree to
    /// the last bit.
    pub fn new(theta_divisions: usize, phi_divisions: usize) -> Self {
        debug_assert!(theta_divisions % 4 == 0 && phi_divisions % 2 == 0);

        let mut sin_theta = vec![0.0f32; theta_divisions + 1];
        let mut cos_theta = vec![0.0f32; theta_divisions + 1];
        let quarter = theta_divisions / 4;
        for i in 0..=quarter {
            let theta = i as f64 / theta_divisions as f64 * 2.0 * PI;
            let (s, c) = if i == quarter {
                (1.0, 0.0)
            } else {
                (theta.sin() as f32, theta.cos() as f32)
            };
            // Reflect the first quadrant into the other three.
            sin_theta[i] = s;
            cos_theta[i] = c;
            sin_theta[2 * quarter - i] = s;
            cos_theta[2 * quarter - i] = -c;
            sin_theta[2 * quarter + i] = -s;
            cos_theta[2 * quarter + i] = -c;
            sin_theta[theta_divisions - i] = -s;
            cos_theta[theta_divisions - i] = c;
        }
        sin_theta[0] = 0.0;
        sin_theta[2 * quarter] = 0.0;
        sin_theta[theta_divisions] = 0.0;

        let mut sin_phi = vec![0.0f32; phi_divisions + 1];
        let mut cos_phi = vec![0.0f32; phi_divisions + 1];
        let half = phi_divisions / 2;
        for i in 0..=half {
            let (s, c) = if i == 0 {
                (0.0, 1.0)
            } else if i == half {
                (1.0, 0.0)
            } else {
                let phi = i as f64 / phi_divisions as f64 * PI;
                (phi.sin() as f32, phi.cos() as f32)
            };
            sin_phi[half + i] = s;
            cos_phi[half + i] = c;
            sin_phi[half - i] = -s;
            cos_phi[half - i] = c;
        }

        Self {
            theta_divisions,
            phi_divisions,
            sin_theta,
            cos_theta,
            sin_phi,
            cos_phi,
        }
    }

    pub fn theta_divisions(&self) -> usize {
        self.theta_divisions
    }

    pub fn phi_divisions(&self) -> usize {
        self.phi_divisions
    }

    #[inline]
    pub fn sin_theta(&self, i: usize) -> f32 {
        self.sin_theta[i]
    }

    #[inline]
    pub fn cos_theta(&self, i: usize) -> f32 {
        self.cos_theta[i]
    }

    #[inline]
    pub fn sin_phi(&self, i: usize) -> f32 {
        self.sin_phi[i]
    }

    #[inline]
    pub fn cos_phi(&self, i: usize) -> f32 {
        self.cos_phi[i]
    }

    /// Point on the unit sphere at longitude index `theta` and latitude
    /// index `phi`. Y is the polar axis.
    #[inline]
    pub fn sphere_point(&self, theta: usize, phi: usize) -> glam::Vec3 {
        let cphi = self.cos_phi[phi];
        glam::Vec3::new(
            cphi * self.cos_theta[theta],
            self.sin_phi[phi],
            cphi * self.sin_theta[theta],
        )
    }
}
