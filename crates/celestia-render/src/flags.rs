//! Render-pass and label bitmasks, and the texture resolution tier.

use serde::{Deserialize, Serialize};

/// Declares a newtype bitmask with named constants, set operations, and a
/// lookup from lowercase config names.
macro_rules! bit_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($repr:ty) {
            $( $(#[$fmeta:meta])* const $flag:ident = $value:expr, $key:literal; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub $repr);

        impl $name {
            pub const NONE: Self = Self(0);
            $( $(#[$fmeta])* pub const $flag: Self = Self($value); )*

            const NAMED: &'static [(&'static str, Self)] = &[$(($key, Self::$flag)),*];

            /// Returns true if `self` contains all bits in `other`.
            #[must_use]
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns true if `self` shares any bit with `other`.
            #[must_use]
            pub fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            #[must_use]
            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Set or clear the bits of `other`.
            pub fn set(&mut self, other: Self, enabled: bool) {
                if enabled {
                    self.0 |= other.0;
                } else {
                    self.0 &= !other.0;
                }
            }

            /// Build a mask from config names; unknown names are reported and skipped.
            pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
                let mut flags = Self::NONE;
                for name in names {
                    let name = name.as_ref();
                    match Self::NAMED.iter().find(|(key, _)| *key == name) {
                        Some((_, flag)) => flags |= *flag,
                        None => log::warn!("unknown {} name '{name}'", stringify!($name)),
                    }
                }
                flags
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }
    };
}

pub(crate) use bit_flags;

bit_flags! {
    /// Which optional passes the renderer draws.
    pub struct RenderFlags(u32) {
        const SHOW_STARS = 0x0001, "stars";
        const SHOW_PLANETS = 0x0002, "planets";
        const SHOW_GALAXIES = 0x0004, "galaxies";
        /// Constellation figures.
        const SHOW_DIAGRAMS = 0x0008, "diagrams";
        const SHOW_CLOUD_MAPS = 0x0010, "cloud_maps";
        const SHOW_ORBITS = 0x0020, "orbits";
        /// RA/Dec grid.
        const SHOW_CELESTIAL_SPHERE = 0x0040, "celestial_sphere";
        const SHOW_NIGHT_MAPS = 0x0080, "night_maps";
        const SHOW_ATMOSPHERES = 0x0100, "atmospheres";
        const SHOW_SMOOTH_LINES = 0x0200, "smooth_lines";
        const SHOW_ECLIPSE_SHADOWS = 0x0400, "eclipse_shadows";
        const SHOW_STARS_AS_POINTS = 0x0800, "stars_as_points";
        const SHOW_RING_SHADOWS = 0x1000, "ring_shadows";
        /// Constellation boundaries.
        const SHOW_BOUNDARIES = 0x2000, "boundaries";
        /// Scale the limiting magnitude with the field of view.
        const SHOW_AUTO_MAG = 0x4000, "auto_mag";
        const SHOW_COMET_TAILS = 0x8000, "comet_tails";
    }
}

bit_flags! {
    /// Which text labels the renderer emits.
    pub struct LabelFlags(u32) {
        const STAR = 0x001, "star";
        const PLANET = 0x002, "planet";
        const MOON = 0x004, "moon";
        const CONSTELLATION = 0x008, "constellation";
        const GALAXY = 0x010, "galaxy";
        const ASTEROID = 0x020, "asteroid";
        const SPACECRAFT = 0x040, "spacecraft";
        const LOCATION = 0x080, "location";
        const COMET = 0x100, "comet";
    }
}

impl RenderFlags {
    /// Stars and planets, the initial renderer state.
    pub const DEFAULT: Self = Self(Self::SHOW_STARS.0 | Self::SHOW_PLANETS.0);
}

/// Which resolution tier of multi-resolution textures to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureResolution {
    Low,
    #[default]
    Medium,
    High,
}

impl TextureResolution {
    /// Number of tiers.
    pub const COUNT: usize = 3;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a config name; unknown names fall back to the default tier.
    pub fn from_name(name: &str) -> Self {
        match name {
            "low" => Self::Low,
            "high" => Self::High,
            "medium" => Self::Medium,
            other => {
                log::warn!("unknown texture resolution '{other}', using medium");
                Self::Medium
            }
        }
    }
}
