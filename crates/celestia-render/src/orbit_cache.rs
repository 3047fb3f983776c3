//! Cache of sampled orbit paths, one per body, recycled frame to frame.
//!
//! Every frame starts with [`OrbitCache::begin_frame`], which clears the
//! keep mark on every slot. Looking up a body's path marks its slot kept.
//! [`OrbitCache::end_frame`] frees slots that were not looked up, and a
//! later miss for a different body reuses the least recently used free
//! slot before the pool grows.

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::body::{BodyId, Orbit};

/// Points sampled per orbit.
pub const ORBIT_SAMPLE_COUNT: usize = 100;

/// Stable reference to a cache slot; stale once the slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrbitHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    owner: Option<BodyId>,
    generation: u32,
    keep: bool,
    revision: u64,
    last_used: u64,
    points: Vec<DVec3>,
}

#[derive(Debug)]
pub struct OrbitCache {
    slots: Vec<Slot>,
    by_body: FxHashMap<BodyId, usize>,
    /// `None` lets the pool grow to the most orbits shown at once.
    capacity: Option<usize>,
    invalidate_stale: bool,
    frame: u64,
    samples_taken: usize,
    /// Holds paths that did not fit in a full cache.
    overflow: Vec<DVec3>,
}

impl Default for OrbitCache {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl OrbitCache {
    pub fn new(capacity: Option<usize>, invalidate_stale: bool) -> Self {
        Self {
            slots: Vec::new(),
            by_body: FxHashMap::default(),
            capacity: capacity.filter(|&c| c > 0),
            invalidate_stale,
            frame: 0,
            samples_taken: 0,
            overflow: Vec::new(),
        }
    }

    pub fn set_invalidate_stale(&mut self, enabled: bool) {
        self.invalidate_stale = enabled;
    }

    pub fn begin_frame(&mut self) {
        self.frame += 1;
        for slot in &mut self.slots {
            slot.keep = false;
        }
    }

    /// Free every slot whose body was not looked up this frame.
    pub fn end_frame(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.keep {
                continue;
            }
            if let Some(owner) = slot.owner.take() {
                log::trace!("orbit cache slot {index} released by {owner:?}");
                self.by_body.remove(&owner);
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    /// Path of `body`, sampled at time `t` on a miss.
    pub fn lookup(&mut self, body: BodyId, orbit: &dyn Orbit, t: f64) -> &[DVec3] {
        if let Some(&index) = self.by_body.get(&body) {
            let stale = self.invalidate_stale && self.slots[index].revision != orbit.revision();
            if stale {
                log::trace!("orbit of {body:?} changed, resampling");
                self.fill(index, orbit, t);
            }
            let slot = &mut self.slots[index];
            slot.keep = true;
            slot.last_used = self.frame;
            return &self.slots[index].points;
        }

        let Some(index) = self.acquire(body) else {
            log::debug!("orbit cache full, drawing {body:?} uncached");
            self.overflow.clear();
            orbit.sample(t, ORBIT_SAMPLE_COUNT, &mut self.overflow);
            self.samples_taken += 1;
            return &self.overflow;
        };
        self.fill(index, orbit, t);
        &self.slots[index].points
    }

    /// Handle to the slot currently owned by `body`.
    pub fn handle_of(&self, body: BodyId) -> Option<OrbitHandle> {
        self.by_body.get(&body).map(|&index| OrbitHandle {
            index: index as u32,
            generation: self.slots[index].generation,
        })
    }

    /// Points behind `handle`, or `None` if its slot has been freed.
    pub fn get(&self, handle: OrbitHandle) -> Option<&[DVec3]> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.owner.is_some())
            .map(|slot| slot.points.as_slice())
    }

    /// Number of slots, live or free.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.by_body.len()
    }

    /// Orbits sampled since the cache was created.
    pub fn samples_taken(&self) -> usize {
        self.samples_taken
    }

    fn acquire(&mut self, body: BodyId) -> Option<usize> {
        let free = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.owner.is_none())
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(index, _)| index);

        let index = match free {
            Some(index) => {
                log::trace!("orbit cache slot {index} reused for {body:?}");
                index
            }
            None if self.capacity.is_none_or(|cap| self.slots.len() < cap) => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
            None => return None,
        };

        let slot = &mut self.slots[index];
        slot.owner = Some(body);
        slot.keep = true;
        slot.last_used = self.frame;
        self.by_body.insert(body, index);
        Some(index)
    }

    fn fill(&mut self, index: usize, orbit: &dyn Orbit, t: f64) {
        let slot = &mut self.slots[index];
        slot.points.clear();
        orbit.sample(t, ORBIT_SAMPLE_COUNT, &mut slot.points);
        slot.revision = orbit.revision();
        self.samples_taken += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{KeplerOrbit, OrbitalElements};

    fn orbit(radius: f64) -> KeplerOrbit {
        KeplerOrbit::new(OrbitalElements::circular(radius, 365.25))
    }

    #[test]
    fn test_hit_within_frame_does_not_resample() {
        let mut cache = OrbitCache::default();
        let earth = orbit(1.5e8);
        cache.begin_frame();
        let first = cache.lookup(BodyId(1), &earth, 0.0).to_vec();
        let second = cache.lookup(BodyId(1), &earth, 10.0).to_vec();
        cache.end_frame();

        assert_eq!(first.len(), ORBIT_SAMPLE_COUNT);
        assert_eq!(first, second);
        assert_eq!(cache.samples_taken(), 1);
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn test_untouched_slot_is_recycled_next_frame() {
        let mut cache = OrbitCache::default();
        let a = orbit(1.0e8);
        let b = orbit(2.0e8);
        let c = orbit(3.0e8);

        cache.begin_frame();
        cache.lookup(BodyId(1), &a, 0.0);
        cache.end_frame();
        let handle_a = cache.handle_of(BodyId(1)).unwrap();

        cache.begin_frame();
        cache.lookup(BodyId(2), &b, 0.0);
        cache.end_frame();
        assert!(cache.handle_of(BodyId(1)).is_none());
        assert!(cache.get(handle_a).is_none());
        assert_eq!(cache.len(), 2);

        cache.begin_frame();
        cache.lookup(BodyId(2), &b, 0.0);
        cache.lookup(BodyId(3), &c, 0.0);
        cache.end_frame();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.live_count(), 2);
        let handle_c = cache.handle_of(BodyId(3)).unwrap();
        assert_eq!(handle_c.index, handle_a.index);
        assert_ne!(handle_c.generation, handle_a.generation);
    }

    #[test]
    fn test_one_live_slot_per_body() {
        let mut cache = OrbitCache::default();
        let a = orbit(1.0e8);
        for _ in 0..5 {
            cache.begin_frame();
            cache.lookup(BodyId(7), &a, 0.0);
            cache.lookup(BodyId(8), &a, 0.0);
            cache.lookup(BodyId(7), &a, 0.0);
            cache.end_frame();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.live_count(), 2);
        assert_eq!(cache.samples_taken(), 2);
        let owners: Vec<_> = cache.slots.iter().filter_map(|s| s.owner).collect();
        assert_eq!(owners.len(), 2);
        assert_ne!(owners[0], owners[1]);
    }

    #[test]
    fn test_changed_orbit_is_resampled() {
        let mut cache = OrbitCache::default();
        let mut a = orbit(1.0e8);
        cache.begin_frame();
        let before = cache.lookup(BodyId(1), &a, 0.0)[0];
        a.set_elements(OrbitalElements::circular(2.0e8, 365.25));
        let after = cache.lookup(BodyId(1), &a, 0.0)[0];
        assert!((after.length() - 2.0e8).abs() < 1.0);
        assert!((before.length() - 1.0e8).abs() < 1.0);
        assert_eq!(cache.samples_taken(), 2);
    }

    #[test]
    fn test_stale_orbit_kept_when_invalidation_disabled() {
        let mut cache = OrbitCache::new(None, false);
        let mut a = orbit(1.0e8);
        cache.begin_frame();
        cache.lookup(BodyId(1), &a, 0.0);
        a.set_elements(OrbitalElements::circular(2.0e8, 365.25));
        let point = cache.lookup(BodyId(1), &a, 0.0)[0];
        assert!((point.length() - 1.0e8).abs() < 1.0);
        assert_eq!(cache.samples_taken(), 1);
    }

    #[test]
    fn test_capacity_bound_falls_back_to_uncached() {
        let mut cache = OrbitCache::new(Some(1), true);
        let a = orbit(1.0e8);
        let b = orbit(2.0e8);
        cache.begin_frame();
        cache.lookup(BodyId(1), &a, 0.0);
        let points = cache.lookup(BodyId(2), &b, 0.0).to_vec();
        cache.end_frame();
        assert_eq!(points.len(), ORBIT_SAMPLE_COUNT);
        assert_eq!(cache.len(), 1);
        assert!(cache.handle_of(BodyId(2)).is_none());

        // Once body 1 drops out, its slot goes to body 2.
        cache.begin_frame();
        cache.end_frame();
        cache.begin_frame();
        cache.lookup(BodyId(2), &b, 0.0);
        cache.end_frame();
        assert!(cache.handle_of(BodyId(2)).is_some());
        assert_eq!(cache.len(), 1);
    }
}
