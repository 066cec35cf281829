//! Fixed-capacity store of sounding grains.
//!
//! The backing vector is allocated once; spawning past capacity drops the
//! grain and counts it instead of growing.

use crate::dsp::filter::FrequencyMap;

use super::grain::{Grain, GrainParams};

#[derive(Debug)]
pub struct GrainPool {
    grains: Vec<Grain>,
    capacity: usize,
    next_id: u64,
    dropped: u64,
}

impl GrainPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            grains: Vec::with_capacity(capacity),
            capacity,
            next_id: 1,
            dropped: 0,
        }
    }

    /// Start a grain. Returns its id, or `None` if the pool is full.
    pub fn spawn(
        &mut self,
        params: &GrainParams,
        window_sigma: f32,
        frequency: &FrequencyMap,
        sample_rate: f32,
    ) -> Option<u64> {
        if self.grains.len() >= self.capacity {
            self.dropped += 1;
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.grains
            .push(Grain::new(id, params, window_sigma, frequency, sample_rate));
        Some(id)
    }

    /// Release every grain of `agent`. Grains not yet started are removed.
    pub fn release_agent(&mut self, agent: u32, frame: u64) -> usize {
        self.grains
            .retain(|grain| grain.agent() != agent || grain.has_started(frame));
        let mut released = 0;
        for grain in self.grains.iter_mut().filter(|g| g.agent() == agent) {
            if !grain.is_releasing() {
                grain.release(frame);
                released += 1;
            }
        }
        released
    }

    /// Release every grain of `population`. Grains not yet started are removed.
    pub fn release_population(&mut self, population: usize, frame: u64) {
        self.grains
            .retain(|grain| grain.population() != population || grain.has_started(frame));
        for grain in self
            .grains
            .iter_mut()
            .filter(|g| g.population() == population)
        {
            grain.release(frame);
        }
    }

    /// Force a short release on everything.
    pub fn release_all(&mut self, frame: u64, release: f32) {
        self.grains.retain(|grain| grain.has_started(frame));
        for grain in &mut self.grains {
            grain.release_fast(frame, release);
        }
    }

    /// Drop grains that finished or whose sample slot changed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Grain) -> bool) {
        self.grains.retain(|grain| !grain.is_finished() && keep(grain));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Grain> {
        self.grains.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Grain> {
        self.grains.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.grains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grains.is_empty()
    }

    /// Grains rejected because the pool was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn count_for_agent(&self, agent: u32) -> usize {
        self.grains.iter().filter(|g| g.agent() == agent).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(agent: u32, start_frame: u64) -> GrainParams {
        GrainParams {
            agent,
            population: 0,
            start_frame,
            duration: 0.05,
            attack: 0.005,
            release: 0.01,
            gain: 1.0,
            x: 0.5,
            y: 0.5,
            size: 0.5,
            center: 100.0,
            playback_rate: 1.0,
            generation: 1,
        }
    }

    fn spawn(pool: &mut GrainPool, agent: u32, start: u64) -> Option<u64> {
        pool.spawn(&params(agent, start), 0.3, &FrequencyMap::default(), 48_000.0)
    }

    #[test]
    fn full_pool_drops_and_counts() {
        let mut pool = GrainPool::new(2);
        assert!(spawn(&mut pool, 1, 0).is_some());
        assert!(spawn(&mut pool, 1, 0).is_some());
        assert!(spawn(&mut pool, 1, 0).is_none());
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.dropped(), 1);
    }

    #[test]
    fn release_agent_discards_future_grains() {
        let mut pool = GrainPool::new(8);
        spawn(&mut pool, 1, 0);
        spawn(&mut pool, 1, 500);
        spawn(&mut pool, 2, 0);

        assert_eq!(pool.release_agent(1, 100), 1);
        assert_eq!(pool.count_for_agent(1), 1);
        assert!(pool.iter().filter(|g| g.agent() == 1).all(Grain::is_releasing));
        assert!(pool.iter().filter(|g| g.agent() == 2).all(|g| !g.is_releasing()));
    }

    #[test]
    fn release_all_marks_everything() {
        let mut pool = GrainPool::new(8);
        spawn(&mut pool, 1, 0);
        spawn(&mut pool, 2, 0);
        pool.release_all(10, 0.01);
        assert!(pool.iter().all(Grain::is_releasing));
    }
}
