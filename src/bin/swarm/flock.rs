//! Toy agent simulation driving the engine.
//!
//! Each agent wanders on the unit square with a slowly turning heading and
//! a speed that swells and rests, so voices keep changing hands.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use swarm_grains::engine::agents::Agent;

const MAX_SPEED: f32 = 0.35;

struct Boid {
    id: u32,
    population: usize,
    x: f32,
    y: f32,
    heading: f32,
    speed: f32,
    target_speed: f32,
    size: f32,
    trail: f32,
}

pub struct Flock {
    boids: Vec<Boid>,
    rng: SmallRng,
}

impl Flock {
    pub fn new(count: usize, populations: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let populations = populations.max(1);
        let boids = (0..count)
            .map(|i| Boid {
                id: i as u32,
                population: i % populations,
                x: rng.random(),
                y: rng.random(),
                heading: rng.random_range(0.0..std::f32::consts::TAU),
                speed: 0.0,
                target_speed: rng.random_range(0.0..MAX_SPEED),
                size: rng.random(),
                trail: rng.random(),
            })
            .collect();
        Self { boids, rng }
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        for boid in &mut self.boids {
            boid.heading += self.rng.random_range(-2.0..2.0) * dt;
            if self.rng.random::<f32>() < 0.2 * dt {
                // Occasionally stop or sprint.
                boid.target_speed = if self.rng.random::<bool>() {
                    0.0
                } else {
                    self.rng.random_range(0.1..MAX_SPEED)
                };
            }
            boid.speed += (boid.target_speed - boid.speed) * (2.0 * dt).min(1.0);

            boid.x += boid.heading.cos() * boid.speed * dt;
            boid.y += boid.heading.sin() * boid.speed * dt;
            // Bounce off the walls.
            if !(0.0..=1.0).contains(&boid.x) {
                boid.heading = std::f32::consts::PI - boid.heading;
                boid.x = boid.x.clamp(0.0, 1.0);
            }
            if !(0.0..=1.0).contains(&boid.y) {
                boid.heading = -boid.heading;
                boid.y = boid.y.clamp(0.0, 1.0);
            }
        }
    }

    /// Current state as an engine snapshot.
    pub fn snapshot(&self) -> Vec<Agent> {
        self.boids
            .iter()
            .map(|boid| Agent {
                id: boid.id,
                population: boid.population,
                x: boid.x,
                y: boid.y,
                size: boid.size,
                velocity: (boid.speed / MAX_SPEED).clamp(0.0, 1.0),
                trail: boid.trail,
                is_moving: boid.speed > 0.0,
                curve: 1.0,
                gain_scale: 1.0,
            })
            .collect()
    }
}
