//! Initial placement of terminals.
//!
//! These allocators only produce starting positions. Moving terminals
//! afterwards is the job of the mobility collaborator, which reports new
//! positions through [`Topology::update_position`].
//!
//! [`Topology::update_position`]: crate::topology::Topology::update_position

use super::Position;
use rand_chacha::ChaChaRng;
use rand_core::{Rng, SeedableRng as _};
use std::f64::consts::PI;

/// A source of initial positions.
pub trait PositionAllocator {
    fn next_position(&mut self) -> Position;
}

/// Hands out a fixed list of positions, starting over once exhausted.
#[derive(Debug, Clone)]
pub struct ListPositionAllocator {
    positions: Vec<Position>,
    cursor: usize,
}

impl ListPositionAllocator {
    /// Returns `None` if `positions` is empty.
    pub fn new(positions: Vec<Position>) -> Option<Self> {
        if positions.is_empty() {
            return None;
        }
        Some(Self {
            positions,
            cursor: 0,
        })
    }
}

impl PositionAllocator for ListPositionAllocator {
    fn next_position(&mut self) -> Position {
        let position = self.positions[self.cursor];
        self.cursor = (self.cursor + 1) % self.positions.len();
        position
    }
}

/// Draws positions uniformly over a horizontal disc.
///
/// All draws come from a [`ChaChaRng`] seeded at construction so the same
/// seed always yields the same drop.
///
/// ```
/// use cellsim_core::topology::{Position, PositionAllocator, UniformDiscPositionAllocator};
///
/// let center = Position::new(5_000.0, 0.0, 0.0);
/// let mut disc = UniformDiscPositionAllocator::new(center, 500.0, 3);
/// let ue = disc.next_position();
/// assert!(ue.distance(&center) <= 500.0);
/// ```
#[derive(Debug, Clone)]
pub struct UniformDiscPositionAllocator {
    center: Position,
    radius: f64,
    rng: ChaChaRng,
}

impl UniformDiscPositionAllocator {
    pub fn new(center: Position, radius: f64, seed: u64) -> Self {
        Self {
            center,
            radius: radius.abs(),
            rng: ChaChaRng::seed_from_u64(seed),
        }
    }

    /// uniform sample in `[0, 1)`
    fn sample(&mut self) -> f64 {
        let bits = self.rng.next_u64();
        (bits as f64) * (1.0 / (u64::MAX as f64 + 1.0))
    }
}

impl PositionAllocator for UniformDiscPositionAllocator {
    fn next_position(&mut self) -> Position {
        // sqrt keeps the density uniform over the area, not the radius
        let rho = self.radius * self.sample().sqrt();
        let theta = 2.0 * PI * self.sample();

        Position::new(
            self.center.x + rho * theta.cos(),
            self.center.y + rho * theta.sin(),
            self.center.z,
        )
    }
}
