//! Straightforward B3/S23 torus that recounts every neighbourhood each
//! generation. Slow, but independent of the packed encoding, so the
//! partitioned engines are checked against it.

use rand::RngCore;

use crate::error::LifeError;
use crate::grid::Dims;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NaiveLife {
    dims: Dims,
    cells: Vec<bool>,
    next: Vec<bool>,
}

impl NaiveLife {
    pub fn new<I>(dims: Dims, alive: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut cells = vec![false; dims.size()];
        for (x, y) in alive {
            if dims.contains(x, y) {
                cells[dims.index(x, y)] = true;
            }
        }
        Self {
            dims,
            next: vec![false; cells.len()],
            cells,
        }
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.cells[self.dims.index(x, y)]
    }

    pub fn step(&mut self) {
        let Dims { width, height } = self.dims;
        for y in 0..height {
            for x in 0..width {
                let mut n = 0;
                for dy in [height - 1, 0, 1] {
                    for dx in [width - 1, 0, 1] {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        n += self.is_alive((x + dx) % width, (y + dy) % height) as u8;
                    }
                }
                let alive = self.is_alive(x, y);
                self.next[y * width + x] = n == 3 || (n == 2 && alive);
            }
        }
        std::mem::swap(&mut self.cells, &mut self.next);
    }

    pub fn advance(&mut self, frames: u64) {
        for _ in 0..frames {
            self.step();
        }
    }

    pub fn population(&self) -> u64 {
        self.cells.iter().filter(|&&c| c).count() as u64
    }

    /// Alive cells in row-major order.
    pub fn alive_cells(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &alive)| alive)
            .map(|(i, _)| self.dims.coords(i))
            .collect()
    }
}

/// Marks each cell alive with probability `density`, drawing from `rng`.
pub fn random_alive_cells<R: RngCore>(
    dims: Dims,
    density: f64,
    rng: &mut R,
) -> Result<Vec<(usize, usize)>, LifeError> {
    let threshold = (u64::MAX as f64 * density.clamp(0.0, 1.0)) as u64;
    let mut alive = Vec::new();
    alive
        .try_reserve((dims.size() as f64 * density.clamp(0.0, 1.0)) as usize)
        .map_err(|_| LifeError::Allocation { bytes: dims.size() })?;
    for y in 0..dims.height {
        for x in 0..dims.width {
            if rng.next_u64() < threshold {
                alive.push((x, y));
            }
        }
    }
    Ok(alive)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::{NaiveLife, random_alive_cells};
    use crate::grid::Dims;

    #[test]
    fn blinker_oscillates() {
        let dims = Dims::new(5, 5).unwrap();
        let mut life = NaiveLife::new(dims, [(1, 2), (2, 2), (3, 2)]);
        life.step();
        assert_eq!(life.alive_cells(), vec![(2, 1), (2, 2), (2, 3)]);
        life.step();
        assert_eq!(life.alive_cells(), vec![(1, 2), (2, 2), (3, 2)]);
    }

    #[test]
    fn glider_wraps_back_to_its_start() {
        // A glider moves one cell diagonally every four generations.
        let dims = Dims::new(8, 8).unwrap();
        let glider = [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
        let mut life = NaiveLife::new(dims, glider);
        life.advance(32);
        let mut expected = glider.to_vec();
        expected.sort_unstable_by_key(|&(x, y)| (y, x));
        assert_eq!(life.alive_cells(), expected);
    }

    #[test]
    fn random_fill_is_seeded_and_roughly_dense() {
        let dims = Dims::new(64, 64).unwrap();
        let a = random_alive_cells(dims, 0.3, &mut rand::rngs::StdRng::seed_from_u64(7)).unwrap();
        let b = random_alive_cells(dims, 0.3, &mut rand::rngs::StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        let share = a.len() as f64 / dims.size() as f64;
        assert!((0.25..0.35).contains(&share), "density {share}");
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let none = random_alive_cells(dims, 0.0, &mut rng).unwrap();
        assert!(none.is_empty());
    }
}
