//! Grid state and randomized placement.
//!
//! The grid is a row-major matrix of cell codes. Border cells are always
//! walls; interior cells are repainted from scratch every tick.

use crate::entity::Position;
use rand::Rng;

pub const CELL_EMPTY: u8 = 0;
pub const CELL_WALL: u8 = 1;
pub const CELL_FOOD: u8 = 2;
/// Snake cells are `CELL_SNAKE_BASE + slot`.
pub const CELL_SNAKE_BASE: u8 = 10;

/// Random candidates tried before a placement search gives up.
pub const PLACEMENT_ATTEMPTS: usize = 100;
/// Spawn candidates keep this distance from the border.
pub const SPAWN_MARGIN: i32 = 5;
/// Half-width of the square that must be free around a spawn point.
pub const SPAWN_CLEAR_RADIUS: i32 = 2;

/// Result of a spawn search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPoint {
    pub pos: Position,
    /// False when the search fell back to the grid center.
    pub clear: bool,
}

/// Fixed-size cell matrix.
#[derive(Debug, Clone)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<u8>,
}

impl Grid {
    /// Create a grid with walls on the border and an empty interior.
    pub fn new(width: u16, height: u16) -> Self {
        let mut grid = Self {
            width: i32::from(width),
            height: i32::from(height),
            cells: vec![CELL_EMPTY; width as usize * height as usize],
        };
        for x in 0..grid.width {
            grid.set(Position::new(x, 0), CELL_WALL);
            grid.set(Position::new(x, grid.height - 1), CELL_WALL);
        }
        for y in 0..grid.height {
            grid.set(Position::new(0, y), CELL_WALL);
            grid.set(Position::new(grid.width - 1, y), CELL_WALL);
        }
        grid
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Row-major cell codes.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn center(&self) -> Position {
        Position::new(self.width / 2, self.height / 2)
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    pub fn get(&self, pos: Position) -> Option<u8> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Write a cell; out-of-range positions are ignored.
    pub fn set(&mut self, pos: Position, code: u8) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = code;
        }
    }

    /// Inside the border walls.
    pub fn is_interior(&self, pos: Position) -> bool {
        pos.x > 0 && pos.x < self.width - 1 && pos.y > 0 && pos.y < self.height - 1
    }

    /// Reset every interior cell to empty, leaving the walls.
    pub fn clear_interior(&mut self) {
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                self.set(Position::new(x, y), CELL_EMPTY);
            }
        }
    }

    /// Random interior cell that is currently empty, if one is found within
    /// the attempt budget.
    pub fn find_empty_cell<R: Rng>(&self, rng: &mut R) -> Option<Position> {
        if self.width < 3 || self.height < 3 {
            return None;
        }
        (0..PLACEMENT_ATTEMPTS)
            .map(|_| {
                Position::new(
                    rng.random_range(1..self.width - 1),
                    rng.random_range(1..self.height - 1),
                )
            })
            .find(|&pos| self.get(pos) == Some(CELL_EMPTY))
    }

    /// Find a spawn point whose surrounding square holds no snake, falling
    /// back to the grid center after the attempt budget.
    pub fn find_spawn_point<R: Rng>(&self, rng: &mut R) -> SpawnPoint {
        let (lo_x, hi_x) = (SPAWN_MARGIN, self.width - SPAWN_MARGIN);
        let (lo_y, hi_y) = (SPAWN_MARGIN, self.height - SPAWN_MARGIN);

        if lo_x < hi_x && lo_y < hi_y {
            for _ in 0..PLACEMENT_ATTEMPTS {
                let pos = Position::new(rng.random_range(lo_x..hi_x), rng.random_range(lo_y..hi_y));
                if self.is_clear_around(pos) {
                    return SpawnPoint { pos, clear: true };
                }
            }
        }

        SpawnPoint {
            pos: self.center(),
            clear: false,
        }
    }

    /// No snake on any interior cell within [`SPAWN_CLEAR_RADIUS`] of `pos`.
    /// Food does not block.
    pub fn is_clear_around(&self, pos: Position) -> bool {
        for dy in -SPAWN_CLEAR_RADIUS..=SPAWN_CLEAR_RADIUS {
            for dx in -SPAWN_CLEAR_RADIUS..=SPAWN_CLEAR_RADIUS {
                let cell = pos + Position::new(dx, dy);
                if !self.is_interior(cell) {
                    continue;
                }
                match self.get(cell) {
                    Some(CELL_EMPTY) | Some(CELL_FOOD) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}
