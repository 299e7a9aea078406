//! Snake body ring buffer.

use super::Position;
use protocol::Direction;

/// Length of a freshly spawned snake.
pub const INITIAL_LENGTH: usize = 3;

/// A snake whose body lives in a fixed-capacity ring of grid positions.
///
/// The body is the `length` slots ending at `head_idx`; advancing moves the
/// head one slot forward and implicitly drops the oldest tail slot.
#[derive(Debug, Clone)]
pub struct Snake {
    ring: Vec<Position>,
    length: usize,
    head_idx: usize,
    pub direction: Direction,
    pub pending_direction: Direction,
    pub alive: bool,
}

impl Snake {
    /// Create a dead snake with room for `capacity` segments.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= INITIAL_LENGTH);
        Self {
            ring: vec![Position::ZERO; capacity],
            length: 0,
            head_idx: 0,
            direction: Direction::Right,
            pending_direction: Direction::Right,
            alive: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn head(&self) -> Position {
        self.ring[self.head_idx]
    }

    /// Place a live snake of [`INITIAL_LENGTH`] lying horizontally with its
    /// head on `head`, facing right.
    pub fn reset_at(&mut self, head: Position) {
        self.direction = Direction::Right;
        self.pending_direction = Direction::Right;
        self.alive = true;
        self.length = INITIAL_LENGTH;
        self.head_idx = INITIAL_LENGTH - 1;
        for i in 0..INITIAL_LENGTH {
            let back = (INITIAL_LENGTH - 1 - i) as i32;
            self.ring[i] = Position::new(head.x - back, head.y);
        }
    }

    /// Adopt the pending direction unless it would reverse into the neck.
    pub fn apply_pending_direction(&mut self) {
        if self.pending_direction != self.direction.opposite() {
            self.direction = self.pending_direction;
        }
    }

    /// Turn, then push a new head one cell ahead. Returns the new head.
    pub fn advance(&mut self) -> Position {
        self.apply_pending_direction();
        let (dx, dy) = self.direction.delta();
        let head = self.head() + Position::new(dx, dy);
        self.head_idx = (self.head_idx + 1) % self.capacity();
        self.ring[self.head_idx] = head;
        head
    }

    /// Lengthen by one segment unless already at capacity.
    pub fn grow(&mut self) -> bool {
        if self.length < self.capacity() {
            self.length += 1;
            true
        } else {
            false
        }
    }

    /// Segment `i` counted from the head (0 is the head itself).
    pub fn segment_from_head(&self, i: usize) -> Position {
        let cap = self.capacity();
        self.ring[(self.head_idx + cap - i % cap) % cap]
    }

    /// Occupied cells, head first.
    pub fn segments(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.length).map(move |i| self.segment_from_head(i))
    }

    /// Whether any segment other than the head sits on `pos`.
    pub fn body_contains(&self, pos: Position) -> bool {
        self.segments().skip(1).any(|seg| seg == pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_lays_out_horizontally() {
        let mut snake = Snake::new(10);
        snake.reset_at(Position::new(10, 7));
        assert!(snake.alive);
        assert_eq!(snake.len(), 3);
        let body: Vec<_> = snake.segments().collect();
        assert_eq!(
            body,
            vec![Position::new(10, 7), Position::new(9, 7), Position::new(8, 7)]
        );
    }

    #[test]
    fn test_reversal_is_rejected() {
        for dir in Direction::ALL {
            let mut snake = Snake::new(10);
            snake.reset_at(Position::new(10, 10));
            snake.direction = dir;
            snake.pending_direction = dir.opposite();
            snake.apply_pending_direction();
            assert_eq!(snake.direction, dir);

            for other in Direction::ALL.into_iter().filter(|d| *d != dir.opposite()) {
                snake.direction = dir;
                snake.pending_direction = other;
                snake.apply_pending_direction();
                assert_eq!(snake.direction, other);
            }
        }
    }

    #[test]
    fn test_advance_moves_body_and_wraps_ring() {
        let mut snake = Snake::new(3);
        snake.reset_at(Position::new(5, 5));
        snake.pending_direction = Direction::Down;
        for _ in 0..4 {
            snake.advance();
        }
        assert_eq!(snake.head(), Position::new(5, 9));
        let body: Vec<_> = snake.segments().collect();
        assert_eq!(
            body,
            vec![Position::new(5, 9), Position::new(5, 8), Position::new(5, 7)]
        );
    }

    #[test]
    fn test_grow_is_capped() {
        let mut snake = Snake::new(4);
        snake.reset_at(Position::new(5, 5));
        assert!(snake.grow());
        assert!(!snake.grow());
        assert_eq!(snake.len(), 4);
    }

    #[test]
    fn test_body_contains_skips_head() {
        let mut snake = Snake::new(8);
        snake.reset_at(Position::new(5, 5));
        assert!(!snake.body_contains(Position::new(5, 5)));
        assert!(snake.body_contains(Position::new(4, 5)));
        assert!(snake.body_contains(Position::new(3, 5)));
    }
}
