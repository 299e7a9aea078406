//! Player slot.

use super::{Position, Snake};

/// Ticks a dead snake waits before it respawns.
pub const RESPAWN_TICKS: u32 = 30;
/// Ticks of immunity after a (re)spawn.
pub const PROTECTION_TICKS: u32 = 30;
/// Number of distinct player colors.
pub const NUM_COLORS: usize = 7;

/// One player slot. Inactive slots are free for the next login.
#[derive(Debug, Clone)]
pub struct Player {
    /// Unique id, never reused.
    pub id: u32,
    pub name: String,
    pub score: i32,
    /// Color index in `1..=NUM_COLORS`.
    pub color: u8,
    pub is_ai: bool,
    pub active: bool,
    pub spawn_protection: u32,
    pub respawn_timer: u32,
    pub snake: Snake,
}

impl Player {
    /// Create an empty, inactive slot.
    pub fn new(snake_capacity: usize) -> Self {
        Self {
            id: 0,
            name: String::new(),
            score: 0,
            color: 0,
            is_ai: false,
            active: false,
            spawn_protection: 0,
            respawn_timer: 0,
            snake: Snake::new(snake_capacity),
        }
    }

    /// Color derived from the slot index.
    pub fn color_for_slot(slot: usize) -> u8 {
        (slot % NUM_COLORS) as u8 + 1
    }

    /// Occupy this slot for a newly logged in player.
    pub fn activate(&mut self, id: u32, slot: usize, name: &str, is_ai: bool) {
        let capacity = self.snake.capacity();
        *self = Self::new(capacity);
        self.id = id;
        self.name = name.to_owned();
        self.color = Self::color_for_slot(slot);
        self.is_ai = is_ai;
        self.active = true;
    }

    /// Free the slot. The id is not handed out again.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.snake.alive = false;
    }

    /// Put a fresh snake at `head` and start the protection window.
    pub fn spawn_at(&mut self, head: Position) {
        self.snake.reset_at(head);
        self.spawn_protection = PROTECTION_TICKS;
        self.respawn_timer = 0;
    }

    /// Kill the snake and start the respawn countdown.
    pub fn die(&mut self) {
        self.snake.alive = false;
        self.respawn_timer = RESPAWN_TICKS;
    }

    pub fn is_alive(&self) -> bool {
        self.active && self.snake.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_resets_previous_occupant() {
        let mut player = Player::new(10);
        player.activate(1, 3, "old", false);
        player.score = 50;
        player.deactivate();

        player.activate(2, 3, "new", true);
        assert_eq!(player.id, 2);
        assert_eq!(player.score, 0);
        assert_eq!(player.color, 4);
        assert!(player.is_ai);
        assert!(!player.snake.alive);
    }

    #[test]
    fn test_die_and_spawn_timers() {
        let mut player = Player::new(10);
        player.activate(1, 0, "p", false);
        player.spawn_at(Position::new(10, 10));
        assert!(player.is_alive());
        assert_eq!(player.spawn_protection, PROTECTION_TICKS);

        player.die();
        assert!(!player.is_alive());
        assert_eq!(player.respawn_timer, RESPAWN_TICKS);
    }
}
