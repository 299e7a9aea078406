//! The shared game state.
//!
//! Everything here is mutated only through [`SharedStore::with_lock`], so each
//! method may assume it has exclusive access for the whole call.
//!
//! [`SharedStore::with_lock`]: super::store::SharedStore::with_lock

use crate::chat::ChatLog;
use crate::config::Config;
use crate::entity::{Food, Player, Position};
use crate::world::{Grid, CELL_FOOD, CELL_SNAKE_BASE};
use protocol::packets::{MapUpdate, SlotSummary};
use protocol::{truncate_utf8, Direction, MAX_NAME_LEN};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

/// Login refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("Server Full")]
    ServerFull,
}

/// What a successful login hands back to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginGrant {
    pub slot: usize,
    pub player_id: u32,
    pub color: u8,
    /// Chat counter before the join announcement, so the new player sees it.
    pub chat_cursor: u64,
}

pub struct GameState {
    pub grid: Grid,
    pub players: Vec<Player>,
    pub foods: Vec<Food>,
    pub chat: ChatLog,
    pub tick: u64,
    running: bool,
    next_player_id: u32,
    active_players: usize,
}

impl GameState {
    /// Build the initial world: walls on the border and half the food cap.
    pub fn new<R: Rng>(config: &Config, rng: &mut R) -> Self {
        let limits = &config.limits;
        let mut state = Self {
            grid: Grid::new(config.grid.width, config.grid.height),
            players: (0..limits.max_players)
                .map(|_| Player::new(limits.max_snake_len))
                .collect(),
            foods: vec![Food::default(); limits.max_food],
            chat: ChatLog::new(limits.chat_history),
            tick: 0,
            running: true,
            next_player_id: 1,
            active_players: 0,
        };

        for _ in 0..limits.max_food / 2 {
            state.spawn_food(rng);
        }
        info!(
            "World initialized: {}x{} grid, {} food",
            config.grid.width,
            config.grid.height,
            state.food_count()
        );
        state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn active_players(&self) -> usize {
        self.active_players
    }

    pub fn food_count(&self) -> usize {
        self.foods.iter().filter(|f| f.active).count()
    }

    /// Place one food on a random empty interior cell.
    ///
    /// Returns false when the cap is reached or no empty cell was found
    /// within the attempt budget.
    pub fn spawn_food<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.food_count() >= self.foods.len() {
            return false;
        }
        let Some(pos) = self.grid.find_empty_cell(rng) else {
            return false;
        };
        if self.foods.iter().any(|f| f.active && f.pos == pos) {
            return false;
        }
        let Some(food) = self.foods.iter_mut().find(|f| !f.active) else {
            return false;
        };
        *food = Food { pos, active: true };
        self.grid.set(pos, CELL_FOOD);
        true
    }

    /// Put a fresh snake for `slot` on the best spawn point available.
    pub fn spawn_player<R: Rng>(&mut self, slot: usize, rng: &mut R) {
        let spawn = self.grid.find_spawn_point(rng);
        if !spawn.clear {
            debug!("No clear spawn point for slot {}, using grid center", slot);
        }
        self.players[slot].spawn_at(spawn.pos);
        self.paint_snake(slot);
    }

    /// Claim the first free slot for a new player.
    pub fn login<R: Rng>(&mut self, name: &str, is_ai: bool, rng: &mut R) -> Result<LoginGrant, LoginError> {
        let slot = self
            .players
            .iter()
            .position(|p| !p.active)
            .ok_or(LoginError::ServerFull)?;

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let name = truncate_utf8(name, MAX_NAME_LEN - 1);
        self.players[slot].activate(player_id, slot, name, is_ai);
        self.spawn_player(slot, rng);
        self.active_players += 1;

        let chat_cursor = self.chat.count();
        self.chat.announce(&format!("{} joined!", name));

        Ok(LoginGrant {
            slot,
            player_id,
            color: self.players[slot].color,
            chat_cursor,
        })
    }

    /// Free `slot` and announce the departure. Returns the player's name,
    /// or `None` if the slot was already free.
    pub fn logout(&mut self, slot: usize) -> Option<String> {
        let player = self.players.get_mut(slot).filter(|p| p.active)?;
        player.deactivate();
        let name = player.name.clone();
        self.active_players = self.active_players.saturating_sub(1);
        self.chat.announce(&format!("{} left the game", name));
        Some(name)
    }

    /// Queue a direction for the next tick. Ignored for dead or free slots.
    pub fn set_pending_direction(&mut self, slot: usize, direction: Direction) -> bool {
        match self.players.get_mut(slot) {
            Some(player) if player.is_alive() => {
                player.snake.pending_direction = direction;
                true
            }
            _ => false,
        }
    }

    /// Append a chat line attributed to the player in `slot`.
    pub fn post_chat(&mut self, slot: usize, text: &str) -> bool {
        match self.players.get(slot) {
            Some(player) if player.active => {
                let (id, name) = (player.id, player.name.clone());
                self.chat.push(id, &name, text);
                true
            }
            _ => false,
        }
    }

    /// Repaint the interior from the food and snake tables.
    pub fn rebuild_map(&mut self) {
        self.grid.clear_interior();
        for food in self.foods.iter().filter(|f| f.active) {
            self.grid.set(food.pos, CELL_FOOD);
        }
        for slot in 0..self.players.len() {
            if self.players[slot].is_alive() {
                self.paint_snake(slot);
            }
        }
    }

    fn paint_snake(&mut self, slot: usize) {
        let code = CELL_SNAKE_BASE + slot as u8;
        let grid = &mut self.grid;
        for seg in self.players[slot].snake.segments() {
            if grid.is_interior(seg) {
                grid.set(seg, code);
            }
        }
    }

    /// Full map and scoreboard for the current tick.
    pub fn snapshot(&self) -> MapUpdate {
        MapUpdate {
            tick: self.tick as u32,
            width: self.grid.width() as u16,
            height: self.grid.height() as u16,
            cells: self.grid.cells().to_vec(),
            slots: self
                .players
                .iter()
                .map(|p| SlotSummary {
                    score: p.score,
                    alive: p.is_alive(),
                    active: p.active,
                    name: p.name.clone(),
                })
                .collect(),
        }
    }

    /// Slot whose snake occupies `pos`, according to the current map.
    #[cfg(test)]
    pub fn snake_at(&self, pos: Position) -> Option<usize> {
        self.grid
            .get(pos)
            .filter(|&code| code >= CELL_SNAKE_BASE)
            .map(|code| (code - CELL_SNAKE_BASE) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::INITIAL_LENGTH;
    use crate::world::CELL_EMPTY;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config(max_players: usize) -> Config {
        let mut config = Config::default();
        config.grid.width = 30;
        config.grid.height = 30;
        config.limits.max_players = max_players;
        config.limits.max_food = 10;
        config.limits.chat_history = 8;
        config
    }

    #[test]
    fn test_initial_food_is_half_capacity() {
        let mut rng = StdRng::seed_from_u64(1);
        let state = GameState::new(&small_config(4), &mut rng);
        assert_eq!(state.food_count(), 5);
        for food in state.foods.iter().filter(|f| f.active) {
            assert_eq!(state.grid.get(food.pos), Some(CELL_FOOD));
        }
        assert!(state.is_running());
    }

    #[test]
    fn test_food_never_shares_a_cell() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = GameState::new(&small_config(1), &mut rng);
        while state.spawn_food(&mut rng) {}
        assert_eq!(state.food_count(), 10);

        let mut positions: Vec<_> = state.foods.iter().map(|f| (f.pos.x, f.pos.y)).collect();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), 10);
    }

    #[test]
    fn test_login_assigns_slots_and_ids() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = GameState::new(&small_config(2), &mut rng);

        let a = state.login("alice", false, &mut rng).unwrap();
        let b = state.login("bob", true, &mut rng).unwrap();
        assert_eq!((a.slot, a.player_id, a.color), (0, 1, 1));
        assert_eq!((b.slot, b.player_id, b.color), (1, 2, 2));
        assert_eq!(state.active_players(), 2);
        assert_eq!(state.players[1].snake.len(), INITIAL_LENGTH);
        assert_eq!(
            state.login("carol", false, &mut rng),
            Err(LoginError::ServerFull)
        );

        // The freed slot is reused, the id is not.
        assert_eq!(state.logout(0).as_deref(), Some("alice"));
        assert_eq!(state.logout(0), None);
        let c = state.login("carol", false, &mut rng).unwrap();
        assert_eq!((c.slot, c.player_id), (0, 3));
    }

    #[test]
    fn test_login_cursor_precedes_join_announcement() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut state = GameState::new(&small_config(2), &mut rng);
        let grant = state.login("alice", false, &mut rng).unwrap();
        let pending = state.chat.since(grant.chat_cursor);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "alice joined!");
    }

    #[test]
    fn test_direction_and_chat_require_active_slot() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = GameState::new(&small_config(2), &mut rng);
        assert!(!state.set_pending_direction(0, Direction::Up));
        assert!(!state.post_chat(0, "hello"));
        assert!(!state.set_pending_direction(9, Direction::Up));

        let grant = state.login("alice", false, &mut rng).unwrap();
        assert!(state.set_pending_direction(grant.slot, Direction::Up));
        assert_eq!(state.players[grant.slot].snake.pending_direction, Direction::Up);
        assert!(state.post_chat(grant.slot, "hello"));
        let last = state.chat.since(state.chat.count() - 1);
        assert_eq!(last[0].sender_id, grant.player_id);
        assert_eq!(last[0].text, "hello");
    }

    #[test]
    fn test_rebuild_map_paints_living_snakes_only() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = GameState::new(&small_config(2), &mut rng);
        let grant = state.login("alice", false, &mut rng).unwrap();
        let head = state.players[grant.slot].snake.head();

        state.rebuild_map();
        assert_eq!(state.snake_at(head), Some(grant.slot));

        state.players[grant.slot].die();
        state.rebuild_map();
        assert_eq!(state.snake_at(head), None);
        assert!(matches!(state.grid.get(head), Some(CELL_EMPTY) | Some(CELL_FOOD)));
    }

    #[test]
    fn test_snapshot_covers_every_slot() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = GameState::new(&small_config(3), &mut rng);
        state.login("alice", false, &mut rng).unwrap();
        state.tick = 12;

        let snap = state.snapshot();
        assert_eq!(snap.tick, 12);
        assert_eq!((snap.width, snap.height), (30, 30));
        assert_eq!(snap.cells.len(), 900);
        assert_eq!(snap.slots.len(), 3);
        assert!(snap.slots[0].active && snap.slots[0].alive);
        assert_eq!(snap.slots[0].name, "alice");
        assert!(!snap.slots[1].active);
    }
}
