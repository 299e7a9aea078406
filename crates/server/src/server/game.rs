//! Simulation engine and main loop.

use super::game_state::GameState;
use super::store::SharedStore;
use crate::collision::resolve_collisions;
use crate::error::ServerError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Minimum time between periodic food top-ups.
pub const FOOD_TOPUP_INTERVAL: Duration = Duration::from_millis(3000);

/// Advances the world one tick at a time. Holds nothing but its random
/// source and top-up timer; all game data lives in the store.
pub struct SimulationEngine {
    rng: StdRng,
    tick_interval: Duration,
    last_food_spawn: Instant,
}

impl SimulationEngine {
    pub fn new(tick_interval: Duration) -> Self {
        Self::with_rng(tick_interval, StdRng::from_os_rng())
    }

    pub fn with_rng(tick_interval: Duration, rng: StdRng) -> Self {
        Self {
            rng,
            tick_interval,
            last_food_spawn: Instant::now(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Run one full tick. The caller holds the store lock for the whole call.
    pub fn step(&mut self, state: &mut GameState, now: Instant) {
        self.respawn_players(state);
        move_snakes(state);
        resolve_collisions(state, &mut self.rng);
        state.rebuild_map();
        self.top_up_food(state, now);
        state.tick += 1;
    }

    fn respawn_players(&mut self, state: &mut GameState) {
        for slot in 0..state.players.len() {
            let player = &mut state.players[slot];
            if !player.active || player.snake.alive {
                continue;
            }
            if player.respawn_timer > 0 {
                player.respawn_timer -= 1;
                continue;
            }

            state.spawn_player(slot, &mut self.rng);
            let name = state.players[slot].name.clone();
            debug!("{} respawned", name);
            state.chat.announce(&format!("{} respawned!", name));
        }
    }

    fn top_up_food(&mut self, state: &mut GameState, now: Instant) {
        if now.saturating_duration_since(self.last_food_spawn) > FOOD_TOPUP_INTERVAL
            && state.food_count() < state.foods.len() / 2
        {
            state.spawn_food(&mut self.rng);
            self.last_food_spawn = now;
        }
    }
}

fn move_snakes(state: &mut GameState) {
    for player in state.players.iter_mut().filter(|p| p.is_alive()) {
        player.snake.advance();
    }
}

/// Tick the world until shutdown is signalled or the store stops running.
pub async fn run_game_loop(
    store: SharedStore,
    mut engine: SimulationEngine,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let period = engine.tick_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    // Skip rather than burst so a stalled loop resumes at the normal rate.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Game loop started ({}ms ticks)", period.as_millis());

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let tick_start = std::time::Instant::now();
        let tick = store.with_lock(|state| {
            if !state.is_running() {
                return None;
            }
            engine.step(state, now);
            Some(state.tick)
        })?;
        let Some(tick) = tick else {
            break;
        };

        let elapsed = tick_start.elapsed();
        if elapsed > period.mul_f64(0.9) {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {}ms)",
                tick,
                elapsed.as_secs_f64() * 1000.0,
                period.as_millis()
            );
        }
    }

    info!("Game loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::{Position, INITIAL_LENGTH, PROTECTION_TICKS, RESPAWN_TICKS};
    use crate::world::{CELL_FOOD, CELL_SNAKE_BASE, SPAWN_MARGIN};
    use protocol::Direction;

    const TICK: Duration = Duration::from_millis(100);

    fn setup(players: usize) -> (GameState, SimulationEngine) {
        let mut config = Config::default();
        config.grid.width = 30;
        config.grid.height = 30;
        config.limits.max_players = players;
        config.limits.max_food = 6;
        let mut rng = StdRng::seed_from_u64(42);
        let state = GameState::new(&config, &mut rng);
        let engine = SimulationEngine::with_rng(TICK, StdRng::seed_from_u64(43));
        (state, engine)
    }

    #[test]
    fn test_step_moves_and_repaints() {
        let (mut state, mut engine) = setup(1);
        let grant = state.login("alice", false, &mut StdRng::seed_from_u64(1)).unwrap();
        let head = state.players[grant.slot].snake.head();
        state.set_pending_direction(grant.slot, Direction::Down);

        engine.step(&mut state, Instant::now());
        let player = &state.players[grant.slot];
        assert_eq!(state.tick, 1);
        assert_eq!(player.snake.head(), head + Position::new(0, 1));
        assert_eq!(player.spawn_protection, PROTECTION_TICKS - 1);
        for seg in player.snake.segments() {
            assert_eq!(state.grid.get(seg), Some(CELL_SNAKE_BASE + grant.slot as u8));
        }
        for food in state.foods.iter().filter(|f| f.active) {
            if state.snake_at(food.pos).is_none() {
                assert_eq!(state.grid.get(food.pos), Some(CELL_FOOD));
            }
        }
    }

    #[test]
    fn test_reverse_request_is_ignored() {
        let (mut state, mut engine) = setup(1);
        let grant = state.login("alice", false, &mut StdRng::seed_from_u64(2)).unwrap();
        let head = state.players[grant.slot].snake.head();
        state.set_pending_direction(grant.slot, Direction::Left);

        engine.step(&mut state, Instant::now());
        let snake = &state.players[grant.slot].snake;
        assert_eq!(snake.direction, Direction::Right);
        assert_eq!(snake.head(), head + Position::new(1, 0));
    }

    #[test]
    fn test_respawn_after_countdown() {
        let (mut state, mut engine) = setup(1);
        let grant = state.login("alice", false, &mut StdRng::seed_from_u64(3)).unwrap();
        state.players[grant.slot].die();

        for _ in 0..RESPAWN_TICKS {
            engine.step(&mut state, Instant::now());
            assert!(!state.players[grant.slot].snake.alive);
        }
        assert_eq!(state.players[grant.slot].respawn_timer, 0);

        engine.respawn_players(&mut state);
        let player = &state.players[grant.slot];
        assert!(player.snake.alive);
        assert_eq!(player.snake.len(), INITIAL_LENGTH);
        assert_eq!(player.spawn_protection, PROTECTION_TICKS);
        let head = player.snake.head();
        assert!(head.x >= SPAWN_MARGIN && head.x < 30 - SPAWN_MARGIN);
        assert!(head.y >= SPAWN_MARGIN && head.y < 30 - SPAWN_MARGIN);
        let last = state.chat.since(state.chat.count() - 1);
        assert_eq!(last[0].text, "alice respawned!");
    }

    #[test]
    fn test_respawn_falls_back_to_center() {
        let (mut state, mut engine) = setup(2);
        state.login("alice", false, &mut StdRng::seed_from_u64(4)).unwrap();
        let grant = state.login("bob", false, &mut StdRng::seed_from_u64(5)).unwrap();
        state.players[grant.slot].die();
        state.players[grant.slot].respawn_timer = 0;

        // Cover the whole interior with slot 0's color so no spawn is clear.
        for y in 1..29 {
            for x in 1..29 {
                state.grid.set(Position::new(x, y), CELL_SNAKE_BASE);
            }
        }
        engine.respawn_players(&mut state);
        let player = &state.players[grant.slot];
        assert!(player.snake.alive);
        assert_eq!(player.snake.head(), state.grid.center());
    }

    #[test]
    fn test_inactive_slots_do_not_respawn() {
        let (mut state, mut engine) = setup(2);
        engine.step(&mut state, Instant::now());
        assert!(state.players.iter().all(|p| !p.snake.alive));
    }

    #[test]
    fn test_food_top_up_waits_for_interval() {
        let (mut state, mut engine) = setup(1);
        for food in state.foods.iter_mut() {
            food.active = false;
        }
        let start = Instant::now();
        engine.last_food_spawn = start;

        engine.top_up_food(&mut state, start + Duration::from_millis(1000));
        assert_eq!(state.food_count(), 0);

        engine.top_up_food(&mut state, start + Duration::from_millis(3001));
        assert_eq!(state.food_count(), 1);

        // Below half capacity, but the timer restarted.
        engine.top_up_food(&mut state, start + Duration::from_millis(3500));
        assert_eq!(state.food_count(), 1);
    }

    #[test]
    fn test_food_top_up_stops_at_half_capacity() {
        let (mut state, mut engine) = setup(1);
        assert_eq!(state.food_count(), 3);
        let start = Instant::now();
        engine.last_food_spawn = start;
        engine.top_up_food(&mut state, start + Duration::from_secs(10));
        assert_eq!(state.food_count(), 3);
    }

    #[tokio::test]
    async fn test_game_loop_ticks_until_shutdown() {
        let (state, _) = setup(1);
        let store = SharedStore::new(state);
        let (tx, rx) = watch::channel(false);
        let engine = SimulationEngine::with_rng(Duration::from_millis(10), StdRng::seed_from_u64(1));
        let handle = tokio::spawn(run_game_loop(store.clone(), engine, rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let ticks = store.with_lock(|state| state.tick).unwrap();
        assert!(ticks > 0);
    }

    #[tokio::test]
    async fn test_game_loop_stops_with_running_flag() {
        let (state, _) = setup(1);
        let store = SharedStore::new(state);
        let (_tx, rx) = watch::channel(false);
        let engine = SimulationEngine::with_rng(Duration::from_millis(10), StdRng::seed_from_u64(1));
        store.with_lock(|state| state.stop()).unwrap();

        run_game_loop(store.clone(), engine, rx).await.unwrap();
        assert_eq!(store.with_lock(|state| state.tick).unwrap(), 0);
    }
}
