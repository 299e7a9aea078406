//! Collision detection and resolution.
//!
//! Runs once per tick after every snake has moved. For each living snake, in
//! slot order:
//! - Spawn protection: decrement the counter and skip all checks
//! - Wall: a head outside the interior kills the snake
//! - Food: a head on active food scores, grows, and replaces the food
//! - Snakes: a head on any body cell of a living snake kills it
//!
//! Food is resolved before snake bodies, so a snake can eat and die in the
//! same tick.

use crate::entity::Position;
use crate::server::GameState;
use rand::Rng;
use tracing::debug;

/// Score for one food.
pub const FOOD_SCORE: i32 = 10;

/// Resolve every collision for the current tick.
pub fn resolve_collisions<R: Rng>(state: &mut GameState, rng: &mut R) {
    for slot in 0..state.players.len() {
        if !state.players[slot].is_alive() {
            continue;
        }

        let player = &mut state.players[slot];
        if player.spawn_protection > 0 {
            player.spawn_protection -= 1;
            continue;
        }

        let head = player.snake.head();
        if !state.grid.is_interior(head) {
            debug!("{} hit a wall at ({}, {})", state.players[slot].name, head.x, head.y);
            state.players[slot].die();
            continue;
        }

        eat_food(state, slot, head, rng);

        if let Some(other) = hit_snake(state, slot, head) {
            debug!(
                "{} ran into {} at ({}, {})",
                state.players[slot].name, state.players[other].name, head.x, head.y
            );
            state.players[slot].die();
        }
    }
}

fn eat_food<R: Rng>(state: &mut GameState, slot: usize, head: Position, rng: &mut R) {
    let Some(food) = state.foods.iter_mut().find(|f| f.active && f.pos == head) else {
        return;
    };
    food.active = false;

    let player = &mut state.players[slot];
    player.score += FOOD_SCORE;
    player.snake.grow();
    state.spawn_food(rng);
}

/// First living snake whose body covers `head`. The mover's own head is
/// excluded; every other snake's head counts.
fn hit_snake(state: &GameState, slot: usize, head: Position) -> Option<usize> {
    state.players.iter().enumerate().find_map(|(other, player)| {
        if !player.is_alive() {
            return None;
        }
        let hit = if other == slot {
            player.snake.body_contains(head)
        } else {
            player.snake.segments().any(|seg| seg == head)
        };
        hit.then_some(other)
    })
}
