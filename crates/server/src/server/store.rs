//! Shared state store.
//!
//! One [`GameState`] behind one exclusive lock, shared by the engine and every
//! worker. Access goes through [`SharedStore::with_lock`], which takes a
//! synchronous closure: the guard can never be held across an `.await`, so a
//! slow socket never stalls the tick.
//!
//! The lock is a `std::sync::Mutex` rather than an async lock since nothing
//! awaits while holding it. A poisoned mutex surfaces as
//! [`ServerError::StorePoisoned`].

use super::game_state::GameState;
use crate::error::ServerError;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<GameState>>,
}

impl SharedStore {
    pub fn new(state: GameState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Run `f` with exclusive access to the game state.
    ///
    /// A poisoned lock means another unit panicked mid-update; the state can
    /// no longer be trusted and the caller must stop.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> Result<R, ServerError> {
        let mut guard = self.inner.lock().map_err(|_| ServerError::StorePoisoned)?;
        Ok(f(&mut guard))
    }

    /// Running flag. A poisoned store counts as stopped.
    pub fn is_running(&self) -> bool {
        self.with_lock(|state| state.is_running()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;

    fn store_with(max_players: usize) -> SharedStore {
        let mut config = Config::default();
        config.limits.max_players = max_players;
        let mut rng = StdRng::seed_from_u64(11);
        SharedStore::new(GameState::new(&config, &mut rng))
    }

    #[test]
    fn test_stop_clears_running_flag() {
        let store = store_with(1);
        assert!(store.is_running());
        store.with_lock(|state| state.stop()).unwrap();
        assert!(!store.is_running());
    }

    #[test]
    fn test_concurrent_login_for_last_slot() {
        for round in 0..20u64 {
            let store = store_with(1);
            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let store = store.clone();
                    thread::spawn(move || {
                        let mut rng = StdRng::seed_from_u64(round * 2 + i);
                        store
                            .with_lock(|state| state.login(&format!("p{}", i), false, &mut rng))
                            .unwrap()
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert_eq!(store.with_lock(|state| state.active_players()).unwrap(), 1);
        }
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let store = store_with(1);
        let poisoner = store.clone();
        let _ = thread::spawn(move || {
            let _: Result<(), _> = poisoner.with_lock(|_| panic!("boom"));
        })
        .join();

        assert!(matches!(store.with_lock(|_| ()), Err(ServerError::StorePoisoned)));
        assert!(!store.is_running());
    }
}
