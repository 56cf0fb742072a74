//! The selector state of the stats view and stale-response suppression.
//!
//! Loading a game's stats takes several independent requests. If the user
//! switches side or period while a load is in flight, that load must not
//! overwrite the newer one when it finally lands. A token is taken from the
//! tracker at the moment a selection is made, before its load is spawned, and
//! only the holder of the latest token may publish its result.

use crate::{PeriodFilter, TeamSide};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Which game, team side and period the stats are computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub game_id: String,
    pub side: TeamSide,
    pub period: PeriodFilter,
}

impl Selection {
    pub fn new(game_id: impl Into<String>, side: TeamSide, period: PeriodFilter) -> Self {
        Selection {
            game_id: game_id.into(),
            side,
            period,
        }
    }

    #[must_use]
    pub fn with_side(&self, side: TeamSide) -> Self {
        Selection {
            side,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_period(&self, period: PeriodFilter) -> Self {
        Selection {
            period,
            ..self.clone()
        }
    }
}

/// Handed out when a load starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    #[must_use]
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Tracks the latest selection and which token is allowed to publish.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    generation: AtomicU64,
    current: Mutex<Option<Selection>>,
}

impl SelectionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new selection and invalidate every token handed out before.
    pub fn begin(&self, selection: Selection) -> RequestToken {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting load #{generation} for {selection:?}");
        *current = Some(selection);
        RequestToken(generation)
    }

    #[must_use]
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// The most recent selection, if any load has started.
    #[must_use]
    pub fn current_selection(&self) -> Option<Selection> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pass `value` through only if `token` is still the latest one.
    pub fn accept<T>(&self, token: RequestToken, value: T) -> Option<T> {
        if self.is_current(token) {
            Some(value)
        } else {
            debug!(
                "Discarding result of load #{}, superseded by #{}",
                token.0,
                self.generation.load(Ordering::SeqCst)
            );
            None
        }
    }
}
