//! Debounce / idle state machine.
//!
//! Driven by the scalar `debounce.since` together with `last_total`:
//!
//! - **Active**: `last_total > 0`, `since == 0`.
//! - **Idle-Pending**: `last_total == 0`, `since != 0`, waiting for
//!   `since + ms`.
//! - **Idle**: `last_total == 0`, `since == 0`; either never active or the
//!   last episode already settled.
//!
//! An episode opens only on a `>0 -> 0` edge of the total. Zero-to-zero
//! mutations keep whatever anchor is already set, so repeated idle reports
//! neither extend the window nor start a new episode after settlement.

use crate::types::{AggregateState, DebounceState, clamp_debounce_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    Active,
    IdlePending { since: u64, deadline: u64 },
    Idle,
}

impl IdlePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::IdlePending { .. } => "idle_pending",
            Self::Idle => "idle",
        }
    }
}

pub fn phase(last_total: u32, debounce: DebounceState) -> IdlePhase {
    if last_total > 0 {
        IdlePhase::Active
    } else if debounce.since != 0 {
        IdlePhase::IdlePending {
            since: debounce.since,
            deadline: debounce.since.saturating_add(debounce.ms),
        }
    } else {
        IdlePhase::Idle
    }
}

/// Deadline of the open idle window, if any.
pub fn deadline(debounce: DebounceState) -> Option<u64> {
    (debounce.since != 0).then(|| debounce.since.saturating_add(debounce.ms))
}

/// React to a committed total transition.
pub fn on_total_change(
    debounce: DebounceState,
    previous_total: u32,
    next_total: u32,
    now_ms: u64,
) -> DebounceState {
    if next_total > 0 {
        return DebounceState {
            since: 0,
            ..debounce
        };
    }
    if previous_total > 0 && debounce.since == 0 {
        // `0` is the "no window" sentinel, so an anchor at epoch 0 is nudged.
        return DebounceState {
            since: now_ms.max(1),
            ..debounce
        };
    }
    debounce
}

/// True when the open idle window has elapsed and nothing is active.
pub fn is_settle_due(state: &AggregateState, now_ms: u64) -> bool {
    state.last_total == 0
        && state.all_tabs_zero()
        && deadline(state.debounce).is_some_and(|d| now_ms >= d)
}

/// Close the idle window after settlement.
pub fn settle(debounce: DebounceState) -> DebounceState {
    DebounceState {
        since: 0,
        ..debounce
    }
}

/// Apply a new window length. The anchor is preserved; only the deadline
/// moves.
pub fn reconfigure(debounce: DebounceState, ms: u64) -> DebounceState {
    DebounceState {
        ms: clamp_debounce_ms(ms),
        ..debounce
    }
}
