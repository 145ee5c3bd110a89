//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible session states during development.
//! These checks are compiled out in release builds.

use crate::models::{ConnectionState, PlayerId};

/// Validate that a player id is bound exactly when the state requires one
pub fn assert_player_id_invariants(state: ConnectionState, player_id: Option<&PlayerId>) {
    debug_assert!(
        !state.is_registered() || player_id.is_some(),
        "State {:?} reached without a bound player id",
        state
    );
}

/// Validate that pending offers only exist while searching
pub fn assert_offer_invariants(state: ConnectionState, offer_count: usize) {
    debug_assert!(
        offer_count == 0 || state == ConnectionState::Searching,
        "{} pending offers held in state {:?}",
        offer_count,
        state
    );
}

/// Validate that chat queues and the opponent only exist while in a game
pub fn assert_game_invariants(
    state: ConnectionState,
    opponent: Option<&PlayerId>,
    unprocessed_count: usize,
) {
    debug_assert!(
        unprocessed_count == 0 || state == ConnectionState::InGame,
        "{} unprocessed messages held in state {:?}",
        unprocessed_count,
        state
    );

    debug_assert!(
        (state == ConnectionState::InGame) == opponent.is_some(),
        "Opponent {:?} inconsistent with state {:?}",
        opponent,
        state
    );
}
