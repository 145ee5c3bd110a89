//! Client session state
//!
//! The state machine (`NotConnected -> Registration -> Searching <-> InGame`)
//! together with the data it guards. Mutations come from two places: server
//! pushes applied by the receive loop, and successful replies applied by the
//! connection façade. Both go through the methods here so the invariants in
//! [`lobby_core::invariants`] are checked after every change.

use std::collections::BTreeMap;

use lobby_core::invariants::{
    assert_game_invariants, assert_offer_invariants, assert_player_id_invariants,
};
use lobby_core::{ConnectionState, Message, MessageId, Player, PlayerId};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Mutable per-connection data
#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    player_id: Option<PlayerId>,
    opponent: Option<PlayerId>,
    offers: Vec<PlayerId>,
    /// Last player snapshot, without this client
    players: Vec<Player>,
    /// Bumped every time a snapshot arrives
    list_revision: u64,
    unprocessed: BTreeMap<MessageId, Message>,
    /// Acknowledged messages; `None` when history is disabled
    processed: Option<BTreeMap<MessageId, Message>>,
    next_message_id: MessageId,
}

impl Session {
    /// A freshly connected session awaiting registration
    pub fn new(keep_history: bool) -> Self {
        Self {
            state: ConnectionState::Registration,
            player_id: None,
            opponent: None,
            offers: Vec::new(),
            players: Vec::new(),
            list_revision: 0,
            unprocessed: BTreeMap::new(),
            processed: keep_history.then(BTreeMap::new),
            next_message_id: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        self.player_id.as_ref()
    }

    pub fn opponent(&self) -> Option<&PlayerId> {
        self.opponent.as_ref()
    }

    pub fn offers(&self) -> &[PlayerId] {
        &self.offers
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn list_revision(&self) -> u64 {
        self.list_revision
    }

    pub fn knows_player(&self, id: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.id == id)
    }

    pub fn history_enabled(&self) -> bool {
        self.processed.is_some()
    }

    /// Fail with [`Error::WrongState`] unless the session is in `expected`
    pub fn require(&self, expected: ConnectionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::WrongState {
                expected: expected.label(),
                actual: self.state,
            })
        }
    }

    /// Fail unless a player id has been assigned
    pub fn require_registered(&self) -> Result<&PlayerId> {
        match (&self.player_id, self.state.is_registered()) {
            (Some(id), true) => Ok(id),
            _ => Err(Error::WrongState {
                expected: "registered",
                actual: self.state,
            }),
        }
    }

    /// Bind the id the server assigned to this client
    pub fn bind_player_id(&mut self, id: PlayerId) -> Result<()> {
        match &self.player_id {
            Some(current) if current == &id => Ok(()),
            Some(current) => Err(Error::Protocol(format!(
                "Server reassigned player id {} to {}",
                current, id
            ))),
            None => {
                debug!(player_id = %id, "Player id assigned");
                self.player_id = Some(id);
                Ok(())
            }
        }
    }

    /// Leave `Registration` once the server accepted the nickname and an id is bound
    pub fn complete_registration(&mut self) -> Result<PlayerId> {
        self.require(ConnectionState::Registration)?;
        let id = self
            .player_id
            .clone()
            .ok_or_else(|| Error::Protocol("Registration accepted without a player id".into()))?;

        self.state = ConnectionState::Searching;
        self.check_invariants();
        info!(player_id = %id, "Registered");
        Ok(id)
    }

    /// Store a new player snapshot, dropping this client from it
    pub fn update_players(&mut self, players: Vec<Player>) {
        let own_id = self.player_id.as_ref();
        self.players = players
            .into_iter()
            .filter(|p| Some(&p.id) != own_id)
            .collect();
        self.list_revision += 1;
        debug!(count = self.players.len(), "Player list updated");
    }

    /// Record an invitation from another player
    pub fn push_offer(&mut self, from: PlayerId) -> Result<()> {
        self.require(ConnectionState::Searching)?;
        debug!(from = %from, "Offer received");
        self.offers.push(from);
        self.check_invariants();
        Ok(())
    }

    /// Enter a session with `opponent`
    pub fn start_game(&mut self, opponent: PlayerId) -> Result<()> {
        self.require(ConnectionState::Searching)?;
        info!(opponent = %opponent, "Game started");

        self.clear_queues();
        self.opponent = Some(opponent);
        self.state = ConnectionState::InGame;
        self.check_invariants();
        Ok(())
    }

    /// Leave the current session, or drop stale offers while searching
    pub fn end_game(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::InGame => {
                info!(opponent = ?self.opponent, "Game ended");
            }
            ConnectionState::Searching => {
                debug!("End of game while searching, clearing offers");
            }
            actual => {
                return Err(Error::WrongState {
                    expected: ConnectionState::InGame.label(),
                    actual,
                });
            }
        }

        self.clear_queues();
        self.opponent = None;
        self.state = ConnectionState::Searching;
        self.check_invariants();
        Ok(())
    }

    /// End the session only if it is still the one with `opponent`
    ///
    /// A reply to `end game` can race with a push that already ended the
    /// session and started another one; that newer session is left alone.
    pub fn end_game_with(&mut self, opponent: &PlayerId) -> bool {
        if self.state == ConnectionState::InGame && self.opponent.as_ref() == Some(opponent) {
            self.end_game().is_ok()
        } else {
            false
        }
    }

    /// Queue a chat line from the opponent; returns its local id
    pub fn push_chat(&mut self, body: String) -> Result<MessageId> {
        self.require(ConnectionState::InGame)?;
        let sender = self
            .opponent
            .clone()
            .ok_or_else(|| Error::Protocol("Chat message without an opponent".into()))?;

        let id = self.next_message_id;
        self.next_message_id += 1;
        self.unprocessed.insert(id, Message::new(sender, id, body));
        self.check_invariants();
        Ok(id)
    }

    /// Unprocessed messages in arrival order
    pub fn messages(&self) -> Vec<Message> {
        self.unprocessed.values().cloned().collect()
    }

    /// Mark a message as processed
    pub fn remove_message(&mut self, id: MessageId) -> Result<()> {
        let message = self
            .unprocessed
            .remove(&id)
            .ok_or(Error::UnknownMessage(id))?;

        if let Some(processed) = self.processed.as_mut() {
            processed.insert(id, message);
        }
        Ok(())
    }

    /// Messages already marked as processed (history mode only)
    pub fn processed_messages(&self) -> Result<Vec<Message>> {
        self.processed
            .as_ref()
            .map(|processed| processed.values().cloned().collect())
            .ok_or(Error::HistoryDisabled)
    }

    /// Processed messages followed by unprocessed ones (history mode only)
    pub fn all_messages(&self) -> Result<Vec<Message>> {
        let mut all = self.processed_messages()?;
        all.extend(self.unprocessed.values().cloned());
        Ok(all)
    }

    /// Connection is gone; nothing but the state query remains meaningful
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::NotConnected {
            info!(previous = %self.state, "Connection state reset");
        }
        self.clear_queues();
        self.opponent = None;
        self.players.clear();
        self.state = ConnectionState::NotConnected;
    }

    fn clear_queues(&mut self) {
        self.offers.clear();
        self.unprocessed.clear();
        if let Some(processed) = self.processed.as_mut() {
            processed.clear();
        }
    }

    fn check_invariants(&self) {
        assert_player_id_invariants(self.state, self.player_id.as_ref());
        assert_offer_invariants(self.state, self.offers.len());
        assert_game_invariants(self.state, self.opponent.as_ref(), self.unprocessed.len());
    }
}
