//! Id-only match snapshots for the wire. Both ends resolve the ids through
//! their own registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::{CardId, PlayerId, Team};
use super::event_engine::ActiveEvent;
use super::registry::CardRegistry;
use super::state::{GamePhase, GameState, VictoryState};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported {what} version {found}, expected {expected}")]
    Version {
        what: &'static str,
        found: u32,
        expected: u32,
    },
    #[error("card definitions differ: expected fingerprint {expected:#x}, found {actual:#x}")]
    FingerprintMismatch { expected: u64, actual: u64 },
    #[error("card {card} is not in the registry")]
    UnknownCard { card: CardId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_event: Option<CardId>,
    pub remaining_rolls: u8,
    pub electoral_score: u32,
    pub institution_score: u32,
    pub crisis_score: u32,
    /// Captured states and institutions, ascending.
    pub captured: Vec<CardId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSnapshot {
    pub version: u32,
    pub fingerprint: u64,
    pub phase: GamePhase,
    pub turn_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player: Option<PlayerId>,
    pub players: Vec<PlayerSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_card: Option<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_card: Option<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_event: Option<ActiveEvent>,
    pub target_deck: Vec<CardId>,
    pub event_deck: Vec<CardId>,
    pub state_discard: Vec<CardId>,
    pub event_discard: Vec<CardId>,
    pub actor_pool: Vec<CardId>,
    pub secession_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
}

impl MatchSnapshot {
    pub fn capture(registry: &CardRegistry, state: &GameState) -> Self {
        let players = state
            .players
            .iter()
            .map(|player| PlayerSnapshot {
                id: player.id,
                actor: player.actor,
                team: player.team,
                held_event: player.held_event,
                remaining_rolls: player.remaining_rolls,
                electoral_score: player.electoral_score,
                institution_score: player.institution_score,
                crisis_score: player.crisis_score,
                captured: state.ledger.cards_of(player.id),
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            fingerprint: registry.fingerprint(),
            phase: state.phase,
            turn_number: state.turn.turn_number,
            current_player: state.current_player_id(),
            players,
            target_card: state.turn.target_card,
            event_card: state.turn.event_card,
            active_event: state.active_event.clone(),
            target_deck: state.target_deck.to_vec(),
            event_deck: state.event_deck.to_vec(),
            state_discard: state.state_discard.to_vec(),
            event_discard: state.event_discard.to_vec(),
            actor_pool: state.actor_pool.clone(),
            secession_count: state.secession_count,
            outcome: state.outcome.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|source| WireError::Json {
            what: "snapshot",
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, WireError> {
        let snapshot: Self = serde_json::from_str(json).map_err(|source| WireError::Json {
            what: "snapshot",
            source,
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(WireError::Version {
                what: "snapshot",
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    fn card_ids(&self) -> impl Iterator<Item = CardId> + '_ {
        self.players
            .iter()
            .flat_map(|player| {
                player
                    .actor
                    .into_iter()
                    .chain(player.held_event)
                    .chain(player.captured.iter().copied())
            })
            .chain(self.target_card)
            .chain(self.event_card)
            .chain(self.active_event.as_ref().map(|active| active.card))
            .chain(self.target_deck.iter().copied())
            .chain(self.event_deck.iter().copied())
            .chain(self.state_discard.iter().copied())
            .chain(self.event_discard.iter().copied())
            .chain(self.actor_pool.iter().copied())
    }

    /// Confirms the snapshot was taken against the same definitions and
    /// that every id resolves locally.
    pub fn check_against(&self, registry: &CardRegistry) -> Result<(), WireError> {
        let actual = registry.fingerprint();
        if self.fingerprint != actual {
            return Err(WireError::FingerprintMismatch {
                expected: self.fingerprint,
                actual,
            });
        }
        match self.card_ids().find(|card| registry.get(*card).is_none()) {
            Some(card) => Err(WireError::UnknownCard { card }),
            None => Ok(()),
        }
    }

    /// FNV-1a over the JSON encoding; equal for replicas in lockstep.
    pub fn digest(&self) -> Result<u64, WireError> {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0100_0000_01b3;

        let json = self.to_json()?;
        Ok(json.bytes().fold(OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(PRIME)
        }))
    }
}
