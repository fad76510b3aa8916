use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::card::{CardId, PlayerId, Team};
use super::crisis::CrisisProgress;
use super::deck::Deck;
use super::event_engine::ActiveEvent;
use super::events::GameEvent;
use super::ledger::OwnershipLedger;
use super::setup::SetupProgress;

/// How the match was decided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VictoryType {
    ElectoralMajority,
    ElectoralPlurality,
    InstitutionalControl,
    CrisisResolution,
    Stalemate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Team>,
    pub victory: VictoryType,
    pub red: TeamTotals,
    pub blue: TeamTotals,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamTotals {
    pub electoral: u32,
    pub institutions: u32,
    pub crisis: u32,
}

/// Top-level match stage. Ordering follows the one-way progression.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum GamePhase {
    #[default]
    Setup,
    MainGame,
    Crisis,
    GameOver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<CardId>,
    /// Cached from the assigned actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_event: Option<CardId>,
    pub remaining_rolls: u8,
    #[serde(default)]
    pub electoral_score: u32,
    #[serde(default)]
    pub institution_score: u32,
    #[serde(default)]
    pub crisis_score: u32,
}

impl Player {
    pub fn new(id: PlayerId, remaining_rolls: u8) -> Self {
        Self {
            id,
            actor: None,
            team: None,
            held_event: None,
            remaining_rolls,
            electoral_score: 0,
            institution_score: 0,
            crisis_score: 0,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.actor.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnState {
    pub current_player_index: usize,
    pub turn_number: u32,
    /// State or institution card on the table awaiting a capture roll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_card: Option<CardId>,
    /// Drawn event awaiting a save/apply decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_card: Option<CardId>,
    /// True while an event handler is in flight; ordinary rolls are rejected.
    #[serde(default)]
    pub event_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    NoPlayers,
    InvalidPlayerIndex { index: usize },
    DuplicatePlayer { player_id: PlayerId },
    DuplicateCard { card_id: CardId },
    LedgerMismatch { card_id: CardId },
    EventFlagMismatch { event_active: bool },
}

/// Complete, id-only match state. Card records live in the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub players: Vec<Player>,
    pub phase: GamePhase,
    #[serde(default)]
    pub setup: SetupProgress,
    #[serde(default)]
    pub turn: TurnState,
    #[serde(default)]
    pub target_deck: Deck,
    #[serde(default)]
    pub event_deck: Deck,
    #[serde(default)]
    pub state_discard: Deck,
    #[serde(default)]
    pub event_discard: Deck,
    /// Actor cards not yet assigned to a player.
    #[serde(default)]
    pub actor_pool: Vec<CardId>,
    #[serde(default)]
    pub ledger: OwnershipLedger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_event: Option<ActiveEvent>,
    #[serde(default)]
    pub crisis: CrisisProgress,
    #[serde(default)]
    pub secession_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
}

impl GameState {
    pub fn new(player_ids: &[PlayerId], rolls_per_turn: u8) -> Self {
        Self {
            players: player_ids
                .iter()
                .map(|id| Player::new(*id, rolls_per_turn))
                .collect(),
            ..Self::default()
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    /// Records `event` and appends it to the batch returned to the caller.
    pub fn emit(&mut self, events: &mut Vec<GameEvent>, event: impl Into<GameEvent>) {
        let event = event.into();
        self.record_event(event.clone());
        events.push(event);
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn player_index(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|player| player.id == id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.turn.current_player_index)
    }

    pub fn current_player_mut(&mut self) -> Option<&mut Player> {
        self.players.get_mut(self.turn.current_player_index)
    }

    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.current_player().map(|player| player.id)
    }

    pub fn is_current(&self, id: PlayerId) -> bool {
        self.current_player_id() == Some(id)
    }

    pub fn set_current_player(&mut self, id: PlayerId) {
        if let Some(index) = self.player_index(id) {
            self.turn.current_player_index = index;
        }
    }

    pub fn team_of(&self, id: PlayerId) -> Option<Team> {
        self.get_player(id).and_then(|player| player.team)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::GameOver || self.outcome.is_some()
    }

    pub fn team_totals(&self, team: Team) -> TeamTotals {
        self.players
            .iter()
            .filter(|player| player.team == Some(team))
            .fold(TeamTotals::default(), |mut totals, player| {
                totals.electoral += player.electoral_score;
                totals.institutions += player.institution_score;
                totals.crisis += player.crisis_score;
                totals
            })
    }

    /// Every place a card id can live outside the registry.
    fn card_locations(&self) -> impl Iterator<Item = CardId> + '_ {
        self.target_deck
            .iter()
            .chain(self.event_deck.iter())
            .chain(self.state_discard.iter())
            .chain(self.event_discard.iter())
            .chain(self.turn.target_card)
            .chain(self.turn.event_card)
            .chain(self.active_event.as_ref().map(|active| active.card))
            .chain(self.actor_pool.iter().copied())
            .chain(self.players.iter().filter_map(|player| player.actor))
            .chain(self.players.iter().filter_map(|player| player.held_event))
            .chain(self.ledger.owned_cards())
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.players.is_empty() {
            return Err(IntegrityError::NoPlayers);
        }
        if self.turn.current_player_index >= self.players.len() {
            return Err(IntegrityError::InvalidPlayerIndex {
                index: self.turn.current_player_index,
            });
        }

        let mut players = HashSet::new();
        for player in &self.players {
            if !players.insert(player.id) {
                return Err(IntegrityError::DuplicatePlayer { player_id: player.id });
            }
        }

        let mut seen = HashSet::new();
        for card_id in self.card_locations() {
            if !seen.insert(card_id) {
                return Err(IntegrityError::DuplicateCard { card_id });
            }
        }

        self.ledger
            .check_consistency()
            .map_err(|card_id| IntegrityError::LedgerMismatch { card_id })?;

        if self.turn.event_active != self.active_event.is_some() {
            return Err(IntegrityError::EventFlagMismatch {
                event_active: self.turn.event_active,
            });
        }

        Ok(())
    }
}
