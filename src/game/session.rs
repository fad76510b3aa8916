//! One match: state, rule engine and event bus wired together.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::card::{CardDefinitions, CardKind, PlayerId};
use super::command::Command;
use super::config::MatchConfig;
use super::deck::Deck;
use super::dice::{DiceRoller, SeededDice};
use super::events::{BusSubscriber, EventBus, GameEvent};
use super::registry::{CardRegistry, RegistryError};
use super::rules::{RuleContext, RuleEngine, RuleError, RuleResolution};
use super::snapshot::MatchSnapshot;
use super::state::GameState;

/// Keeps the dice stream apart from the deck shuffle stream of the same seed.
const DICE_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type", content = "detail")]
pub enum MatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("a match needs at least one player")]
    NoPlayers,
    #[error("player {0} is listed twice")]
    DuplicatePlayer(PlayerId),
    #[error("{players} players but only {actors} actor cards")]
    NotEnoughActors { players: usize, actors: usize },
    #[error("card definitions differ: expected fingerprint {expected:#x}, found {actual:#x}")]
    DefinitionsMismatch { expected: u64, actual: u64 },
    #[error("command {index} was rejected: {error}")]
    Rejected { index: usize, error: RuleError },
}

/// Builds the opening state: shuffled target and event decks, every actor in
/// the pool, allegiance cards kept out of play.
pub(crate) fn deal(ctx: &mut RuleContext, players: &[PlayerId]) -> GameState {
    let mut state = GameState::new(players, ctx.config.rolls_per_turn);

    let mut targets = Deck::from_cards(
        ctx.registry
            .ids_of_kind(CardKind::State)
            .into_iter()
            .chain(ctx.registry.ids_of_kind(CardKind::Institution)),
    );
    targets.shuffle(&mut ctx.rng);
    let mut events = Deck::from_cards(ctx.registry.ids_of_kind(CardKind::Event));
    events.shuffle(&mut ctx.rng);

    state.target_deck = targets;
    state.event_deck = events;
    state.actor_pool = ctx.registry.ids_of_kind(CardKind::Actor);
    debug!(
        targets = state.target_deck.len(),
        events = state.event_deck.len(),
        actors = state.actor_pool.len(),
        "match dealt"
    );
    state
}

pub struct Match {
    state: GameState,
    engine: RuleEngine,
    bus: EventBus,
    players: Vec<PlayerId>,
}

impl Match {
    /// A match rolling [`SeededDice`] derived from `config.seed`.
    pub fn new(definitions: &CardDefinitions, config: MatchConfig, players: &[PlayerId]) -> Result<Self, MatchError> {
        let dice = SeededDice::new(config.seed ^ DICE_STREAM);
        Self::with_dice(definitions, config, players, Box::new(dice))
    }

    pub fn with_dice(
        definitions: &CardDefinitions,
        config: MatchConfig,
        players: &[PlayerId],
        dice: Box<dyn DiceRoller>,
    ) -> Result<Self, MatchError> {
        let registry = CardRegistry::from_definitions(definitions)?;
        Self::from_registry(registry, config, players, dice)
    }

    pub fn from_registry(
        registry: CardRegistry,
        config: MatchConfig,
        players: &[PlayerId],
        dice: Box<dyn DiceRoller>,
    ) -> Result<Self, MatchError> {
        if players.is_empty() {
            return Err(MatchError::NoPlayers);
        }
        let mut seen = HashSet::new();
        if let Some(player) = players.iter().find(|player| !seen.insert(**player)) {
            return Err(MatchError::DuplicatePlayer(*player));
        }
        let actors = registry.ids_of_kind(CardKind::Actor).len();
        if actors < players.len() {
            return Err(MatchError::NotEnoughActors {
                players: players.len(),
                actors,
            });
        }

        let mut engine = RuleEngine::new(registry, config, dice);
        let state = deal(engine.context_mut(), players);
        info!(players = players.len(), seed = engine.config().seed, "match created");
        Ok(Self {
            state,
            engine,
            bus: EventBus::new(),
            players: players.to_vec(),
        })
    }

    /// Enters setup; the first roller's turn starts.
    pub fn start(&mut self) -> Vec<GameEvent> {
        let events = self.engine.start(&mut self.state);
        self.bus.publish(&events);
        events
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn registry(&self) -> &CardRegistry {
        self.engine.registry()
    }

    pub fn config(&self) -> &MatchConfig {
        self.engine.config()
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn BusSubscriber>) {
        self.bus.subscribe(subscriber);
    }

    pub fn validate(&self, command: &Command) -> Result<(), RuleError> {
        command.validate(&self.engine, &self.state)
    }

    /// Validates, executes and publishes one command. A rejected command
    /// leaves the match untouched.
    pub(crate) fn run(&mut self, command: &Command) -> Result<Vec<GameEvent>, RuleError> {
        self.run_with_faces(command, &[]).map(|(events, _)| events)
    }

    /// Like [`Match::run`], but rolls `faces` before touching the match dice
    /// and also returns every face the command rolled.
    pub(crate) fn run_with_faces(
        &mut self,
        command: &Command,
        faces: &[u8],
    ) -> Result<(Vec<GameEvent>, Vec<u8>), RuleError> {
        command.validate(&self.engine, &self.state)?;
        self.engine.begin_command(faces);
        let events = command.execute(&mut self.engine, &mut self.state);
        let (rolled, unused) = self.engine.finish_command();
        if unused > 0 {
            warn!(unused, ?command, "forced dice faces were not consumed");
        }
        self.bus.publish(&events);
        Ok((events, rolled))
    }

    pub fn resolution(&self, events: Vec<GameEvent>) -> RuleResolution {
        RuleResolution::new(self.state.clone(), events)
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot::capture(self.registry(), &self.state)
    }
}

impl std::fmt::Debug for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Match")
            .field("phase", &self.state.phase)
            .field("players", &self.players)
            .field("bus", &self.bus)
            .finish()
    }
}
