use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::{CardId, PlayerId};
use super::config::MatchConfig;
use super::dice::{DiceRoller, FaceJournal};
use super::event_engine::EventStage;
use super::events::GameEvent;
use super::phase::PhaseMachine;
use super::registry::CardRegistry;
use super::setup::SetupPhase;
use super::state::{GamePhase, GameState, IntegrityError, VictoryState};
use super::turn::MainGamePhase;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the match is over")]
    GameFinished,
    #[error("expected phase {expected:?}, match is in {actual:?}")]
    WrongPhase { expected: GamePhase, actual: GamePhase },
    #[error("player {player} cannot act now")]
    NotPlayerTurn { player: PlayerId },
    #[error("player {player} is not in this match")]
    PlayerNotFound { player: PlayerId },
    #[error("card {card} is not in the registry")]
    CardNotFound { card: CardId },
    #[error("player {player} has no rolls left")]
    NoRollsRemaining { player: PlayerId },
    #[error("no target card on the table")]
    NoTargetCard,
    #[error("event {card} is still resolving")]
    EventActive { card: CardId },
    #[error("no event is waiting for a choice")]
    NoEventActive,
    #[error("event {card} must be played before rolling")]
    EventPending { card: CardId },
    #[error("event {card} cannot be saved")]
    CannotSaveEvent { card: CardId },
    #[error("player {player} already holds an event")]
    EventSlotOccupied { player: PlayerId },
    #[error("event {card} is neither on the table nor held by the player")]
    EventMismatch { card: CardId },
    #[error("card {card} cannot be challenged")]
    NotAChallengeCandidate { card: CardId },
    #[error("actor {actor} is not available")]
    ActorUnavailable { actor: CardId },
    #[error("player {player} already has an actor")]
    PlayerAlreadyAssigned { player: PlayerId },
    #[error("player {player} cannot receive an actor from this selector")]
    InvalidAssignmentTarget { player: PlayerId },
    #[error("player {player} is not the current selector")]
    NotSelector { player: PlayerId },
    #[error("state integrity violated: {error:?}")]
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryState>,
}

impl RuleResolution {
    /// The state travels without its event log; `events` carries only what
    /// this step produced.
    pub fn new(mut state: GameState, events: Vec<GameEvent>) -> Self {
        state.event_log = Vec::new();
        let victory = state.outcome.clone();
        Self {
            state,
            events,
            victory,
        }
    }
}

/// Everything a phase controller or event handler may consult besides the
/// state itself. The rng drives deck shuffles and random re-insertion.
pub struct RuleContext {
    pub registry: CardRegistry,
    pub config: MatchConfig,
    pub rng: SmallRng,
}

impl RuleContext {
    pub fn new(registry: CardRegistry, config: MatchConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            registry,
            config,
            rng,
        }
    }
}

impl std::fmt::Debug for RuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleContext")
            .field("cards", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Validates player requests and routes them to the active phase. Every
/// `check_*` is side-effect free; the matching operation runs the check
/// first and only then mutates.
pub struct RuleEngine {
    ctx: RuleContext,
    dice: Box<dyn DiceRoller>,
    faces: FaceJournal,
}

impl RuleEngine {
    pub fn new(registry: CardRegistry, config: MatchConfig, dice: Box<dyn DiceRoller>) -> Self {
        Self {
            ctx: RuleContext::new(registry, config),
            dice,
            faces: FaceJournal::default(),
        }
    }

    pub fn registry(&self) -> &CardRegistry {
        &self.ctx.registry
    }

    pub fn config(&self) -> &MatchConfig {
        &self.ctx.config
    }

    pub(crate) fn context_mut(&mut self) -> &mut RuleContext {
        &mut self.ctx
    }

    /// Starts journaling dice for one command; `forced` faces are rolled
    /// before the engine's own dice.
    pub(crate) fn begin_command(&mut self, forced: &[u8]) {
        self.faces.begin(forced);
    }

    pub(crate) fn finish_command(&mut self) -> (Vec<u8>, usize) {
        self.faces.finish()
    }

    fn ensure_not_finished(state: &GameState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_phase(state: &GameState, expected: GamePhase) -> Result<(), RuleError> {
        Self::ensure_not_finished(state)?;
        if state.phase != expected {
            return Err(RuleError::WrongPhase {
                expected,
                actual: state.phase,
            });
        }
        Ok(())
    }

    fn ensure_player(state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        state
            .get_player(player)
            .map(|_| ())
            .ok_or(RuleError::PlayerNotFound { player })
    }

    fn ensure_turn_owner(state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        Self::ensure_player(state, player)?;
        if !state.is_current(player) {
            return Err(RuleError::NotPlayerTurn { player });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_main_turn(state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        Self::ensure_phase(state, GamePhase::MainGame)?;
        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, player)
    }

    fn ensure_selector(state: &GameState, selector: PlayerId) -> Result<(), RuleError> {
        Self::ensure_phase(state, GamePhase::Setup)?;
        Self::ensure_player(state, selector)?;
        if !state.setup.is_assigning() || state.setup.selector != Some(selector) {
            return Err(RuleError::NotSelector { player: selector });
        }
        Ok(())
    }

    fn ensure_actor_available(&self, state: &GameState, actor: CardId) -> Result<(), RuleError> {
        if self.ctx.registry.actor(actor).is_none() {
            return Err(RuleError::CardNotFound { card: actor });
        }
        if !state.actor_pool.contains(&actor) {
            return Err(RuleError::ActorUnavailable { actor });
        }
        Ok(())
    }

    pub fn check_roll(&self, state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        Self::ensure_not_finished(state)?;
        Self::ensure_player(state, player)?;
        match state.phase {
            GamePhase::Setup => {
                if !state.setup.is_rolling() || state.setup.next_roller() != Some(player) {
                    return Err(RuleError::NotPlayerTurn { player });
                }
                Ok(())
            }
            GamePhase::MainGame => {
                Self::ensure_main_turn(state, player)?;
                let remaining = state.get_player(player).map_or(0, |p| p.remaining_rolls);
                match &state.active_event {
                    Some(active) => match active.stage {
                        EventStage::AwaitingTableRoll { .. } => {
                            if remaining == 0 {
                                return Err(RuleError::NoRollsRemaining { player });
                            }
                            if state.turn.target_card.is_none() {
                                return Err(RuleError::NoTargetCard);
                            }
                            Ok(())
                        }
                        EventStage::AwaitingDuelRoll { .. } | EventStage::AwaitingAlternateRoll { .. } => Ok(()),
                        _ => Err(RuleError::EventActive { card: active.card }),
                    },
                    None => {
                        if remaining == 0 {
                            return Err(RuleError::NoRollsRemaining { player });
                        }
                        if state.turn.target_card.is_none() {
                            return Err(RuleError::NoTargetCard);
                        }
                        if let Some(card) = state.turn.event_card.filter(|card| {
                            self.ctx
                                .registry
                                .event(*card)
                                .is_some_and(|event| event.must_play_immediately)
                        }) {
                            return Err(RuleError::EventPending { card });
                        }
                        Ok(())
                    }
                }
            }
            GamePhase::Crisis => {
                if state.crisis.pending.first() != Some(&player) {
                    return Err(RuleError::NotPlayerTurn { player });
                }
                Ok(())
            }
            GamePhase::GameOver => Err(RuleError::GameFinished),
        }
    }

    /// Drawing with a card already on the table is accepted and does nothing.
    pub fn check_draw_target(&self, state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        Self::ensure_main_turn(state, player)
    }

    pub fn check_draw_event(&self, state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        Self::ensure_main_turn(state, player)
    }

    pub fn check_save_event(&self, state: &GameState, player: PlayerId, card: CardId) -> Result<(), RuleError> {
        Self::ensure_main_turn(state, player)?;
        let event = self
            .ctx
            .registry
            .event(card)
            .ok_or(RuleError::CardNotFound { card })?;
        if state.turn.event_card != Some(card) {
            return Err(RuleError::EventMismatch { card });
        }
        if !event.can_save || event.must_play_immediately {
            return Err(RuleError::CannotSaveEvent { card });
        }
        if state.get_player(player).is_some_and(|p| p.held_event.is_some()) {
            return Err(RuleError::EventSlotOccupied { player });
        }
        Ok(())
    }

    pub fn check_play_event(&self, state: &GameState, player: PlayerId, card: CardId) -> Result<(), RuleError> {
        Self::ensure_main_turn(state, player)?;
        if self.ctx.registry.event(card).is_none() {
            return Err(RuleError::CardNotFound { card });
        }
        if let Some(active) = &state.active_event {
            return Err(RuleError::EventActive { card: active.card });
        }
        let on_table = state.turn.event_card == Some(card);
        let held = state.get_player(player).and_then(|p| p.held_event) == Some(card);
        if !on_table && !held {
            return Err(RuleError::EventMismatch { card });
        }
        Ok(())
    }

    pub fn check_challenge_target(&self, state: &GameState, player: PlayerId, card: CardId) -> Result<(), RuleError> {
        Self::ensure_main_turn(state, player)?;
        match state.active_event.as_ref().map(|active| (active.player, &active.stage)) {
            Some((owner, EventStage::AwaitingChallengeChoice { candidates })) if owner == player => {
                if candidates.contains(&card) {
                    Ok(())
                } else {
                    Err(RuleError::NotAChallengeCandidate { card })
                }
            }
            _ => Err(RuleError::NoEventActive),
        }
    }

    pub fn check_select_actor(&self, state: &GameState, selector: PlayerId, actor: CardId) -> Result<(), RuleError> {
        Self::ensure_selector(state, selector)?;
        self.ensure_actor_available(state, actor)
    }

    pub fn check_assign_actor(
        &self,
        state: &GameState,
        selector: PlayerId,
        target: PlayerId,
        actor: CardId,
    ) -> Result<(), RuleError> {
        Self::ensure_selector(state, selector)?;
        self.ensure_actor_available(state, actor)?;
        let receiver = state
            .get_player(target)
            .ok_or(RuleError::PlayerNotFound { player: target })?;
        if receiver.is_assigned() {
            return Err(RuleError::PlayerAlreadyAssigned { player: target });
        }
        if target == selector {
            return Err(RuleError::InvalidAssignmentTarget { player: target });
        }
        Ok(())
    }

    pub fn start(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        PhaseMachine::start(&mut self.ctx, state)
    }

    pub fn roll(&mut self, state: &mut GameState, player: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        self.check_roll(state, player)?;
        Ok(self.apply_roll(state, player))
    }

    pub fn draw_target(&mut self, state: &mut GameState, player: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        self.check_draw_target(state, player)?;
        Ok(self.apply_draw_target(state, player))
    }

    pub fn draw_event(&mut self, state: &mut GameState, player: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        self.check_draw_event(state, player)?;
        Ok(self.apply_draw_event(state, player))
    }

    pub fn save_event(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.check_save_event(state, player, card)?;
        Ok(self.apply_save_event(state, player, card))
    }

    pub fn play_event(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.check_play_event(state, player, card)?;
        Ok(self.apply_play_event(state, player, card))
    }

    pub fn choose_challenge_target(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.check_challenge_target(state, player, card)?;
        Ok(self.apply_challenge_target(state, player, card))
    }

    pub fn select_actor(
        &mut self,
        state: &mut GameState,
        selector: PlayerId,
        actor: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.check_select_actor(state, selector, actor)?;
        Ok(self.apply_select_actor(state, selector, actor))
    }

    pub fn assign_actor(
        &mut self,
        state: &mut GameState,
        selector: PlayerId,
        target: PlayerId,
        actor: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.check_assign_actor(state, selector, target, actor)?;
        Ok(self.apply_assign_actor(state, selector, target, actor))
    }

    pub(crate) fn apply_roll(&mut self, state: &mut GameState, player: PlayerId) -> Vec<GameEvent> {
        let value = self.faces.roll(self.dice.as_mut());
        PhaseMachine::request_roll(&mut self.ctx, state, player, value)
    }

    pub(crate) fn apply_draw_target(&mut self, state: &mut GameState, player: PlayerId) -> Vec<GameEvent> {
        MainGamePhase.draw_target(&mut self.ctx, state, player)
    }

    pub(crate) fn apply_draw_event(&mut self, state: &mut GameState, player: PlayerId) -> Vec<GameEvent> {
        MainGamePhase.draw_event(&mut self.ctx, state, player)
    }

    pub(crate) fn apply_save_event(&mut self, state: &mut GameState, player: PlayerId, card: CardId) -> Vec<GameEvent> {
        MainGamePhase.save_event(&mut self.ctx, state, player, card)
    }

    pub(crate) fn apply_play_event(&mut self, state: &mut GameState, player: PlayerId, card: CardId) -> Vec<GameEvent> {
        MainGamePhase.play_event(&mut self.ctx, state, player, card)
    }

    pub(crate) fn apply_challenge_target(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Vec<GameEvent> {
        MainGamePhase.choose_challenge_target(&mut self.ctx, state, player, card)
    }

    pub(crate) fn apply_select_actor(&mut self, state: &mut GameState, selector: PlayerId, actor: CardId) -> Vec<GameEvent> {
        SetupPhase.select_actor(&mut self.ctx, state, selector, actor)
    }

    pub(crate) fn apply_assign_actor(
        &mut self,
        state: &mut GameState,
        selector: PlayerId,
        target: PlayerId,
        actor: CardId,
    ) -> Vec<GameEvent> {
        SetupPhase.assign_actor(&mut self.ctx, state, selector, target, actor)
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine").field("ctx", &self.ctx).finish()
    }
}
