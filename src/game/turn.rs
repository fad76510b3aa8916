//! Main game: draw a target, optionally take an event, roll to capture.

use tracing::{debug, info, warn};

use super::card::{CardId, PlayerId};
use super::crisis::{electoral_majority, evaluate_victory};
use super::deck::Deck;
use super::event_engine::EventResolutionEngine;
use super::events::{DiscardReason, EventCardEvent, GameEvent, TurnFlowEvent};
use super::phase::{PhaseController, PhaseMachine};
use super::rules::RuleContext;
use super::state::{GamePhase, GameState};

/// Result of a single roll against the table target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollOutcome {
    Seceded { card: CardId },
    Captured { card: CardId },
    Missed,
    NoTarget,
}

pub struct MainGamePhase;

impl MainGamePhase {
    pub fn draw_target(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "draw_target") {
            return events;
        }
        if state.turn.target_card.is_some() {
            debug!(player, "target already on the table");
            return events;
        }
        match state.target_deck.draw() {
            Some(card) => {
                state.turn.target_card = Some(card);
                state.emit(&mut events, TurnFlowEvent::TargetCardDrawn { player, card });
            }
            None => Self::exhaust_targets(ctx, state, &mut events),
        }
        events
    }

    pub fn draw_event(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "draw_event") {
            return events;
        }
        if state.turn.event_card.is_some() {
            debug!(player, "event already on the table");
            return events;
        }
        if state.event_deck.is_empty()
            && ctx.config.reshuffle_event_discard
            && !state.event_discard.is_empty()
        {
            let mut deck = Deck::from_cards(state.event_discard.take_all());
            deck.shuffle(&mut ctx.rng);
            let cards = deck.len();
            state.event_deck = deck;
            state.emit(&mut events, EventCardEvent::DeckReshuffled { cards });
        }
        match state.event_deck.draw() {
            Some(card) => {
                state.turn.event_card = Some(card);
                state.emit(&mut events, EventCardEvent::Drawn { player, card });
            }
            None => debug!(player, "event deck empty"),
        }
        events
    }

    pub fn save_event(
        &self,
        _ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "save_event") || state.turn.event_card != Some(card) {
            return events;
        }
        let Some(holder) = state.get_player_mut(player) else {
            return events;
        };
        if holder.held_event.is_some() {
            warn!(player, "held event slot already occupied");
            return events;
        }
        holder.held_event = Some(card);
        state.turn.event_card = None;
        state.emit(&mut events, EventCardEvent::Saved { player, card });
        events
    }

    pub fn play_event(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Vec<GameEvent> {
        if !self.is_active(state, "play_event") {
            return Vec::new();
        }
        EventResolutionEngine::apply_event(ctx, state, player, card)
    }

    pub fn choose_challenge_target(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        card: CardId,
    ) -> Vec<GameEvent> {
        if !self.is_active(state, "choose_challenge_target") {
            return Vec::new();
        }
        EventResolutionEngine::choose_target(ctx, state, player, card)
    }

    /// Applies one roll to the table target. Secession is checked first and
    /// ends the attempt; a roll-again face grants a roll before the capture
    /// check. `required` replaces the card's success set with a single face.
    pub(crate) fn resolve_table_roll(
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        value: u8,
        required: Option<u8>,
        events: &mut Vec<GameEvent>,
    ) -> RollOutcome {
        let Some(card) = state.turn.target_card else {
            warn!(player, "roll with no target on the table");
            return RollOutcome::NoTarget;
        };

        if let Some(target) = ctx.registry.state(card) {
            if target.has_secession && value == ctx.config.secession_roll {
                state.turn.target_card = None;
                state.state_discard.push_bottom(card);
                state.secession_count += 1;
                info!(player, card, "state seceded");
                state.emit(
                    events,
                    TurnFlowEvent::StateDiscarded {
                        card,
                        reason: DiscardReason::Secession,
                    },
                );
                return RollOutcome::Seceded { card };
            }
            if target.has_roll_again && value == ctx.config.roll_again_roll {
                if let Some(roller) = state.get_player_mut(player) {
                    roller.remaining_rolls = roller.remaining_rolls.saturating_add(1);
                    let remaining = roller.remaining_rolls;
                    state.emit(events, TurnFlowEvent::ExtraRollGranted { player, remaining });
                }
            }
        }

        let success = match required {
            Some(face) => value == face,
            None => match (ctx.registry.get(card).and_then(|c| c.success_rolls()), state.team_of(player)) {
                (Some(rolls), Some(team)) => rolls.succeeds(team, value),
                _ => false,
            },
        };

        if success && state.capture_card(&ctx.registry, player, card, events) {
            RollOutcome::Captured { card }
        } else {
            RollOutcome::Missed
        }
    }

    /// Follows up a resolved roll: victory check after a capture, turn end
    /// after a capture or secession, or after a miss with no rolls left.
    pub(crate) fn settle_roll(
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        outcome: RollOutcome,
        events: &mut Vec<GameEvent>,
    ) {
        if state.phase != GamePhase::MainGame {
            return;
        }
        let turn_over = match outcome {
            RollOutcome::Captured { .. } => {
                if Self::check_electoral_victory(ctx, state, events) {
                    return;
                }
                true
            }
            RollOutcome::Seceded { .. } => true,
            RollOutcome::Missed | RollOutcome::NoTarget => state
                .get_player(player)
                .map_or(true, |roller| roller.remaining_rolls == 0),
        };
        if turn_over {
            events.extend(PhaseMachine::finish_turn(ctx, state));
        }
    }

    /// Ends the match on an electoral majority. Returns true when it did.
    pub(crate) fn check_electoral_victory(
        ctx: &mut RuleContext,
        state: &mut GameState,
        events: &mut Vec<GameEvent>,
    ) -> bool {
        match electoral_majority(state, &ctx.config) {
            Some(outcome) => {
                info!(winner = ?outcome.winner, "electoral majority reached");
                state.outcome = Some(outcome);
                events.extend(PhaseMachine::set_phase(ctx, state, GamePhase::GameOver));
                true
            }
            None => false,
        }
    }

    fn exhaust_targets(ctx: &mut RuleContext, state: &mut GameState, events: &mut Vec<GameEvent>) {
        state.emit(events, TurnFlowEvent::TargetDeckExhausted);
        let next = if ctx.config.crisis_enabled {
            GamePhase::Crisis
        } else {
            state.outcome = Some(evaluate_victory(state, &ctx.config));
            GamePhase::GameOver
        };
        events.extend(PhaseMachine::set_phase(ctx, state, next));
    }

    fn consume_roll(state: &mut GameState, player: PlayerId) {
        if let Some(roller) = state.get_player_mut(player) {
            roller.remaining_rolls = roller.remaining_rolls.saturating_sub(1);
        }
    }
}

impl PhaseController for MainGamePhase {
    fn phase(&self) -> GamePhase {
        GamePhase::MainGame
    }

    fn begin_phase(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        if !self.is_active(state, "begin_phase") {
            return Vec::new();
        }
        match state.setup.winner {
            Some(winner) => state.set_current_player(winner),
            None => state.turn.current_player_index = 0,
        }
        state.turn.turn_number = 0;
        for player in &mut state.players {
            player.remaining_rolls = ctx.config.rolls_per_turn;
        }
        self.start_player_turn(ctx, state)
    }

    fn end_phase(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = EventResolutionEngine::cancel(ctx, state, "main game ended");
        if let Some(card) = state.turn.event_card.take() {
            state.event_discard.push_bottom(card);
            state.emit(&mut events, EventCardEvent::Discarded { card });
        }
        events
    }

    fn start_player_turn(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "start_player_turn") {
            return events;
        }
        let rolls = ctx.config.rolls_per_turn;
        let Some(player) = state.current_player_mut().map(|player| {
            player.remaining_rolls = rolls;
            player.id
        }) else {
            return events;
        };
        state.turn.turn_number += 1;
        let turn = state.turn.turn_number;
        state.emit(&mut events, TurnFlowEvent::TurnStarted { player, turn });

        if state.turn.target_card.is_none() && state.target_deck.is_empty() {
            Self::exhaust_targets(ctx, state, &mut events);
            return events;
        }
        if ctx.config.auto_draw {
            events.extend(self.draw_target(ctx, state, player));
            events.extend(self.draw_event(ctx, state, player));
        }
        events
    }

    fn end_player_turn(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "end_player_turn") {
            return events;
        }
        events.extend(EventResolutionEngine::cancel(ctx, state, "turn ended"));
        if let Some(card) = state.turn.event_card.take() {
            state.event_discard.push_bottom(card);
            state.emit(&mut events, EventCardEvent::Discarded { card });
        }
        let rolls = ctx.config.rolls_per_turn;
        if let Some(player) = state.current_player_mut().map(|player| {
            player.remaining_rolls = rolls;
            player.id
        }) {
            state.emit(&mut events, TurnFlowEvent::TurnEnded { player });
        }
        events
    }

    fn move_to_next_player(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        if !self.is_active(state, "move_to_next_player") || state.players.is_empty() {
            return Vec::new();
        }
        state.turn.current_player_index = (state.turn.current_player_index + 1) % state.players.len();
        self.start_player_turn(ctx, state)
    }

    fn on_roll_requested(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        value: u8,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "roll") {
            return events;
        }
        if !state.is_current(player) {
            debug!(player, "roll out of turn ignored");
            return events;
        }

        if let Some(active) = &state.active_event {
            if active.stage.consumes_turn_roll() {
                Self::consume_roll(state, player);
            }
            state.emit(&mut events, TurnFlowEvent::PlayerRolled { player, value });
            events.extend(EventResolutionEngine::evaluate_roll(ctx, state, player, value));
            return events;
        }

        Self::consume_roll(state, player);
        state.emit(&mut events, TurnFlowEvent::PlayerRolled { player, value });
        let outcome = Self::resolve_table_roll(ctx, state, player, value, None, &mut events);
        Self::settle_roll(ctx, state, player, outcome, &mut events);
        events
    }
}
