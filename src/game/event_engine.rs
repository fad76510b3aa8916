//! Event card resolution. One handler per event type; a card in flight is
//! tracked as an [`ActiveEvent`] whose stage says what input it waits for.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::card::{CardId, EventCard, EventCondition, EventType, PlayerId};
use super::events::{DiscardReason, EventCardEvent, GameEvent, SelectableCardEvent, TurnFlowEvent};
use super::phase::PhaseMachine;
use super::rules::RuleContext;
use super::state::GameState;
use super::turn::MainGamePhase;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "stage")]
pub enum EventStage {
    Entered,
    /// The next turn roll captures the table target only on `required`.
    AwaitingTableRoll { required: u8 },
    AwaitingChallengeChoice { candidates: Vec<CardId> },
    AwaitingDuelRoll { card: CardId, defender: PlayerId },
    AwaitingAlternateRoll {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first: Option<CardId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        second: Option<CardId>,
    },
}

impl EventStage {
    pub fn awaits_roll(&self) -> bool {
        matches!(
            self,
            EventStage::AwaitingTableRoll { .. }
                | EventStage::AwaitingDuelRoll { .. }
                | EventStage::AwaitingAlternateRoll { .. }
        )
    }

    /// Only the table roll spends one of the turn's rolls.
    pub fn consumes_turn_roll(&self) -> bool {
        matches!(self, EventStage::AwaitingTableRoll { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveEvent {
    pub player: PlayerId,
    pub card: CardId,
    pub effective_type: EventType,
    pub stage: EventStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Discard,
    ReturnToDeck,
}

pub trait EventHandler {
    fn event_type(&self) -> EventType;

    /// Entry point once the card has been taken from its slot.
    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: &EventCard) -> Vec<GameEvent>;

    fn evaluate_roll(&self, _ctx: &mut RuleContext, _state: &mut GameState, player: PlayerId, roll: u8) -> Vec<GameEvent> {
        warn!(player, roll, handler = ?self.event_type(), "handler does not take rolls");
        Vec::new()
    }

    fn choose_target(&self, _ctx: &mut RuleContext, _state: &mut GameState, player: PlayerId, card: CardId) -> Vec<GameEvent> {
        warn!(player, card, handler = ?self.event_type(), "handler does not take a target choice");
        Vec::new()
    }
}

pub fn handler_for(event_type: EventType) -> &'static dyn EventHandler {
    match event_type {
        EventType::ExtraRoll => &ExtraRollHandler,
        EventType::NeedTwo => &NeedTwoHandler,
        EventType::LoseTurn => &LoseTurnHandler,
        EventType::ChallengeAnyState => &ChallengeAnyStateHandler,
        EventType::ChallengeInstitution => &ChallengeInstitutionHandler,
        EventType::AlternateStates => &AlternateStatesHandler,
        EventType::NoImpact | EventType::TeamConditional => &NoImpactHandler,
    }
}

pub struct EventResolutionEngine;

impl EventResolutionEngine {
    /// Takes `card` from the table or the player's held slot and dispatches
    /// it to the handler for its effective type.
    pub fn apply_event(ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: CardId) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if let Some(active) = &state.active_event {
            warn!(player, card, active = active.card, "another event is still resolving");
            return events;
        }
        let Some(event) = ctx.registry.event(card).cloned() else {
            warn!(card, "not an event card");
            return events;
        };

        if state.turn.event_card == Some(card) {
            state.turn.event_card = None;
        } else if let Some(holder) = state
            .get_player_mut(player)
            .filter(|holder| holder.held_event == Some(card))
        {
            holder.held_event = None;
        } else {
            warn!(player, card, "event card is not available to this player");
            return events;
        }

        let effective_type = event.effective_type(state.team_of(player));
        state.turn.event_active = true;
        state.active_event = Some(ActiveEvent {
            player,
            card,
            effective_type,
            stage: EventStage::Entered,
        });
        info!(player, card, ?effective_type, "event applied");
        state.emit(
            &mut events,
            EventCardEvent::Applied {
                player,
                card,
                effective_type,
            },
        );
        events.extend(handler_for(effective_type).handle(ctx, state, player, &event));
        events
    }

    pub fn evaluate_roll(ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, roll: u8) -> Vec<GameEvent> {
        let waiting = state
            .active_event
            .as_ref()
            .filter(|active| active.player == player && active.stage.awaits_roll())
            .map(|active| active.effective_type);
        match waiting {
            Some(effective_type) => handler_for(effective_type).evaluate_roll(ctx, state, player, roll),
            None => {
                debug!(player, roll, "no event waiting on this roll");
                Vec::new()
            }
        }
    }

    pub fn choose_target(ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: CardId) -> Vec<GameEvent> {
        let waiting = state
            .active_event
            .as_ref()
            .filter(|active| active.player == player)
            .map(|active| active.effective_type);
        match waiting {
            Some(effective_type) => handler_for(effective_type).choose_target(ctx, state, player, card),
            None => {
                debug!(player, card, "no event waiting on a target");
                Vec::new()
            }
        }
    }

    /// Cancels the event in flight, if any.
    pub fn cancel(ctx: &mut RuleContext, state: &mut GameState, reason: &'static str) -> Vec<GameEvent> {
        let mut events = Vec::new();
        cancel_active(ctx, state, &mut events, reason);
        events
    }
}

fn set_stage(state: &mut GameState, stage: EventStage) {
    if let Some(active) = state.active_event.as_mut() {
        active.stage = stage;
    }
}

fn stage(state: &GameState) -> Option<&EventStage> {
    state.active_event.as_ref().map(|active| &active.stage)
}

fn dispose(ctx: &mut RuleContext, state: &mut GameState, card: CardId, disposition: Disposition) {
    match disposition {
        Disposition::Discard => state.event_discard.push_bottom(card),
        Disposition::ReturnToDeck => {
            let position = state.event_deck.insert_random(card, &mut ctx.rng);
            debug!(card, position, "event returned to deck");
        }
    }
}

fn complete(ctx: &mut RuleContext, state: &mut GameState, events: &mut Vec<GameEvent>, disposition: Disposition) {
    let Some(active) = state.active_event.take() else {
        return;
    };
    state.turn.event_active = false;
    dispose(ctx, state, active.card, disposition);
    state.emit(
        events,
        EventCardEvent::Completed {
            player: active.player,
            card: active.card,
        },
    );
}

/// Returnable cards go back into the deck; the rest are discarded. A cancel
/// is always followed by a completion notice.
fn cancel_active(ctx: &mut RuleContext, state: &mut GameState, events: &mut Vec<GameEvent>, reason: &'static str) {
    let Some(active) = state.active_event.take() else {
        return;
    };
    state.turn.event_active = false;
    let returned = ctx
        .registry
        .event(active.card)
        .is_some_and(|event| event.returnable);
    let disposition = if returned {
        Disposition::ReturnToDeck
    } else {
        Disposition::Discard
    };
    dispose(ctx, state, active.card, disposition);
    info!(player = active.player, card = active.card, returned, reason, "event canceled");
    state.emit(
        events,
        EventCardEvent::Canceled {
            player: active.player,
            card: active.card,
            returned,
        },
    );
    state.emit(
        events,
        EventCardEvent::Completed {
            player: active.player,
            card: active.card,
        },
    );
}

fn condition_holds(ctx: &RuleContext, state: &GameState, player: PlayerId, event: &EventCard) -> bool {
    let institution = || {
        event
            .required_institution
            .as_deref()
            .and_then(|name| ctx.registry.id_of(name))
    };
    match event.conditions {
        EventCondition::None | EventCondition::TeamConditions | EventCondition::Any => true,
        EventCondition::IfOwnsInstitution => {
            institution().is_some_and(|id| state.ledger.owner_of(id) == Some(player))
        }
        EventCondition::IfInstitutionCaptured => institution().is_some_and(|id| state.ledger.is_owned(id)),
    }
}

/// Opens a duel over `card` against its current owner.
fn start_duel(ctx: &mut RuleContext, state: &mut GameState, events: &mut Vec<GameEvent>, attacker: PlayerId, card: CardId) {
    match state.ledger.owner_of(card) {
        Some(defender) if defender != attacker => {
            set_stage(state, EventStage::AwaitingDuelRoll { card, defender });
            state.emit(
                events,
                SelectableCardEvent::DuelStarted {
                    attacker,
                    defender,
                    card,
                },
            );
        }
        _ => cancel_active(ctx, state, events, "duel has no defender"),
    }
}

/// The attacker wins the card on a face from its success set for their team;
/// a lost duel puts the event card back into the deck.
fn resolve_duel(ctx: &mut RuleContext, state: &mut GameState, attacker: PlayerId, roll: u8) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let Some(&EventStage::AwaitingDuelRoll { card, defender }) = stage(state) else {
        debug!(attacker, roll, "no duel in progress");
        return events;
    };
    if state.ledger.owner_of(card) != Some(defender) {
        warn!(card, defender, "duel target changed hands");
        cancel_active(ctx, state, &mut events, "duel target changed hands");
        return events;
    }

    let won = match (ctx.registry.get(card).and_then(|c| c.success_rolls()), state.team_of(attacker)) {
        (Some(rolls), Some(team)) => rolls.succeeds(team, roll),
        _ => false,
    };
    if won {
        info!(attacker, defender, card, roll, "duel won");
        state.transfer_card(&ctx.registry, attacker, card, &mut events);
        complete(ctx, state, &mut events, Disposition::Discard);
        MainGamePhase::check_electoral_victory(ctx, state, &mut events);
    } else {
        info!(attacker, defender, card, roll, "duel lost");
        complete(ctx, state, &mut events, Disposition::ReturnToDeck);
    }
    events
}

pub struct ExtraRollHandler;

impl EventHandler for ExtraRollHandler {
    fn event_type(&self) -> EventType {
        EventType::ExtraRoll
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: &EventCard) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !condition_holds(ctx, state, player, card) {
            cancel_active(ctx, state, &mut events, "extra roll condition not met");
            return events;
        }
        if let Some(roller) = state.get_player_mut(player) {
            roller.remaining_rolls = roller.remaining_rolls.saturating_add(1);
            let remaining = roller.remaining_rolls;
            state.emit(&mut events, TurnFlowEvent::ExtraRollGranted { player, remaining });
        }
        complete(ctx, state, &mut events, Disposition::Discard);
        events
    }
}

pub struct NeedTwoHandler;

impl EventHandler for NeedTwoHandler {
    fn event_type(&self) -> EventType {
        EventType::NeedTwo
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, _player: PlayerId, _card: &EventCard) -> Vec<GameEvent> {
        set_stage(
            state,
            EventStage::AwaitingTableRoll {
                required: ctx.config.need_two_roll,
            },
        );
        Vec::new()
    }

    fn evaluate_roll(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, roll: u8) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(&EventStage::AwaitingTableRoll { required }) = stage(state) else {
            return events;
        };
        let outcome = MainGamePhase::resolve_table_roll(ctx, state, player, roll, Some(required), &mut events);
        complete(ctx, state, &mut events, Disposition::Discard);
        MainGamePhase::settle_roll(ctx, state, player, outcome, &mut events);
        events
    }
}

pub struct LoseTurnHandler;

impl EventHandler for LoseTurnHandler {
    fn event_type(&self) -> EventType {
        EventType::LoseTurn
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, _card: &EventCard) -> Vec<GameEvent> {
        let mut events = Vec::new();
        complete(ctx, state, &mut events, Disposition::Discard);
        debug!(player, "turn lost to event");
        events.extend(PhaseMachine::finish_turn(ctx, state));
        events
    }
}

pub struct ChallengeAnyStateHandler;

impl EventHandler for ChallengeAnyStateHandler {
    fn event_type(&self) -> EventType {
        EventType::ChallengeAnyState
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, _card: &EventCard) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let candidates: Vec<CardId> = state
            .ledger
            .owned_states()
            .into_iter()
            .filter(|(_, owner)| *owner != player)
            .map(|(card, _)| card)
            .collect();
        if candidates.is_empty() {
            cancel_active(ctx, state, &mut events, "no state to challenge");
            return events;
        }
        set_stage(
            state,
            EventStage::AwaitingChallengeChoice {
                candidates: candidates.clone(),
            },
        );
        state.emit(&mut events, SelectableCardEvent::ChallengeStatesDetermined { player, candidates });
        events
    }

    fn choose_target(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: CardId) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let offered = matches!(
            stage(state),
            Some(EventStage::AwaitingChallengeChoice { candidates }) if candidates.contains(&card)
        );
        if offered {
            start_duel(ctx, state, &mut events, player, card);
        } else {
            debug!(player, card, "not a challenge candidate");
        }
        events
    }

    fn evaluate_roll(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, roll: u8) -> Vec<GameEvent> {
        resolve_duel(ctx, state, player, roll)
    }
}

pub struct ChallengeInstitutionHandler;

impl EventHandler for ChallengeInstitutionHandler {
    fn event_type(&self) -> EventType {
        EventType::ChallengeInstitution
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: &EventCard) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(institution) = card
            .required_institution
            .as_deref()
            .and_then(|name| ctx.registry.id_of(name))
        else {
            cancel_active(ctx, state, &mut events, "institution not in registry");
            return events;
        };
        start_duel(ctx, state, &mut events, player, institution);
        events
    }

    fn evaluate_roll(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, roll: u8) -> Vec<GameEvent> {
        resolve_duel(ctx, state, player, roll)
    }
}

pub struct AlternateStatesHandler;

impl EventHandler for AlternateStatesHandler {
    fn event_type(&self) -> EventType {
        EventType::AlternateStates
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, card: &EventCard) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let in_deck = |name: &str| {
            ctx.registry
                .id_of(name)
                .filter(|id| state.target_deck.contains(*id))
        };
        let (first, second) = match &card.alternate_states {
            Some((first, second)) => (in_deck(first), in_deck(second)),
            None => (None, None),
        };
        if first.is_none() && second.is_none() {
            cancel_active(ctx, state, &mut events, "neither state is still in the deck");
            return events;
        }
        set_stage(state, EventStage::AwaitingAlternateRoll { first, second });
        state.emit(
            &mut events,
            SelectableCardEvent::AlternateStatesShown { player, first, second },
        );
        events
    }

    fn evaluate_roll(&self, ctx: &mut RuleContext, state: &mut GameState, player: PlayerId, roll: u8) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(&EventStage::AwaitingAlternateRoll { first, second }) = stage(state) else {
            return events;
        };
        let doomed = match roll {
            1 => first,
            2 => second,
            _ => None,
        };
        if let Some(card) = doomed {
            if state.target_deck.remove(card).is_some() {
                state.state_discard.push_bottom(card);
                info!(player, card, "alternate state discarded");
                state.emit(
                    &mut events,
                    TurnFlowEvent::StateDiscarded {
                        card,
                        reason: DiscardReason::AlternateStates,
                    },
                );
            }
        }
        complete(ctx, state, &mut events, Disposition::Discard);
        events
    }
}

pub struct NoImpactHandler;

impl EventHandler for NoImpactHandler {
    fn event_type(&self) -> EventType {
        EventType::NoImpact
    }

    fn handle(&self, ctx: &mut RuleContext, state: &mut GameState, _player: PlayerId, _card: &EventCard) -> Vec<GameEvent> {
        let mut events = Vec::new();
        complete(ctx, state, &mut events, Disposition::Discard);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::Team;
    use crate::game::catalog::{event_id, main_game_context, state_id};
    use crate::game::events::EventCardEvent;
    use crate::game::phase::PhaseController;

    fn table_event(ctx: &RuleContext, state: &mut GameState, name: &str) -> CardId {
        let card = event_id(ctx, name);
        state.event_deck.remove(card);
        state.turn.event_card = Some(card);
        card
    }

    fn give(ctx: &RuleContext, state: &mut GameState, player: PlayerId, name: &str) -> CardId {
        let card = ctx.registry.id_of(name).expect("card should exist");
        assert!(state.capture_card(&ctx.registry, player, card, &mut Vec::new()));
        card
    }

    fn red_blue() -> (RuleContext, GameState) {
        main_game_context(&[(0, Team::Red), (1, Team::Blue)])
    }

    #[test]
    fn extra_roll_without_condition_adds_a_roll() {
        let (mut ctx, mut state) = red_blue();
        let card = table_event(&ctx, &mut state, "Grassroots Surge");
        let events = EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert_eq!(state.get_player(0).map(|p| p.remaining_rolls), Some(2));
        assert!(events.contains(&GameEvent::from(EventCardEvent::Completed { player: 0, card })));
        assert!(state.event_discard.contains(card));
        assert!(!state.turn.event_active);
    }

    #[test]
    fn unmet_condition_cancels_and_returns_a_returnable_card() {
        let (mut ctx, mut state) = red_blue();
        let card = table_event(&ctx, &mut state, "Court Ruling");
        let events = EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(events.contains(&GameEvent::from(EventCardEvent::Canceled {
            player: 0,
            card,
            returned: true
        })));
        assert!(state.event_deck.contains(card));
        assert_eq!(state.get_player(0).map(|p| p.remaining_rolls), Some(1));
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn owned_institution_satisfies_the_condition() {
        let (mut ctx, mut state) = red_blue();
        give(&ctx, &mut state, 0, "Supreme Court");
        let card = table_event(&ctx, &mut state, "Court Ruling");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert_eq!(state.get_player(0).map(|p| p.remaining_rolls), Some(2));
        assert!(state.event_discard.contains(card));
    }

    #[test]
    fn need_two_captures_only_on_the_required_face() {
        let (mut ctx, mut state) = red_blue();
        let ohio = state_id(&ctx, "Ohio");
        state.target_deck.remove(ohio);
        state.turn.target_card = Some(ohio);
        let card = table_event(&ctx, &mut state, "Recount");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(matches!(
            state.active_event.as_ref().map(|a| &a.stage),
            Some(EventStage::AwaitingTableRoll { required: 2 })
        ));

        // 2 is not a Red success face on Ohio but the event overrides it.
        MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 2);
        assert_eq!(state.ledger.owner_of(ohio), Some(0));
        assert!(state.active_event.is_none());
        assert!(state.event_discard.contains(card));
        assert_eq!(state.current_player_id(), Some(1));
    }

    #[test]
    fn lose_turn_hands_play_to_the_next_player() {
        let (mut ctx, mut state) = red_blue();
        let card = table_event(&ctx, &mut state, "Scandal");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert_eq!(state.current_player_id(), Some(1));
        assert!(state.event_discard.contains(card));
    }

    #[test]
    fn challenge_any_state_without_candidates_cancels() {
        let (mut ctx, mut state) = red_blue();
        give(&ctx, &mut state, 0, "Ohio");
        let card = table_event(&ctx, &mut state, "Attack Ad");
        let events = EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(events.iter().any(|e| matches!(e, GameEvent::EventCard(EventCardEvent::Canceled { .. }))));
        assert!(state.active_event.is_none());
    }

    #[test]
    fn won_duel_transfers_the_state() {
        let (mut ctx, mut state) = red_blue();
        let ohio = give(&ctx, &mut state, 1, "Ohio");
        let card = table_event(&ctx, &mut state, "Attack Ad");
        let events = EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(events.contains(&GameEvent::from(SelectableCardEvent::ChallengeStatesDetermined {
            player: 0,
            candidates: vec![ohio]
        })));

        let events = EventResolutionEngine::choose_target(&mut ctx, &mut state, 0, ohio);
        assert!(events.contains(&GameEvent::from(SelectableCardEvent::DuelStarted {
            attacker: 0,
            defender: 1,
            card: ohio
        })));

        // Duel rolls do not spend the turn roll.
        MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 6);
        assert_eq!(state.ledger.owner_of(ohio), Some(0));
        assert_eq!(state.get_player(1).map(|p| p.electoral_score), Some(0));
        assert_eq!(state.get_player(0).map(|p| p.remaining_rolls), Some(1));
        assert!(state.event_discard.contains(card));
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn lost_duel_returns_the_event_to_the_deck() {
        let (mut ctx, mut state) = red_blue();
        let ohio = give(&ctx, &mut state, 1, "Ohio");
        let card = table_event(&ctx, &mut state, "Attack Ad");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        EventResolutionEngine::choose_target(&mut ctx, &mut state, 0, ohio);
        MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 1);
        assert_eq!(state.ledger.owner_of(ohio), Some(1));
        assert!(state.event_deck.contains(card));
        assert!(state.active_event.is_none());
    }

    #[test]
    fn challenge_institution_needs_a_rival_owner() {
        let (mut ctx, mut state) = red_blue();
        let card = table_event(&ctx, &mut state, "Hearings");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(state.active_event.is_none());

        let (mut ctx, mut state) = red_blue();
        let court = give(&ctx, &mut state, 1, "Supreme Court");
        let card = table_event(&ctx, &mut state, "Hearings");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(matches!(
            state.active_event.as_ref().map(|a| &a.stage),
            Some(EventStage::AwaitingDuelRoll { card: c, defender: 1 }) if *c == court
        ));
    }

    #[test]
    fn need_two_ignores_the_normal_success_faces() {
        let (mut ctx, mut state) = red_blue();
        let ohio = state_id(&ctx, "Ohio");
        state.target_deck.remove(ohio);
        state.turn.target_card = Some(ohio);
        let card = table_event(&ctx, &mut state, "Recount");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);

        // 5 captures Ohio for Red on an ordinary roll.
        MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 5);
        assert_eq!(state.ledger.owner_of(ohio), None);
        assert_eq!(state.get_player(0).map(|p| p.electoral_score), Some(0));
    }

    #[test]
    fn alternate_states_roll_of_six_discards_neither() {
        let (mut ctx, mut state) = red_blue();
        let first = state_id(&ctx, "Nevada");
        let second = state_id(&ctx, "Arizona");
        let card = table_event(&ctx, &mut state, "Border Dispute");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        let deck_before = state.target_deck.to_vec();

        MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 6);
        assert_eq!(state.target_deck.to_vec(), deck_before);
        assert!(state.target_deck.contains(first));
        assert!(state.target_deck.contains(second));
        assert!(state.state_discard.is_empty());
        assert!(state.active_event.is_none());
    }

    #[test]
    fn alternate_states_discards_the_rolled_state() {
        let (mut ctx, mut state) = red_blue();
        let first = state_id(&ctx, "Nevada");
        let second = state_id(&ctx, "Arizona");
        let card = table_event(&ctx, &mut state, "Border Dispute");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        let events = MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 2);
        assert!(events.contains(&GameEvent::from(TurnFlowEvent::StateDiscarded {
            card: second,
            reason: DiscardReason::AlternateStates
        })));
        assert!(state.target_deck.contains(first));
        assert!(state.state_discard.contains(second));
        assert!(state.active_event.is_none());
    }

    #[test]
    fn alternate_states_with_both_gone_cancels() {
        let (mut ctx, mut state) = red_blue();
        for name in ["Nevada", "Arizona"] {
            let id = state_id(&ctx, name);
            state.target_deck.remove(id);
            state.state_discard.push_bottom(id);
        }
        let card = table_event(&ctx, &mut state, "Border Dispute");
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert!(state.active_event.is_none());
        assert!(state.event_discard.contains(card));
    }

    #[test]
    fn team_conditional_resolves_per_team() {
        let (mut ctx, mut state) = red_blue();
        let card = table_event(&ctx, &mut state, "Party Split");
        let events = EventResolutionEngine::apply_event(&mut ctx, &mut state, 1, card);
        assert!(events.contains(&GameEvent::from(EventCardEvent::Applied {
            player: 1,
            card,
            effective_type: EventType::ExtraRoll
        })));
    }

    #[test]
    fn held_event_can_be_played_later() {
        let (mut ctx, mut state) = red_blue();
        let card = event_id(&ctx, "Grassroots Surge");
        state.event_deck.remove(card);
        state.get_player_mut(0).expect("player should exist").held_event = Some(card);
        EventResolutionEngine::apply_event(&mut ctx, &mut state, 0, card);
        assert_eq!(state.get_player(0).and_then(|p| p.held_event), None);
        assert_eq!(state.get_player(0).map(|p| p.remaining_rolls), Some(2));
    }
}
