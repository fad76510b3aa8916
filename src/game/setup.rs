//! Setup phase: a roll-off decides who goes first, then actors are handed
//! out one selector at a time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::card::{CardId, PlayerId};
use super::events::{GameEvent, TurnFlowEvent};
use super::phase::{PhaseController, PhaseMachine};
use super::rules::RuleContext;
use super::state::{GamePhase, GameState};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SetupState {
    #[default]
    None,
    Roll,
    AllPlayersRolled,
    UniqueWinner,
    TiedRoll,
    Reroll,
    BeginActorAssignment,
    ActorAssigned,
    LastActorAssigned,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupProgress {
    pub state: SetupState,
    /// Players taking part in the current roll round, in roster order.
    #[serde(default)]
    pub rollers: Vec<PlayerId>,
    #[serde(default)]
    pub rolls: BTreeMap<PlayerId, u8>,
    #[serde(default)]
    pub round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_actor: Option<CardId>,
}

impl SetupProgress {
    pub fn is_rolling(&self) -> bool {
        matches!(self.state, SetupState::Roll | SetupState::Reroll)
    }

    pub fn is_assigning(&self) -> bool {
        matches!(
            self.state,
            SetupState::BeginActorAssignment | SetupState::ActorAssigned
        )
    }

    pub fn next_roller(&self) -> Option<PlayerId> {
        self.rollers
            .iter()
            .find(|player| !self.rolls.contains_key(player))
            .copied()
    }
}

pub struct SetupPhase;

impl SetupPhase {
    fn set_state(state: &mut GameState, events: &mut Vec<GameEvent>, next: SetupState) {
        state.setup.state = next;
        state.emit(events, TurnFlowEvent::SetupStateChanged { state: next });
    }

    fn unassigned(state: &GameState) -> Vec<PlayerId> {
        state
            .players
            .iter()
            .filter(|player| !player.is_assigned())
            .map(|player| player.id)
            .collect()
    }

    fn begin_round(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        events: &mut Vec<GameEvent>,
        rollers: Vec<PlayerId>,
        kind: SetupState,
    ) {
        state.setup.rollers = rollers;
        state.setup.rolls.clear();
        state.setup.round += 1;
        Self::set_state(state, events, kind);
        events.extend(self.start_player_turn(ctx, state));
    }

    fn resolve_round(&self, ctx: &mut RuleContext, state: &mut GameState, events: &mut Vec<GameEvent>) {
        Self::set_state(state, events, SetupState::AllPlayersRolled);
        let Some(best) = state.setup.rolls.values().copied().max() else {
            warn!("setup round resolved without rolls");
            return;
        };
        let tied: Vec<PlayerId> = state
            .setup
            .rollers
            .iter()
            .filter(|player| state.setup.rolls.get(player) == Some(&best))
            .copied()
            .collect();

        if let [winner] = tied[..] {
            Self::set_state(state, events, SetupState::UniqueWinner);
            state.emit(events, TurnFlowEvent::SetupWinner { player: winner, value: best });
            self.begin_assignment(ctx, state, events, winner);
        } else {
            Self::set_state(state, events, SetupState::TiedRoll);
            state.emit(
                events,
                TurnFlowEvent::SetupTie {
                    players: tied.clone(),
                    value: best,
                },
            );
            self.begin_round(ctx, state, events, tied, SetupState::Reroll);
        }
    }

    fn begin_assignment(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        events: &mut Vec<GameEvent>,
        winner: PlayerId,
    ) {
        state.setup.winner = Some(winner);
        state.setup.selector = Some(winner);
        state.set_current_player(winner);
        Self::set_state(state, events, SetupState::BeginActorAssignment);
        self.after_assignment(ctx, state, events);
    }

    fn assign(
        ctx: &RuleContext,
        state: &mut GameState,
        events: &mut Vec<GameEvent>,
        selector: Option<PlayerId>,
        target: PlayerId,
        actor: CardId,
    ) -> bool {
        let Some(team) = ctx.registry.actor(actor).map(|card| card.team) else {
            warn!(actor, "assignment skipped: not an actor card");
            return false;
        };
        let Some(position) = state.actor_pool.iter().position(|id| *id == actor) else {
            warn!(actor, "assignment skipped: actor already taken");
            return false;
        };
        let Some(player) = state.get_player_mut(target) else {
            warn!(target, "assignment skipped: unknown player");
            return false;
        };
        player.actor = Some(actor);
        player.team = Some(team);
        state.actor_pool.remove(position);
        state.emit(
            events,
            TurnFlowEvent::ActorAssigned {
                selector,
                player: target,
                actor,
                team,
            },
        );
        true
    }

    /// Either hands the choice to the next selector or, with one player
    /// left, assigns the last actor without asking and starts the main game.
    fn after_assignment(&self, ctx: &mut RuleContext, state: &mut GameState, events: &mut Vec<GameEvent>) {
        let unassigned = Self::unassigned(state);
        match unassigned[..] {
            [] => {
                Self::set_state(state, events, SetupState::LastActorAssigned);
                events.extend(PhaseMachine::set_phase(ctx, state, GamePhase::MainGame));
            }
            [last] => {
                match state.actor_pool.first().copied() {
                    Some(actor) => {
                        Self::assign(ctx, state, events, None, last, actor);
                    }
                    None => warn!(player = last, "no actor left for the last player"),
                }
                Self::set_state(state, events, SetupState::LastActorAssigned);
                events.extend(PhaseMachine::set_phase(ctx, state, GamePhase::MainGame));
            }
            _ => events.extend(self.start_player_turn(ctx, state)),
        }
    }

    pub fn select_actor(
        &self,
        _ctx: &mut RuleContext,
        state: &mut GameState,
        selector: PlayerId,
        actor: CardId,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "select_actor") || !state.setup.is_assigning() {
            return events;
        }
        state.setup.pending_actor = Some(actor);
        state.emit(&mut events, TurnFlowEvent::ActorSelected { selector, actor });
        events
    }

    pub fn assign_actor(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        selector: PlayerId,
        target: PlayerId,
        actor: CardId,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "assign_actor") || !state.setup.is_assigning() {
            return events;
        }
        if !Self::assign(ctx, state, &mut events, Some(selector), target, actor) {
            return events;
        }
        state.setup.pending_actor = None;
        Self::set_state(state, &mut events, SetupState::ActorAssigned);
        events.extend(self.end_player_turn(ctx, state));
        // The player who just received an actor picks next.
        state.setup.selector = Some(target);
        state.set_current_player(target);
        self.after_assignment(ctx, state, &mut events);
        events
    }
}

impl PhaseController for SetupPhase {
    fn phase(&self) -> GamePhase {
        GamePhase::Setup
    }

    fn begin_phase(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "begin_phase") {
            return events;
        }
        state.setup = SetupProgress::default();
        let roster = state.players.iter().map(|player| player.id).collect();
        self.begin_round(ctx, state, &mut events, roster, SetupState::Roll);
        events
    }

    fn start_player_turn(&self, _ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "start_player_turn") {
            return events;
        }
        let next = if state.setup.is_rolling() {
            state.setup.next_roller()
        } else {
            state.setup.selector
        };
        if let Some(player) = next {
            state.set_current_player(player);
            let turn = state.turn.turn_number;
            state.emit(&mut events, TurnFlowEvent::TurnStarted { player, turn });
        }
        events
    }

    fn end_player_turn(&self, _ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "end_player_turn") {
            return events;
        }
        if let Some(player) = state.current_player_id() {
            state.emit(&mut events, TurnFlowEvent::TurnEnded { player });
        }
        events
    }

    fn move_to_next_player(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        if !self.is_active(state, "move_to_next_player") {
            return Vec::new();
        }
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
        if !state.setup.is_rolling() || state.setup.next_roller() != Some(player) {
            debug!(player, state = ?state.setup.state, "setup roll out of turn ignored");
            return events;
        }

        state.setup.rolls.insert(player, value);
        state.emit(&mut events, TurnFlowEvent::PlayerRolled { player, value });
        events.extend(self.end_player_turn(ctx, state));

        if state.setup.next_roller().is_some() {
            events.extend(self.move_to_next_player(ctx, state));
        } else {
            self.resolve_round(ctx, state, &mut events);
        }
        events
    }
}
