//! Top-level phase machine. Phases only move forward
//! (Setup → MainGame → Crisis → GameOver); each phase has one controller that
//! owns its turn order and sub-states.

use tracing::{debug, info, warn};

use super::card::PlayerId;
use super::crisis::{CrisisPhase, GameOverPhase};
use super::events::{GameEvent, TurnFlowEvent};
use super::rules::RuleContext;
use super::setup::SetupPhase;
use super::state::{GamePhase, GameState};
use super::turn::MainGamePhase;

/// Per-phase turn logic. Controllers are stateless; everything they track
/// lives in [`GameState`] so snapshots capture it.
pub trait PhaseController {
    fn phase(&self) -> GamePhase;

    fn begin_phase(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent>;

    fn end_phase(&self, _ctx: &mut RuleContext, _state: &mut GameState) -> Vec<GameEvent> {
        Vec::new()
    }

    fn start_player_turn(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent>;

    fn end_player_turn(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent>;

    fn move_to_next_player(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent>;

    /// The shared "player requested a roll" signal, with the rolled face.
    fn on_roll_requested(
        &self,
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        value: u8,
    ) -> Vec<GameEvent>;

    /// False (and logged) when a callback arrives for a phase that is no
    /// longer active. Stale AI/UI callbacks are expected after transitions.
    fn is_active(&self, state: &GameState, operation: &'static str) -> bool {
        let active = state.phase == self.phase();
        if !active {
            debug!(
                operation,
                controller = ?self.phase(),
                current = ?state.phase,
                "ignoring request for inactive phase"
            );
        }
        active
    }
}

pub fn controller_for(phase: GamePhase) -> &'static dyn PhaseController {
    match phase {
        GamePhase::Setup => &SetupPhase,
        GamePhase::MainGame => &MainGamePhase,
        GamePhase::Crisis => &CrisisPhase,
        GamePhase::GameOver => &GameOverPhase,
    }
}

pub struct PhaseMachine;

impl PhaseMachine {
    /// Enters the first phase of a fresh match.
    pub fn start(ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        if state.setup.state != Default::default() || state.phase != GamePhase::Setup {
            warn!(phase = ?state.phase, "match already started");
            return Vec::new();
        }
        controller_for(GamePhase::Setup).begin_phase(ctx, state)
    }

    /// Moves to `next` if it differs from the current phase and lies ahead
    /// of it. The outgoing controller ends, the change is published, then the
    /// incoming controller begins.
    pub fn set_phase(ctx: &mut RuleContext, state: &mut GameState, next: GamePhase) -> Vec<GameEvent> {
        let from = state.phase;
        if next == from {
            return Vec::new();
        }
        if next < from {
            warn!(?from, to = ?next, "phases never move backwards");
            return Vec::new();
        }

        let mut events = controller_for(from).end_phase(ctx, state);
        state.phase = next;
        info!(?from, to = ?next, "phase changed");
        state.emit(&mut events, TurnFlowEvent::PhaseChanged { from, to: next });
        events.extend(controller_for(next).begin_phase(ctx, state));
        events
    }

    pub fn request_roll(
        ctx: &mut RuleContext,
        state: &mut GameState,
        player: PlayerId,
        value: u8,
    ) -> Vec<GameEvent> {
        controller_for(state.phase).on_roll_requested(ctx, state, player, value)
    }

    /// Ends the active player's turn and hands over to the next one.
    pub fn finish_turn(ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let phase = state.phase;
        let controller = controller_for(phase);
        let mut events = controller.end_player_turn(ctx, state);
        if state.phase == phase {
            events.extend(controller.move_to_next_player(ctx, state));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::test_context;

    #[test]
    fn set_phase_ignores_same_and_backward_moves() {
        let (mut ctx, mut state) = test_context(&[0, 1]);
        state.phase = GamePhase::Crisis;
        assert!(PhaseMachine::set_phase(&mut ctx, &mut state, GamePhase::Crisis).is_empty());
        assert!(PhaseMachine::set_phase(&mut ctx, &mut state, GamePhase::MainGame).is_empty());
        assert_eq!(state.phase, GamePhase::Crisis);
    }

    #[test]
    fn set_phase_publishes_change_before_new_phase_events() {
        let (mut ctx, mut state) = test_context(&[0, 1]);
        state.phase = GamePhase::Crisis;
        let events = PhaseMachine::set_phase(&mut ctx, &mut state, GamePhase::GameOver);
        assert_eq!(state.phase, GamePhase::GameOver);
        assert_eq!(
            events.first(),
            Some(&GameEvent::from(TurnFlowEvent::PhaseChanged {
                from: GamePhase::Crisis,
                to: GamePhase::GameOver
            }))
        );
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::TurnFlow(TurnFlowEvent::GameOver { .. }))));
    }

    #[test]
    fn stale_roll_for_wrong_phase_is_ignored() {
        let (mut ctx, mut state) = test_context(&[0, 1]);
        state.phase = GamePhase::GameOver;
        let before = state.clone();
        let events = MainGamePhase.on_roll_requested(&mut ctx, &mut state, 0, 3);
        assert!(events.is_empty());
        assert_eq!(state, before);
    }
}
