//! Crisis round, final scoring and the terminal phase.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::card::{PlayerId, Team};
use super::config::MatchConfig;
use super::events::{GameEvent, TurnFlowEvent};
use super::phase::{PhaseController, PhaseMachine};
use super::rules::RuleContext;
use super::state::{GamePhase, GameState, TeamTotals, VictoryState, VictoryType};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrisisProgress {
    /// Players still owed a crisis roll, in rolling order.
    #[serde(default)]
    pub pending: Vec<PlayerId>,
    #[serde(default)]
    pub rolls: BTreeMap<PlayerId, u8>,
}

/// A team with at least the configured electoral votes, if any.
pub fn electoral_majority(state: &GameState, config: &MatchConfig) -> Option<VictoryState> {
    let red = state.team_totals(Team::Red);
    let blue = state.team_totals(Team::Blue);
    let threshold = config.electoral_votes_to_win;
    let winner = match (red.electoral >= threshold, blue.electoral >= threshold) {
        (true, false) => Team::Red,
        (false, true) => Team::Blue,
        (true, true) => match red.electoral.cmp(&blue.electoral) {
            Ordering::Greater => Team::Red,
            Ordering::Less => Team::Blue,
            Ordering::Equal => return None,
        },
        (false, false) => return None,
    };
    Some(VictoryState {
        winner: Some(winner),
        victory: VictoryType::ElectoralMajority,
        red,
        blue,
    })
}

/// Final scoring: electoral votes first, then institutions, then crisis
/// points. A tie on every count is a stalemate.
pub fn evaluate_victory(state: &GameState, config: &MatchConfig) -> VictoryState {
    if let Some(majority) = electoral_majority(state, config) {
        return majority;
    }
    let red = state.team_totals(Team::Red);
    let blue = state.team_totals(Team::Blue);

    let tiebreaks: [(VictoryType, fn(&TeamTotals) -> u32); 3] = [
        (VictoryType::ElectoralPlurality, |totals| totals.electoral),
        (VictoryType::InstitutionalControl, |totals| totals.institutions),
        (VictoryType::CrisisResolution, |totals| totals.crisis),
    ];
    for (victory, score) in tiebreaks {
        let winner = match score(&red).cmp(&score(&blue)) {
            Ordering::Greater => Team::Red,
            Ordering::Less => Team::Blue,
            Ordering::Equal => continue,
        };
        return VictoryState {
            winner: Some(winner),
            victory,
            red,
            blue,
        };
    }

    VictoryState {
        winner: None,
        victory: VictoryType::Stalemate,
        red,
        blue,
    }
}

/// Every player rolls once; the face indexes their actor's dice stats.
pub struct CrisisPhase;

impl PhaseController for CrisisPhase {
    fn phase(&self) -> GamePhase {
        GamePhase::Crisis
    }

    fn begin_phase(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        if !self.is_active(state, "begin_phase") || state.players.is_empty() {
            return Vec::new();
        }
        let start = state.turn.current_player_index % state.players.len();
        let order = state.players[start..]
            .iter()
            .chain(&state.players[..start])
            .map(|player| player.id)
            .collect();
        state.crisis = CrisisProgress {
            pending: order,
            rolls: BTreeMap::new(),
        };
        self.start_player_turn(ctx, state)
    }

    fn start_player_turn(&self, _ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "start_player_turn") {
            return events;
        }
        if let Some(player) = state.crisis.pending.first().copied() {
            state.set_current_player(player);
            state.turn.turn_number += 1;
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
        if !state.crisis.pending.is_empty() {
            return self.start_player_turn(ctx, state);
        }
        let outcome = evaluate_victory(state, &ctx.config);
        info!(winner = ?outcome.winner, victory = ?outcome.victory, "crisis resolved");
        state.outcome = Some(outcome);
        PhaseMachine::set_phase(ctx, state, GamePhase::GameOver)
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
        if state.crisis.pending.first() != Some(&player) {
            debug!(player, "crisis roll out of turn ignored");
            return events;
        }
        state.crisis.pending.remove(0);
        state.crisis.rolls.insert(player, value);

        let points = state
            .get_player(player)
            .and_then(|p| p.actor)
            .and_then(|actor| ctx.registry.actor(actor))
            .map_or(0, |actor| actor.stat_for_roll(value));
        if let Some(roller) = state.get_player_mut(player) {
            roller.crisis_score += u32::from(points);
        }
        state.emit(&mut events, TurnFlowEvent::PlayerRolled { player, value });
        state.emit(&mut events, TurnFlowEvent::CrisisRolled { player, value, points });

        events.extend(PhaseMachine::finish_turn(ctx, state));
        events
    }
}

pub struct GameOverPhase;

impl PhaseController for GameOverPhase {
    fn phase(&self) -> GamePhase {
        GamePhase::GameOver
    }

    fn begin_phase(&self, ctx: &mut RuleContext, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_active(state, "begin_phase") {
            return events;
        }
        let outcome = match &state.outcome {
            Some(outcome) => outcome.clone(),
            None => evaluate_victory(state, &ctx.config),
        };
        state.outcome = Some(outcome.clone());
        info!(winner = ?outcome.winner, victory = ?outcome.victory, "game over");
        state.emit(
            &mut events,
            TurnFlowEvent::GameOver {
                winner: outcome.winner,
                victory: outcome.victory,
            },
        );
        events
    }

    fn start_player_turn(&self, _ctx: &mut RuleContext, _state: &mut GameState) -> Vec<GameEvent> {
        Vec::new()
    }

    fn end_player_turn(&self, _ctx: &mut RuleContext, _state: &mut GameState) -> Vec<GameEvent> {
        Vec::new()
    }

    fn move_to_next_player(&self, _ctx: &mut RuleContext, _state: &mut GameState) -> Vec<GameEvent> {
        Vec::new()
    }

    fn on_roll_requested(
        &self,
        _ctx: &mut RuleContext,
        _state: &mut GameState,
        player: PlayerId,
        _value: u8,
    ) -> Vec<GameEvent> {
        debug!(player, "roll after game over ignored");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::main_game_context;

    #[test]
    fn every_player_rolls_once_then_the_match_ends() {
        let (mut ctx, mut state) = main_game_context(&[(0, Team::Red), (1, Team::Blue)]);
        state.set_current_player(1);
        PhaseMachine::set_phase(&mut ctx, &mut state, GamePhase::Crisis);
        assert_eq!(state.crisis.pending, vec![1, 0]);
        assert_eq!(state.current_player_id(), Some(1));

        // Out of order is ignored.
        assert!(CrisisPhase.on_roll_requested(&mut ctx, &mut state, 0, 6).is_empty());

        CrisisPhase.on_roll_requested(&mut ctx, &mut state, 1, 6);
        assert_eq!(state.current_player_id(), Some(0));
        let events = CrisisPhase.on_roll_requested(&mut ctx, &mut state, 0, 1);

        assert_eq!(state.phase, GamePhase::GameOver);
        let outcome = state.outcome.clone().expect("outcome should be recorded");
        assert_eq!(outcome.victory, VictoryType::CrisisResolution);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::TurnFlow(TurnFlowEvent::GameOver { .. }))));
    }

    #[test]
    fn crisis_points_come_from_the_actor_stats() {
        let (mut ctx, mut state) = main_game_context(&[(0, Team::Red), (1, Team::Blue)]);
        PhaseMachine::set_phase(&mut ctx, &mut state, GamePhase::Crisis);
        let actor = state
            .get_player(0)
            .and_then(|p| p.actor)
            .and_then(|id| ctx.registry.actor(id))
            .cloned()
            .expect("actor should be assigned");
        let events = CrisisPhase.on_roll_requested(&mut ctx, &mut state, 0, 3);
        let points = actor.dice_stats[2];
        assert!(events.contains(&GameEvent::from(TurnFlowEvent::CrisisRolled {
            player: 0,
            value: 3,
            points
        })));
        assert_eq!(state.get_player(0).map(|p| p.crisis_score), Some(u32::from(points)));
    }

    #[test]
    fn victory_falls_through_the_tiebreaks() {
        let mut state = GameState::new(&[0, 1], 1);
        let config = MatchConfig::default();
        for (id, team) in [(0, Team::Red), (1, Team::Blue)] {
            state.get_player_mut(id).expect("player should exist").team = Some(team);
        }
        assert_eq!(evaluate_victory(&state, &config).victory, VictoryType::Stalemate);
        assert_eq!(evaluate_victory(&state, &config).winner, None);

        state.get_player_mut(1).expect("player should exist").crisis_score = 4;
        let outcome = evaluate_victory(&state, &config);
        assert_eq!((outcome.winner, outcome.victory), (Some(Team::Blue), VictoryType::CrisisResolution));

        state.get_player_mut(0).expect("player should exist").institution_score = 1;
        let outcome = evaluate_victory(&state, &config);
        assert_eq!((outcome.winner, outcome.victory), (Some(Team::Red), VictoryType::InstitutionalControl));

        state.get_player_mut(1).expect("player should exist").electoral_score = 20;
        let outcome = evaluate_victory(&state, &config);
        assert_eq!((outcome.winner, outcome.victory), (Some(Team::Blue), VictoryType::ElectoralPlurality));

        state.get_player_mut(0).expect("player should exist").electoral_score = 270;
        let outcome = evaluate_victory(&state, &config);
        assert_eq!((outcome.winner, outcome.victory), (Some(Team::Red), VictoryType::ElectoralMajority));
    }
}
