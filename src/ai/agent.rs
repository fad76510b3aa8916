use std::str::FromStr;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::game::events::{EventCardEvent, TurnFlowEvent};
use crate::game::{Command, EventStage, GameEvent, GamePhase, GameState, PlayerId, RuleEngine};

/// Whether `player` already drew an event since their turn started.
fn drew_event_this_turn(state: &GameState, player: PlayerId) -> bool {
    for event in state.event_log.iter().rev() {
        match event {
            GameEvent::EventCard(EventCardEvent::Drawn { player: drawer, .. }) if *drawer == player => return true,
            GameEvent::TurnFlow(TurnFlowEvent::TurnStarted { .. }) => return false,
            _ => {}
        }
    }
    false
}

/// Which player the match is waiting on, if any.
pub fn next_actor(state: &GameState) -> Option<PlayerId> {
    if state.is_finished() {
        return None;
    }
    match state.phase {
        GamePhase::Setup if state.setup.is_assigning() => state.setup.selector,
        GamePhase::Setup => state.setup.next_roller(),
        GamePhase::MainGame => state.current_player_id(),
        GamePhase::Crisis => state.crisis.pending.first().copied(),
        GamePhase::GameOver => None,
    }
}

/// Every command `player` could submit right now that passes validation.
/// Draws are only offered while their slot is empty.
pub fn legal_commands(engine: &RuleEngine, state: &GameState, player: PlayerId) -> Vec<Command> {
    let mut candidates = vec![Command::Roll { player }];

    if state.phase == GamePhase::MainGame {
        if state.turn.target_card.is_none() {
            candidates.push(Command::DrawTarget { player });
        }
        if state.turn.event_card.is_none() {
            candidates.push(Command::DrawEvent { player });
        }
        if let Some(card) = state.turn.event_card {
            candidates.push(Command::SaveEvent { player, card });
            candidates.push(Command::PlayEvent { player, card });
        }
        if let Some(card) = state.get_player(player).and_then(|p| p.held_event) {
            candidates.push(Command::PlayEvent { player, card });
        }
        if let Some(EventStage::AwaitingChallengeChoice { candidates: targets }) =
            state.active_event.as_ref().map(|active| &active.stage)
        {
            candidates.extend(
                targets
                    .iter()
                    .map(|card| Command::ChooseChallengeTarget { player, card: *card }),
            );
        }
    }

    if state.phase == GamePhase::Setup && state.setup.is_assigning() {
        for actor in &state.actor_pool {
            candidates.push(Command::SelectActor {
                selector: player,
                actor: *actor,
            });
            candidates.extend(
                state
                    .players
                    .iter()
                    .filter(|target| !target.is_assigned())
                    .map(|target| Command::AssignActor {
                        selector: player,
                        target: target.id,
                        actor: *actor,
                    }),
            );
        }
    }

    candidates
        .into_iter()
        .filter(|command| command.validate(engine, state).is_ok())
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStrategy {
    /// Plays events the moment they show up and challenges the biggest state.
    Aggressive,
    /// Banks saveable events for later turns.
    Cautious,
    Random,
}

impl FromStr for AiStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aggressive" | "aggro" => Ok(AiStrategy::Aggressive),
            "cautious" | "control" => Ok(AiStrategy::Cautious),
            "random" => Ok(AiStrategy::Random),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Normal,
    Hard,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" => Ok(AiDifficulty::Normal),
            "hard" | "expert" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub randomness: f64,
    /// Added to the score of saving an event.
    pub save_bias: f64,
    /// Pause before the host submits the decision.
    pub think_delay: Duration,
    pub strategy: AiStrategy,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                randomness: 1.5,
                save_bias: 0.0,
                think_delay: Duration::from_millis(300),
                strategy: AiStrategy::Random,
            },
            AiDifficulty::Normal => Self {
                randomness: 0.5,
                save_bias: 0.5,
                think_delay: Duration::from_millis(500),
                strategy: AiStrategy::Cautious,
            },
            AiDifficulty::Hard => Self {
                randomness: 0.1,
                save_bias: -0.5,
                think_delay: Duration::from_millis(700),
                strategy: AiStrategy::Aggressive,
            },
        }
    }

    pub fn with_strategy(mut self, strategy: AiStrategy) -> Self {
        self.strategy = strategy;
        if matches!(self.strategy, AiStrategy::Random) {
            self.randomness = self.randomness.max(1.0);
        }
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Normal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiDecision {
    pub command: Command,
    pub score: f64,
    pub think_delay_ms: u64,
    pub strategy: AiStrategy,
}

/// Anything that can pick a command for a waiting player. Delays are for the
/// host to honor.
pub trait Strategy {
    fn decide(&mut self, engine: &RuleEngine, state: &GameState, player: PlayerId) -> Option<AiDecision>;
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn random_noise(&mut self) -> f64 {
        if self.config.randomness <= 0.0 {
            0.0
        } else {
            self.rng.gen_range(0.0..self.config.randomness)
        }
    }

    /// Heuristic value of a command, `None` for commands that make no
    /// progress on their own.
    fn score(&self, engine: &RuleEngine, state: &GameState, command: &Command) -> Option<f64> {
        let registry = engine.registry();
        let aggressive = self.config.strategy == AiStrategy::Aggressive;
        let score = match *command {
            Command::SelectActor { .. } => return None,
            // One event draw per turn keeps a turn from cycling the deck.
            Command::DrawEvent { player } if drew_event_this_turn(state, player) => return None,
            Command::DrawEvent { .. } => 6.0,
            Command::DrawTarget { .. } => 5.0,
            Command::ChooseChallengeTarget { card, .. } => {
                let votes = registry.state(card).map_or(20.0, |state| f64::from(state.electoral_votes));
                if aggressive {
                    5.0 + votes / 5.0
                } else {
                    5.0 + votes / 20.0
                }
            }
            Command::SaveEvent { .. } => {
                let base = if self.config.strategy == AiStrategy::Cautious { 4.5 } else { 3.5 };
                base + self.config.save_bias
            }
            Command::PlayEvent { player, card } => {
                let held = state.get_player(player).and_then(|p| p.held_event) == Some(card);
                match (held, state.turn.event_card.is_some()) {
                    // A held event waits until the table event is dealt with.
                    (true, true) => 0.5,
                    (true, false) => 2.0,
                    (false, _) if aggressive => 4.5,
                    (false, _) => 4.0,
                }
            }
            Command::Roll { .. } => 1.0,
            Command::AssignActor { .. } => 1.0,
        };
        Some(score)
    }

    pub fn decide(&mut self, engine: &RuleEngine, state: &GameState, player: PlayerId) -> Option<AiDecision> {
        let mut legal = legal_commands(engine, state, player);
        if legal.is_empty() {
            return None;
        }
        legal.shuffle(&mut self.rng);

        let mut scored: Vec<(Command, f64)> = Vec::with_capacity(legal.len());
        for command in legal.iter() {
            if let Some(score) = self.score(engine, state, command) {
                let noise = self.random_noise();
                scored.push((command.clone(), score + noise));
            }
        }

        let (command, score) = scored
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .or_else(|| legal.into_iter().next().map(|command| (command, 0.0)))?;

        trace!(player, ?command, score, "ai decision");
        Some(AiDecision {
            command,
            score,
            think_delay_ms: self.config.think_delay.as_millis() as u64,
            strategy: self.config.strategy,
        })
    }
}

impl Strategy for AiAgent {
    fn decide(&mut self, engine: &RuleEngine, state: &GameState, player: PlayerId) -> Option<AiDecision> {
        AiAgent::decide(self, engine, state, player)
    }
}

impl std::fmt::Debug for AiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiAgent").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{sample_definitions, CardId, Match, MatchConfig};
    use proptest::prelude::*;
    // Shadows proptest's own `Strategy` from the prelude glob.
    use super::Strategy;

    const STEP_CAP: usize = 5_000;

    fn self_play(seed: u64, players: &[PlayerId], difficulty: AiDifficulty) -> Match {
        let config = MatchConfig::default().with_seed(seed);
        let mut game = Match::new(&sample_definitions(), config, players).expect("match should build");
        game.start();
        let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(difficulty), seed);
        for _ in 0..STEP_CAP {
            let Some(player) = next_actor(game.state()) else {
                break;
            };
            let decision = agent
                .decide(game.engine(), game.state(), player)
                .expect("the waiting player should have a legal command");
            game.run(&decision.command).expect("legal command should be accepted");
            game.state().integrity_check().expect("state should stay consistent");
        }
        game
    }

    #[test]
    fn difficulty_and_strategy_parse_from_strings() {
        assert_eq!("Medium".parse::<AiDifficulty>(), Ok(AiDifficulty::Normal));
        assert_eq!("aggro".parse::<AiStrategy>(), Ok(AiStrategy::Aggressive));
        assert!("impossible".parse::<AiDifficulty>().is_err());
        let config = AiConfig::from_difficulty(AiDifficulty::Hard).with_strategy(AiStrategy::Random);
        assert!(config.randomness >= 1.0);
    }

    #[test]
    fn legal_commands_at_start_are_a_single_roll() {
        let mut game = Match::new(&sample_definitions(), MatchConfig::default(), &[0, 1]).expect("match should build");
        game.start();
        assert_eq!(legal_commands(game.engine(), game.state(), 0), vec![Command::Roll { player: 0 }]);
        assert!(legal_commands(game.engine(), game.state(), 1).is_empty());
    }

    #[test]
    fn agent_never_picks_a_bare_actor_selection() {
        let mut game = Match::new(&sample_definitions(), MatchConfig::default().with_seed(2), &[0, 1, 2])
            .expect("match should build");
        game.start();
        let mut agent = AiAgent::with_seed(AiConfig::default(), 2);
        while game.state().phase == GamePhase::Setup {
            let player = next_actor(game.state()).expect("setup should wait on someone");
            let decision = agent.decide(game.engine(), game.state(), player).expect("decision");
            assert!(!matches!(decision.command, Command::SelectActor { .. }));
            game.run(&decision.command).expect("legal command should be accepted");
        }
        assert!(game.state().players.iter().all(|player| player.is_assigned()));
    }

    #[test]
    fn self_play_finishes_a_match() {
        for difficulty in [AiDifficulty::Easy, AiDifficulty::Normal, AiDifficulty::Hard] {
            let game = self_play(17, &[0, 1, 2, 3], difficulty);
            let state = game.state();
            assert_eq!(state.phase, GamePhase::GameOver);
            assert!(state.outcome.is_some());
        }
    }

    #[test]
    fn agents_plug_in_through_the_strategy_trait() {
        let mut game = Match::new(&sample_definitions(), MatchConfig::default(), &[0, 1]).expect("match should build");
        game.start();
        let mut strategy: Box<dyn Strategy> = Box::new(AiAgent::with_seed(AiConfig::default(), 1));
        let decision = strategy.decide(game.engine(), game.state(), 0).expect("player 0 should roll");
        assert_eq!(decision.command, Command::Roll { player: 0 });
        assert_eq!(decision.think_delay_ms, 500);
    }

    #[test]
    fn finished_match_has_no_next_actor() {
        let game = self_play(5, &[0, 1], AiDifficulty::Normal);
        assert_eq!(next_actor(game.state()), None);
        let mut agent = AiAgent::with_seed(AiConfig::default(), 5);
        assert!(agent.decide(game.engine(), game.state(), 0).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn self_play_keeps_cards_conserved(seed in any::<u64>(), players in 1u8..=6) {
            let roster: Vec<PlayerId> = (0..players).collect();
            let game = self_play(seed, &roster, AiDifficulty::Easy);
            let state = game.state();
            prop_assert!(state.is_finished());
            let owned: Vec<CardId> = state.ledger.owned_cards().collect();
            let scored: u32 = state.players.iter().map(|player| player.electoral_score).sum();
            let votes: u32 = owned
                .iter()
                .filter_map(|card| game.registry().state(*card))
                .map(|card| u32::from(card.electoral_votes))
                .sum();
            prop_assert_eq!(scored, votes);
        }
    }
}
