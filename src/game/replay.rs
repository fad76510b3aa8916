//! Replay logs: seed, roster and the ordered accepted commands are enough to
//! rebuild a match whose dice come from the seed.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::card::{CardDefinitions, PlayerId};
use super::command::Command;
use super::config::MatchConfig;
use super::session::{Match, MatchError};
use super::snapshot::WireError;

pub const REPLAY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayLog {
    pub version: u32,
    pub config: MatchConfig,
    pub players: Vec<PlayerId>,
    pub fingerprint: u64,
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl ReplayLog {
    pub fn for_match(game: &Match) -> Self {
        Self {
            version: REPLAY_VERSION,
            config: game.config().clone(),
            players: game.players().to_vec(),
            fingerprint: game.registry().fingerprint(),
            commands: Vec::new(),
        }
    }

    pub fn record(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|source| WireError::Json { what: "replay", source })
    }

    pub fn from_json(json: &str) -> Result<Self, WireError> {
        let log: Self = serde_json::from_str(json).map_err(|source| WireError::Json { what: "replay", source })?;
        if log.version != REPLAY_VERSION {
            return Err(WireError::Version {
                what: "replay",
                found: log.version,
                expected: REPLAY_VERSION,
            });
        }
        Ok(log)
    }
}

impl Match {
    /// Rebuilds a match from `definitions` and a replay log. Only matches
    /// created with [`Match::new`] (seeded dice) replay faithfully.
    pub fn replay(definitions: &CardDefinitions, log: &ReplayLog) -> Result<Match, MatchError> {
        let mut game = Match::new(definitions, log.config.clone(), &log.players)?;
        let actual = game.registry().fingerprint();
        if actual != log.fingerprint {
            return Err(MatchError::DefinitionsMismatch {
                expected: log.fingerprint,
                actual,
            });
        }
        game.start();
        for (index, command) in log.commands.iter().enumerate() {
            game.run(command)
                .map_err(|error| MatchError::Rejected { index, error })?;
        }
        info!(commands = log.len(), "replay finished");
        Ok(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::agent::{legal_commands, next_actor, AiAgent, AiConfig, AiDifficulty};
    use crate::game::catalog::sample_definitions;
    use crate::game::command::CommandProcessor;
    use crate::game::rules::RuleError;

    fn play(seed: u64, steps: usize) -> (Match, CommandProcessor) {
        let mut game = Match::new(&sample_definitions(), MatchConfig::default().with_seed(seed), &[0, 1, 2])
            .expect("match should build");
        game.start();
        let mut processor = CommandProcessor::local(&game);
        let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(AiDifficulty::Normal), seed);
        for _ in 0..steps {
            let Some(player) = next_actor(game.state()) else {
                break;
            };
            let Some(decision) = agent.decide(game.engine(), game.state(), player) else {
                break;
            };
            processor
                .submit(&mut game, decision.command)
                .expect("legal command should be accepted");
        }
        (game, processor)
    }

    #[test]
    fn replay_rebuilds_the_same_state() {
        let (game, processor) = play(21, 60);
        let log = ReplayLog::from_json(&processor.replay().to_json().expect("log should serialize"))
            .expect("log should parse");
        let rebuilt = Match::replay(&sample_definitions(), &log).expect("replay should succeed");
        assert_eq!(rebuilt.state(), game.state());
    }

    #[test]
    fn replay_against_other_definitions_fails() {
        let (_, processor) = play(4, 5);
        let mut defs = sample_definitions();
        defs.events.pop();
        assert!(matches!(
            Match::replay(&defs, processor.replay()),
            Err(MatchError::DefinitionsMismatch { .. })
        ));
    }

    #[test]
    fn tampered_log_reports_the_rejected_command() {
        let (game, processor) = play(9, 3);
        let mut log = processor.replay().clone();
        let idle = game
            .state()
            .players
            .iter()
            .map(|player| player.id)
            .find(|id| legal_commands(game.engine(), game.state(), *id).is_empty())
            .expect("some player should be idle");
        log.record(Command::DrawTarget { player: idle });
        let index = log.len() - 1;
        match Match::replay(&sample_definitions(), &log) {
            Err(MatchError::Rejected { index: at, error }) => {
                assert_eq!(at, index);
                assert_ne!(error, RuleError::GameFinished);
            }
            other => panic!("expected a rejection, got {other:?}"),
        }
    }
}
