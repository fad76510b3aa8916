use serde::{Deserialize, Serialize};

const DEFAULT_SEED: u64 = 0x5eed_0f_1776;
const DEFAULT_ROLLS_PER_TURN: u8 = 1;
const DEFAULT_SECESSION_ROLL: u8 = 1;
const DEFAULT_ROLL_AGAIN_ROLL: u8 = 4;
const DEFAULT_NEED_TWO_ROLL: u8 = 2;
const DEFAULT_VOTES_TO_WIN: u32 = 270;

/// Rule constants and seed for one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchConfig {
    /// Seeds deck shuffles, random returns and the default dice.
    pub seed: u64,
    pub rolls_per_turn: u8,
    /// Face that makes a seceding state leave play.
    pub secession_roll: u8,
    /// Face that grants an extra roll on roll-again states.
    pub roll_again_roll: u8,
    /// The only face that captures while a need-two event is in flight.
    pub need_two_roll: u8,
    pub electoral_votes_to_win: u32,
    /// Draw the target and event cards automatically at turn start.
    pub auto_draw: bool,
    /// Refill an empty event deck from the event discard.
    pub reshuffle_event_discard: bool,
    /// Play a crisis round when the target deck runs out; otherwise score
    /// the match immediately.
    pub crisis_enabled: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            rolls_per_turn: DEFAULT_ROLLS_PER_TURN,
            secession_roll: DEFAULT_SECESSION_ROLL,
            roll_again_roll: DEFAULT_ROLL_AGAIN_ROLL,
            need_two_roll: DEFAULT_NEED_TWO_ROLL,
            electoral_votes_to_win: DEFAULT_VOTES_TO_WIN,
            auto_draw: false,
            reshuffle_event_discard: true,
            crisis_enabled: true,
        }
    }
}

impl MatchConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_auto_draw(mut self, auto_draw: bool) -> Self {
        self.auto_draw = auto_draw;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = MatchConfig::from_json(r#"{"seed": 9, "auto_draw": true}"#)
            .expect("partial config should parse");
        assert_eq!(config.seed, 9);
        assert!(config.auto_draw);
        assert_eq!(config.electoral_votes_to_win, 270);
        assert_eq!(config.secession_roll, 1);
    }
}
