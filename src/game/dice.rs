use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::card::DIE_FACES;

/// Source of six-sided die results. Injected per match so tests and replays
/// can fix the sequence.
pub trait DiceRoller {
    fn roll_d6(&mut self) -> u8;
}

#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: SmallRng,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl DiceRoller for SeededDice {
    fn roll_d6(&mut self) -> u8 {
        self.rng.gen_range(1..=DIE_FACES)
    }
}

/// Plays back a fixed list of faces, then falls back to seeded dice.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    script: VecDeque<u8>,
    fallback: SeededDice,
}

impl ScriptedDice {
    pub fn new(script: impl IntoIterator<Item = u8>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: SeededDice::new(0),
        }
    }

    pub fn push(&mut self, face: u8) {
        self.script.push_back(face);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll_d6(&mut self) -> u8 {
        match self.script.pop_front() {
            Some(face) => face.clamp(1, DIE_FACES),
            None => self.fallback.roll_d6(),
        }
    }
}

/// Faces rolled while one command executes. Faces queued with
/// [`FaceJournal::begin`] are used before the dice, which is how a replica
/// replays the authority's rolls.
#[derive(Debug, Clone, Default)]
pub struct FaceJournal {
    forced: VecDeque<u8>,
    rolled: Vec<u8>,
}

impl FaceJournal {
    pub fn begin(&mut self, forced: &[u8]) {
        self.forced = forced.iter().map(|face| (*face).clamp(1, DIE_FACES)).collect();
        self.rolled.clear();
    }

    pub fn roll(&mut self, dice: &mut dyn DiceRoller) -> u8 {
        let face = self.forced.pop_front().unwrap_or_else(|| dice.roll_d6());
        self.rolled.push(face);
        face
    }

    /// Returns the faces rolled since `begin` and how many forced faces went
    /// unused.
    pub fn finish(&mut self) -> (Vec<u8>, usize) {
        let unused = self.forced.len();
        self.forced.clear();
        (std::mem::take(&mut self.rolled), unused)
    }
}
