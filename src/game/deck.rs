use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::card::CardId;

/// Ordered pile of card ids. The front is the top of the deck.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Deck {
    cards: VecDeque<CardId>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(cards: impl IntoIterator<Item = CardId>) -> Self {
        Self {
            cards: cards.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, card: CardId) -> bool {
        self.cards.contains(&card)
    }

    pub fn position(&self, card: CardId) -> Option<usize> {
        self.cards.iter().position(|id| *id == card)
    }

    pub fn iter(&self) -> impl Iterator<Item = CardId> + '_ {
        self.cards.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<CardId> {
        self.cards.iter().copied().collect()
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.make_contiguous().shuffle(rng);
    }

    pub fn draw(&mut self) -> Option<CardId> {
        self.cards.pop_front()
    }

    pub fn push_bottom(&mut self, card: CardId) {
        self.cards.push_back(card);
    }

    /// Inserts at `index`, clamped to the bottom of the deck.
    pub fn insert_at(&mut self, index: usize, card: CardId) {
        let index = index.min(self.cards.len());
        self.cards.insert(index, card);
    }

    /// Returns a card to a uniformly random position, top and bottom included.
    pub fn insert_random<R: Rng + ?Sized>(&mut self, card: CardId, rng: &mut R) -> usize {
        let index = rng.gen_range(0..=self.cards.len());
        self.cards.insert(index, card);
        index
    }

    pub fn remove(&mut self, card: CardId) -> Option<usize> {
        let index = self.position(card)?;
        self.cards.remove(index);
        Some(index)
    }

    pub fn take_all(&mut self) -> Vec<CardId> {
        self.cards.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn draws_from_the_front() {
        let mut deck = Deck::from_cards([4, 5, 6]);
        assert_eq!(deck.draw(), Some(4));
        assert_eq!(deck.draw(), Some(5));
        assert_eq!(deck.len(), 1);
    }

    #[test]
    fn shuffle_keeps_every_card() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut deck = Deck::from_cards(1..=20);
        deck.shuffle(&mut rng);
        let mut cards = deck.to_vec();
        cards.sort_unstable();
        assert_eq!(cards, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn random_insert_stays_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut deck = Deck::from_cards([1, 2, 3]);
        for card in 10..40 {
            let index = deck.insert_random(card, &mut rng);
            assert_eq!(deck.position(card), Some(index));
        }
        assert_eq!(deck.len(), 33);
    }

    #[test]
    fn remove_reports_position() {
        let mut deck = Deck::from_cards([9, 8, 7]);
        assert_eq!(deck.remove(8), Some(1));
        assert_eq!(deck.remove(8), None);
        deck.insert_at(10, 8);
        assert_eq!(deck.to_vec(), vec![9, 7, 8]);
    }
}
