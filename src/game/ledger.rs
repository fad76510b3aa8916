//! Ownership ledger: which player holds which captured state or institution.
//!
//! A card is in at most one of {a deck, the ledger}, and never has two owners.
//! Capture and release are exact inverses, so the ledger also remembers where
//! each card was captured from.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::card::{CardId, CardKind, PlayerId};
use super::events::{GameEvent, TurnFlowEvent};
use super::registry::CardRegistry;
use super::state::GameState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CardOrigin {
    TargetDeck { position: usize },
    StateDiscard { position: usize },
    Table,
    Loose,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipLedger {
    states: BTreeMap<PlayerId, BTreeSet<CardId>>,
    institutions: BTreeMap<PlayerId, BTreeSet<CardId>>,
    owners: BTreeMap<CardId, PlayerId>,
    origins: BTreeMap<CardId, CardOrigin>,
}

impl OwnershipLedger {
    pub fn owner_of(&self, card: CardId) -> Option<PlayerId> {
        self.owners.get(&card).copied()
    }

    pub fn is_owned(&self, card: CardId) -> bool {
        self.owners.contains_key(&card)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owned_cards(&self) -> impl Iterator<Item = CardId> + '_ {
        self.owners.keys().copied()
    }

    pub fn states_of(&self, player: PlayerId) -> Vec<CardId> {
        self.states
            .get(&player)
            .map(|cards| cards.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn institutions_of(&self, player: PlayerId) -> Vec<CardId> {
        self.institutions
            .get(&player)
            .map(|cards| cards.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn cards_of(&self, player: PlayerId) -> Vec<CardId> {
        let mut cards = self.states_of(player);
        cards.extend(self.institutions_of(player));
        cards
    }

    /// Every owned state card with its owner, in card order.
    pub fn owned_states(&self) -> Vec<(CardId, PlayerId)> {
        Self::flatten(&self.states)
    }

    pub fn owned_institutions(&self) -> Vec<(CardId, PlayerId)> {
        Self::flatten(&self.institutions)
    }

    fn flatten(map: &BTreeMap<PlayerId, BTreeSet<CardId>>) -> Vec<(CardId, PlayerId)> {
        let mut pairs: Vec<_> = map
            .iter()
            .flat_map(|(owner, cards)| cards.iter().map(move |card| (*card, *owner)))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    fn per_kind(&mut self, kind: CardKind) -> Option<&mut BTreeMap<PlayerId, BTreeSet<CardId>>> {
        match kind {
            CardKind::State => Some(&mut self.states),
            CardKind::Institution => Some(&mut self.institutions),
            _ => None,
        }
    }

    fn insert(&mut self, player: PlayerId, card: CardId, kind: CardKind, origin: CardOrigin) -> bool {
        if self.owners.contains_key(&card) {
            return false;
        }
        let Some(map) = self.per_kind(kind) else {
            return false;
        };
        map.entry(player).or_default().insert(card);
        self.owners.insert(card, player);
        self.origins.insert(card, origin);
        true
    }

    fn remove(&mut self, card: CardId) -> Option<(PlayerId, CardOrigin)> {
        let owner = self.owners.remove(&card)?;
        for map in [&mut self.states, &mut self.institutions] {
            if let Some(cards) = map.get_mut(&owner) {
                cards.remove(&card);
                if cards.is_empty() {
                    map.remove(&owner);
                }
            }
        }
        let origin = self.origins.remove(&card).unwrap_or(CardOrigin::Loose);
        Some((owner, origin))
    }

    /// Checks the per-type maps against the reverse map; returns the first
    /// card that disagrees.
    pub fn check_consistency(&self) -> Result<(), CardId> {
        let mut forward = 0usize;
        for map in [&self.states, &self.institutions] {
            for (owner, cards) in map {
                for card in cards {
                    forward += 1;
                    if self.owners.get(card) != Some(owner) {
                        return Err(*card);
                    }
                }
            }
        }
        if forward != self.owners.len() {
            let orphan = self
                .owners
                .iter()
                .find(|&(card, owner)| {
                    let in_states = self.states.get(owner).is_some_and(|cards| cards.contains(card));
                    let in_institutions = self
                        .institutions
                        .get(owner)
                        .is_some_and(|cards| cards.contains(card));
                    !(in_states || in_institutions)
                })
                .map(|(card, _)| *card);
            return Err(orphan.unwrap_or_default());
        }
        Ok(())
    }
}

impl GameState {
    fn adjust_score(&mut self, registry: &CardRegistry, player: PlayerId, card: CardId, gain: bool) {
        let votes = registry
            .state(card)
            .map(|state| u32::from(state.electoral_votes));
        let Some(player) = self.get_player_mut(player) else {
            return;
        };
        match (votes, gain) {
            (Some(votes), true) => player.electoral_score += votes,
            (Some(votes), false) => player.electoral_score = player.electoral_score.saturating_sub(votes),
            (None, true) => player.institution_score += 1,
            (None, false) => player.institution_score = player.institution_score.saturating_sub(1),
        }
    }

    /// Marks `card` as captured by `player`, pulling it off the table or out of
    /// whichever pile holds it. Double captures are ignored with a warning.
    pub fn capture_card(
        &mut self,
        registry: &CardRegistry,
        player: PlayerId,
        card: CardId,
        events: &mut Vec<GameEvent>,
    ) -> bool {
        if let Some(owner) = self.ledger.owner_of(card) {
            warn!(card, owner, player, "capture rejected: card already owned");
            return false;
        }
        let Some(kind) = registry.kind_of(card) else {
            warn!(card, "capture rejected: unknown card");
            return false;
        };
        if !matches!(kind, CardKind::State | CardKind::Institution) {
            warn!(card, ?kind, "capture rejected: card is not capturable");
            return false;
        }
        if self.get_player(player).is_none() {
            warn!(card, player, "capture rejected: unknown player");
            return false;
        }

        let origin = if self.turn.target_card == Some(card) {
            self.turn.target_card = None;
            CardOrigin::Table
        } else if let Some(position) = self.target_deck.remove(card) {
            CardOrigin::TargetDeck { position }
        } else if let Some(position) = self.state_discard.remove(card) {
            CardOrigin::StateDiscard { position }
        } else {
            CardOrigin::Loose
        };

        self.ledger.insert(player, card, kind, origin);
        self.adjust_score(registry, player, card, true);
        debug!(card, player, ?origin, "card captured");
        self.emit(events, TurnFlowEvent::CardCaptured { player, card });
        true
    }

    /// Inverse of [`GameState::capture_card`]: the card goes back where it
    /// was captured from and the owner's score drops accordingly.
    pub fn release_card(
        &mut self,
        registry: &CardRegistry,
        card: CardId,
        events: &mut Vec<GameEvent>,
    ) -> Option<PlayerId> {
        let (owner, origin) = self.ledger.remove(card)?;
        self.adjust_score(registry, owner, card, false);
        match origin {
            CardOrigin::TargetDeck { position } => self.target_deck.insert_at(position, card),
            CardOrigin::StateDiscard { position } => self.state_discard.insert_at(position, card),
            CardOrigin::Table if self.turn.target_card.is_none() => self.turn.target_card = Some(card),
            CardOrigin::Table => {
                debug!(card, "table occupied; released card returns to the top of the target deck");
                self.target_deck.insert_at(0, card);
            }
            CardOrigin::Loose => {}
        }
        self.emit(events, TurnFlowEvent::CardReleased { player: owner, card });
        Some(owner)
    }

    /// Moves an owned card to `new_owner` in one step; observers only ever
    /// see the card with exactly one owner.
    pub fn transfer_card(
        &mut self,
        registry: &CardRegistry,
        new_owner: PlayerId,
        card: CardId,
        events: &mut Vec<GameEvent>,
    ) -> bool {
        let Some(kind) = registry.kind_of(card) else {
            return false;
        };
        if self.get_player(new_owner).is_none() {
            warn!(card, new_owner, "transfer rejected: unknown player");
            return false;
        }
        let Some(from) = self.ledger.owner_of(card) else {
            warn!(card, new_owner, "transfer rejected: card is not owned");
            return false;
        };
        if from == new_owner {
            return false;
        }

        let Some((_, origin)) = self.ledger.remove(card) else {
            return false;
        };
        self.adjust_score(registry, from, card, false);
        self.ledger.insert(new_owner, card, kind, origin);
        self.adjust_score(registry, new_owner, card, true);
        self.emit(
            events,
            TurnFlowEvent::CardOwnershipChanged {
                card,
                from,
                to: new_owner,
            },
        );
        true
    }
}
