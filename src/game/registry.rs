//! Bidirectional mapping between card records and their transmissible ids.
//!
//! Ownership, decks and wire messages only ever carry [`CardId`]s; both ends of
//! a networked match build the same registry from the same definitions and
//! compare [`CardRegistry::fingerprint`] to detect mismatches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::{
    ActorCard, Card, CardDefinitions, CardId, CardKind, EventCard, EventType, InstitutionCard,
    StateCard, DIE_FACES,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RegistryError {
    #[error("card name `{name}` is registered twice")]
    DuplicateName { name: String },
    #[error("state `{name}` must be worth at least one electoral vote")]
    NoElectoralVotes { name: String },
    #[error("card `{name}` uses die face {face}, expected 1..=6")]
    InvalidDieFace { name: String, face: u8 },
    #[error("event `{event}` refers to unknown {expected:?} card `{target}`")]
    UnknownReference {
        event: String,
        target: String,
        expected: CardKind,
    },
    #[error("event `{name}` is team-conditional but has no team bindings")]
    MissingTeamTypes { name: String },
}

#[derive(Debug, Clone, Default)]
pub struct CardRegistry {
    cards: Vec<Card>,
    by_name: HashMap<String, CardId>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every definition and checks cross references between them.
    pub fn from_definitions(definitions: &CardDefinitions) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for card in &definitions.states {
            registry.register(Card::State(card.clone()))?;
        }
        for card in &definitions.institutions {
            registry.register(Card::Institution(card.clone()))?;
        }
        for card in &definitions.events {
            registry.register(Card::Event(card.clone()))?;
        }
        for card in &definitions.actors {
            registry.register(Card::Actor(card.clone()))?;
        }
        for card in &definitions.allegiances {
            registry.register(Card::Allegiance(card.clone()))?;
        }
        registry.check_references()?;
        Ok(registry)
    }

    pub fn register(&mut self, card: Card) -> Result<CardId, RegistryError> {
        Self::validate(&card)?;
        if self.by_name.contains_key(card.name()) {
            return Err(RegistryError::DuplicateName {
                name: card.name().to_string(),
            });
        }
        let id = CardId::try_from(self.cards.len() + 1).unwrap_or(CardId::MAX);
        self.by_name.insert(card.name().to_string(), id);
        self.cards.push(card);
        Ok(id)
    }

    fn validate(card: &Card) -> Result<(), RegistryError> {
        if let Card::State(state) = card {
            if state.electoral_votes == 0 {
                return Err(RegistryError::NoElectoralVotes {
                    name: state.name.clone(),
                });
            }
        }
        if let Some(rolls) = card.success_rolls() {
            if let Some(face) = rolls.faces().find(|face| !(1..=DIE_FACES).contains(face)) {
                return Err(RegistryError::InvalidDieFace {
                    name: card.name().to_string(),
                    face,
                });
            }
        }
        if let Card::Event(event) = card {
            if event.event_type == EventType::TeamConditional && event.team_types.is_none() {
                return Err(RegistryError::MissingTeamTypes {
                    name: event.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_references(&self) -> Result<(), RegistryError> {
        for card in &self.cards {
            let Card::Event(event) = card else { continue };
            if let Some(institution) = &event.required_institution {
                self.expect_kind(event, institution, CardKind::Institution)?;
            }
            if let Some((first, second)) = &event.alternate_states {
                self.expect_kind(event, first, CardKind::State)?;
                self.expect_kind(event, second, CardKind::State)?;
            }
        }
        Ok(())
    }

    fn expect_kind(&self, event: &EventCard, target: &str, expected: CardKind) -> Result<(), RegistryError> {
        match self.find(target) {
            Some((_, card)) if card.kind() == expected => Ok(()),
            _ => Err(RegistryError::UnknownReference {
                event: event.name.clone(),
                target: target.to_string(),
                expected,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, id: CardId) -> Option<&Card> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.cards.get(index)
    }

    pub fn id_of(&self, name: &str) -> Option<CardId> {
        self.by_name.get(name).copied()
    }

    /// Id of a card instance, matched by its unique name.
    pub fn id_of_card(&self, card: &Card) -> Option<CardId> {
        let id = self.id_of(card.name())?;
        (self.get(id) == Some(card)).then_some(id)
    }

    pub fn find(&self, name: &str) -> Option<(CardId, &Card)> {
        let id = self.id_of(name)?;
        self.get(id).map(|card| (id, card))
    }

    pub fn kind_of(&self, id: CardId) -> Option<CardKind> {
        self.get(id).map(Card::kind)
    }

    pub fn state(&self, id: CardId) -> Option<&StateCard> {
        match self.get(id)? {
            Card::State(card) => Some(card),
            _ => None,
        }
    }

    pub fn institution(&self, id: CardId) -> Option<&InstitutionCard> {
        match self.get(id)? {
            Card::Institution(card) => Some(card),
            _ => None,
        }
    }

    pub fn event(&self, id: CardId) -> Option<&EventCard> {
        self.get(id)?.as_event()
    }

    pub fn actor(&self, id: CardId) -> Option<&ActorCard> {
        self.get(id)?.as_actor()
    }

    pub fn ids_of_kind(&self, kind: CardKind) -> Vec<CardId> {
        self.iter()
            .filter(|(_, card)| card.kind() == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CardId, &Card)> {
        self.cards
            .iter()
            .enumerate()
            .map(|(index, card)| (CardId::try_from(index + 1).unwrap_or(CardId::MAX), card))
    }

    /// Resolves a list of ids received over the wire, skipping unknown ones.
    pub fn resolve<'a>(&'a self, ids: &'a [CardId]) -> impl Iterator<Item = &'a Card> + 'a {
        ids.iter().filter_map(|id| self.get(*id))
    }

    /// FNV-1a over the registered names and kinds, in id order.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0100_0000_01b3;

        let mut hash = OFFSET_BASIS;
        for card in &self.cards {
            let kind = card.kind() as u8;
            for byte in card.name().bytes().chain(std::iter::once(kind)) {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(PRIME);
            }
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{EventType, SuccessRolls, StateCard};

    fn definitions() -> CardDefinitions {
        CardDefinitions {
            states: vec![
                StateCard::new("Ohio", 18, SuccessRolls::shared([3, 5])),
                StateCard::new("Iowa", 6, SuccessRolls::shared([2])),
            ],
            institutions: vec![InstitutionCard::new("Supreme Court", SuccessRolls::shared([6]))],
            events: vec![EventCard::new("Recount", EventType::AlternateStates).alternating("Ohio", "Iowa")],
            ..CardDefinitions::default()
        }
    }

    #[test]
    fn ids_resolve_both_ways() {
        let registry = CardRegistry::from_definitions(&definitions()).expect("definitions should load");
        let ohio = registry.id_of("Ohio").expect("Ohio should be registered");
        let card = registry.get(ohio).expect("id should resolve");
        assert_eq!(card.name(), "Ohio");
        assert_eq!(registry.id_of_card(card), Some(ohio));
        assert_eq!(registry.kind_of(ohio), Some(CardKind::State));
        assert!(registry.get(0).is_none());
        assert_eq!(registry.ids_of_kind(CardKind::Institution).len(), 1);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut defs = definitions();
        defs.states.push(StateCard::new("Ohio", 3, SuccessRolls::shared([1])));
        let err = CardRegistry::from_definitions(&defs).expect_err("duplicate must fail");
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
    }

    #[test]
    fn rejects_out_of_range_faces_and_dangling_refs() {
        let mut defs = definitions();
        defs.states.push(StateCard::new("Utah", 6, SuccessRolls::shared([7])));
        assert!(matches!(
            CardRegistry::from_definitions(&defs),
            Err(RegistryError::InvalidDieFace { face: 7, .. })
        ));

        let mut defs = definitions();
        defs.events
            .push(EventCard::new("Hearing", EventType::ChallengeInstitution).requiring("Senate"));
        assert!(matches!(
            CardRegistry::from_definitions(&defs),
            Err(RegistryError::UnknownReference { .. })
        ));
    }

    #[test]
    fn fingerprint_tracks_definition_order() {
        let a = CardRegistry::from_definitions(&definitions()).expect("load");
        let b = CardRegistry::from_definitions(&definitions()).expect("load");
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut defs = definitions();
        defs.states.reverse();
        let c = CardRegistry::from_definitions(&defs).expect("load");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
