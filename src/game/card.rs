//! Card value records. Cards are built once from definitions and never
//! mutated afterwards; decks and the ownership ledger refer to them by
//! [`CardId`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Stable, transmissible card identifier assigned by the registry.
pub type CardId = u32;
/// Player identifier.
pub type PlayerId = u8;

pub const DIE_FACES: u8 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CardKind {
    State,
    Institution,
    Event,
    Actor,
    Allegiance,
}

/// Die faces on which a capture roll succeeds, per team.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessRolls {
    #[serde(default)]
    pub red: BTreeSet<u8>,
    #[serde(default)]
    pub blue: BTreeSet<u8>,
}

impl SuccessRolls {
    pub fn new(red: impl IntoIterator<Item = u8>, blue: impl IntoIterator<Item = u8>) -> Self {
        Self {
            red: red.into_iter().collect(),
            blue: blue.into_iter().collect(),
        }
    }

    /// Same faces for both teams.
    pub fn shared(faces: impl IntoIterator<Item = u8> + Clone) -> Self {
        Self::new(faces.clone(), faces)
    }

    pub fn for_team(&self, team: Team) -> &BTreeSet<u8> {
        match team {
            Team::Red => &self.red,
            Team::Blue => &self.blue,
        }
    }

    pub fn succeeds(&self, team: Team, roll: u8) -> bool {
        self.for_team(team).contains(&roll)
    }

    pub(crate) fn faces(&self) -> impl Iterator<Item = u8> + '_ {
        self.red.iter().chain(self.blue.iter()).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateCard {
    pub name: String,
    #[serde(default)]
    pub artwork: String,
    pub electoral_votes: u16,
    pub success_rolls: SuccessRolls,
    #[serde(default)]
    pub has_roll_again: bool,
    #[serde(default)]
    pub has_secession: bool,
}

impl StateCard {
    pub fn new(name: impl Into<String>, electoral_votes: u16, success_rolls: SuccessRolls) -> Self {
        Self {
            name: name.into(),
            artwork: String::new(),
            electoral_votes,
            success_rolls,
            has_roll_again: false,
            has_secession: false,
        }
    }

    pub fn with_roll_again(mut self) -> Self {
        self.has_roll_again = true;
        self
    }

    pub fn with_secession(mut self) -> Self {
        self.has_secession = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstitutionCard {
    pub name: String,
    #[serde(default)]
    pub artwork: String,
    pub success_rolls: SuccessRolls,
}

impl InstitutionCard {
    pub fn new(name: impl Into<String>, success_rolls: SuccessRolls) -> Self {
        Self {
            name: name.into(),
            artwork: String::new(),
            success_rolls,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    ExtraRoll,
    NeedTwo,
    LoseTurn,
    ChallengeAnyState,
    ChallengeInstitution,
    AlternateStates,
    NoImpact,
    /// Resolved through [`EventCard::team_types`] for the acting player's team.
    TeamConditional,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventCondition {
    #[default]
    None,
    IfOwnsInstitution,
    IfInstitutionCaptured,
    TeamConditions,
    Any,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEventTypes {
    pub red: EventType,
    pub blue: EventType,
}

impl TeamEventTypes {
    pub fn for_team(&self, team: Team) -> EventType {
        match team {
            Team::Red => self.red,
            Team::Blue => self.blue,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventCard {
    pub name: String,
    #[serde(default)]
    pub artwork: String,
    pub event_type: EventType,
    #[serde(default)]
    pub conditions: EventCondition,
    #[serde(default)]
    pub can_save: bool,
    #[serde(default)]
    pub must_play_immediately: bool,
    /// Goes back into the event deck when the event is canceled.
    #[serde(default)]
    pub returnable: bool,
    /// Name of the institution card this event refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_institution: Option<String>,
    /// Names of the two state cards an alternate-states event targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_states: Option<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_types: Option<TeamEventTypes>,
}

impl EventCard {
    pub fn new(name: impl Into<String>, event_type: EventType) -> Self {
        Self {
            name: name.into(),
            artwork: String::new(),
            event_type,
            conditions: EventCondition::None,
            can_save: false,
            must_play_immediately: false,
            returnable: false,
            required_institution: None,
            alternate_states: None,
            team_types: None,
        }
    }

    pub fn saveable(mut self) -> Self {
        self.can_save = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.must_play_immediately = true;
        self
    }

    pub fn returnable(mut self) -> Self {
        self.returnable = true;
        self
    }

    pub fn with_condition(mut self, condition: EventCondition) -> Self {
        self.conditions = condition;
        self
    }

    pub fn requiring(mut self, institution: impl Into<String>) -> Self {
        self.required_institution = Some(institution.into());
        self
    }

    pub fn alternating(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.alternate_states = Some((first.into(), second.into()));
        self
    }

    pub fn by_team(mut self, red: EventType, blue: EventType) -> Self {
        self.event_type = EventType::TeamConditional;
        self.team_types = Some(TeamEventTypes { red, blue });
        self
    }

    /// The handler type for a player on `team`. A team-conditional card with
    /// no team binding, or an actor without a team, degrades to `NoImpact`.
    pub fn effective_type(&self, team: Option<Team>) -> EventType {
        if self.event_type != EventType::TeamConditional {
            return self.event_type;
        }
        match (self.team_types, team) {
            (Some(types), Some(team)) => types.for_team(team),
            _ => EventType::NoImpact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorCard {
    pub name: String,
    #[serde(default)]
    pub artwork: String,
    pub team: Team,
    /// Stat value for each die face, indexed by `face - 1`.
    pub dice_stats: [u8; 6],
}

impl ActorCard {
    pub fn new(name: impl Into<String>, team: Team, dice_stats: [u8; 6]) -> Self {
        Self {
            name: name.into(),
            artwork: String::new(),
            team,
            dice_stats,
        }
    }

    pub fn stat_for_roll(&self, roll: u8) -> u8 {
        usize::from(roll)
            .checked_sub(1)
            .and_then(|index| self.dice_stats.get(index))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllegianceCard {
    pub name: String,
    #[serde(default)]
    pub artwork: String,
    pub team: Team,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum Card {
    State(StateCard),
    Institution(InstitutionCard),
    Event(EventCard),
    Actor(ActorCard),
    Allegiance(AllegianceCard),
}

impl Card {
    pub fn name(&self) -> &str {
        match self {
            Card::State(card) => &card.name,
            Card::Institution(card) => &card.name,
            Card::Event(card) => &card.name,
            Card::Actor(card) => &card.name,
            Card::Allegiance(card) => &card.name,
        }
    }

    /// Opaque asset handle; never interpreted by the engine.
    pub fn artwork(&self) -> &str {
        match self {
            Card::State(card) => &card.artwork,
            Card::Institution(card) => &card.artwork,
            Card::Event(card) => &card.artwork,
            Card::Actor(card) => &card.artwork,
            Card::Allegiance(card) => &card.artwork,
        }
    }

    pub fn kind(&self) -> CardKind {
        match self {
            Card::State(_) => CardKind::State,
            Card::Institution(_) => CardKind::Institution,
            Card::Event(_) => CardKind::Event,
            Card::Actor(_) => CardKind::Actor,
            Card::Allegiance(_) => CardKind::Allegiance,
        }
    }

    /// Success faces for capturable cards (states and institutions).
    pub fn success_rolls(&self) -> Option<&SuccessRolls> {
        match self {
            Card::State(card) => Some(&card.success_rolls),
            Card::Institution(card) => Some(&card.success_rolls),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&StateCard> {
        match self {
            Card::State(card) => Some(card),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventCard> {
        match self {
            Card::Event(card) => Some(card),
            _ => None,
        }
    }

    pub fn as_actor(&self) -> Option<&ActorCard> {
        match self {
            Card::Actor(card) => Some(card),
            _ => None,
        }
    }
}

/// Card definitions for one match, grouped by deck.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDefinitions {
    #[serde(default)]
    pub states: Vec<StateCard>,
    #[serde(default)]
    pub institutions: Vec<InstitutionCard>,
    #[serde(default)]
    pub events: Vec<EventCard>,
    #[serde(default)]
    pub actors: Vec<ActorCard>,
    #[serde(default)]
    pub allegiances: Vec<AllegianceCard>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_conditional_resolves_by_team() {
        let card = EventCard::new("Swing Vote", EventType::NoImpact)
            .by_team(EventType::ExtraRoll, EventType::LoseTurn);
        assert_eq!(card.effective_type(Some(Team::Red)), EventType::ExtraRoll);
        assert_eq!(card.effective_type(Some(Team::Blue)), EventType::LoseTurn);
        assert_eq!(card.effective_type(None), EventType::NoImpact);
    }

    #[test]
    fn actor_stat_lookup_ignores_invalid_faces() {
        let actor = ActorCard::new("Senator", Team::Blue, [1, 2, 3, 4, 5, 6]);
        assert_eq!(actor.stat_for_roll(1), 1);
        assert_eq!(actor.stat_for_roll(6), 6);
        assert_eq!(actor.stat_for_roll(0), 0);
        assert_eq!(actor.stat_for_roll(7), 0);
    }

    #[test]
    fn cards_round_trip_with_kind_tag() {
        let card = Card::State(StateCard::new("Ohio", 18, SuccessRolls::shared([3, 5])));
        let json = serde_json::to_string(&card).expect("card should serialize");
        assert!(json.contains("\"kind\":\"State\""));
        let back: Card = serde_json::from_str(&json).expect("card should deserialize");
        assert_eq!(back, card);
    }
}
