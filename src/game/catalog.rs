//! Built-in sample catalog used by demos, the wasm host and tests.

use once_cell::sync::Lazy;

use super::card::{
    ActorCard, AllegianceCard, CardDefinitions, EventCard, EventCondition, EventType, InstitutionCard,
    StateCard, SuccessRolls, Team,
};

pub static SAMPLE_DEFINITIONS: Lazy<CardDefinitions> = Lazy::new(|| CardDefinitions {
    states: vec![
        StateCard::new("California", 54, SuccessRolls::new([6], [2, 3, 4, 5, 6])),
        StateCard::new("Texas", 40, SuccessRolls::new([3, 4, 5, 6], [6])).with_secession(),
        StateCard::new("Florida", 30, SuccessRolls::new([4, 5, 6], [5, 6])).with_roll_again(),
        StateCard::new("New York", 28, SuccessRolls::new([6], [3, 4, 5, 6])),
        StateCard::new("Pennsylvania", 19, SuccessRolls::shared([4, 5, 6])).with_roll_again(),
        StateCard::new("Ohio", 18, SuccessRolls::shared([5, 6])),
        StateCard::new("Georgia", 16, SuccessRolls::new([3, 4, 5, 6], [5, 6])),
        StateCard::new("North Carolina", 16, SuccessRolls::new([3, 4, 5, 6], [5, 6])),
        StateCard::new("Michigan", 15, SuccessRolls::shared([4, 5, 6])),
        StateCard::new("Virginia", 13, SuccessRolls::new([5, 6], [4, 5, 6])),
        StateCard::new("Arizona", 11, SuccessRolls::shared([4, 5, 6])),
        StateCard::new("Wisconsin", 10, SuccessRolls::shared([4, 5, 6])).with_roll_again(),
        StateCard::new("Nevada", 6, SuccessRolls::shared([4, 5, 6])),
        StateCard::new("Alaska", 3, SuccessRolls::new([2, 3, 4, 5, 6], [6])).with_secession(),
    ],
    institutions: vec![
        InstitutionCard::new("Supreme Court", SuccessRolls::shared([6])),
        InstitutionCard::new("Senate", SuccessRolls::shared([5, 6])),
        InstitutionCard::new("Federal Reserve", SuccessRolls::shared([6])),
    ],
    events: vec![
        EventCard::new("Grassroots Surge", EventType::ExtraRoll).saveable(),
        EventCard::new("Court Ruling", EventType::ExtraRoll)
            .with_condition(EventCondition::IfOwnsInstitution)
            .requiring("Supreme Court")
            .returnable(),
        EventCard::new("Senate Confirmation", EventType::ExtraRoll)
            .with_condition(EventCondition::IfInstitutionCaptured)
            .requiring("Senate")
            .saveable(),
        EventCard::new("Recount", EventType::NeedTwo).saveable(),
        EventCard::new("Scandal", EventType::LoseTurn).immediate(),
        EventCard::new("Attack Ad", EventType::ChallengeAnyState).saveable().returnable(),
        EventCard::new("Hearings", EventType::ChallengeInstitution).requiring("Supreme Court"),
        EventCard::new("Border Dispute", EventType::AlternateStates).alternating("Nevada", "Arizona"),
        EventCard::new("Rust Belt Shuffle", EventType::AlternateStates)
            .alternating("Michigan", "Wisconsin")
            .returnable(),
        EventCard::new("Party Split", EventType::NoImpact).by_team(EventType::LoseTurn, EventType::ExtraRoll),
        EventCard::new("Quiet News Day", EventType::NoImpact),
    ],
    actors: vec![
        ActorCard::new("The Senator", Team::Red, [1, 2, 3, 4, 5, 6]),
        ActorCard::new("The Mayor", Team::Blue, [1, 1, 2, 3, 5, 8]),
        ActorCard::new("The Governor", Team::Red, [2, 2, 3, 3, 4, 4]),
        ActorCard::new("The Activist", Team::Blue, [3, 3, 3, 3, 3, 3]),
        ActorCard::new("The Strategist", Team::Red, [0, 1, 2, 4, 6, 7]),
        ActorCard::new("The Pundit", Team::Blue, [2, 2, 2, 4, 4, 4]),
    ],
    allegiances: vec![
        AllegianceCard {
            name: "Red Allegiance".to_string(),
            artwork: String::new(),
            team: Team::Red,
        },
        AllegianceCard {
            name: "Blue Allegiance".to_string(),
            artwork: String::new(),
            team: Team::Blue,
        },
    ],
});

pub fn sample_definitions() -> CardDefinitions {
    SAMPLE_DEFINITIONS.clone()
}

#[cfg(test)]
pub(crate) use fixtures::{event_id, main_game_context, state_id, test_context};

#[cfg(test)]
mod fixtures {
    use super::SAMPLE_DEFINITIONS;
    use crate::game::card::{CardId, PlayerId, Team};
    use crate::game::config::MatchConfig;
    use crate::game::registry::CardRegistry;
    use crate::game::rules::RuleContext;
    use crate::game::session::deal;
    use crate::game::state::{GamePhase, GameState};

    /// A freshly dealt match over the sample catalog, still in setup.
    pub(crate) fn test_context(players: &[PlayerId]) -> (RuleContext, GameState) {
        let registry = CardRegistry::from_definitions(&SAMPLE_DEFINITIONS).expect("sample catalog should load");
        let mut ctx = RuleContext::new(registry, MatchConfig::default());
        let state = deal(&mut ctx, players);
        (ctx, state)
    }

    /// A dealt match placed directly in the main game with the first player
    /// to act, each player holding the first pooled actor of their team.
    pub(crate) fn main_game_context(players: &[(PlayerId, Team)]) -> (RuleContext, GameState) {
        let ids: Vec<PlayerId> = players.iter().map(|(id, _)| *id).collect();
        let (ctx, mut state) = test_context(&ids);
        for (id, team) in players {
            let actor = state
                .actor_pool
                .iter()
                .copied()
                .find(|actor| ctx.registry.actor(*actor).is_some_and(|card| card.team == *team))
                .expect("pool should hold an actor for the team");
            state.actor_pool.retain(|pooled| *pooled != actor);
            let player = state.get_player_mut(*id).expect("player should exist");
            player.actor = Some(actor);
            player.team = Some(*team);
        }
        state.phase = GamePhase::MainGame;
        state.turn.current_player_index = 0;
        state.turn.turn_number = 1;
        (ctx, state)
    }

    pub(crate) fn state_id(ctx: &RuleContext, name: &str) -> CardId {
        let id = ctx.registry.id_of(name).expect("state should be registered");
        assert!(ctx.registry.state(id).is_some(), "{name} is not a state");
        id
    }

    pub(crate) fn event_id(ctx: &RuleContext, name: &str) -> CardId {
        let id = ctx.registry.id_of(name).expect("event should be registered");
        assert!(ctx.registry.event(id).is_some(), "{name} is not an event");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::registry::CardRegistry;

    #[test]
    fn sample_catalog_loads() {
        let registry = CardRegistry::from_definitions(&SAMPLE_DEFINITIONS).expect("sample catalog should load");
        assert_eq!(registry.len(), 14 + 3 + 11 + 6 + 2);
    }

    #[test]
    fn every_capturable_card_can_be_won_by_both_teams() {
        let defs = sample_definitions();
        let rolls = defs
            .states
            .iter()
            .map(|card| &card.success_rolls)
            .chain(defs.institutions.iter().map(|card| &card.success_rolls));
        for rolls in rolls {
            assert!(!rolls.red.is_empty());
            assert!(!rolls.blue.is_empty());
        }
    }
}
