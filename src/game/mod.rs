//! Game core: card data, phase machine, event resolution and the command layer.

pub mod card;
pub mod catalog;
pub mod command;
pub mod config;
pub mod crisis;
pub mod deck;
pub mod dice;
pub mod event_engine;
pub mod events;
pub mod ledger;
pub mod phase;
pub mod registry;
pub mod replay;
pub mod rules;
pub mod session;
pub mod setup;
pub mod snapshot;
pub mod state;
pub mod turn;

pub use card::{
    ActorCard,
    AllegianceCard,
    Card,
    CardDefinitions,
    CardId,
    CardKind,
    EventCard,
    EventCondition,
    EventType,
    InstitutionCard,
    PlayerId,
    StateCard,
    SuccessRolls,
    Team,
    TeamEventTypes,
};
pub use catalog::sample_definitions;
pub use command::{
    Authority,
    AuthorityLink,
    AuthorityVerdict,
    ClientId,
    Command,
    CommandEnvelope,
    CommandProcessor,
    Desync,
    LoopbackLink,
    Resolved,
    Submission,
};
pub use config::MatchConfig;
pub use dice::{DiceRoller, FaceJournal, ScriptedDice, SeededDice};
pub use event_engine::{ActiveEvent, EventResolutionEngine, EventStage};
pub use events::{BusSubscriber, EventBus, EventRecorder, GameEvent};
pub use ledger::OwnershipLedger;
pub use phase::{PhaseController, PhaseMachine};
pub use registry::{CardRegistry, RegistryError};
pub use replay::ReplayLog;
pub use rules::{RuleEngine, RuleError, RuleResolution};
pub use session::{Match, MatchError};
pub use snapshot::{MatchSnapshot, WireError};
pub use state::{GamePhase, GameState, IntegrityError, Player, VictoryState, VictoryType};
