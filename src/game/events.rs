//! Notifications published by the engine. Each bus is a closed enum so
//! observers match exhaustively on payloads; every notification is emitted
//! only after the mutation it describes has been committed to the state.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::card::{CardId, EventType, PlayerId, Team};
use super::setup::SetupState;
use super::state::{GamePhase, VictoryType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiscardReason {
    Secession,
    AlternateStates,
}

/// Phase, turn, dice and ownership notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TurnFlowEvent {
    PhaseChanged {
        from: GamePhase,
        to: GamePhase,
    },
    SetupStateChanged {
        state: SetupState,
    },
    SetupTie {
        players: Vec<PlayerId>,
        value: u8,
    },
    SetupWinner {
        player: PlayerId,
        value: u8,
    },
    ActorSelected {
        selector: PlayerId,
        actor: CardId,
    },
    ActorAssigned {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<PlayerId>,
        player: PlayerId,
        actor: CardId,
        team: Team,
    },
    TurnStarted {
        player: PlayerId,
        turn: u32,
    },
    TurnEnded {
        player: PlayerId,
    },
    PlayerRolled {
        player: PlayerId,
        value: u8,
    },
    ExtraRollGranted {
        player: PlayerId,
        remaining: u8,
    },
    TargetCardDrawn {
        player: PlayerId,
        card: CardId,
    },
    TargetDeckExhausted,
    CardCaptured {
        player: PlayerId,
        card: CardId,
    },
    CardReleased {
        player: PlayerId,
        card: CardId,
    },
    CardOwnershipChanged {
        card: CardId,
        from: PlayerId,
        to: PlayerId,
    },
    StateDiscarded {
        card: CardId,
        reason: DiscardReason,
    },
    CrisisRolled {
        player: PlayerId,
        value: u8,
        points: u8,
    },
    GameOver {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<Team>,
        victory: VictoryType,
    },
}

/// Event-card lifecycle notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EventCardEvent {
    Drawn {
        player: PlayerId,
        card: CardId,
    },
    DeckReshuffled {
        cards: usize,
    },
    Saved {
        player: PlayerId,
        card: CardId,
    },
    Applied {
        player: PlayerId,
        card: CardId,
        effective_type: EventType,
    },
    Canceled {
        player: PlayerId,
        card: CardId,
        returned: bool,
    },
    Completed {
        player: PlayerId,
        card: CardId,
    },
    /// An undecided table event expired at the end of its turn.
    Discarded {
        card: CardId,
    },
}

/// Notifications that ask a player (or AI) to pick among cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SelectableCardEvent {
    ChallengeStatesDetermined {
        player: PlayerId,
        candidates: Vec<CardId>,
    },
    DuelStarted {
        attacker: PlayerId,
        defender: PlayerId,
        card: CardId,
    },
    AlternateStatesShown {
        player: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        first: Option<CardId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        second: Option<CardId>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "bus", content = "event")]
pub enum GameEvent {
    TurnFlow(TurnFlowEvent),
    EventCard(EventCardEvent),
    Selectable(SelectableCardEvent),
}

impl From<TurnFlowEvent> for GameEvent {
    fn from(event: TurnFlowEvent) -> Self {
        GameEvent::TurnFlow(event)
    }
}

impl From<EventCardEvent> for GameEvent {
    fn from(event: EventCardEvent) -> Self {
        GameEvent::EventCard(event)
    }
}

impl From<SelectableCardEvent> for GameEvent {
    fn from(event: SelectableCardEvent) -> Self {
        GameEvent::Selectable(event)
    }
}

/// Observer of published notifications (renderer, AI driver, network relay).
pub trait BusSubscriber {
    fn on_event(&mut self, event: &GameEvent);
}

impl<F> BusSubscriber for F
where
    F: FnMut(&GameEvent),
{
    fn on_event(&mut self, event: &GameEvent) {
        self(event)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn BusSubscriber>>,
    published: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn BusSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Delivers a batch in order to every subscriber. Batches are never
    /// interleaved: the engine publishes one command's events at a time.
    pub fn publish(&mut self, events: &[GameEvent]) {
        for event in events {
            self.published += 1;
            for subscriber in &mut self.subscribers {
                subscriber.on_event(event);
            }
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("published", &self.published)
            .finish()
    }
}

/// Subscriber that keeps every event it sees behind a shared handle.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<GameEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.borrow().clone()
    }

    pub fn drain(&self) -> Vec<GameEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl BusSubscriber for EventRecorder {
    fn on_event(&mut self, event: &GameEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_delivers_in_order_to_all_subscribers() {
        let mut bus = EventBus::new();
        let recorder = EventRecorder::new();
        bus.subscribe(Box::new(recorder.clone()));

        let counter = Rc::new(RefCell::new(0usize));
        let handle = Rc::clone(&counter);
        bus.subscribe(Box::new(move |_: &GameEvent| *handle.borrow_mut() += 1));

        let events = vec![
            GameEvent::from(TurnFlowEvent::TurnStarted { player: 1, turn: 1 }),
            GameEvent::from(TurnFlowEvent::PlayerRolled { player: 1, value: 4 }),
        ];
        bus.publish(&events);

        assert_eq!(recorder.len(), 2);
        assert_eq!(*counter.borrow(), 2);
        assert_eq!(recorder.events(), events);
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn events_serialize_with_bus_tag() {
        let event = GameEvent::from(SelectableCardEvent::DuelStarted {
            attacker: 0,
            defender: 1,
            card: 4,
        });
        let json = serde_json::to_string(&event).expect("event should serialize");
        assert!(json.contains("\"bus\":\"Selectable\""));
        assert!(json.contains("\"type\":\"DuelStarted\""));
        let back: GameEvent = serde_json::from_str(&json).expect("event should deserialize");
        assert_eq!(back, event);
    }
}
