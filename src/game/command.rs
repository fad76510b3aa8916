//! Command layer: every externally triggered mutation as a validate/execute
//! pair, run either locally or through an authoritative host.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::card::{CardId, PlayerId};
use super::events::GameEvent;
use super::replay::ReplayLog;
use super::rules::{RuleEngine, RuleError};
use super::session::Match;
use super::state::GameState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Command {
    Roll { player: PlayerId },
    DrawTarget { player: PlayerId },
    DrawEvent { player: PlayerId },
    SaveEvent { player: PlayerId, card: CardId },
    PlayEvent { player: PlayerId, card: CardId },
    ChooseChallengeTarget { player: PlayerId, card: CardId },
    SelectActor { selector: PlayerId, actor: CardId },
    AssignActor { selector: PlayerId, target: PlayerId, actor: CardId },
}

impl Command {
    pub fn player(&self) -> PlayerId {
        match self {
            Command::Roll { player }
            | Command::DrawTarget { player }
            | Command::DrawEvent { player }
            | Command::SaveEvent { player, .. }
            | Command::PlayEvent { player, .. }
            | Command::ChooseChallengeTarget { player, .. } => *player,
            Command::SelectActor { selector, .. } | Command::AssignActor { selector, .. } => *selector,
        }
    }

    /// Pure check against the current state.
    pub fn validate(&self, engine: &RuleEngine, state: &GameState) -> Result<(), RuleError> {
        match *self {
            Command::Roll { player } => engine.check_roll(state, player),
            Command::DrawTarget { player } => engine.check_draw_target(state, player),
            Command::DrawEvent { player } => engine.check_draw_event(state, player),
            Command::SaveEvent { player, card } => engine.check_save_event(state, player, card),
            Command::PlayEvent { player, card } => engine.check_play_event(state, player, card),
            Command::ChooseChallengeTarget { player, card } => engine.check_challenge_target(state, player, card),
            Command::SelectActor { selector, actor } => engine.check_select_actor(state, selector, actor),
            Command::AssignActor {
                selector,
                target,
                actor,
            } => engine.check_assign_actor(state, selector, target, actor),
        }
    }

    /// Applies the command. Callers run [`Command::validate`] first.
    pub fn execute(&self, engine: &mut RuleEngine, state: &mut GameState) -> Vec<GameEvent> {
        match *self {
            Command::Roll { player } => engine.apply_roll(state, player),
            Command::DrawTarget { player } => engine.apply_draw_target(state, player),
            Command::DrawEvent { player } => engine.apply_draw_event(state, player),
            Command::SaveEvent { player, card } => engine.apply_save_event(state, player, card),
            Command::PlayEvent { player, card } => engine.apply_play_event(state, player, card),
            Command::ChooseChallengeTarget { player, card } => engine.apply_challenge_target(state, player, card),
            Command::SelectActor { selector, actor } => engine.apply_select_actor(state, selector, actor),
            Command::AssignActor {
                selector,
                target,
                actor,
            } => engine.apply_assign_actor(state, selector, target, actor),
        }
    }
}

pub type ClientId = u32;

/// A command on its way to the authority, numbered per client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub client: ClientId,
    pub seq: u64,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AuthorityVerdict {
    /// Broadcast to every client; `order` is the global execution order.
    /// `faces` are the dice the authority rolled for the command and
    /// `digest` is its snapshot digest afterwards.
    Accepted {
        order: u64,
        client: ClientId,
        seq: u64,
        command: Command,
        #[serde(default)]
        faces: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        digest: Option<u64>,
    },
    /// Sent back to the submitting client only.
    Rejected { client: ClientId, seq: u64, error: RuleError },
}

/// Transport between a client processor and the authority.
pub trait AuthorityLink {
    fn client(&self) -> ClientId;
    fn send(&mut self, envelope: CommandEnvelope);
    fn poll(&mut self) -> Vec<AuthorityVerdict>;
}

pub enum ProcessorMode {
    Local,
    Networked(Box<dyn AuthorityLink>),
}

impl std::fmt::Debug for ProcessorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorMode::Local => f.write_str("Local"),
            ProcessorMode::Networked(link) => f.debug_tuple("Networked").field(&link.client()).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Applied { events: Vec<GameEvent> },
    Queued { seq: u64 },
}

/// Why a replica no longer matches the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desync {
    /// The authority accepted a command this replica refuses.
    Rejected(RuleError),
    /// Both sides applied the command but ended in different states.
    DigestMismatch { expected: u64, actual: u64 },
}

/// What a [`CommandProcessor::pump`] did with one verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Applied { order: u64, events: Vec<GameEvent> },
    Rejected { seq: u64, error: RuleError },
    Desynced { order: u64, reason: Desync },
}

/// An accepted verdict waiting for its turn in the global order.
#[derive(Debug, Clone)]
struct AcceptedCommand {
    client: ClientId,
    seq: u64,
    command: Command,
    faces: Vec<u8>,
    digest: Option<u64>,
}

#[derive(Debug)]
pub struct CommandProcessor {
    mode: ProcessorMode,
    next_seq: u64,
    next_order: u64,
    pending: BTreeMap<u64, Command>,
    /// Accepted verdicts that arrived ahead of `next_order`.
    held: BTreeMap<u64, AcceptedCommand>,
    replay: ReplayLog,
}

impl CommandProcessor {
    pub fn local(game: &Match) -> Self {
        Self::with_mode(game, ProcessorMode::Local)
    }

    pub fn networked(game: &Match, link: Box<dyn AuthorityLink>) -> Self {
        Self::with_mode(game, ProcessorMode::Networked(link))
    }

    fn with_mode(game: &Match, mode: ProcessorMode) -> Self {
        Self {
            mode,
            next_seq: 0,
            next_order: 0,
            pending: BTreeMap::new(),
            held: BTreeMap::new(),
            replay: ReplayLog::for_match(game),
        }
    }

    pub fn replay(&self) -> &ReplayLog {
        &self.replay
    }

    /// Continues recording onto an existing log, e.g. after [`Match::replay`].
    pub fn adopt(&mut self, log: ReplayLog) {
        self.replay = log;
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Local mode runs the command now. Networked mode checks it against the
    /// local replica, sends it and leaves the replica untouched until the
    /// authority answers.
    pub fn submit(&mut self, game: &mut Match, command: Command) -> Result<Submission, RuleError> {
        match &mut self.mode {
            ProcessorMode::Local => {
                let events = game.run(&command)?;
                self.replay.record(command);
                Ok(Submission::Applied { events })
            }
            ProcessorMode::Networked(link) => {
                game.validate(&command)?;
                let seq = self.next_seq;
                self.next_seq += 1;
                let client = link.client();
                link.send(CommandEnvelope {
                    client,
                    seq,
                    command: command.clone(),
                });
                self.pending.insert(seq, command);
                Ok(Submission::Queued { seq })
            }
        }
    }

    /// Applies verdicts from the authority strictly in execution order.
    /// Verdicts past a gap are held until the missing ones arrive. Each
    /// accepted command is replayed with the authority's dice faces and
    /// checked against its digest.
    pub fn pump(&mut self, game: &mut Match) -> Vec<Resolved> {
        let ProcessorMode::Networked(link) = &mut self.mode else {
            return Vec::new();
        };
        let own = link.client();
        let verdicts = link.poll();

        let mut rejected = Vec::new();
        for verdict in verdicts {
            match verdict {
                AuthorityVerdict::Accepted {
                    order,
                    client,
                    seq,
                    command,
                    faces,
                    digest,
                } => {
                    if order < self.next_order {
                        debug!(order, "verdict already applied");
                        continue;
                    }
                    self.held.insert(
                        order,
                        AcceptedCommand {
                            client,
                            seq,
                            command,
                            faces,
                            digest,
                        },
                    );
                }
                AuthorityVerdict::Rejected { client, seq, error } => {
                    if client != own {
                        continue;
                    }
                    self.pending.remove(&seq);
                    debug!(seq, %error, "command rejected by authority");
                    rejected.push(Resolved::Rejected { seq, error });
                }
            }
        }

        let mut resolved = Vec::new();
        while let Some(accepted) = self.held.remove(&self.next_order) {
            let order = self.next_order;
            self.next_order += 1;
            resolved.push(self.apply_accepted(game, own, order, accepted));
        }
        if let Some(next) = self.held.keys().next() {
            debug!(
                expected = self.next_order,
                next = *next,
                held = self.held.len(),
                "verdict stream has a gap"
            );
        }
        resolved.extend(rejected);
        resolved
    }

    fn apply_accepted(&mut self, game: &mut Match, own: ClientId, order: u64, accepted: AcceptedCommand) -> Resolved {
        if accepted.client == own {
            self.pending.remove(&accepted.seq);
        }
        let events = match game.run_with_faces(&accepted.command, &accepted.faces) {
            Ok((events, _)) => events,
            Err(error) => {
                warn!(order, %error, "authority accepted a command this replica rejects");
                return Resolved::Desynced {
                    order,
                    reason: Desync::Rejected(error),
                };
            }
        };
        self.replay.record(accepted.command);

        if let Some(expected) = accepted.digest {
            match game.snapshot().digest() {
                Ok(actual) if actual != expected => {
                    warn!(order, expected, actual, "replica state diverged from the authority");
                    return Resolved::Desynced {
                        order,
                        reason: Desync::DigestMismatch { expected, actual },
                    };
                }
                Ok(_) => {}
                Err(error) => warn!(order, %error, "replica state could not be digested"),
            }
        }
        Resolved::Applied { order, events }
    }
}

type Inbox = Rc<RefCell<VecDeque<AuthorityVerdict>>>;

/// Host side: owns the authoritative match and decides command order.
pub struct Authority {
    game: Match,
    replay: ReplayLog,
    next_order: u64,
    next_client: ClientId,
    clients: BTreeMap<ClientId, Inbox>,
}

impl Authority {
    pub fn new(game: Match) -> Self {
        let replay = ReplayLog::for_match(&game);
        Self {
            game,
            replay,
            next_order: 0,
            next_client: 0,
            clients: BTreeMap::new(),
        }
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Match {
        &mut self.game
    }

    pub fn replay(&self) -> &ReplayLog {
        &self.replay
    }

    /// Registers an in-process client on a shared authority.
    pub fn connect(authority: &Rc<RefCell<Authority>>) -> LoopbackLink {
        let mut host = authority.borrow_mut();
        let client = host.next_client;
        host.next_client += 1;
        let inbox: Inbox = Rc::default();
        host.clients.insert(client, Rc::clone(&inbox));
        LoopbackLink {
            client,
            authority: Rc::clone(authority),
            inbox,
        }
    }

    /// Runs the command on the authoritative match and routes the verdict.
    pub fn receive(&mut self, envelope: CommandEnvelope) -> AuthorityVerdict {
        let CommandEnvelope { client, seq, command } = envelope;
        let verdict = match self.game.run_with_faces(&command, &[]) {
            Ok((_, faces)) => {
                let order = self.next_order;
                self.next_order += 1;
                self.replay.record(command.clone());
                let digest = match self.game.snapshot().digest() {
                    Ok(digest) => Some(digest),
                    Err(error) => {
                        warn!(order, %error, "authority state could not be digested");
                        None
                    }
                };
                AuthorityVerdict::Accepted {
                    order,
                    client,
                    seq,
                    command,
                    faces,
                    digest,
                }
            }
            Err(error) => AuthorityVerdict::Rejected { client, seq, error },
        };

        match &verdict {
            AuthorityVerdict::Accepted { .. } => {
                for inbox in self.clients.values() {
                    inbox.borrow_mut().push_back(verdict.clone());
                }
            }
            AuthorityVerdict::Rejected { .. } => {
                if let Some(inbox) = self.clients.get(&client) {
                    inbox.borrow_mut().push_back(verdict.clone());
                }
            }
        }
        verdict
    }
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("game", &self.game)
            .field("next_order", &self.next_order)
            .field("clients", &self.clients.len())
            .finish()
    }
}

/// In-process link: sends go straight to the shared authority, verdicts
/// wait in this client's inbox until polled.
pub struct LoopbackLink {
    client: ClientId,
    authority: Rc<RefCell<Authority>>,
    inbox: Inbox,
}

impl AuthorityLink for LoopbackLink {
    fn client(&self) -> ClientId {
        self.client
    }

    fn send(&mut self, envelope: CommandEnvelope) {
        self.authority.borrow_mut().receive(envelope);
    }

    fn poll(&mut self) -> Vec<AuthorityVerdict> {
        self.inbox.borrow_mut().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::sample_definitions;
    use crate::game::config::MatchConfig;
    use crate::game::dice::ScriptedDice;
    use crate::game::state::GamePhase;

    fn new_match() -> Match {
        Match::new(&sample_definitions(), MatchConfig::default().with_seed(7), &[0, 1]).expect("match should build")
    }

    #[test]
    fn commands_serialize_with_type_tag() {
        let command = Command::AssignActor {
            selector: 0,
            target: 1,
            actor: 30,
        };
        let json = serde_json::to_string(&command).expect("command should serialize");
        assert!(json.contains("\"type\":\"AssignActor\""));
        let back: Command = serde_json::from_str(&json).expect("command should deserialize");
        assert_eq!(back, command);
        assert_eq!(back.player(), 0);
    }

    #[test]
    fn local_processor_applies_and_records() {
        let mut game = new_match();
        game.start();
        let mut processor = CommandProcessor::local(&game);
        let submission = processor
            .submit(&mut game, Command::Roll { player: 0 })
            .expect("roll should be accepted");
        assert!(matches!(submission, Submission::Applied { ref events } if !events.is_empty()));
        assert_eq!(processor.replay().commands, vec![Command::Roll { player: 0 }]);

        let rejected = processor.submit(&mut game, Command::Roll { player: 0 });
        assert_eq!(rejected, Err(RuleError::NotPlayerTurn { player: 0 }));
        assert_eq!(processor.replay().commands.len(), 1);
    }

    #[test]
    fn networked_replicas_follow_the_authority() {
        let mut host_match = new_match();
        host_match.start();
        let authority = Rc::new(RefCell::new(Authority::new(host_match)));

        let mut replicas: Vec<(Match, CommandProcessor)> = (0..2)
            .map(|_| {
                let mut game = new_match();
                game.start();
                let link = Authority::connect(&authority);
                let processor = CommandProcessor::networked(&game, Box::new(link));
                (game, processor)
            })
            .collect();

        for player in [0, 1] {
            let (game, processor) = &mut replicas[usize::from(player)];
            let submission = processor
                .submit(game, Command::Roll { player })
                .expect("roll should pass local validation");
            assert!(matches!(submission, Submission::Queued { .. }));
            assert_eq!(processor.pending(), 1);
            for (game, processor) in replicas.iter_mut() {
                for resolved in processor.pump(game) {
                    assert!(matches!(resolved, Resolved::Applied { .. }));
                }
            }
        }

        let host_state = authority.borrow().game().state().clone();
        for (game, processor) in &replicas {
            assert_eq!(game.state(), &host_state);
            assert_eq!(processor.pending(), 0);
            assert_eq!(processor.replay().commands.len(), 2);
        }
        assert!(!host_state.event_log.is_empty());
    }

    #[test]
    fn stale_command_is_rejected_by_the_authority() {
        let mut host_match = new_match();
        host_match.start();
        let authority = Rc::new(RefCell::new(Authority::new(host_match)));

        let mut game = new_match();
        game.start();
        let mut processor = CommandProcessor::networked(&game, Box::new(Authority::connect(&authority)));

        // Both commands look legal to the replica until the first is applied.
        processor
            .submit(&mut game, Command::Roll { player: 0 })
            .expect("first roll should queue");
        processor
            .submit(&mut game, Command::Roll { player: 0 })
            .expect("second roll should queue");

        let resolved = processor.pump(&mut game);
        assert!(matches!(resolved[0], Resolved::Applied { order: 0, .. }));
        assert!(matches!(
            resolved[1],
            Resolved::Rejected {
                seq: 1,
                error: RuleError::NotPlayerTurn { player: 0 }
            }
        ));
        assert_eq!(game.state(), authority.borrow().game().state());
        assert_eq!(game.state().phase, GamePhase::Setup);
    }

    /// Delivers prepared verdict batches, one per poll.
    struct ScriptedLink {
        batches: VecDeque<Vec<AuthorityVerdict>>,
    }

    impl AuthorityLink for ScriptedLink {
        fn client(&self) -> ClientId {
            99
        }

        fn send(&mut self, _envelope: CommandEnvelope) {}

        fn poll(&mut self) -> Vec<AuthorityVerdict> {
            self.batches.pop_front().unwrap_or_default()
        }
    }

    fn scripted_match(faces: impl IntoIterator<Item = u8>) -> Match {
        let mut game = Match::with_dice(
            &sample_definitions(),
            MatchConfig::default().with_seed(7),
            &[0, 1],
            Box::new(ScriptedDice::new(faces)),
        )
        .expect("match should build");
        game.start();
        game
    }

    fn envelope(seq: u64, player: PlayerId) -> CommandEnvelope {
        CommandEnvelope {
            client: 0,
            seq,
            command: Command::Roll { player },
        }
    }

    #[test]
    fn replica_rolls_the_authority_faces() {
        let authority = Rc::new(RefCell::new(Authority::new(scripted_match([6]))));
        let mut replica = scripted_match([1]);
        let mut processor = CommandProcessor::networked(&replica, Box::new(Authority::connect(&authority)));

        processor
            .submit(&mut replica, Command::Roll { player: 0 })
            .expect("roll should queue");
        let resolved = processor.pump(&mut replica);

        assert!(matches!(resolved[..], [Resolved::Applied { order: 0, .. }]));
        assert_eq!(replica.state().setup.rolls.get(&0), Some(&6));
        assert_eq!(replica.state(), authority.borrow().game().state());
    }

    #[test]
    fn verdicts_after_a_gap_wait_for_the_missing_order() {
        let mut authority = Authority::new(scripted_match([2, 5]));
        let first = authority.receive(envelope(0, 0));
        let second = authority.receive(envelope(1, 1));

        let mut replica = scripted_match([]);
        let before = replica.state().clone();
        let link = ScriptedLink {
            batches: VecDeque::from([vec![second], vec![first]]),
        };
        let mut processor = CommandProcessor::networked(&replica, Box::new(link));

        assert!(processor.pump(&mut replica).is_empty());
        assert_eq!(replica.state(), &before);

        let resolved = processor.pump(&mut replica);
        assert!(matches!(
            resolved[..],
            [Resolved::Applied { order: 0, .. }, Resolved::Applied { order: 1, .. }]
        ));
        assert_eq!(replica.state(), authority.game().state());
        assert_eq!(processor.replay().commands, authority.replay().commands);
    }

    #[test]
    fn digest_mismatch_is_reported_as_desync() {
        let mut authority = Authority::new(scripted_match([4]));
        let verdict = match authority.receive(envelope(0, 0)) {
            AuthorityVerdict::Accepted {
                order,
                client,
                seq,
                command,
                faces,
                digest,
            } => AuthorityVerdict::Accepted {
                order,
                client,
                seq,
                command,
                faces,
                digest: digest.map(|digest| digest ^ 1),
            },
            other => panic!("roll should be accepted, got {other:?}"),
        };

        let mut replica = scripted_match([]);
        let link = ScriptedLink {
            batches: VecDeque::from([vec![verdict]]),
        };
        let mut processor = CommandProcessor::networked(&replica, Box::new(link));
        let resolved = processor.pump(&mut replica);
        assert!(matches!(
            resolved[..],
            [Resolved::Desynced {
                order: 0,
                reason: Desync::DigestMismatch { .. }
            }]
        ));
    }
}
