//! Relay engine - one actor per lieutenant
//!
//! Each lieutenant owns its inbox and its received log. On every message it
//! passes the order on to each lieutenant not yet on the message's path,
//! lying according to the corruption policy if it is a traitor, until the
//! path reaches the recursion limit. Frames are encoded with borsh and go
//! through bounded mpsc inboxes sized so a send never has to wait.

use crate::config::{SettleStrategy, SimulationConfig};
use crate::error::{ProtocolError, SimulationError};
use crate::policy::CorruptionPolicy;
use crate::types::{LieutenantReport, ParticipantId, ReceivedLog, RelayMessage, RelayStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Receiving end of a lieutenant's inbox
pub type Inbox = mpsc::Receiver<Vec<u8>>;

/// Send handles for every lieutenant's inbox
#[derive(Debug)]
pub struct Peers {
    /// Index i holds the inbox of lieutenant i + 1
    senders: Vec<mpsc::Sender<Vec<u8>>>,
}

impl Peers {
    /// Create one inbox per lieutenant, returning the receivers in id order
    pub fn new(num_lieutenants: usize, capacity: usize) -> (Self, Vec<Inbox>) {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..num_lieutenants)
            .map(|_| mpsc::channel(capacity.max(1)))
            .unzip();
        (Self { senders }, inboxes)
    }

    /// Lieutenant ids reachable through these handles
    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        (1..=self.senders.len()).map(|id| id as ParticipantId)
    }

    /// Queue a frame for `to` without waiting.
    ///
    /// Returns `false` if `to` has already settled and dropped its inbox.
    pub fn deliver(&self, to: ParticipantId, frame: Vec<u8>) -> Result<bool, ProtocolError> {
        let sender = usize::from(to)
            .checked_sub(1)
            .and_then(|i| self.senders.get(i))
            .ok_or(ProtocolError::UnknownParticipant(to))?;

        match sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Err(ProtocolError::InboxFull(to)),
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Lieutenant {} already settled, frame dropped", to);
                Ok(false)
            }
        }
    }
}

/// A single lieutenant actor
pub struct RelayEngine {
    id: ParticipantId,
    is_traitor: bool,
    inbox: Inbox,
    peers: Arc<Peers>,
    corruption: Arc<dyn CorruptionPolicy>,
    num_participants: usize,
    max_path_len: usize,
    settle: SettleStrategy,
    expected: usize,
    quiescence: Duration,
    initial_timeout: Duration,
    log: ReceivedLog,
    stats: RelayStats,
}

impl RelayEngine {
    pub fn new(
        id: ParticipantId,
        is_traitor: bool,
        inbox: Inbox,
        peers: Arc<Peers>,
        corruption: Arc<dyn CorruptionPolicy>,
        config: &SimulationConfig,
    ) -> Self {
        Self {
            id,
            is_traitor,
            inbox,
            peers,
            corruption,
            num_participants: config.num_participants,
            max_path_len: config.max_path_len(),
            settle: config.settle,
            expected: config.inbox_capacity(),
            quiescence: config.quiescence,
            initial_timeout: config.initial_timeout,
            log: ReceivedLog::new(),
            stats: RelayStats::default(),
        }
    }

    /// Relay until traffic settles, then hand back the frozen log
    pub async fn run(mut self) -> Result<LieutenantReport, SimulationError> {
        loop {
            if self.settle == SettleStrategy::ExpectedCount && self.log.len() >= self.expected {
                break;
            }

            let window = if self.log.is_empty() {
                self.initial_timeout
            } else {
                self.quiescence
            };

            match tokio::time::timeout(window, self.inbox.recv()).await {
                Ok(Some(frame)) => {
                    if let Err(e) = self.handle_frame(&frame) {
                        tracing::error!("Lieutenant {} cannot process relay frame: {}", self.id, e);
                        return Err(SimulationError::Protocol {
                            lieutenant: self.id,
                            source: e,
                        });
                    }
                }
                Ok(None) => {
                    tracing::debug!("Lieutenant {} inbox closed", self.id);
                    break;
                }
                Err(_) => {
                    if self.settle == SettleStrategy::ExpectedCount {
                        tracing::warn!(
                            "Lieutenant {} timed out after {} of {} messages",
                            self.id,
                            self.log.len(),
                            self.expected
                        );
                    }
                    break;
                }
            }
        }

        tracing::debug!(
            "Lieutenant {} settled: {} received, {} relayed, {} corrupted",
            self.id,
            self.stats.messages_received,
            self.stats.messages_relayed,
            self.stats.messages_corrupted
        );

        Ok(LieutenantReport {
            lieutenant: self.id,
            is_traitor: self.is_traitor,
            log: self.log,
            stats: self.stats,
        })
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        let msg = RelayMessage::from_bytes(frame)?;
        msg.path
            .validate(self.id, self.num_participants, self.max_path_len)?;
        self.stats.messages_received += 1;

        tracing::trace!(
            "Lieutenant {} received {} via {} ({} so far)",
            self.id,
            msg.order,
            msg.path,
            self.log.len() + 1
        );

        if msg.path.len() < self.max_path_len {
            self.relay(&msg)?;
        }
        self.log.push(msg);
        Ok(())
    }

    fn relay(&mut self, msg: &RelayMessage) -> Result<(), ProtocolError> {
        let peers = Arc::clone(&self.peers);
        for peer in peers.ids() {
            if peer == self.id || msg.path.contains(peer) {
                continue;
            }

            let order = if self.is_traitor {
                self.corruption.corrupt(msg.order, peer)
            } else {
                msg.order
            };
            if peers.deliver(peer, msg.relayed(order, self.id).to_bytes())? {
                self.stats.messages_relayed += 1;
                if order != msg.order {
                    self.stats.messages_corrupted += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfigBuilder;
    use crate::policy::EvenRecipientFlip;
    use crate::types::Order;

    fn config(m: usize, n: usize) -> SimulationConfig {
        SimulationConfigBuilder::new()
            .recursion_bound(m)
            .num_participants(n)
            .quiescence(Duration::from_millis(50))
            .initial_timeout(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    fn engine(id: ParticipantId, traitor: bool, config: &SimulationConfig) -> (RelayEngine, Vec<Inbox>) {
        let (peers, mut inboxes) = Peers::new(config.num_lieutenants(), config.inbox_capacity());
        let inbox = inboxes.remove(usize::from(id) - 1);
        let engine = RelayEngine::new(
            id,
            traitor,
            inbox,
            Arc::new(peers),
            Arc::new(EvenRecipientFlip),
            config,
        );
        (engine, inboxes)
    }

    fn drain(inbox: &mut Inbox) -> Vec<RelayMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = inbox.try_recv() {
            out.push(RelayMessage::from_bytes(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_loyal_relay_fans_out() {
        let config = config(1, 4);
        let (engine, mut others) = engine(1, false, &config);
        engine
            .peers
            .deliver(1, RelayMessage::from_commander(Order::Affirm).to_bytes())
            .unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.log.len(), 1);
        assert_eq!(report.stats.messages_relayed, 2);
        assert_eq!(report.stats.messages_corrupted, 0);

        for inbox in others.iter_mut() {
            let got = drain(inbox);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].order, Order::Affirm);
            assert_eq!(got[0].path.hops(), &[0, 1]);
        }
    }

    #[tokio::test]
    async fn test_traitor_lies_to_even_recipients() {
        let config = config(1, 5);
        let (engine, mut others) = engine(1, true, &config);
        engine
            .peers
            .deliver(1, RelayMessage::from_commander(Order::Affirm).to_bytes())
            .unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.stats.messages_relayed, 3);
        assert_eq!(report.stats.messages_corrupted, 2);

        // others holds lieutenants 2, 3, 4
        assert_eq!(drain(&mut others[0])[0].order, Order::Retreat);
        assert_eq!(drain(&mut others[1])[0].order, Order::Affirm);
        assert_eq!(drain(&mut others[2])[0].order, Order::Retreat);
    }

    #[tokio::test]
    async fn test_recursion_limit_stops_relay() {
        let config = config(1, 4);
        let (engine, mut others) = engine(2, false, &config);
        let relayed = RelayMessage::from_commander(Order::Retreat).relayed(Order::Retreat, 1);
        engine.peers.deliver(2, relayed.to_bytes()).unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.log.len(), 1);
        assert_eq!(report.stats.messages_relayed, 0);
        assert!(others.iter_mut().all(|inbox| drain(inbox).is_empty()));
    }

    #[tokio::test]
    async fn test_skips_participants_on_path() {
        let config = config(2, 5);
        let (engine, mut others) = engine(3, false, &config);
        let msg = RelayMessage::from_commander(Order::Affirm).relayed(Order::Affirm, 1);
        engine.peers.deliver(3, msg.to_bytes()).unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.stats.messages_relayed, 2);

        // others holds lieutenants 1, 2, 4
        assert!(drain(&mut others[0]).is_empty());
        assert_eq!(drain(&mut others[1])[0].path.hops(), &[0, 1, 3]);
        assert_eq!(drain(&mut others[2])[0].path.hops(), &[0, 1, 3]);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_fatal() {
        let config = config(1, 4);
        let (engine, _others) = engine(1, false, &config);
        engine.peers.deliver(1, vec![0, 3, 0, 0, 0, 0, 0, 1]).unwrap();

        let err = engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Protocol {
                lieutenant: 1,
                source: ProtocolError::MalformedToken { len: 3 }
            }
        ));
    }

    #[tokio::test]
    async fn test_repeated_hop_is_fatal() {
        let config = config(2, 5);
        let (engine, _others) = engine(1, false, &config);
        let looped = RelayMessage::from_commander(Order::Affirm)
            .relayed(Order::Affirm, 2)
            .relayed(Order::Affirm, 2);
        engine.peers.deliver(1, looped.to_bytes()).unwrap();

        assert!(matches!(
            engine.run().await,
            Err(SimulationError::Protocol {
                source: ProtocolError::RepeatedHop(2),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_settles_on_silence() {
        let config = config(1, 4);
        let (engine, _others) = engine(1, false, &config);
        let report = engine.run().await.unwrap();
        assert!(report.log.is_empty());
    }

    #[test]
    fn test_deliver_to_unknown_lieutenant() {
        let (peers, _inboxes) = Peers::new(3, 4);
        assert_eq!(
            peers.deliver(0, Vec::new()),
            Err(ProtocolError::UnknownParticipant(0))
        );
        assert_eq!(
            peers.deliver(4, Vec::new()),
            Err(ProtocolError::UnknownParticipant(4))
        );
    }

    #[test]
    fn test_deliver_full_and_closed() {
        let (peers, mut inboxes) = Peers::new(2, 1);
        assert_eq!(peers.deliver(1, vec![1]), Ok(true));
        assert_eq!(peers.deliver(1, vec![2]), Err(ProtocolError::InboxFull(1)));

        drop(inboxes.pop());
        assert_eq!(peers.deliver(2, vec![3]), Ok(false));
    }

    #[tokio::test]
    async fn test_lies_to_settled_peers_are_not_counted() {
        let config = config(1, 5);
        let (engine, mut others) = engine(1, true, &config);
        engine
            .peers
            .deliver(1, RelayMessage::from_commander(Order::Affirm).to_bytes())
            .unwrap();
        // lieutenant 4 settled and dropped its inbox
        drop(others.pop());

        let report = engine.run().await.unwrap();
        assert_eq!(report.stats.messages_relayed, 2);
        assert_eq!(report.stats.messages_corrupted, 1);
        assert_eq!(drain(&mut others[0])[0].order, Order::Retreat);
        assert_eq!(drain(&mut others[1])[0].order, Order::Affirm);
    }
}
