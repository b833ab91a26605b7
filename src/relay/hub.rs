//! Signaling relay.
//!
//! [`Relay`] holds the whole relay state: the live transport connections
//! with their outbound channels, plus the [`ConnectionRegistry`]. It is owned
//! by a single task spawned through [`spawn`]; sockets reach it only through a
//! [`RelayHandle`], so commands are applied one at a time and in the order
//! each socket submitted them.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::protocol::{ClientEvent, ServerEvent};
use super::registry::{ConnectionId, ConnectionRegistry, PeerEntry};

pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Commands accepted by the relay task.
#[derive(Debug)]
pub enum Command {
    Connect {
        conn_tx: Outbound,
        res_tx: oneshot::Sender<ConnectionId>,
    },
    Event {
        conn: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        conn: ConnectionId,
    },
    Peers {
        res_tx: oneshot::Sender<Vec<PeerEntry>>,
    },
}

#[derive(Debug, Default)]
pub struct Relay {
    connections: HashMap<ConnectionId, Outbound>,
    registry: ConnectionRegistry,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Accept a new transport connection. It starts unidentified.
    pub fn connect(&mut self, conn_tx: Outbound) -> ConnectionId {
        let conn = ConnectionId::generate();
        let _ = conn_tx.send(ServerEvent::Connected {
            connection_id: conn.clone(),
        });
        self.connections.insert(conn.clone(), conn_tx);
        info!(%conn, connections = self.connections.len(), "client connected");
        conn
    }

    /// Apply one inbound event from `conn`.
    pub fn handle(&mut self, conn: &ConnectionId, event: ClientEvent) {
        if !self.connections.contains_key(conn) {
            debug!(%conn, event = event.name(), "event from closed connection ignored");
            return;
        }

        match event {
            ClientEvent::Identify(client_id) => self.identify(conn, client_id),
            ClientEvent::NegotiationOffer { to, offer } => self.forward(
                conn,
                &to,
                ServerEvent::NegotiationOffer {
                    from: conn.clone(),
                    offer,
                },
            ),
            ClientEvent::NegotiationAnswer { to, answer } => self.forward(
                conn,
                &to,
                ServerEvent::NegotiationAnswer {
                    from: conn.clone(),
                    answer,
                },
            ),
            ClientEvent::NegotiationCandidate { to, candidate } => self.forward(
                conn,
                &to,
                ServerEvent::NegotiationCandidate {
                    from: conn.clone(),
                    candidate,
                },
            ),
            ClientEvent::CallEnded => {
                let from = self.registry.client_id(conn).map(str::to_string);
                info!(%conn, client = ?from, "call ended");
                self.broadcast_except(
                    conn,
                    ServerEvent::CallEnded {
                        from,
                        from_connection_id: conn.clone(),
                    },
                );
            }
            ClientEvent::ListPeers => {
                self.send_to(conn, ServerEvent::PeersList(self.registry.list_all()));
            }
        }
    }

    /// Drop the connection from every table and tell the remaining clients.
    pub fn disconnect(&mut self, conn: &ConnectionId) {
        if self.connections.remove(conn).is_none() {
            return;
        }
        let client = self.registry.unregister(conn);
        info!(
            %conn,
            client = ?client,
            remaining = self.registry.len(),
            "client disconnected"
        );
        self.broadcast(ServerEvent::PeerOffline(conn.clone()));
    }

    fn identify(&mut self, conn: &ConnectionId, client_id: String) {
        self.registry.register(conn.clone(), client_id.clone());
        info!(%conn, client = %client_id, "client identified");

        let existing = self.registry.list_others(conn);
        debug!(%conn, peers = existing.len(), "sending existing peers");
        self.send_to(conn, ServerEvent::ExistingPeers(existing));

        self.broadcast(ServerEvent::PeerOnline(PeerEntry {
            connection_id: conn.clone(),
            client_id,
        }));
    }

    fn forward(&self, from: &ConnectionId, to: &ConnectionId, event: ServerEvent) {
        match self.connections.get(to) {
            Some(tx) => {
                debug!(%from, %to, event = event.name(), "forwarding");
                let _ = tx.send(event);
            }
            None => debug!(%from, %to, event = event.name(), "target not connected, dropped"),
        }
    }

    fn send_to(&self, conn: &ConnectionId, event: ServerEvent) {
        if let Some(tx) = self.connections.get(conn) {
            let _ = tx.send(event);
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        for tx in self.connections.values() {
            let _ = tx.send(event.clone());
        }
    }

    fn broadcast_except(&self, skip: &ConnectionId, event: ServerEvent) {
        for (conn, tx) in &self.connections {
            if conn != skip {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { conn_tx, res_tx } => {
                let conn = self.connect(conn_tx);
                let _ = res_tx.send(conn);
            }
            Command::Event { conn, event } => self.handle(&conn, event),
            Command::Disconnect { conn } => self.disconnect(&conn),
            Command::Peers { res_tx } => {
                let _ = res_tx.send(self.registry.list_all());
            }
        }
    }

    /// Process commands until every [`RelayHandle`] is dropped.
    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = cmd_rx.recv().await {
            self.apply(cmd);
        }
        debug!("relay command channel closed");
    }
}

/// Cloneable entry point into the relay task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl RelayHandle {
    /// Register a transport connection; events for it arrive on the returned receiver.
    pub async fn connect(&self) -> Option<(ConnectionId, mpsc::UnboundedReceiver<ServerEvent>)> {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Connect { conn_tx, res_tx }).ok()?;
        let conn = res_rx.await.ok()?;
        Some((conn, conn_rx))
    }

    pub fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        let _ = self.cmd_tx.send(Command::Event { conn, event });
    }

    pub fn disconnect(&self, conn: ConnectionId) {
        let _ = self.cmd_tx.send(Command::Disconnect { conn });
    }

    /// Snapshot of identified peers. Empty if the relay task is gone.
    pub async fn peers(&self) -> Vec<PeerEntry> {
        let (res_tx, res_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Peers { res_tx }).is_err() {
            return Vec::new();
        }
        res_rx.await.unwrap_or_default()
    }
}

/// Start the relay task on the current runtime.
pub fn spawn() -> (RelayHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(Relay::new().run(cmd_rx));
    (RelayHandle { cmd_tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Client {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn join(relay: &mut Relay) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = relay.connect(tx);
        let mut client = Client { id, rx };
        assert!(matches!(
            client.drain().as_slice(),
            [ServerEvent::Connected { .. }]
        ));
        client
    }

    fn entry(client: &Client, client_id: &str) -> PeerEntry {
        PeerEntry {
            connection_id: client.id.clone(),
            client_id: client_id.to_string(),
        }
    }

    #[test]
    fn test_two_party_call_scenario() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);

        relay.handle(&a.id, ClientEvent::Identify("peerA".into()));
        let online_a = ServerEvent::PeerOnline(entry(&a, "peerA"));
        assert_eq!(
            a.drain(),
            vec![ServerEvent::ExistingPeers(vec![]), online_a.clone()]
        );
        assert_eq!(b.drain(), vec![online_a]);

        relay.handle(&b.id, ClientEvent::Identify("peerB".into()));
        let online_b = ServerEvent::PeerOnline(entry(&b, "peerB"));
        assert_eq!(
            b.drain(),
            vec![
                ServerEvent::ExistingPeers(vec![entry(&a, "peerA")]),
                online_b.clone()
            ]
        );
        assert_eq!(a.drain(), vec![online_b]);

        relay.handle(
            &a.id,
            ClientEvent::NegotiationOffer {
                to: b.id.clone(),
                offer: json!("X"),
            },
        );
        assert_eq!(
            b.drain(),
            vec![ServerEvent::NegotiationOffer {
                from: a.id.clone(),
                offer: json!("X")
            }]
        );
        assert!(a.drain().is_empty());

        relay.disconnect(&b.id);
        assert_eq!(a.drain(), vec![ServerEvent::PeerOffline(b.id.clone())]);
        assert_eq!(relay.registry().list_all(), vec![entry(&a, "peerA")]);
    }

    #[test]
    fn test_forward_reaches_only_target() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let mut c = join(&mut relay);

        relay.handle(
            &a.id,
            ClientEvent::NegotiationAnswer {
                to: c.id.clone(),
                answer: json!({"type": "answer", "sdp": "v=0"}),
            },
        );

        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert_eq!(
            c.drain(),
            vec![ServerEvent::NegotiationAnswer {
                from: a.id.clone(),
                answer: json!({"type": "answer", "sdp": "v=0"})
            }]
        );
    }

    #[test]
    fn test_forward_to_unknown_target_is_dropped() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);

        relay.handle(
            &a.id,
            ClientEvent::NegotiationOffer {
                to: "nobody".into(),
                offer: json!("X"),
            },
        );

        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_candidates_keep_arrival_order() {
        let mut relay = Relay::new();
        let a = join(&mut relay);
        let mut b = join(&mut relay);

        for n in 0..5 {
            relay.handle(
                &a.id,
                ClientEvent::NegotiationCandidate {
                    to: b.id.clone(),
                    candidate: json!(n),
                },
            );
        }

        let received: Vec<_> = b
            .drain()
            .into_iter()
            .map(|event| match event {
                ServerEvent::NegotiationCandidate { candidate, .. } => candidate,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(received, (0..5).map(|n| json!(n)).collect::<Vec<_>>());
    }

    #[test]
    fn test_call_ended_skips_sender() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let mut c = join(&mut relay);

        relay.handle(&a.id, ClientEvent::Identify("peerA".into()));
        a.drain();
        b.drain();
        c.drain();

        relay.handle(&a.id, ClientEvent::CallEnded);
        let expected = ServerEvent::CallEnded {
            from: Some("peerA".into()),
            from_connection_id: a.id.clone(),
        };
        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![expected.clone()]);
        assert_eq!(c.drain(), vec![expected]);
    }

    #[test]
    fn test_call_ended_before_identify_has_no_client_id() {
        let mut relay = Relay::new();
        let a = join(&mut relay);
        let mut b = join(&mut relay);

        relay.handle(&a.id, ClientEvent::CallEnded);
        assert_eq!(
            b.drain(),
            vec![ServerEvent::CallEnded {
                from: None,
                from_connection_id: a.id.clone()
            }]
        );
    }

    #[test]
    fn test_reidentify_overwrites() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);

        relay.handle(&a.id, ClientEvent::Identify("first".into()));
        relay.handle(&a.id, ClientEvent::Identify("second".into()));
        a.drain();

        relay.handle(&a.id, ClientEvent::ListPeers);
        assert_eq!(
            a.drain(),
            vec![ServerEvent::PeersList(vec![entry(&a, "second")])]
        );
    }

    #[test]
    fn test_list_peers_replies_only_to_requester() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        relay.handle(&b.id, ClientEvent::Identify("peerB".into()));
        a.drain();
        b.drain();

        relay.handle(&a.id, ClientEvent::ListPeers);
        assert_eq!(
            a.drain(),
            vec![ServerEvent::PeersList(vec![entry(&b, "peerB")])]
        );
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_disconnect_broadcasts_once_and_is_idempotent() {
        let mut relay = Relay::new();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let mut c = join(&mut relay);
        relay.handle(&c.id, ClientEvent::Identify("peerC".into()));
        a.drain();
        b.drain();

        relay.disconnect(&c.id);
        relay.disconnect(&c.id);

        let offline = ServerEvent::PeerOffline(c.id.clone());
        assert_eq!(a.drain(), vec![offline.clone()]);
        assert_eq!(b.drain(), vec![offline]);
        assert!(relay.registry().is_empty());
        assert_eq!(relay.connection_count(), 2);
        assert!(c.drain().iter().all(|e| !matches!(e, ServerEvent::PeerOffline(_))));
    }

    #[test]
    fn test_unidentified_disconnect_still_announced() {
        let mut relay = Relay::new();
        let a = join(&mut relay);
        let mut b = join(&mut relay);

        relay.disconnect(&a.id);
        assert_eq!(b.drain(), vec![ServerEvent::PeerOffline(a.id.clone())]);
    }

    #[test]
    fn test_events_after_disconnect_are_ignored() {
        let mut relay = Relay::new();
        let a = join(&mut relay);
        let mut b = join(&mut relay);
        relay.disconnect(&a.id);
        b.drain();

        relay.handle(&a.id, ClientEvent::Identify("ghost".into()));
        assert!(relay.registry().is_empty());
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_list_all_tracks_latest_identity() {
        let mut relay = Relay::new();
        let a = join(&mut relay);
        let b = join(&mut relay);
        let c = join(&mut relay);

        relay.handle(&a.id, ClientEvent::Identify("a1".into()));
        relay.handle(&b.id, ClientEvent::Identify("b1".into()));
        relay.handle(&a.id, ClientEvent::Identify("a2".into()));
        relay.handle(&c.id, ClientEvent::Identify("c1".into()));
        relay.disconnect(&c.id);

        let mut all = relay.registry().list_all();
        all.sort_by(|x, y| x.connection_id.cmp(&y.connection_id));
        let mut expected = vec![entry(&a, "a2"), entry(&b, "b1")];
        expected.sort_by(|x, y| x.connection_id.cmp(&y.connection_id));
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_handle_round_trip_through_task() {
        let (relay, task) = spawn();

        let (a, mut a_rx) = relay.connect().await.unwrap();
        assert_eq!(
            a_rx.recv().await,
            Some(ServerEvent::Connected {
                connection_id: a.clone()
            })
        );

        relay.dispatch(a.clone(), ClientEvent::Identify("peerA".into()));
        assert_eq!(a_rx.recv().await, Some(ServerEvent::ExistingPeers(vec![])));

        let peers = relay.peers().await;
        assert_eq!(
            peers,
            vec![PeerEntry {
                connection_id: a.clone(),
                client_id: "peerA".into()
            }]
        );

        relay.disconnect(a);
        assert!(relay.peers().await.is_empty());

        drop(relay);
        task.await.unwrap();
    }
}
