//! The hub: a single task that owns the registry of live sessions and routes
//! freshly stored messages to the recipient's session, if there is one.
//!
//! All registry access goes through one command queue consumed by one loop,
//! so the map needs no lock. Delivery is a `try_send` into a bounded
//! per-client queue; a client whose queue is full or closed is evicted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rapport_db::{Database, DbError};
use rapport_types::models::{Connection, Message, UserId};

/// Resolves a connection id to its two members. Implemented by the store;
/// tests can substitute their own.
pub trait ConnectionLookup: Send + Sync + 'static {
    fn connection(&self, connection_id: i64) -> Result<Option<Connection>, DbError>;
}

impl ConnectionLookup for Database {
    fn connection(&self, connection_id: i64) -> Result<Option<Connection>, DbError> {
        self.get_connection(connection_id)
    }
}

/// Identifies one live session. A user reconnecting gets a new `client_id`,
/// so a late unregister from the old session cannot evict the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientKey {
    pub user_id: UserId,
    pub client_id: Uuid,
}

/// The hub's end of a session: the sending half of its outbound queue.
/// The hub holds the only sender, so dropping the client closes the queue.
#[derive(Debug)]
pub struct HubClient {
    key: ClientKey,
    outbound: mpsc::Sender<Message>,
}

impl HubClient {
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let client = Self {
            key: ClientKey {
                user_id,
                client_id: Uuid::new_v4(),
            },
            outbound,
        };
        (client, rx)
    }

    pub fn key(&self) -> ClientKey {
        self.key
    }
}

enum Command {
    Register(HubClient),
    Unregister(ClientKey),
    Route(Message),
    IsOnline(UserId, oneshot::Sender<bool>),
}

/// Cheap, cloneable handle to the hub loop.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
}

impl Hub {
    /// Start the hub loop. It runs until `shutdown` is cancelled or every
    /// handle has been dropped.
    pub fn spawn<L: ConnectionLookup>(lookup: Arc<L>, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = HubLoop {
            clients: HashMap::new(),
            lookup,
        };
        let handle = tokio::spawn(task.run(rx, shutdown));
        (Self { commands }, handle)
    }

    /// Make `client` the live session for its user, replacing any previous one.
    pub fn register(&self, client: HubClient) {
        self.send(Command::Register(client));
    }

    pub fn unregister(&self, key: ClientKey) {
        self.send(Command::Unregister(key));
    }

    /// Hand a persisted message to the hub for live delivery. Never blocks;
    /// an offline recipient simply reads it from history later.
    pub fn route(&self, message: Message) {
        self.send(Command::Route(message));
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        let (tx, rx) = oneshot::channel();
        self.send(Command::IsOnline(user_id, tx));
        rx.await.unwrap_or(false)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Hub is not running, command dropped");
        }
    }
}

struct HubLoop<L> {
    clients: HashMap<UserId, HubClient>,
    lookup: Arc<L>,
}

impl<L: ConnectionLookup> HubLoop<L> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
        info!("Hub started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        // Dropping the clients closes every outbound queue.
        let sessions = self.clients.len();
        self.clients.clear();
        info!("Hub stopped ({} sessions closed)", sessions);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Register(client) => {
                let key = client.key;
                if self.clients.insert(key.user_id, client).is_some() {
                    debug!("User {} re-registered, previous session replaced", key.user_id);
                } else {
                    debug!("User {} registered", key.user_id);
                }
            }
            Command::Unregister(key) => {
                let current = self
                    .clients
                    .get(&key.user_id)
                    .is_some_and(|c| c.key.client_id == key.client_id);
                if current {
                    self.clients.remove(&key.user_id);
                    debug!("User {} unregistered", key.user_id);
                }
            }
            Command::Route(message) => self.route(message).await,
            Command::IsOnline(user_id, reply) => {
                let _ = reply.send(self.clients.contains_key(&user_id));
            }
        }
    }

    async fn route(&mut self, message: Message) {
        let lookup = self.lookup.clone();
        let connection_id = message.connection_id;
        let connection = match tokio::task::spawn_blocking(move || lookup.connection(connection_id)).await {
            Ok(Ok(Some(connection))) => connection,
            Ok(Ok(None)) => {
                warn!("Message {} references unknown connection {}", message.id, connection_id);
                return;
            }
            Ok(Err(e)) => {
                warn!("Error finding connection {}: {}", connection_id, e);
                return;
            }
            Err(e) => {
                warn!("Connection lookup task failed: {}", e);
                return;
            }
        };

        let recipient = connection.counterpart(message.sender_id);
        let Some(client) = self.clients.get(&recipient) else {
            debug!("User {} offline, message {} left in history", recipient, message.id);
            return;
        };

        let message_id = message.id;
        if let Err(e) = client.outbound.try_send(message) {
            warn!(
                "Evicting user {} session, delivery of message {} failed: {}",
                recipient, message_id, e
            );
            self.clients.remove(&recipient);
        }
    }
}
