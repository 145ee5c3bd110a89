//! Connection to a matchmaking server
//!
//! [`Connection`] is the public operation surface. Every operation checks the
//! session state first and fails with [`Error::WrongState`] without touching
//! the network. Commands are written by a dedicated writer task and the caller
//! then waits for the receive loop to deposit the matching reply.

use std::sync::Arc;
use std::time::Duration;

use lobby_core::{
    is_valid_message, is_valid_nickname, ClientConfig, ConnectionState, Message, MessageId,
    Player, PlayerId, TransportKind,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{encode_request, parse_reply, Command, Reply, ServerMessage};
use crate::receiver::{receive_loop, Shared};
use crate::session::Session;
use crate::transport::{TcpTransport, Transport, TransportWriter, WsTransport};

/// Outbound frames buffered ahead of the writer task
const OUTBOUND_BUFFER: usize = 64;

/// Upper bound on ending a running game during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A frame queued for the writer task, with a slot for the write result
struct Outbound {
    frame: String,
    done: oneshot::Sender<Result<()>>,
}

/// Client handle for a single server connection
pub struct Connection {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Outbound>,
    request_timeout: Option<Duration>,
    stop_tx: Option<oneshot::Sender<()>>,
    receiver: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Connect to the server named in `config` using its transport kind
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        match config.transport {
            TransportKind::WebSocket => {
                let url = config.websocket_url();
                info!(url = %url, "Connecting to server");
                let transport = WsTransport::connect(&url).await?;
                Ok(Self::with_transport(transport, config))
            }
            TransportKind::Tcp => {
                let addr = config.address();
                info!(addr = %addr, "Connecting to server");
                let transport = TcpTransport::connect(&addr).await?;
                Ok(Self::with_transport(transport, config))
            }
        }
    }

    /// Run the connection engine over an already established transport
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport<T: Transport>(transport: T, config: &ClientConfig) -> Self {
        let (reader, writer) = transport.split();
        let shared = Arc::new(Shared::new(Session::new(config.keep_history)));

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();

        let writer = tokio::spawn(writer_task(writer, outbound_rx, shared.clone()));
        let receiver = tokio::spawn(receive_loop(reader, shared.clone(), stop_rx));

        debug!("Connection established");

        Connection {
            shared,
            outbound,
            request_timeout: config.request_timeout(),
            stop_tx: Some(stop_tx),
            receiver: Some(receiver),
            writer: Some(writer),
        }
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        self.shared.session.read().await.state()
    }

    /// Get the id the server assigned to this player
    pub async fn id(&self) -> Result<PlayerId> {
        self.shared
            .session
            .read()
            .await
            .require_registered()
            .cloned()
    }

    /// Get the current opponent
    pub async fn opponent(&self) -> Result<PlayerId> {
        let session = self.shared.session.read().await;
        session.require(ConnectionState::InGame)?;
        session
            .opponent()
            .cloned()
            .ok_or_else(|| Error::Protocol("In game without an opponent".into()))
    }

    /// Register a nickname and start searching for an opponent
    pub async fn register(&self, nickname: &str) -> Result<PlayerId> {
        self.require(ConnectionState::Registration).await?;
        if !is_valid_nickname(nickname) {
            return Err(Error::InvalidNickname(nickname.to_string()));
        }

        let mut updates = self.shared.subscribe();
        if let Some(ServerMessage::PlayerId(id)) =
            self.request(Command::Register(nickname.to_string())).await?
        {
            self.shared.session.write().await.bind_player_id(id)?;
        }

        // The id may arrive as a push after the reply
        self.wait_for(&mut updates, |session| session.player_id().cloned())
            .await?;

        let id = self.shared.session.write().await.complete_registration()?;
        self.shared.notify();
        Ok(id)
    }

    /// Request a fresh snapshot of the players searching for a game
    pub async fn players(&self) -> Result<Vec<Player>> {
        self.require(ConnectionState::Searching).await?;

        let mut updates = self.shared.subscribe();
        let revision = self.shared.session.read().await.list_revision();

        if let Some(ServerMessage::PlayerList(players)) = self.request(Command::List).await? {
            self.shared.session.write().await.update_players(players);
            self.shared.notify();
        }

        self.wait_for(&mut updates, |session| {
            (session.list_revision() > revision).then(|| session.players().to_vec())
        })
        .await
    }

    /// Invite a player from the last known player list
    pub async fn send_offer(&self, target: &PlayerId) -> Result<()> {
        {
            let session = self.shared.session.read().await;
            session.require(ConnectionState::Searching)?;
            if !session.knows_player(target) {
                return Err(Error::UnknownPlayer(target.clone()));
            }
        }

        self.request(Command::Offer(target.clone())).await?;
        info!(target = %target, "Offer sent");
        Ok(())
    }

    /// Players that invited this client
    pub async fn offers(&self) -> Result<Vec<PlayerId>> {
        let session = self.shared.session.read().await;
        session.require(ConnectionState::Searching)?;
        Ok(session.offers().to_vec())
    }

    /// Unprocessed messages from the opponent, in arrival order
    pub async fn messages(&self) -> Result<Vec<Message>> {
        let session = self.shared.session.read().await;
        session.require(ConnectionState::InGame)?;
        Ok(session.messages())
    }

    /// Mark a message as processed so it is no longer returned by [`Self::messages`]
    pub async fn remove_message(&self, id: MessageId) -> Result<()> {
        let mut session = self.shared.session.write().await;
        session.require(ConnectionState::InGame)?;
        session.remove_message(id)
    }

    /// Messages already marked as processed (requires `keep_history`)
    pub async fn processed_messages(&self) -> Result<Vec<Message>> {
        let session = self.shared.session.read().await;
        session.require(ConnectionState::InGame)?;
        session.processed_messages()
    }

    /// Processed and unprocessed messages (requires `keep_history`)
    pub async fn all_messages(&self) -> Result<Vec<Message>> {
        let session = self.shared.session.read().await;
        session.require(ConnectionState::InGame)?;
        session.all_messages()
    }

    /// Send a chat line to the opponent
    pub async fn send_message(&self, body: &str) -> Result<()> {
        self.require(ConnectionState::InGame).await?;
        if !is_valid_message(body) {
            return Err(Error::InvalidMessage(body.to_string()));
        }

        self.request(Command::Message(body.to_string())).await?;
        Ok(())
    }

    /// Leave the current game and go back to searching
    pub async fn end_game(&self) -> Result<()> {
        let opponent = self.opponent().await?;

        self.request(Command::EndGame).await?;

        // A push may already have ended this game
        if self.shared.session.write().await.end_game_with(&opponent) {
            self.shared.notify();
        }
        Ok(())
    }

    /// Protocol violations seen by the receive loop since the last call
    pub fn take_protocol_errors(&self) -> Vec<Error> {
        self.shared.take_protocol_errors()
    }

    /// Close the connection
    ///
    /// Ends a running game, stops the receive loop, releases any waiting
    /// callers and waits for the loop to finish. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.state().await == ConnectionState::InGame {
            match tokio::time::timeout(SHUTDOWN_GRACE, self.end_game()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Could not end game during shutdown"),
                Err(_) => debug!("Timed out ending game during shutdown"),
            }
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(receiver) = self.receiver.take() {
            if let Err(e) = receiver.await {
                warn!(error = %e, "Receive loop failed");
            }
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }

        info!("Connection closed");
    }

    async fn require(&self, expected: ConnectionState) -> Result<()> {
        self.shared.session.read().await.require(expected)
    }

    /// Send a command and wait for its reply
    ///
    /// A reply starting with the error prefix becomes [`Error::Server`].
    async fn request(&self, command: Command) -> Result<Option<ServerMessage>> {
        let request_id = self.shared.table.reserve()?;
        let frame = encode_request(request_id, &command);
        debug!(request_id, command = command.name(), "Sending request");

        if let Err(e) = self.write(frame).await {
            self.shared.table.forget(request_id);
            return Err(e);
        }

        let payload = self
            .shared
            .table
            .wait(request_id, self.request_timeout)
            .await?;

        match parse_reply(&payload) {
            Reply::Ok(msg) => Ok(msg),
            Reply::Failed(reason) => {
                debug!(request_id, reason = %reason, "Request failed");
                Err(Error::Server(reason))
            }
        }
    }

    async fn write(&self, frame: String) -> Result<()> {
        let (done, done_rx) = oneshot::channel();
        self.outbound
            .send(Outbound { frame, done })
            .await
            .map_err(|_| Error::ConnectionLost)?;
        done_rx.await.map_err(|_| Error::ConnectionLost)?
    }

    /// Wait until `check` yields a value, re-checking after every session update
    async fn wait_for<T>(
        &self,
        updates: &mut watch::Receiver<u64>,
        mut check: impl FnMut(&Session) -> Option<T>,
    ) -> Result<T> {
        let wait = async {
            loop {
                {
                    let session = self.shared.session.read().await;
                    if let Some(value) = check(&*session) {
                        return Ok(value);
                    }
                    if session.state() == ConnectionState::NotConnected {
                        return Err(Error::ConnectionLost);
                    }
                }
                if updates.changed().await.is_err() {
                    return Err(Error::ConnectionLost);
                }
            }
        };

        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => wait.await,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// Writer task - sends queued frames to the server in order
///
/// A failed write ends the session: the state is `NotConnected` before the
/// caller sees the error.
async fn writer_task<W: TransportWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    shared: Arc<Shared>,
) {
    while let Some(Outbound { frame, done }) = rx.recv().await {
        debug!(frame = %frame, "Sending frame");
        let result = writer.send(&frame).await;
        let failed = result.is_err();
        if let Err(e) = &result {
            error!(error = %e, "Write failed");
            shared.transport_lost().await;
        }
        let _ = done.send(result);
        if failed {
            break;
        }
    }
    debug!("Writer task stopped");
}
