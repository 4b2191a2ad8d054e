//! Client session lifecycle.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────────┐  CONNECT / JOINED  ┌───────────┐  sentinel, EOF  ┌──────────────┐
//! │ Unauthenticated │───────────────────>│ Connected │────────────────>│ Disconnected │
//! └─────────────────┘                    └───────────┘  server close   └──────────────┘
//! ```
//!
//! - [`ClientSession`] is the unauthenticated state: configuration and login,
//!   no socket yet.
//! - [`ConnectedSession`] owns both halves of the socket and the room key.
//! - [`ConnectedSession::run`] consumes the session; when it returns the
//!   transport is closed.

use std::{fmt, time::Duration};

use parley_crypto::{KdfParams, RoomCredentials, RoomKey};
use parley_proto::{Envelope, FrameCodec, JoinAck, RoomId};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    time::timeout,
};
use zeroize::Zeroizing;

use crate::{error::ClientError, event::ClientEvent};

/// Default disconnect sentinel.
pub const DEFAULT_DISCONNECT_COMMAND: &str = "/disconnect";

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (e.g., "127.0.0.1:5190")
    pub server_address: String,
    /// Frame codec; the header width must match the server's
    pub codec: FrameCodec,
    /// Input line that ends the session
    pub disconnect_command: String,
    /// Limit on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Key derivation costs; must match every other member of the room
    pub kdf: KdfParams,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:5190".to_string(),
            codec: FrameCodec::default(),
            disconnect_command: DEFAULT_DISCONNECT_COMMAND.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            kdf: KdfParams::default(),
        }
    }
}

/// What the user typed to get in.
#[derive(Clone)]
pub struct Login {
    username: String,
    room_name: String,
    password: Zeroizing<String>,
}

impl Login {
    /// Validate a login. Username and room name are trimmed.
    ///
    /// # Errors
    ///
    /// - `ClientError::EmptyField` if any value is empty
    pub fn new(
        username: impl Into<String>,
        room_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let username = username.into().trim().to_string();
        let room_name = room_name.into().trim().to_string();
        let password = Zeroizing::new(password.into());

        if username.is_empty() {
            return Err(ClientError::EmptyField("username"));
        }
        if room_name.is_empty() {
            return Err(ClientError::EmptyField("room name"));
        }
        if password.is_empty() {
            return Err(ClientError::EmptyField("password"));
        }

        Ok(Self { username, room_name, password })
    }

    /// Display name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Human-readable room name. Never sent to the server.
    pub fn room_name(&self) -> &str {
        &self.room_name
    }
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("room_name", &self.room_name)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// How a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed the disconnect command
    UserDisconnected,
    /// Input reached end-of-file
    InputClosed,
    /// The server closed the connection
    ServerClosed,
}

/// A client that has not connected yet.
#[derive(Debug, Clone)]
pub struct ClientSession {
    config: ClientConfig,
    login: Login,
}

impl ClientSession {
    /// Create a session for `login`.
    pub fn new(config: ClientConfig, login: Login) -> Self {
        Self { config, login }
    }

    /// Derive the room credentials, connect and join.
    ///
    /// Derivation runs on a blocking thread; it is deliberately slow.
    ///
    /// # Errors
    ///
    /// - `ClientError::Connect` / `ClientError::Timeout` if the server is
    ///   unreachable
    /// - `ClientError::Framing` / `ClientError::Decode` if the reply is
    ///   malformed or the server hangs up
    /// - `ClientError::Protocol` if the reply is not a `JOINED` for our room
    pub async fn connect(self) -> Result<ConnectedSession, ClientError> {
        let Self { config, login } = self;

        let kdf = config.kdf;
        let (room_name, password) = (login.room_name.clone(), login.password.clone());
        let credentials = tokio::task::spawn_blocking(move || {
            RoomCredentials::derive(&room_name, &password, &kdf)
        })
        .await
        .map_err(|e| ClientError::Task(e.to_string()))?;
        let room = RoomId::new(credentials.room_id);

        tracing::debug!(room = room.short(), "Derived room identifier");

        let address = config.server_address.clone();
        let stream = timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ClientError::Timeout {
                address: address.clone(),
                after: config.connect_timeout,
            })?
            .map_err(|source| ClientError::Connect { address: address.clone(), source })?;

        tracing::info!("Connected to {}", address);

        let codec = config.codec;
        let (mut reader, mut writer) = stream.into_split();

        let connect = Envelope::connect(login.username.as_str(), room.clone());
        codec.write_frame(&mut writer, &connect.encode()).await?;

        let payload = codec.read_frame(&mut reader).await?;
        let ack = match Envelope::decode(&payload)? {
            Envelope::Joined(ack) if ack.chat_id == room => ack,
            Envelope::Joined(ack) => {
                return Err(ClientError::Protocol(format!(
                    "JOINED for room {}, expected {}",
                    ack.chat_id.short(),
                    room.short()
                )));
            },
            other => {
                return Err(ClientError::Protocol(format!(
                    "expected JOINED, got {}",
                    other.type_tag()
                )));
            },
        };

        tracing::info!(
            room = room.short(),
            participants = ack.participants,
            total_online = ack.total_online,
            "Joined room"
        );

        Ok(ConnectedSession {
            reader,
            writer,
            codec,
            room,
            key: credentials.key,
            username: login.username,
            disconnect_command: config.disconnect_command,
            ack,
        })
    }
}

/// A joined client, ready to chat.
pub struct ConnectedSession {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    codec: FrameCodec,
    room: RoomId,
    key: RoomKey,
    username: String,
    disconnect_command: String,
    ack: JoinAck,
}

impl fmt::Debug for ConnectedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedSession")
            .field("room", &self.room)
            .field("username", &self.username)
            .field("ack", &self.ack)
            .finish_non_exhaustive()
    }
}

impl ConnectedSession {
    /// The server's join acknowledgment.
    pub fn ack(&self) -> &JoinAck {
        &self.ack
    }

    /// Derived room identifier.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Chat until the user disconnects, input ends or the server hangs up.
    ///
    /// Each non-empty line of `input` is encrypted and sent; the disconnect
    /// command (and end of input) sends `DISCONNECT` instead. Everything the
    /// server relays is reported on `events`.
    ///
    /// # Errors
    ///
    /// - `ClientError::Io` if reading `input` fails
    /// - `ClientError::Framing` if the connection breaks mid-frame
    pub async fn run<R>(
        self,
        input: R,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<SessionEnd, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let Self { reader, mut writer, codec, room, key, username, disconnect_command, .. } = self;

        let mut inbound = tokio::spawn(receive_loop(reader, codec, key.clone(), events));
        let mut lines = input.lines();

        let outcome = loop {
            tokio::select! {
                joined = &mut inbound => {
                    break match joined {
                        Ok(Ok(())) => Ok(SessionEnd::ServerClosed),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(ClientError::Task(e.to_string())),
                    };
                },

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        send(&codec, &mut writer, &Envelope::disconnect(&username, room.clone())).await?;
                        break Ok(SessionEnd::InputClosed);
                    };

                    let text = line.trim_end_matches(['\r', '\n']);
                    if text.trim().is_empty() {
                        continue;
                    }

                    if text.trim() == disconnect_command {
                        send(&codec, &mut writer, &Envelope::disconnect(&username, room.clone())).await?;
                        break Ok(SessionEnd::UserDisconnected);
                    }

                    let token = key.encrypt(text);
                    send(&codec, &mut writer, &Envelope::chat(&username, room.clone(), token)).await?;
                },
            }
        };

        inbound.abort();
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Shutdown after session end: {}", e);
        }

        tracing::info!(room = room.short(), "Session ended: {:?}", outcome);
        outcome
    }
}

async fn send(
    codec: &FrameCodec,
    writer: &mut OwnedWriteHalf,
    envelope: &Envelope,
) -> Result<(), ClientError> {
    codec.write_frame(writer, &envelope.encode()).await?;
    Ok(())
}

/// Turn relayed envelopes into events until the server hangs up.
async fn receive_loop(
    mut reader: OwnedReadHalf,
    codec: FrameCodec,
    key: RoomKey,
    events: mpsc::Sender<ClientEvent>,
) -> Result<(), ClientError> {
    loop {
        let payload = match codec.read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(e) if e.is_clean_close() => {
                let _ = events.send(ClientEvent::ServerClosed).await;
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Dropping undecodable envelope: {}", e);
                continue;
            },
        };

        let event = match envelope {
            Envelope::Chat(message) => match key.decrypt(&message.contents) {
                Ok(opened) => ClientEvent::Message {
                    sender: message.sender,
                    text: opened.plaintext,
                    sent_at: opened.issued_at,
                },
                Err(error) => {
                    tracing::warn!(sender = %message.sender, "Could not decrypt message: {}", error);
                    ClientEvent::Undecryptable { sender: message.sender, error }
                },
            },
            Envelope::Connect(presence) => ClientEvent::MemberJoined { sender: presence.sender },
            Envelope::Disconnect(presence) => ClientEvent::MemberLeft { sender: presence.sender },
            Envelope::Joined(_) => {
                tracing::debug!("Ignoring repeated JOINED");
                continue;
            },
        };

        if events.send(event).await.is_err() {
            return Ok(());
        }
    }
}
