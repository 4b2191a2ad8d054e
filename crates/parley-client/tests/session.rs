//! End-to-end client tests against a real relay on loopback TCP.

use std::{net::SocketAddr, time::Duration};

use parley_client::{ClientConfig, ClientError, ClientEvent, ClientSession, Login, SessionEnd};
use parley_crypto::{CryptoError, KdfParams, RoomCredentials};
use parley_proto::{Envelope, FrameCodec, JoinAck, JoinStatus, RoomId};
use parley_server::{Server, ServerConfig};
use tokio::{
    io::{AsyncWriteExt, BufReader, DuplexStream, duplex},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> (SocketAddr, JoinHandle<()>) {
    let config = ServerConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
    let server = Server::bind(config).await.expect("bind loopback");
    let addr = server.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, task)
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        server_address: addr.to_string(),
        kdf: KdfParams::insecure_fast(),
        ..Default::default()
    }
}

/// A joined client whose `run` loop is driven from the test.
struct Member {
    input: DuplexStream,
    events: mpsc::Receiver<ClientEvent>,
    task: JoinHandle<Result<SessionEnd, ClientError>>,
    ack: JoinAck,
}

impl Member {
    async fn join(addr: SocketAddr, user: &str, room: &str, password: &str) -> Self {
        let login = Login::new(user, room, password).unwrap();
        let session = ClientSession::new(config(addr), login).connect().await.expect("join");
        let ack = session.ack().clone();

        let (input, input_rx) = duplex(4096);
        let (events_tx, events) = mpsc::channel(64);
        let task = tokio::spawn(session.run(BufReader::new(input_rx), events_tx));

        Self { input, events, task, ack }
    }

    async fn type_line(&mut self, line: &str) {
        self.input.write_all(line.as_bytes()).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
    }

    async fn next_event(&mut self) -> ClientEvent {
        timeout(WAIT, self.events.recv()).await.expect("event within timeout").expect("event")
    }

    async fn finish(self) -> Result<SessionEnd, ClientError> {
        timeout(WAIT, self.task).await.expect("session ends").expect("task joins")
    }
}

#[tokio::test]
async fn members_chat_and_see_presence() {
    let (addr, server) = start_server().await;

    let mut ana = Member::join(addr, "ana", "lobby", "secret").await;
    assert_eq!(ana.ack.status, JoinStatus::Created);
    assert_eq!(ana.ack.participants, 1);

    let mut ben = Member::join(addr, "ben", "lobby", "secret").await;
    assert_eq!(ben.ack.status, JoinStatus::Joined);
    assert_eq!(ben.ack.participants, 2);
    assert_eq!(ana.next_event().await, ClientEvent::MemberJoined { sender: "ben".into() });

    ben.type_line("hello ana").await;
    match ana.next_event().await {
        ClientEvent::Message { sender, text, sent_at } => {
            assert_eq!(sender, "ben");
            assert_eq!(text, "hello ana");
            assert!(sent_at > 0);
        },
        other => panic!("expected message, got {other:?}"),
    }

    ana.type_line("hi ben").await;
    assert!(matches!(
        ben.next_event().await,
        ClientEvent::Message { ref sender, ref text, .. } if sender == "ana" && text == "hi ben"
    ));

    ben.type_line("/disconnect").await;
    assert_eq!(ben.finish().await.unwrap(), SessionEnd::UserDisconnected);
    assert_eq!(ana.next_event().await, ClientEvent::MemberLeft { sender: "ben".into() });

    server.abort();
}

#[tokio::test]
async fn empty_lines_are_not_sent() {
    let (addr, server) = start_server().await;

    let mut ana = Member::join(addr, "ana", "quiet", "pw").await;
    let mut ben = Member::join(addr, "ben", "quiet", "pw").await;
    assert_eq!(ana.next_event().await, ClientEvent::MemberJoined { sender: "ben".into() });

    ben.type_line("").await;
    ben.type_line("   ").await;
    ben.type_line("only this").await;

    assert!(matches!(
        ana.next_event().await,
        ClientEvent::Message { ref text, .. } if text == "only this"
    ));

    drop(ben.input);
    assert_eq!(ana.next_event().await, ClientEvent::MemberLeft { sender: "ben".into() });

    server.abort();
}

#[tokio::test]
async fn wrong_password_lands_in_an_empty_room() {
    let (addr, server) = start_server().await;

    let mut ana = Member::join(addr, "ana", "lobby", "secret").await;
    let mut eve = Member::join(addr, "eve", "lobby", "guess").await;

    assert_eq!(eve.ack.status, JoinStatus::Created);
    assert_eq!(eve.ack.participants, 1);
    assert_eq!(eve.ack.total_online, 2);
    assert_ne!(eve.ack.chat_id, ana.ack.chat_id);

    ana.type_line("for members only").await;
    assert!(timeout(Duration::from_millis(200), eve.events.recv()).await.is_err());

    server.abort();
}

#[tokio::test]
async fn foreign_ciphertext_is_reported_and_session_continues() {
    let (addr, server) = start_server().await;

    let mut ana = Member::join(addr, "ana", "lobby", "secret").await;

    // A raw peer that knows the room identifier but holds a different key
    let real = RoomCredentials::derive("lobby", "secret", &KdfParams::insecure_fast());
    let other = RoomCredentials::derive("lobby", "not-the-password", &KdfParams::insecure_fast());
    let room = RoomId::new(real.room_id.clone());

    let codec = FrameCodec::default();
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    let join = Envelope::connect("mallory", room.clone());
    codec.write_frame(&mut writer, &join.encode()).await.unwrap();
    codec.read_frame(&mut reader).await.unwrap();
    assert_eq!(ana.next_event().await, ClientEvent::MemberJoined { sender: "mallory".into() });

    let forged = Envelope::chat("mallory", room.clone(), other.key.encrypt("spoof"));
    codec.write_frame(&mut writer, &forged.encode()).await.unwrap();
    assert_eq!(ana.next_event().await, ClientEvent::Undecryptable {
        sender: "mallory".into(),
        error: CryptoError::Authentication,
    });

    let genuine = Envelope::chat("mallory", room, real.key.encrypt("still works"));
    codec.write_frame(&mut writer, &genuine.encode()).await.unwrap();
    assert!(matches!(
        ana.next_event().await,
        ClientEvent::Message { ref text, .. } if text == "still works"
    ));

    server.abort();
}

/// Accept one connection, read its CONNECT, and reply with `reply`.
async fn scripted_server(reply: fn(RoomId) -> Option<Envelope>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let codec = FrameCodec::default();

        let payload = codec.read_frame(&mut reader).await.unwrap();
        let Envelope::Connect(presence) = Envelope::decode(&payload).unwrap() else {
            panic!("expected CONNECT");
        };
        if let Some(envelope) = reply(presence.chat_id) {
            codec.write_frame(&mut writer, &envelope.encode()).await.unwrap();
        }
        // Dropping both halves closes the connection
    });

    addr
}

#[tokio::test]
async fn server_close_ends_the_session() {
    let addr = scripted_server(|room| {
        Some(Envelope::Joined(JoinAck {
            chat_id: room,
            participants: 1,
            total_online: 1,
            status: JoinStatus::Created,
        }))
    })
    .await;

    let mut member = Member::join(addr, "ana", "lobby", "secret").await;

    assert_eq!(member.next_event().await, ClientEvent::ServerClosed);
    assert_eq!(member.finish().await.unwrap(), SessionEnd::ServerClosed);
}

#[tokio::test]
async fn first_reply_must_be_joined() {
    let addr = scripted_server(|room| Some(Envelope::chat("server", room, "nope"))).await;
    let login = Login::new("ana", "lobby", "secret").unwrap();

    let result = ClientSession::new(config(addr), login).connect().await;

    assert!(matches!(result, Err(ClientError::Protocol(_))));
}

#[tokio::test]
async fn hang_up_before_joined_is_a_framing_error() {
    let addr = scripted_server(|_| None).await;
    let login = Login::new("ana", "lobby", "secret").unwrap();

    let result = ClientSession::new(config(addr), login).connect().await;

    assert!(matches!(result, Err(ClientError::Framing(_))));
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let login = Login::new("ana", "lobby", "secret").unwrap();

    let result = ClientSession::new(config(addr), login).connect().await;

    assert!(matches!(result, Err(ClientError::Connect { .. })));
}
