//! End-to-end tests of the connection against a scripted in-process server

use std::time::Duration;

use lobby_core::{ClientConfig, ConnectionState, PlayerId};
use lobby_net::transport::{ChannelReader, ChannelWriter};
use lobby_net::{
    ChannelTransport, Connection, Error, LineTransport, RequestId, Transport, TransportReader,
    TransportWriter,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Server side of a channel transport, driven step by step by a test
struct FakeServer {
    rx: ChannelReader,
    tx: ChannelWriter,
}

impl FakeServer {
    /// Read the next request and check its payload
    async fn expect(&mut self, payload: &str) -> RequestId {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for a request")
            .unwrap()
            .expect("client closed the connection");
        let (id, body) = frame.split_once('@').expect("frame without tag");
        assert_eq!(body, payload);
        id.parse().expect("non-numeric request id")
    }

    /// Assert the client sends nothing for a short while
    async fn expect_silence(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(50), self.rx.recv()).await;
        assert!(result.is_err(), "unexpected frame: {:?}", result);
    }

    async fn reply(&mut self, id: RequestId, payload: &str) {
        self.tx.send(&format!("{}@{}", id, payload)).await.unwrap();
    }

    async fn push(&mut self, payload: &str) {
        self.tx.send(&format!("server@{}", payload)).await.unwrap();
    }
}

fn test_config() -> ClientConfig {
    let mut config = ClientConfig::with_server("127.0.0.1", 0);
    config.request_timeout_ms = 2_000;
    config.keep_history = true;
    config
}

fn start() -> (Connection, FakeServer) {
    start_with(test_config())
}

fn start_with(config: ClientConfig) -> (Connection, FakeServer) {
    let (client, server) = ChannelTransport::pair(16);
    let conn = Connection::with_transport(client, &config);
    let (rx, tx) = server.split();
    (conn, FakeServer { rx, tx })
}

/// Poll until pushes have been applied
async fn wait_for_state(conn: &Connection, expected: ConnectionState) {
    for _ in 0..200 {
        if conn.state().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("state never became {:?}", expected);
}

/// Register as `Alice` with id 7, id delivered as a push before the reply
async fn register(conn: &Connection, server: &mut FakeServer) {
    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        let id = server.expect("register:Alice").await;
        server.push("id:7").await;
        server.reply(id, "success").await;
    });
    assert_eq!(result.unwrap(), PlayerId::new("7"));
}

/// Register, list players `42` and `99`, then start a game with `42`
async fn enter_game(conn: &Connection, server: &mut FakeServer) {
    register(conn, server).await;
    list_players(conn, server, "7:Alice\n42:Bob\n99:Carol").await;
    server.push("in game with:42").await;
    wait_for_state(conn, ConnectionState::InGame).await;
}

async fn list_players(conn: &Connection, server: &mut FakeServer, snapshot: &str) {
    let (result, ()) = tokio::join!(conn.players(), async {
        let id = server.expect("list").await;
        server.reply(id, "success").await;
        server.push(&format!("list:{}", snapshot)).await;
    });
    result.unwrap();
}

#[tokio::test]
async fn test_register_moves_to_searching() {
    let (conn, mut server) = start();
    assert_eq!(conn.state().await, ConnectionState::Registration);

    register(&conn, &mut server).await;

    assert_eq!(conn.state().await, ConnectionState::Searching);
    assert_eq!(conn.id().await.unwrap(), PlayerId::new("7"));
}

#[tokio::test]
async fn test_register_waits_for_id_push_after_reply() {
    let (conn, mut server) = start();

    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        let id = server.expect("register:Alice").await;
        server.reply(id, "success").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.push("id:7").await;
    });

    assert_eq!(result.unwrap(), PlayerId::new("7"));
    assert_eq!(conn.state().await, ConnectionState::Searching);
}

#[tokio::test]
async fn test_register_twice_fails_without_sending() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    let result = conn.register("Alice").await;
    assert!(matches!(
        result,
        Err(Error::WrongState {
            actual: ConnectionState::Searching,
            ..
        })
    ));
    server.expect_silence().await;
}

#[tokio::test]
async fn test_invalid_nickname_sends_nothing() {
    let (conn, mut server) = start();

    assert!(matches!(
        conn.register("bad!name").await,
        Err(Error::InvalidNickname(_))
    ));
    assert!(matches!(
        conn.register("a_very_long_nickname_indeed").await,
        Err(Error::InvalidNickname(_))
    ));
    server.expect_silence().await;
    assert_eq!(conn.state().await, ConnectionState::Registration);
}

#[tokio::test]
async fn test_server_rejects_nickname() {
    let (conn, mut server) = start();

    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        let id = server.expect("register:Alice").await;
        server.reply(id, "error: invalid nickname").await;
    });

    assert!(matches!(result, Err(Error::Server(reason)) if reason == "invalid nickname"));
    assert_eq!(conn.state().await, ConnectionState::Registration);
}

#[tokio::test]
async fn test_players_excludes_self() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    let (result, ()) = tokio::join!(conn.players(), async {
        let id = server.expect("list").await;
        server.reply(id, "success").await;
        server.push("list:7:Alice\n3:Bob\n5:Carol Ann\n").await;
    });

    let players = result.unwrap();
    let ids: Vec<_> = players.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "5"]);
    assert_eq!(players[1].nickname, "Carol Ann");
}

#[tokio::test]
async fn test_players_from_reply() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    let (result, ()) = tokio::join!(conn.players(), async {
        let id = server.expect("list").await;
        server.reply(id, "list:3:Bob").await;
    });

    assert_eq!(result.unwrap().len(), 1);
}

#[tokio::test]
async fn test_players_requires_registration() {
    let (conn, mut server) = start();
    assert!(matches!(
        conn.players().await,
        Err(Error::WrongState { .. })
    ));
    server.expect_silence().await;
}

#[tokio::test]
async fn test_offers_collected_while_searching() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    server.push("offer:3").await;
    server.push("offer:5").await;

    for _ in 0..200 {
        if conn.offers().await.unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        conn.offers().await.unwrap(),
        vec![PlayerId::new("3"), PlayerId::new("5")]
    );
}

#[tokio::test]
async fn test_offer_before_registration_fails_without_sending() {
    let (conn, mut server) = start();

    let result = conn.send_offer(&PlayerId::new("99")).await;
    assert!(matches!(
        result,
        Err(Error::WrongState {
            actual: ConnectionState::Registration,
            ..
        })
    ));
    server.expect_silence().await;
}

#[tokio::test]
async fn test_offer_to_unknown_player() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;
    list_players(&conn, &mut server, "3:Bob").await;

    let result = conn.send_offer(&PlayerId::new("99")).await;
    assert!(matches!(result, Err(Error::UnknownPlayer(id)) if id == PlayerId::new("99")));
    server.expect_silence().await;
}

#[tokio::test]
async fn test_offer_rejected_by_server() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;
    list_players(&conn, &mut server, "99:Carol").await;

    let target = PlayerId::new("99");
    let (result, ()) = tokio::join!(conn.send_offer(&target), async {
        let id = server.expect("offer:99").await;
        server.reply(id, "error: unknown id").await;
    });

    assert!(matches!(result, Err(Error::Server(reason)) if reason == "unknown id"));
}

#[tokio::test]
async fn test_game_start_clears_offers() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    server.push("offer:42").await;
    server.push("in game with:42").await;
    wait_for_state(&conn, ConnectionState::InGame).await;

    assert_eq!(conn.opponent().await.unwrap(), PlayerId::new("42"));
    assert!(conn.messages().await.unwrap().is_empty());
    assert!(matches!(conn.offers().await, Err(Error::WrongState { .. })));
}

#[tokio::test]
async fn test_chat_messages() {
    let (conn, mut server) = start();
    enter_game(&conn, &mut server).await;

    server.push("message:hello").await;
    let mut messages = Vec::new();
    for _ in 0..200 {
        messages = conn.messages().await.unwrap();
        if !messages.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "hello");
    assert_eq!(messages[0].sender_id, PlayerId::new("42"));

    let id = messages[0].id;
    conn.remove_message(id).await.unwrap();
    assert!(conn.messages().await.unwrap().is_empty());
    assert!(matches!(
        conn.remove_message(id).await,
        Err(Error::UnknownMessage(_))
    ));

    let processed = conn.processed_messages().await.unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].id, id);
    assert_eq!(conn.all_messages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_disabled() {
    let mut config = test_config();
    config.keep_history = false;
    let (conn, mut server) = start_with(config);
    enter_game(&conn, &mut server).await;

    assert!(matches!(
        conn.processed_messages().await,
        Err(Error::HistoryDisabled)
    ));
}

#[tokio::test]
async fn test_send_message() {
    let (conn, mut server) = start();
    enter_game(&conn, &mut server).await;

    let (result, ()) = tokio::join!(conn.send_message("good game"), async {
        let id = server.expect("message:good game").await;
        server.reply(id, "success").await;
    });
    result.unwrap();

    assert!(matches!(
        conn.send_message("no <tags>").await,
        Err(Error::InvalidMessage(_))
    ));
    server.expect_silence().await;
}

#[tokio::test]
async fn test_send_message_outside_game() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    assert!(matches!(
        conn.send_message("hello").await,
        Err(Error::WrongState { .. })
    ));
    server.expect_silence().await;
}

#[tokio::test]
async fn test_end_game_returns_to_searching() {
    let (conn, mut server) = start();
    enter_game(&conn, &mut server).await;
    server.push("message:bye").await;

    let (result, ()) = tokio::join!(conn.end_game(), async {
        let id = server.expect("end game").await;
        server.reply(id, "success").await;
    });
    result.unwrap();

    assert_eq!(conn.state().await, ConnectionState::Searching);
    assert!(conn.offers().await.unwrap().is_empty());
    assert!(matches!(conn.opponent().await, Err(Error::WrongState { .. })));
}

#[tokio::test]
async fn test_end_game_push_from_opponent() {
    let (conn, mut server) = start();
    enter_game(&conn, &mut server).await;

    server.push("end game").await;
    wait_for_state(&conn, ConnectionState::Searching).await;
    assert!(matches!(conn.messages().await, Err(Error::WrongState { .. })));
}

#[tokio::test]
async fn test_unrecognised_push_keeps_loop_running() {
    let (conn, mut server) = start();

    server.push("weather:sunny").await;
    register(&conn, &mut server).await;

    let errors = conn.take_protocol_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Error::Protocol(_)));
}

#[tokio::test]
async fn test_duplicate_reply_surfaced() {
    let (conn, mut server) = start();

    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        let id = server.expect("register:Alice").await;
        server.reply(id, "id:7").await;
        server.reply(id, "id:7").await;
    });
    result.unwrap();

    for _ in 0..200 {
        let errors = conn.take_protocol_errors();
        if !errors.is_empty() {
            assert!(matches!(errors[0], Error::Protocol(_)));
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("duplicate reply was not reported");
}

#[tokio::test]
async fn test_transport_closure_releases_waiter() {
    let (conn, mut server) = start();

    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        server.expect("register:Alice").await;
        drop(server);
    });

    assert!(matches!(result, Err(Error::ConnectionLost)));
    wait_for_state(&conn, ConnectionState::NotConnected).await;
    assert!(matches!(conn.players().await, Err(Error::WrongState { .. })));
}

#[tokio::test]
async fn test_request_timeout() {
    let mut config = test_config();
    config.request_timeout_ms = 50;
    let (conn, mut server) = start_with(config);

    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        server.expect("register:Alice").await;
    });

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(conn.state().await, ConnectionState::Registration);
}

#[tokio::test]
async fn test_request_ids_are_distinct() {
    let (conn, mut server) = start();
    register(&conn, &mut server).await;

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let (result, ()) = tokio::join!(conn.players(), async {
            let id = server.expect("list").await;
            assert!(seen.insert(id), "request id {} reused", id);
            server.reply(id, "list:3:Bob").await;
        });
        result.unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_ends_game() {
    let (mut conn, mut server) = start();
    enter_game(&conn, &mut server).await;

    let server_task = tokio::spawn(async move {
        let id = server.expect("end game").await;
        server.reply(id, "success").await;
        server
    });

    conn.shutdown().await;
    assert_eq!(conn.state().await, ConnectionState::NotConnected);
    assert!(matches!(conn.id().await, Err(Error::WrongState { .. })));
    server_task.await.unwrap();
}

#[tokio::test]
async fn test_undecodable_line_does_not_end_session() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    let conn = Connection::with_transport(LineTransport::new(client_io), &test_config());
    let (server_read, mut server_write) = tokio::io::split(server_io);
    let mut lines = BufReader::new(server_read).lines();

    let (result, ()) = tokio::join!(conn.register("Alice"), async {
        let line = lines.next_line().await.unwrap().unwrap();
        let (id, payload) = line.split_once('@').unwrap();
        assert_eq!(payload, "register:Alice");
        server_write
            .write_all(format!("server@id:7\n{}@success\n", id).as_bytes())
            .await
            .unwrap();
    });
    result.unwrap();

    server_write
        .write_all(b"server@message:\xff\xfe\nserver@offer:3\n")
        .await
        .unwrap();

    for _ in 0..200 {
        if !conn.offers().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(conn.state().await, ConnectionState::Searching);
    assert_eq!(conn.offers().await.unwrap(), vec![PlayerId::new("3")]);
    let errors = conn.take_protocol_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Error::Protocol(_)));
}
