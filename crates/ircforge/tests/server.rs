//! Integration tests for the assembled server: dispatch isolation and full
//! client conversations over TCP and WebSocket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ircforge::prelude::*;
use ircforge::transport::QueuedMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(3), fut)
        .await
        .expect("timed out")
}

/// Builds and starts a server with one TCP and one WebSocket listener on
/// ephemeral ports.
async fn start_server() -> IrcServer {
    let server = IrcServer::builder()
        .bind_tcp("127.0.0.1:0".parse().unwrap())
        .bind_websocket("127.0.0.1:0".parse().unwrap())
        .build()
        .await
        .expect("server should build");
    server.start().await.expect("server should start");
    server
}

/// Polls `check` until it holds or the timeout hits.
async fn eventually(mut check: impl FnMut() -> bool) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(server: &IrcServer) -> Self {
        let addr = server.local_addr().expect("tcp listener bound");
        let stream = TcpStream::connect(addr).await.expect("should connect");
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("write");
    }

    async fn next_line(&mut self) -> String {
        let line = within(self.lines.next_line())
            .await
            .expect("read")
            .expect("connection open");
        line.trim_end_matches('\r').to_owned()
    }

    /// Reads until a line containing `needle` arrives and returns it.
    async fn expect(&mut self, needle: &str) -> String {
        loop {
            let line = self.next_line().await;
            if line.contains(needle) {
                return line;
            }
        }
    }

    /// Registers as `nick` and waits for the end of the welcome burst.
    async fn register(server: &IrcServer, nick: &str) -> Self {
        let mut client = Self::connect(server).await;
        client.send(&format!("NICK {nick}")).await;
        client.send(&format!("USER {nick} 0 * :{nick}")).await;
        client.expect(" 004 ").await;
        client
    }
}

// =========================================================================
// Dispatch isolation
// =========================================================================

struct Failing;

#[async_trait]
impl CommandListener for Failing {
    async fn on_command(&self, _: &SessionId, _: &dyn Command) -> Result<(), IrcforgeError> {
        Err(IrcforgeError::InboundTaken)
    }
}

struct Panicking;

#[async_trait]
impl CommandListener for Panicking {
    async fn on_command(&self, _: &SessionId, _: &dyn Command) -> Result<(), IrcforgeError> {
        panic!("listener exploded");
    }
}

struct Counting(AtomicUsize);

#[async_trait]
impl CommandListener for Counting {
    async fn on_command(&self, _: &SessionId, _: &dyn Command) -> Result<(), IrcforgeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatch_failing_and_panicking_listeners_do_not_stop_others() {
    let server = IrcServer::builder().build().await.unwrap();
    let counter = Arc::new(Counting(AtomicUsize::new(0)));
    let dispatcher = server.dispatcher();
    dispatcher.add_listener("CUSTOM", NetworkKind::Client, Arc::new(Failing));
    dispatcher.add_listener("CUSTOM", NetworkKind::Client, Arc::new(Panicking));
    dispatcher.add_listener("CUSTOM", NetworkKind::Client, counter.clone());

    dispatcher
        .dispatch(QueuedMessage {
            session_id: SessionId::new("s1"),
            data: b"CUSTOM one\r\nCUSTOM two\r\n".to_vec(),
            network: NetworkKind::Client,
        })
        .await;

    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dispatch_custom_command_reaches_listener_over_tcp() {
    let server = start_server().await;
    let counter = Arc::new(Counting(AtomicUsize::new(0)));
    server
        .dispatcher()
        .add_listener("away", NetworkKind::Client, counter.clone());

    let mut client = Client::connect(&server).await;
    client.send("AWAY :lunch").await;

    eventually(|| counter.0.load(Ordering::SeqCst) == 1).await;
    server.shutdown().await;
}

// =========================================================================
// Registration
// =========================================================================

#[tokio::test]
async fn test_nick_user_registers_and_sends_welcome() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send("NICK bob\r\nUSER b 0 * :Bob").await;

    assert_eq!(
        client.next_line().await,
        ":irc.local 001 bob :Welcome to the ircforge Network bob!b@127.0.0.1"
    );
    assert!(client.next_line().await.starts_with(":irc.local 002 bob :Your host is irc.local"));
    assert!(client.next_line().await.starts_with(":irc.local 003 bob :This server was created"));
    assert!(client.next_line().await.starts_with(":irc.local 004 bob irc.local ircforge-"));

    let id = server.sessions().find_by_nick("bob").expect("nick claimed");
    let session = server.sessions().get(&id).unwrap();
    assert!(session.is_authenticated());
    assert_eq!(session.realname, "Bob");
    server.shutdown().await;
}

#[tokio::test]
async fn test_nick_taken_returns_433() {
    let server = start_server().await;
    let _alice = Client::register(&server, "alice").await;
    let mut other = Client::connect(&server).await;

    other.send("NICK Alice").await;

    assert_eq!(
        other.next_line().await,
        ":irc.local 433 * Alice :Nickname is already in use"
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_join_before_registration_returns_451() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send("JOIN #rust").await;

    assert_eq!(
        client.next_line().await,
        ":irc.local 451 * :You have not registered"
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send("PING :abc").await;

    assert_eq!(client.next_line().await, ":irc.local PONG irc.local :abc");
    server.shutdown().await;
}

// =========================================================================
// Channels
// =========================================================================

#[tokio::test]
async fn test_join_privmsg_part_between_two_clients() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    let mut bob = Client::register(&server, "bob").await;

    alice.send("JOIN #rust").await;
    assert_eq!(alice.next_line().await, ":alice!alice@127.0.0.1 JOIN #rust");
    assert_eq!(alice.next_line().await, ":irc.local 353 alice = #rust :@alice");
    alice.expect(" 366 ").await;

    bob.send("JOIN #rust").await;
    assert_eq!(bob.next_line().await, ":bob!bob@127.0.0.1 JOIN #rust");
    assert_eq!(bob.next_line().await, ":irc.local 353 bob = #rust :@alice bob");
    assert_eq!(alice.next_line().await, ":bob!bob@127.0.0.1 JOIN #rust");

    bob.send("PRIVMSG #rust :hello there").await;
    assert_eq!(
        alice.next_line().await,
        ":bob!bob@127.0.0.1 PRIVMSG #rust :hello there"
    );

    bob.send("PART #rust :later").await;
    assert_eq!(alice.next_line().await, ":bob!bob@127.0.0.1 PART #rust :later");
    bob.expect("PART #rust :later").await;

    assert_eq!(server.channels().members("#rust").unwrap(), vec!["alice"]);
    server.shutdown().await;
}

#[tokio::test]
async fn test_mode_invite_only_refuses_then_invite_admits() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    let mut bob = Client::register(&server, "bob").await;
    alice.send("JOIN #priv").await;
    alice.expect(" 366 ").await;

    alice.send("MODE #priv +i").await;
    assert_eq!(alice.next_line().await, ":alice!alice@127.0.0.1 MODE #priv +i");

    bob.send("JOIN #priv").await;
    assert_eq!(
        bob.next_line().await,
        ":irc.local 473 bob #priv :Cannot join channel (+i)"
    );

    alice.send("INVITE bob #priv").await;
    assert_eq!(bob.next_line().await, ":alice!alice@127.0.0.1 INVITE bob #priv");
    assert_eq!(alice.next_line().await, ":irc.local 341 alice bob :#priv");

    bob.send("JOIN #priv").await;
    assert_eq!(bob.next_line().await, ":bob!bob@127.0.0.1 JOIN #priv");
    server.shutdown().await;
}

#[tokio::test]
async fn test_mode_query_reports_defaults() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    alice.send("JOIN #rust").await;
    alice.expect(" 366 ").await;

    alice.send("MODE #rust").await;

    assert_eq!(alice.next_line().await, ":irc.local 324 alice #rust :+nt");
    assert!(alice.next_line().await.starts_with(":irc.local 329 alice #rust :"));
    server.shutdown().await;
}

#[tokio::test]
async fn test_topic_set_is_broadcast_and_queryable() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    alice.send("JOIN #rust").await;
    alice.expect(" 366 ").await;

    alice.send("TOPIC #rust :ownership rules").await;
    assert_eq!(
        alice.next_line().await,
        ":alice!alice@127.0.0.1 TOPIC #rust :ownership rules"
    );

    alice.send("TOPIC #rust").await;
    assert_eq!(
        alice.next_line().await,
        ":irc.local 332 alice #rust :ownership rules"
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_privmsg_to_unknown_nick_returns_401() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;

    alice.send("PRIVMSG ghost :boo").await;

    assert_eq!(
        alice.next_line().await,
        ":irc.local 401 alice ghost :No such nick/channel"
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_privmsg_direct_between_clients() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    let mut bob = Client::register(&server, "bob").await;

    alice.send("PRIVMSG bob :psst").await;

    assert_eq!(bob.next_line().await, ":alice!alice@127.0.0.1 PRIVMSG bob :psst");
    server.shutdown().await;
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_quit_is_announced_and_frees_nick() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    let mut bob = Client::register(&server, "bob").await;
    alice.send("JOIN #rust").await;
    alice.expect(" 366 ").await;
    bob.send("JOIN #rust").await;
    bob.expect(" 366 ").await;
    alice.expect("JOIN #rust").await;

    bob.send("QUIT :bye").await;

    assert_eq!(alice.next_line().await, ":bob!bob@127.0.0.1 QUIT :Quit: bye");
    let sessions = Arc::clone(server.sessions());
    eventually(|| !sessions.nick_in_use("bob")).await;
    assert_eq!(server.channels().members("#rust").unwrap(), vec!["alice"]);
    server.shutdown().await;
}

#[tokio::test]
async fn test_dropped_connection_is_announced_as_quit() {
    let server = start_server().await;
    let mut alice = Client::register(&server, "alice").await;
    let mut bob = Client::register(&server, "bob").await;
    alice.send("JOIN #rust").await;
    alice.expect(" 366 ").await;
    bob.send("JOIN #rust").await;
    bob.expect(" 366 ").await;
    alice.expect("JOIN #rust").await;

    drop(bob);

    assert_eq!(
        alice.next_line().await,
        ":bob!bob@127.0.0.1 QUIT :Connection closed"
    );
    server.shutdown().await;
}

// =========================================================================
// WebSocket
// =========================================================================

#[tokio::test]
async fn test_websocket_client_registers() {
    let server = start_server().await;
    let addr = server.websocket_addr().expect("websocket listener bound");
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");

    ws.send(Message::text("NICK wsbob\r\nUSER w 0 * :Web Bob"))
        .await
        .expect("send");

    let frame = within(ws.next()).await.unwrap().expect("frame");
    assert_eq!(
        frame.to_text().unwrap(),
        ":irc.local 001 wsbob :Welcome to the ircforge Network wsbob!w@127.0.0.1"
    );
    server.shutdown().await;
}
