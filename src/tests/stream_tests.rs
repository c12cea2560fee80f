//! End-to-end tests for the TCP transport.
//!
//! These tests run a real server on a loopback port and talk to it with plain
//! sockets. No mocks are used.

use super::*;
use crate::protocol::{parse_length_header, parse_status_line, Status};
use crate::registry::Registry;
use crate::test_support::Fixture;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A running stream server plus the fixture it serves.
struct TestServer {
    addr: SocketAddr,
    fx: Fixture,
    admin_tx: mpsc::Sender<AdminCommand>,
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(Registry::default(), 1024).await
    }

    async fn start_with(registry: Registry, buffer_size: usize) -> Self {
        let fx = Fixture::with_registry(registry).await;
        let server = StreamServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            16,
            fx.dispatcher(),
            buffer_size,
        )
        .unwrap();
        let addr = server.local_addr().unwrap();

        let (admin_tx, admin_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(admin_rx, shutdown_rx));

        Self {
            addr,
            fx,
            admin_tx,
            shutdown_tx,
            handle,
        }
    }

    async fn client(&self) -> Client {
        Client::connect(self.addr).await
    }

    /// Polls until `cond` holds or a few seconds have passed.
    async fn wait_until(&self, cond: impl Fn(&Registry) -> bool) -> bool {
        for _ in 0..500 {
            if cond(&**self.fx.registry()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        line
    }

    /// Reads exactly `n` bytes.
    async fn raw(&mut self, n: usize) -> String {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(IO_TIMEOUT, self.reader.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    /// Reads one full envelope and returns its status and body.
    async fn response(&mut self) -> (Status, String) {
        let status_line = self.line().await;
        let (seq, status) = parse_status_line(&status_line).unwrap();
        assert_eq!(seq, None);

        let len = parse_length_header(&self.line().await).unwrap();
        assert_eq!(self.line().await, "\r\n");
        (status, self.raw(len).await)
    }

    async fn request(&mut self, line: &str) -> (Status, String) {
        self.send(line).await;
        self.response().await
    }

    /// Whether the server has closed the connection.
    async fn closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        match tokio::time::timeout(IO_TIMEOUT, self.reader.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            Ok(Ok(_)) | Err(_) => false,
        }
    }
}

#[tokio::test]
async fn test_auth_scenario_exact_bytes() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send("AUTH alice;secret\r\n").await;
    let expected = "200 OK\r\nLENGTH: 27\r\n\r\nSuccessful authentication\r\n";
    assert_eq!(client.raw(expected.len()).await, expected);

    let (status, body) = client.request("LS .\r\n").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body, "docs/\r\nmusic/\r\nnotes.txt\r\n");
}

#[tokio::test]
async fn test_unauthenticated_ls_is_forbidden() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send("LS .\r\n").await;
    let expected = "403 Forbidden\r\nLENGTH: 0\r\n\r\n";
    assert_eq!(client.raw(expected.len()).await, expected);
}

#[tokio::test]
async fn test_bad_request_gets_minimal_reply_and_session_continues() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send("FETCH /etc/passwd\r\n").await;
    assert_eq!(client.line().await, "400 Bad Request\r\n");

    let (status, _) = client.request("AUTH alice;secret\n").await;
    assert_eq!(status, Status::Ok);
}

#[tokio::test]
async fn test_over_long_line_closes_connection() {
    let server = TestServer::start_with(Registry::default(), 128).await;
    let mut client = server.client().await;

    client.send(&format!("CD {}\r\n", "x".repeat(200))).await;
    assert_eq!(client.line().await, "500 Internal Server Error\r\n");
    assert!(client.closed().await);
    assert!(server.wait_until(|r| r.current_count() == 0).await);
}

#[tokio::test]
async fn test_cd_and_ls_relative() {
    let server = TestServer::start().await;
    let mut client = server.client().await;
    client.request("AUTH alice;secret\r\n").await;

    assert_eq!(
        client.request("CD docs\r\n").await,
        (Status::Ok, "/docs\r\n".to_string())
    );
    assert_eq!(
        client.request("LS\r\n").await,
        (Status::Ok, "archive/\r\n".to_string())
    );
    assert_eq!(
        client.request("CD ../../..\r\n").await,
        (Status::Ok, "/\r\n".to_string())
    );
    assert_eq!(
        client.request("CD notes.txt\r\n").await,
        (Status::NotDir, String::new())
    );
}

#[tokio::test]
async fn test_large_listing_is_chunked_with_exact_length() {
    let server = TestServer::start_with(Registry::default(), 64).await;
    for i in 0..40 {
        std::fs::write(server.fx.root.path().join(format!("file-{:02}.txt", i)), "").unwrap();
    }

    let mut client = server.client().await;
    client.request("AUTH alice;secret\r\n").await;
    let (status, body) = client.request("LS .\r\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(body.lines().count(), 43);
    assert!(body.contains("file-39.txt\r\n"));

    // The stream is still in sync after the long body.
    let (status, _) = client.request("WHO\r\n").await;
    assert_eq!(status, Status::Ok);
}

#[tokio::test]
async fn test_who_over_stream() {
    let server = TestServer::start().await;
    let mut alice = server.client().await;
    let mut root = server.client().await;
    alice.request("AUTH alice;secret\r\n").await;
    root.request("AUTH root;toor\r\n").await;

    let (status, body) = alice.request("WHO\r\n").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body, "ID\tUNAME\tMODE\tCWD\n1\talice\t1\t/\n2\troot\t2\t/\nTOTAL: 2\n");
}

#[tokio::test]
async fn test_logout_replies_then_closes() {
    let server = TestServer::start().await;
    let mut client = server.client().await;
    client.request("AUTH alice;secret\r\n").await;

    assert_eq!(client.request("LOGOUT bob\r\n").await.0, Status::BadRequest);

    client.send("LOGOUT alice\r\n").await;
    let expected = "200 OK\r\nLENGTH: 0\r\n\r\n";
    assert_eq!(client.raw(expected.len()).await, expected);
    assert!(client.closed().await);
    assert!(server.wait_until(|r| r.current_count() == 0).await);
}

#[tokio::test]
async fn test_kill_closes_victim_connection() {
    let server = TestServer::start().await;
    let mut root = server.client().await;
    let mut alice = server.client().await;
    root.request("AUTH root;toor\r\n").await;
    alice.request("AUTH alice;secret\r\n").await;

    assert_eq!(root.request("KILL alice\r\n").await, (Status::Ok, String::new()));
    assert!(alice.closed().await);
    assert_eq!(server.fx.registry().current_count(), 1);

    assert_eq!(
        root.request("KILL alice\r\n").await,
        (Status::NotFound, String::new())
    );
}

#[tokio::test]
async fn test_kill_self_is_forbidden_over_stream() {
    let server = TestServer::start().await;
    let mut root = server.client().await;
    root.request("AUTH root;toor\r\n").await;

    let (status, body) = root.request("KILL 1\r\n").await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body, "You cannot kill your own session\r\n");

    let (status, _) = root.request("WHO\r\n").await;
    assert_eq!(status, Status::Ok);
}

#[tokio::test]
async fn test_full_registry_refuses_connection() {
    let server = TestServer::start_with(Registry::new(1, 1), 1024).await;
    let mut first = server.client().await;
    assert!(server.wait_until(|r| r.current_count() == 1).await);

    let mut second = server.client().await;
    assert!(second.closed().await);

    let (status, _) = first.request("AUTH alice;secret\r\n").await;
    assert_eq!(status, Status::Ok);
}

#[tokio::test]
async fn test_hangup_releases_slot() {
    let server = TestServer::start().await;
    let client = server.client().await;
    assert!(server.wait_until(|r| r.current_count() == 1).await);

    drop(client);
    assert!(server.wait_until(|r| r.current_count() == 0).await);
    assert_eq!(server.fx.registry().total_issued(), 1);
}

#[tokio::test]
async fn test_console_kill_and_quit() {
    let server = TestServer::start().await;
    let mut client = server.client().await;
    assert!(server.wait_until(|r| r.current_count() == 1).await);

    server.admin_tx.send(AdminCommand::Kill(SessionId(1))).await.unwrap();
    assert!(client.closed().await);

    server.admin_tx.send(AdminCommand::Quit).await.unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_sessions() {
    let server = TestServer::start().await;
    let mut a = server.client().await;
    let mut b = server.client().await;
    a.request("AUTH alice;secret\r\n").await;
    b.request("AUTH bob;builder\r\n").await;

    server.shutdown_tx.send(()).unwrap();
    server.handle.await.unwrap().unwrap();

    assert!(a.closed().await);
    assert!(b.closed().await);
    assert_eq!(server.fx.registry().current_count(), 0);
}

#[tokio::test]
async fn test_write_response_framing() {
    let mut out = Vec::new();
    let written = write_response(
        &mut out,
        &Response::message(crate::protocol::Status::Ok, "/docs"),
        16,
    )
    .await
    .unwrap();

    assert_eq!(out, b"200 OK\r\nLENGTH: 7\r\n\r\n/docs\r\n".to_vec());
    assert_eq!(written, out.len());
}
