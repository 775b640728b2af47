//! Socket-level behavior of the capture daemon.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kmsgrab_command_server::{
    send_command, send_raw, Command, CommandServer, GrabHandler, Reply, ServerConfig,
};
use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Tally {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    grabs: AtomicUsize,
}

#[derive(Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Panic,
}

struct SlowHandler {
    tally: Arc<Tally>,
    outcome: Outcome,
}

impl GrabHandler for SlowHandler {
    fn grab(&self) -> KmsgrabResult<()> {
        let now = self.tally.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.tally.grabs.fetch_add(1, Ordering::SeqCst);
        self.tally.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(KmsgrabError::NoCapableDevice {
                searched: PathBuf::from("/dev/dri"),
            }),
            Outcome::Panic if self.tally.grabs.load(Ordering::SeqCst) == 1 => {
                panic!("framebuffer vanished mid-capture")
            }
            Outcome::Panic => Ok(()),
        }
    }
}

struct RunningServer {
    socket: PathBuf,
    tally: Arc<Tally>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<KmsgrabResult<()>>,
    _dir: tempfile::TempDir,
}

fn start(outcome: Outcome) -> RunningServer {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("kmsgrab.sock");
    let tally = Arc::new(Tally::default());
    let handler = SlowHandler {
        tally: Arc::clone(&tally),
        outcome,
    };

    let server = CommandServer::bind(ServerConfig::new(&socket), handler).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async move {
        let _ = stopped.await;
    }));

    RunningServer {
        socket,
        tally,
        stop,
        task,
        _dir: dir,
    }
}

impl RunningServer {
    async fn shutdown(self) -> (Arc<Tally>, PathBuf) {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap();
        (self.tally, self.socket)
    }
}

async fn grab(socket: &Path) -> Reply {
    send_command(socket, Command::Grab).await.unwrap()
}

#[tokio::test]
async fn padded_grab_is_accepted() {
    let server = start(Outcome::Succeed);

    let reply = send_raw(&server.socket, b"  GRAB  \n").await.unwrap();

    assert_eq!(reply, "OK\n");
    let (tally, _) = server.shutdown().await;
    assert_eq!(tally.grabs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lowercase_grab_is_unsupported() {
    let server = start(Outcome::Succeed);

    let reply = send_raw(&server.socket, b"grab").await.unwrap();

    assert_eq!(reply, "ERR unsupported command\n");
    let (tally, _) = server.shutdown().await;
    assert_eq!(tally.grabs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn capture_failure_is_reported_with_reason() {
    let server = start(Outcome::Fail);

    let reply = grab(&server.socket).await;

    assert_eq!(reply, Reply::Err("no capable device".to_string()));
    server.shutdown().await;
}

#[tokio::test]
async fn crashed_capture_is_reported_and_serving_continues() {
    let server = start(Outcome::Panic);

    let reply = send_raw(&server.socket, b"GRAB\n").await.unwrap();
    assert_eq!(reply, "ERR capture crashed\n");
    assert_eq!(grab(&server.socket).await, Reply::Ok);

    let (tally, _) = server.shutdown().await;
    assert_eq!(tally.grabs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn daemon_keeps_serving_after_errors() {
    let server = start(Outcome::Succeed);

    assert!(!send_raw(&server.socket, b"PING\n").await.unwrap().starts_with("OK"));
    assert!(grab(&server.socket).await.is_ok());
    assert!(grab(&server.socket).await.is_ok());

    let (tally, _) = server.shutdown().await;
    assert_eq!(tally.grabs.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_grabs_never_overlap() {
    let server = start(Outcome::Succeed);

    let clients: Vec<_> = (0..6)
        .map(|_| {
            let socket = server.socket.clone();
            tokio::spawn(async move { grab(&socket).await })
        })
        .collect();
    for client in clients {
        assert_eq!(client.await.unwrap(), Reply::Ok);
    }

    let (tally, _) = server.shutdown().await;
    assert_eq!(tally.grabs.load(Ordering::SeqCst), 6);
    assert_eq!(tally.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn socket_removed_on_shutdown() {
    let server = start(Outcome::Succeed);
    assert!(server.socket.exists());

    let (_, socket) = server.shutdown().await;

    assert!(!socket.exists());
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("kmsgrab.sock");
    std::fs::write(&socket, b"left over").unwrap();

    let handler = SlowHandler {
        tally: Arc::new(Tally::default()),
        outcome: Outcome::Succeed,
    };
    let server = CommandServer::bind(ServerConfig::new(&socket), handler).unwrap();
    let task = tokio::spawn(server.run(tokio::time::sleep(Duration::from_millis(500))));

    assert_eq!(grab(&socket).await, Reply::Ok);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn silent_client_does_not_block_shutdown() {
    let server = start(Outcome::Succeed);
    let _idle = tokio::net::UnixStream::connect(&server.socket).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), server.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn client_that_sends_nothing_gets_no_reply() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = start(Outcome::Succeed);

    let mut silent = tokio::net::UnixStream::connect(&server.socket).await.unwrap();
    silent.shutdown().await.unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), silent.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert!(received.is_empty());

    drop(tokio::net::UnixStream::connect(&server.socket).await.unwrap());

    assert_eq!(grab(&server.socket).await, Reply::Ok);
    let (tally, _) = server.shutdown().await;
    assert_eq!(tally.grabs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bind_fails_for_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("missing").join("kmsgrab.sock");
    let handler = SlowHandler {
        tally: Arc::new(Tally::default()),
        outcome: Outcome::Succeed,
    };

    let err = CommandServer::bind(ServerConfig::new(&socket), handler)
        .err()
        .unwrap();

    assert!(matches!(err, KmsgrabError::Ipc { .. }));
}
