//! Integration tests for the stream multiplexer and attach clients.

use cradle::logger::{LogFormat, Logger};
use cradle::mux::StreamMux;
use cradle::streams::{ChildStreams, StreamPair};
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ============================================================================
// TEST FIXTURES
// ============================================================================

struct MuxFixture {
    dir: TempDir,
    log_path: std::path::PathBuf,
    socket_path: std::path::PathBuf,
}

impl MuxFixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("c1.log");
        let socket_path = dir.path().join("attach.sock");
        Self {
            dir,
            log_path,
            socket_path,
        }
    }

    fn log(&self) -> String {
        std::fs::read_to_string(&self.log_path).unwrap_or_default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

async fn read_chunk(conn: &mut UnixStream) -> Vec<u8> {
    let mut buf = [0u8; 4096];
    let n = timeout(Duration::from_secs(2), conn.read(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf[..n].to_vec()
}

// ============================================================================
// PIPE MODE
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn attacher_sees_only_bytes_after_attachment() {
    let fixture = MuxFixture::new();
    let logger = Logger::open(&fixture.log_path, LogFormat::Kubernetes).unwrap();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

    let (host, child_ends) = StreamPair::pipes().unwrap().split();
    let (mut out, err) = match child_ends {
        ChildStreams::Pipes {
            output_write,
            error_write,
        } => (
            std::fs::File::from(output_write),
            std::fs::File::from(error_write),
        ),
        _ => unreachable!(),
    };

    let listener = UnixListener::bind(&fixture.socket_path).unwrap();
    let mux = StreamMux::new(host, &logger);
    tokio::spawn(mux.run(listener, fatal_tx));

    out.write_all(b"before\n").unwrap();
    settle().await;

    let mut client = UnixStream::connect(&fixture.socket_path).await.unwrap();
    settle().await;
    out.write_all(b"after\n").unwrap();

    let received = read_chunk(&mut client).await;
    assert_eq!(received, b"after\n");

    drop(out);
    drop(err);
    settle().await;

    let log = fixture.log();
    assert!(log.contains(" stdout F before"), "log was: {:?}", log);
    assert!(log.contains(" stdout F after"), "log was: {:?}", log);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_input_is_discarded_without_a_terminal() {
    let fixture = MuxFixture::new();
    let logger = Logger::open(&fixture.log_path, LogFormat::Kubernetes).unwrap();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

    let (host, child_ends) = StreamPair::pipes().unwrap().split();
    let listener = UnixListener::bind(&fixture.socket_path).unwrap();
    tokio::spawn(StreamMux::new(host, &logger).run(listener, fatal_tx));

    let mut client = UnixStream::connect(&fixture.socket_path).await.unwrap();
    client.write_all(b"ignored input").await.unwrap();
    client.shutdown().await.unwrap();
    settle().await;

    // The input went nowhere; the log only ever sees payload output.
    assert_eq!(fixture.log(), "");
    drop(child_ends);
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnecting_client_does_not_disturb_the_log() {
    let fixture = MuxFixture::new();
    let logger = Logger::open(&fixture.log_path, LogFormat::Kubernetes).unwrap();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

    let (host, child_ends) = StreamPair::pipes().unwrap().split();
    let mut out = match child_ends {
        ChildStreams::Pipes { output_write, .. } => std::fs::File::from(output_write),
        _ => unreachable!(),
    };

    let listener = UnixListener::bind(&fixture.socket_path).unwrap();
    tokio::spawn(StreamMux::new(host, &logger).run(listener, fatal_tx));

    let client = UnixStream::connect(&fixture.socket_path).await.unwrap();
    settle().await;
    drop(client);
    settle().await;

    out.write_all(b"still logged\n").unwrap();
    settle().await;

    assert!(fixture.log().contains(" stdout F still logged"));
}

#[tokio::test(flavor = "multi_thread")]
async fn attacher_after_payload_exit_receives_nothing() {
    let fixture = MuxFixture::new();
    let logger = Logger::open(&fixture.log_path, LogFormat::Kubernetes).unwrap();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

    let (host, child_ends) = StreamPair::pipes().unwrap().split();
    let mut out = match child_ends {
        ChildStreams::Pipes { output_write, .. } => std::fs::File::from(output_write),
        _ => unreachable!(),
    };

    let listener = UnixListener::bind(&fixture.socket_path).unwrap();
    tokio::spawn(StreamMux::new(host, &logger).run(listener, fatal_tx));

    out.write_all(b"hi\n").unwrap();
    drop(out);
    settle().await;

    let mut client = UnixStream::connect(&fixture.socket_path).await.unwrap();
    let mut buf = [0u8; 64];
    let outcome = timeout(Duration::from_millis(500), client.read(&mut buf)).await;
    match outcome {
        Err(_elapsed) => {}     // nothing ever arrives
        Ok(Ok(0)) => {}         // or a clean EOF
        Ok(other) => panic!("expected silence after exit, got {:?}", other),
    }

    assert!(fixture.log().contains(" stdout F hi"));
}

// ============================================================================
// TERMINAL MODE
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn late_attacher_receives_the_scrollback_snapshot() {
    let fixture = MuxFixture::new();
    let logger = Logger::open(&fixture.log_path, LogFormat::Kubernetes).unwrap();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

    let (host, child_ends) = StreamPair::terminal().unwrap().split();
    let mut slave = match child_ends {
        ChildStreams::Terminal { slave } => std::fs::File::from(slave),
        _ => unreachable!(),
    };

    let listener = UnixListener::bind(&fixture.socket_path).unwrap();
    tokio::spawn(StreamMux::new(host, &logger).run(listener, fatal_tx));

    // Scrollback written well before anyone attaches. The pty line
    // discipline may render "\n" as "\r\n"; assert on content, not framing.
    slave.write_all(b"hello\n").unwrap();
    settle().await;

    let mut client = UnixStream::connect(&fixture.socket_path).await.unwrap();
    let replay = read_chunk(&mut client).await;
    assert!(
        replay.windows(5).any(|w| w == b"hello"),
        "snapshot was: {:?}",
        replay
    );

    // Bytes produced after attachment flow through live.
    slave.write_all(b"more\n").unwrap();
    let live = read_chunk(&mut client).await;
    assert!(
        live.windows(4).any(|w| w == b"more"),
        "live bytes were: {:?}",
        live
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn client_input_reaches_the_pty() {
    let fixture = MuxFixture::new();
    let logger = Logger::open(&fixture.log_path, LogFormat::Kubernetes).unwrap();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

    let (host, child_ends) = StreamPair::terminal().unwrap().split();
    let slave = match child_ends {
        ChildStreams::Terminal { slave } => std::fs::File::from(slave),
        _ => unreachable!(),
    };

    let listener = UnixListener::bind(&fixture.socket_path).unwrap();
    tokio::spawn(StreamMux::new(host, &logger).run(listener, fatal_tx));

    let mut client = UnixStream::connect(&fixture.socket_path).await.unwrap();
    settle().await;
    // A full line: the pty slave is in canonical mode, so reads only
    // complete once a newline arrives.
    client.write_all(b"x\n").await.unwrap();

    // The payload side of the pty sees the client's byte.
    let mut payload_stdin = slave.try_clone().unwrap();
    let received = tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut byte = [0u8; 1];
        payload_stdin.read_exact(&mut byte).map(|_| byte[0])
    });
    let byte = timeout(Duration::from_secs(2), received)
        .await
        .expect("payload never saw the input")
        .unwrap()
        .unwrap();
    assert_eq!(byte, b'x');

    drop(slave);
    drop(fixture.dir);
}
