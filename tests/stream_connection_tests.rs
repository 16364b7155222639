use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use spike_watch::detector::{SpikeDetector, WindowConfig};
use spike_watch::error::TransportError;
use spike_watch::feed::{
    BackoffPolicy, ConnectionState, Connector, Frame, MessageHandler, Session, StreamConnection,
};
use spike_watch::history::HistoryStore;
use spike_watch::pipeline::IngestionPipeline;
use spike_watch::sink::ChannelSink;

enum Step {
    Refuse,
    Fail,
    Open {
        frames: Vec<Result<Frame, TransportError>>,
        hold_open: bool,
    },
}

#[derive(Clone, Default)]
struct Probe {
    attempts: Arc<Mutex<Vec<Instant>>>,
    closed: Arc<AtomicBool>,
}

impl Probe {
    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn gap(&self, from: usize) -> Duration {
        let attempts = self.attempts();
        attempts[from + 1] - attempts[from]
    }
}

/// Replays scripted connect outcomes; once the script is exhausted every
/// further attempt hangs in `Connecting`.
struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    probe: Probe,
}

impl ScriptedConnector {
    fn new(steps: Vec<Step>) -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                steps: Mutex::new(steps.into()),
                probe: probe.clone(),
            },
            probe,
        )
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    fn endpoint(&self) -> &str {
        "scripted://feed"
    }

    async fn connect(&self) -> Result<ScriptedSession, TransportError> {
        self.probe.attempts.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Refuse) => Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            ))),
            Some(Step::Fail) => Err(TransportError::Handshake("HTTP 500".to_string())),
            Some(Step::Open { frames, hold_open }) => Ok(ScriptedSession {
                frames: frames.into(),
                hold_open,
                closed: Arc::clone(&self.probe.closed),
            }),
            None => std::future::pending().await,
        }
    }
}

struct ScriptedSession {
    frames: VecDeque<Result<Frame, TransportError>>,
    hold_open: bool,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.frames.pop_front() {
            Some(frame) => Some(frame),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingHandler {
    seen: Vec<Vec<u8>>,
    fail: bool,
}

impl MessageHandler for CountingHandler {
    fn on_message(&mut self, raw: &[u8]) -> anyhow::Result<()> {
        self.seen.push(raw.to_vec());
        if self.fail {
            anyhow::bail!("handler blew up");
        }
        Ok(())
    }
}

fn update(ticker: &str, price: f64) -> Result<Frame, TransportError> {
    Ok(Frame::Text(format!(
        r#"{{"ticker":"{}","price":{},"timestamp":"2024-05-01T12:00:00"}}"#,
        ticker, price
    )))
}

fn open(frames: Vec<Result<Frame, TransportError>>, hold_open: bool) -> Step {
    Step::Open { frames, hold_open }
}

async fn wait_for_attempts(probe: &Probe, n: usize) {
    while probe.attempt_count() < n {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    rx.wait_for(|s| *s == state).await.unwrap();
}

fn spawn_run<H: MessageHandler + 'static>(
    conn: Arc<StreamConnection<ScriptedConnector>>,
    mut handler: H,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<H> {
    tokio::spawn(async move {
        conn.run(&mut handler, shutdown).await;
        handler
    })
}

#[tokio::test(start_paused = true)]
async fn connect_refused_waits_on_long_tier() {
    let (connector, probe) = ScriptedConnector::new(vec![Step::Refuse, open(vec![], true)]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let mut states = conn.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_state(&mut states, ConnectionState::Connected).await;

    assert_eq!(probe.attempt_count(), 2);
    assert_eq!(probe.gap(0), Duration::from_secs(5));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Draining);
}

#[tokio::test(start_paused = true)]
async fn unexpected_connect_error_waits_longest() {
    let (connector, probe) = ScriptedConnector::new(vec![Step::Fail, open(vec![], true)]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_attempts(&probe, 2).await;
    assert_eq!(probe.gap(0), Duration::from_secs(10));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn mid_stream_close_reconnects_on_short_tier() {
    let (connector, probe) = ScriptedConnector::new(vec![
        open(vec![update("AAPL", 150.0)], false),
        open(vec![update("AAPL", 151.0)], true),
    ]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_attempts(&probe, 2).await;
    assert_eq!(probe.gap(0), Duration::from_secs(1));
    assert!(probe.gap(0) < BackoffPolicy::default().connect_refused);

    shutdown_tx.send(true).unwrap();
    let handler = handle.await.unwrap();
    assert_eq!(handler.seen.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn read_error_counts_as_stream_drop() {
    let (connector, probe) = ScriptedConnector::new(vec![
        open(vec![Err(TransportError::Protocol("reset".to_string()))], false),
        open(vec![], true),
    ]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_attempts(&probe, 2).await;
    assert_eq!(probe.gap(0), Duration::from_secs(1));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handler_failure_abandons_session_with_long_backoff() {
    let (connector, probe) = ScriptedConnector::new(vec![
        open(vec![update("AAPL", 150.0), update("AAPL", 151.0)], true),
        open(vec![], true),
    ]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler = CountingHandler {
        fail: true,
        ..Default::default()
    };

    let handle = spawn_run(conn.clone(), handler, shutdown_rx);
    wait_for_attempts(&probe, 2).await;
    assert_eq!(probe.gap(0), Duration::from_secs(10));

    shutdown_tx.send(true).unwrap();
    let handler = handle.await.unwrap();
    // The second frame of the abandoned session is never delivered.
    assert_eq!(handler.seen.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn control_frames_are_skipped() {
    let (connector, _probe) = ScriptedConnector::new(vec![open(
        vec![
            Ok(Frame::Control),
            Ok(Frame::Binary(br#"{"ticker":"MSFT"}"#.to_vec())),
            Ok(Frame::Control),
        ],
        true,
    )]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let handler = handle.await.unwrap();
    assert_eq!(handler.seen, vec![br#"{"ticker":"MSFT"}"#.to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn malformed_message_keeps_connection_up() {
    let (connector, probe) = ScriptedConnector::new(vec![open(
        vec![Ok(Frame::Text("{garbage".to_string())), update("AAPL", 150.0)],
        true,
    )]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let mut states = conn.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (sink, _alerts) = ChannelSink::channel(8);
    let pipeline = IngestionPipeline::new(
        HistoryStore::new(100),
        SpikeDetector::new(WindowConfig::default()),
        sink,
    );
    let stats = pipeline.stats();

    let handle = spawn_run(conn.clone(), pipeline, shutdown_rx);
    wait_for_state(&mut states, ConnectionState::Connected).await;
    while stats.snapshot().received < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(probe.attempt_count(), 1);
    assert_eq!(stats.snapshot().rejected, 1);

    shutdown_tx.send(true).unwrap();
    let pipeline = handle.await.unwrap();
    assert_eq!(pipeline.history().snapshot("AAPL").len(), 1);
    assert_eq!(pipeline.history().ticker_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_connected_drains_and_closes_transport() {
    let (connector, probe) = ScriptedConnector::new(vec![open(vec![], true), open(vec![], true)]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let mut states = conn.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_state(&mut states, ConnectionState::Connected).await;

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(conn.state(), ConnectionState::Draining);
    assert!(probe.closed.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(probe.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_connecting_stops_without_retry() {
    let (connector, probe) = ScriptedConnector::new(vec![]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let mut states = conn.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_state(&mut states, ConnectionState::Connecting).await;

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(conn.state(), ConnectionState::Draining);
    assert_eq!(probe.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_backoff_is_prompt() {
    let (connector, probe) = ScriptedConnector::new(vec![Step::Refuse, open(vec![], true)]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let started = Instant::now();
    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_attempts(&probe, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(conn.state(), ConnectionState::Draining);
    assert_eq!(probe.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_sender_counts_as_shutdown() {
    let (connector, _probe) = ScriptedConnector::new(vec![open(vec![], true)]);
    let conn = Arc::new(StreamConnection::new(connector, BackoffPolicy::default()));
    let mut states = conn.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = spawn_run(conn.clone(), CountingHandler::default(), shutdown_rx);
    wait_for_state(&mut states, ConnectionState::Connected).await;

    drop(shutdown_tx);
    handle.await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Draining);
}

#[tokio::test(start_paused = true)]
async fn already_requested_shutdown_never_connects() {
    let (connector, probe) = ScriptedConnector::new(vec![open(vec![], true)]);
    let conn = StreamConnection::new(connector, BackoffPolicy::default());
    let (_shutdown_tx, shutdown_rx) = watch::channel(true);

    conn.run(&mut CountingHandler::default(), shutdown_rx).await;
    assert_eq!(conn.state(), ConnectionState::Draining);
    assert_eq!(probe.attempt_count(), 0);
}
