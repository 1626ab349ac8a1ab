//! Logcat stream engine
//!
//! Owns at most one long-lived `adb logcat` process. A reader task feeds
//! stdout chunks, in arrival order, through a [`LineBuffer`], the line
//! parser and the active [`LogFilter`]; accepted entries go to the
//! [`EntryBuffer`] and then to subscribers.

use super::lines::LineBuffer;
use super::parser::parse_line;
use crate::adb::terminate;
use crate::{
    AdbExecutor, BridgeError, CommandResult, EntryBuffer, LogFilter, LogLevel, LogcatEntry,
    Result,
};
use futures::stream::{BoxStream, StreamExt};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const READ_CHUNK_SIZE: usize = 8 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 1024;
const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Events delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogcatEvent {
    /// A session's process was spawned
    Started {
        session_id: Uuid,
        serial: Option<String>,
    },
    /// An entry passed the filters and was buffered
    Entry(LogcatEntry),
    /// Output from the process's stderr or a read failure; not fatal
    Error(String),
    /// The session's process exited; `None` if it was killed by a signal
    Closed {
        session_id: Uuid,
        exit_code: Option<i32>,
    },
}

/// Subscriber handle; dropping it (or calling `unsubscribe`) detaches
pub struct LogcatSubscription {
    receiver: broadcast::Receiver<LogcatEvent>,
}

impl LogcatSubscription {
    /// Wait for the next event. Events missed by a lagging subscriber are
    /// skipped.
    pub async fn recv(&mut self) -> Option<LogcatEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Logcat subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<LogcatEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Logcat subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, LogcatEvent> {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
        .boxed()
    }

    pub fn unsubscribe(self) {}
}

enum EngineState {
    Stopped,
    Running(ActiveSession),
}

struct ActiveSession {
    id: Uuid,
    shutdown: oneshot::Sender<()>,
    reader: JoinHandle<()>,
}

/// Per-session processing of raw stdout chunks
pub(crate) struct SessionPipeline {
    lines: LineBuffer,
    filter: Arc<RwLock<LogFilter>>,
    buffer: EntryBuffer,
    events: broadcast::Sender<LogcatEvent>,
}

impl SessionPipeline {
    pub(crate) fn new(
        filter: Arc<RwLock<LogFilter>>,
        buffer: EntryBuffer,
        events: broadcast::Sender<LogcatEvent>,
    ) -> Self {
        Self {
            lines: LineBuffer::new(),
            filter,
            buffer,
            events,
        }
    }

    /// Process one chunk; returns the number of entries accepted
    pub(crate) fn ingest(&mut self, chunk: &[u8]) -> usize {
        self.lines
            .push_chunk(chunk)
            .iter()
            .filter(|line| self.process_line(line))
            .count()
    }

    fn process_line(&self, line: &str) -> bool {
        let Some(entry) = parse_line(line) else {
            trace!("Skipping non-logcat line: {}", line);
            return false;
        };

        let accepted = self
            .filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .matches(&entry);
        if !accepted {
            return false;
        }

        if let Err(e) = self.buffer.push(entry.clone()) {
            warn!("Failed to store log entry in buffer: {}", e);
        }
        // no subscribers is fine
        let _ = self.events.send(LogcatEvent::Entry(entry));
        true
    }

    /// Drop the dangling partial line at session end
    pub(crate) fn finish(mut self) -> usize {
        self.lines.discard()
    }
}

/// Logcat stream engine with an explicit Stopped / Running state
pub struct LogcatStream {
    executor: AdbExecutor,
    filter: Arc<RwLock<LogFilter>>,
    buffer: EntryBuffer,
    events: broadcast::Sender<LogcatEvent>,
    state: Arc<Mutex<EngineState>>,
    last_serial: std::sync::Mutex<Option<String>>,
}

impl LogcatStream {
    /// Create a stopped engine retaining up to `max_entries` entries
    pub fn new(executor: AdbExecutor, max_entries: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            executor,
            filter: Arc::new(RwLock::new(LogFilter::new())),
            buffer: EntryBuffer::new(max_entries),
            events,
            state: Arc::new(Mutex::new(EngineState::Stopped)),
            last_serial: std::sync::Mutex::new(None),
        }
    }

    /// Replace the initial filter
    pub fn with_filter(self, filter: LogFilter) -> Self {
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
        self
    }

    pub fn executor(&self) -> &AdbExecutor {
        &self.executor
    }

    /// Attach a new subscriber. Only events sent after this call are seen.
    pub fn subscribe(&self) -> LogcatSubscription {
        LogcatSubscription {
            receiver: self.events.subscribe(),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, EngineState::Running(_))
    }

    /// Id of the running session, if any
    pub async fn session_id(&self) -> Option<Uuid> {
        match &*self.state.lock().await {
            EngineState::Running(session) => Some(session.id),
            EngineState::Stopped => None,
        }
    }

    /// Start streaming. Fails with `AlreadyRunning` instead of restarting.
    ///
    /// A non-empty `tags` list makes the bridge silence every other tag.
    pub async fn start(&self, serial: Option<&str>, tags: &[String]) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        if let EngineState::Running(session) = &*state {
            return Err(BridgeError::AlreadyRunning {
                session_id: session.id.to_string(),
            });
        }

        let args = logcat_args(tags);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!("Starting logcat with args: {:?}", arg_refs);

        let child = self
            .executor
            .command(serial, &arg_refs)
            .spawn()
            .map_err(|e| BridgeError::spawn(self.executor.adb_path(), e))?;

        let session_id = Uuid::new_v4();
        // announce before the reader task can emit anything for this session
        let _ = self.events.send(LogcatEvent::Started {
            session_id,
            serial: serial.map(str::to_string),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let pipeline = SessionPipeline::new(
            self.filter.clone(),
            self.buffer.clone(),
            self.events.clone(),
        );
        let reader = tokio::spawn(run_session(
            session_id,
            child,
            shutdown_rx,
            pipeline,
            self.events.clone(),
            self.state.clone(),
        ));

        *state = EngineState::Running(ActiveSession {
            id: session_id,
            shutdown: shutdown_tx,
            reader,
        });
        *self
            .last_serial
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = serial.map(str::to_string);

        info!(
            "Started logcat session {} for {}",
            session_id,
            serial.unwrap_or("default device")
        );
        Ok(session_id)
    }

    /// Stop the running session; a no-op when already stopped.
    ///
    /// Returns once the process has been killed and reaped.
    pub async fn stop(&self) {
        let session = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, EngineState::Stopped) {
                EngineState::Running(session) => session,
                EngineState::Stopped => {
                    debug!("Logcat already stopped");
                    return;
                }
            }
        };

        info!("Stopping logcat session {}", session.id);
        let _ = session.shutdown.send(());
        if let Err(e) = session.reader.await {
            error!("Logcat reader task for {} failed: {}", session.id, e);
        }
    }

    /// Stop then start a fresh session
    pub async fn restart(&self, serial: Option<&str>, tags: &[String]) -> Result<Uuid> {
        self.stop().await;
        self.start(serial, tags).await
    }

    /// Snapshot of the active filter
    pub fn filter(&self) -> LogFilter {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies to lines processed from now on; buffered entries are kept
    pub fn set_min_level(&self, level: LogLevel) {
        self.filter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_min_level(level);
    }

    /// Applies to lines processed from now on; buffered entries are kept
    pub fn set_text_filter(&self, text: Option<&str>) {
        self.filter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_text(text);
    }

    pub fn buffer(&self) -> &EntryBuffer {
        &self.buffer
    }

    /// Copy of the buffered entries, oldest first
    pub fn entries(&self) -> Result<Vec<LogcatEntry>> {
        self.buffer.snapshot()
    }

    /// Clear the local entry buffer only
    pub fn clear(&self) -> Result<()> {
        self.buffer.clear()
    }

    /// Clear the on-device log of the last started serial
    pub async fn clear_device_log(&self) -> Result<CommandResult> {
        let serial = self
            .last_serial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.executor.clear_logcat(serial.as_deref()).await
    }
}

impl Drop for LogcatStream {
    fn drop(&mut self) {
        // the reader task keeps `state` alive, so signal it explicitly
        if let Ok(mut state) = self.state.try_lock() {
            signal_shutdown(&mut state);
            return;
        }

        // state is busy (a reader finishing, or a stop in flight): signal
        // once it frees up
        let state = self.state.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Logcat state busy at drop, deferring shutdown");
                runtime.spawn(async move {
                    signal_shutdown(&mut *state.lock().await);
                });
            }
            Err(_) => warn!("Logcat stream dropped busy outside a runtime, session left running"),
        }
    }
}

fn signal_shutdown(state: &mut EngineState) {
    if let EngineState::Running(session) = std::mem::replace(state, EngineState::Stopped) {
        debug!("Signalling logcat session {} to shut down", session.id);
        let _ = session.shutdown.send(());
    }
}

/// Arguments for `adb logcat` in threadtime format.
///
/// Bare tags are sent as `TAG:V`; `*:S` is appended when any tag is given.
pub fn logcat_args(tags: &[String]) -> Vec<String> {
    let mut args: Vec<String> = ["logcat", "-v", "threadtime"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let tags: Vec<&str> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        for tag in tags {
            if tag.contains(':') {
                args.push(tag.to_string());
            } else {
                args.push(format!("{}:V", tag));
            }
        }
        args.push("*:S".to_string());
    }
    args
}

async fn run_session(
    session_id: Uuid,
    mut child: Child,
    mut shutdown: oneshot::Receiver<()>,
    mut pipeline: SessionPipeline,
    events: broadcast::Sender<LogcatEvent>,
    state: Arc<Mutex<EngineState>>,
) {
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(forward_stderr(stderr, events.clone())));

    let mut stopped = false;
    match child.stdout.take() {
        Some(mut stdout) => {
            stopped = pump_stdout(&mut stdout, &mut shutdown, &mut pipeline, &events).await;
        }
        None => {
            let _ = events.send(LogcatEvent::Error("logcat stdout unavailable".to_string()));
        }
    }

    if stopped {
        terminate(&mut child).await;
    }
    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Failed to reap logcat process: {}", e);
            None
        }
    };

    if let Some(task) = stderr_task {
        if stopped {
            task.abort();
        } else if tokio::time::timeout(STDERR_DRAIN_GRACE, task).await.is_err() {
            debug!("stderr of session {} still open after exit", session_id);
        }
    }

    let dropped = pipeline.finish();
    if dropped > 0 {
        debug!("Discarded {} bytes of partial line at session end", dropped);
    }

    {
        let mut state = state.lock().await;
        if matches!(&*state, EngineState::Running(session) if session.id == session_id) {
            *state = EngineState::Stopped;
        }
    }

    info!("Logcat session {} closed with {:?}", session_id, exit_code);
    let _ = events.send(LogcatEvent::Closed {
        session_id,
        exit_code,
    });
}

/// Read stdout until EOF, a read error, or shutdown. Returns true when
/// shutdown was requested (or the engine dropped its handle).
async fn pump_stdout<R: AsyncRead + Unpin>(
    stdout: &mut R,
    shutdown: &mut oneshot::Receiver<()>,
    pipeline: &mut SessionPipeline,
    events: &broadcast::Sender<LogcatEvent>,
) -> bool {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        tokio::select! {
            _ = &mut *shutdown => return true,
            read = stdout.read(&mut chunk) => match read {
                Ok(0) => return false,
                Ok(n) => {
                    pipeline.ingest(&chunk[..n]);
                }
                Err(e) => {
                    error!("Error reading logcat output: {}", e);
                    let _ = events.send(LogcatEvent::Error(format!("read failed: {}", e)));
                    return false;
                }
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr, events: broadcast::Sender<LogcatEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    warn!("logcat stderr: {}", line);
                    let _ = events.send(LogcatEvent::Error(line.to_string()));
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("stderr read ended: {}", e);
                break;
            }
        }
    }
}
