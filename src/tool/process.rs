//! One stay-open metadata tool process: spawn, version handshake, serialized
//! command/response exchange over stdin/stdout, graceful stop, and resurrection.
//!
//! Reader threads push stdout and stderr lines onto per-session channels. A command
//! holds the session lock from the moment it writes until it sees its own
//! `{ready<N>}` sentinel, because responses are correlated by position only.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::utils::config::ToolConsts;

use super::protocol::{
    self, CommandRequest, CommandResponse, STOP_PAYLOAD, is_ready_for, is_ready_line,
};
use super::{CommunicationMethod, ToolConfig, ToolError};

/// Lines buffered per stream before the reader thread waits for the caller.
const LINE_CHANNEL_CAP: usize = 4096;
/// After the first stderr line, keep collecting while lines arrive this quickly.
const STDERR_SETTLE: Duration = Duration::from_millis(25);
/// Poll step while waiting for a stopping process to exit.
const EXIT_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Ready,
    Stopping,
}

/// Handle to one tool process. Not `Clone`: share it behind an `Arc`.
pub struct ToolProcess {
    shared: Arc<Shared>,
}

struct Shared {
    config: ToolConfig,
    exe: PathBuf,
    state: Mutex<ProcessState>,
    /// The command lock. `None` while no process is running.
    session: Mutex<Option<Session>>,
    /// Starts true: a process that was never started is not resurrected.
    stop_requested: AtomicBool,
    generation: AtomicU64,
    pid: AtomicU32,
    restarts: AtomicUsize,
    version: Mutex<Option<String>>,
}

struct Session {
    generation: u64,
    child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    stdout_rx: Receiver<String>,
    stderr_rx: Receiver<String>,
    next_tag: u64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ToolProcess {
    /// Resolve the executable (fails fast if missing). Does not spawn anything yet.
    pub fn new(config: ToolConfig) -> Result<Self, ToolError> {
        let exe = config.resolve_exe()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                exe,
                state: Mutex::new(ProcessState::Stopped),
                session: Mutex::new(None),
                stop_requested: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                pid: AtomicU32::new(0),
                restarts: AtomicUsize::new(0),
                version: Mutex::new(None),
            }),
        })
    }

    /// Stopped → Starting → Ready: spawn and wait for the version probe (command 0).
    pub fn start(&self) -> Result<(), ToolError> {
        let mut slot = lock(&self.shared.session);
        let actual = self.state();
        if slot.is_some() || actual != ProcessState::Stopped {
            return Err(ToolError::InvalidState {
                expected: ProcessState::Stopped,
                actual,
            });
        }
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        let started = self.shared.spawn_session(&mut slot);
        if started.is_err() {
            self.shared.stop_requested.store(true, Ordering::SeqCst);
        }
        started
    }

    /// Start unless a live session exists. A session that died without a stop request is
    /// replaced and counted as a restart.
    pub fn ensure_started(&self) -> Result<(), ToolError> {
        let mut slot = lock(&self.shared.session);
        if slot.as_mut().is_some_and(Session::is_alive) {
            return Ok(());
        }
        if slot.is_some() {
            self.shared.discard(&mut slot);
        }
        if !self.shared.stop_requested.swap(false, Ordering::SeqCst) {
            self.shared.restarts.fetch_add(1, Ordering::SeqCst);
        }
        let started = self.shared.spawn_session(&mut slot);
        if started.is_err() {
            self.shared.stop_requested.store(true, Ordering::SeqCst);
        }
        started
    }

    /// Ready → Stopping → Stopped: ask the session to end, kill it if it does not exit in time.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        let mut slot = lock(&self.shared.session);
        let Some(mut session) = slot.take() else {
            debug!("metadata tool: stop requested but no process is running");
            self.shared.set_state(ProcessState::Stopped);
            return;
        };
        self.shared.set_state(ProcessState::Stopping);
        let deadline = Instant::now() + self.shared.config.stop_timeout;
        let exited = session.write(STOP_PAYLOAD).is_ok()
            && wait_for_disconnect(&session.stdout_rx, deadline)
            && wait_for_exit(&mut session.child, deadline);
        if exited {
            debug!("metadata tool: exited cleanly");
        } else {
            warn!(
                "metadata tool: no clean exit within {:?}; killing pid {}",
                self.shared.config.stop_timeout,
                session.child.id()
            );
            session.kill();
        }
        self.shared.pid.store(0, Ordering::SeqCst);
        self.shared.set_state(ProcessState::Stopped);
    }

    /// Send one command using the configured [`CommunicationMethod`].
    ///
    /// `Auto` retries once via an argument file when the error text suggests a filename
    /// encoding problem. If the process died, it is restarted (when resurrection is on)
    /// and the command is retried once on the fresh session.
    pub fn send(&self, request: &CommandRequest) -> Result<CommandResponse, ToolError> {
        let method = self.shared.config.method;
        let response = self.send_with(method, request)?;
        if method == CommunicationMethod::Auto && response.suggests_via_file() {
            debug!("metadata tool: retrying command via argument file");
            return self.send_with(CommunicationMethod::ViaFile, request);
        }
        Ok(response)
    }

    fn send_with(
        &self,
        method: CommunicationMethod,
        request: &CommandRequest,
    ) -> Result<CommandResponse, ToolError> {
        let shared = &self.shared;
        let mut slot = lock(&shared.session);
        shared.ensure_live(&mut slot)?;
        let session = slot.as_mut().ok_or(ToolError::NotRunning)?;
        match session.exchange(method, request, &shared.config) {
            Err(e) if e.is_session_lost() => {
                shared.discard(&mut slot);
                if !shared.should_resurrect() {
                    return Err(e);
                }
                warn!("metadata tool: {e}; restarting and retrying once");
                shared.restarts.fetch_add(1, Ordering::SeqCst);
                shared.spawn_session(&mut slot)?;
                let session = slot.as_mut().ok_or(ToolError::NotRunning)?;
                let retried = session.exchange(method, request, &shared.config);
                if retried.as_ref().is_err_and(ToolError::is_session_lost) {
                    shared.discard(&mut slot);
                }
                retried
            }
            other => other,
        }
    }

    /// All tag → value pairs for `path`, or only `tags` when given. The tool is asked for
    /// exactly those tags and the listing is filtered again on parse. A missing file or a
    /// rejected command yields an empty map.
    pub fn fetch_metadata(
        &self,
        path: &Path,
        tags: Option<&[String]>,
    ) -> Result<HashMap<String, String>, ToolError> {
        if !path.is_file() {
            return Ok(HashMap::new());
        }
        let mut request = CommandRequest::for_file(path);
        if let Some(tags) = tags {
            request = request.tags(tags);
        }
        let response = self.send(&request)?;
        if !response.success {
            debug!(
                "metadata tool: no metadata for {}: {}",
                path.display(),
                response.payload.trim()
            );
            return Ok(HashMap::new());
        }
        Ok(protocol::parse_metadata(&response.payload, tags, true))
    }

    pub fn state(&self) -> ProcessState {
        *lock(&self.shared.state)
    }

    /// Version string reported by the last handshake.
    pub fn version(&self) -> Option<String> {
        lock(&self.shared.version).clone()
    }

    /// OS process id of the current session, if one is running.
    pub fn pid(&self) -> Option<u32> {
        match self.shared.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// How many times the process was brought back after an unexpected exit.
    pub fn restarts(&self) -> usize {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    pub fn exe(&self) -> &Path {
        &self.shared.exe
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if self.state() == ProcessState::Ready {
            self.stop();
        }
    }
}

impl Shared {
    fn set_state(&self, state: ProcessState) {
        *lock(&self.state) = state;
    }

    fn should_resurrect(&self) -> bool {
        self.config.resurrect && !self.stop_requested.load(Ordering::SeqCst)
    }

    /// Spawn a process into `slot` and complete the version handshake. Caller holds the session lock.
    fn spawn_session(self: &Arc<Self>, slot: &mut Option<Session>) -> Result<(), ToolError> {
        self.set_state(ProcessState::Starting);
        let mut child = Command::new(&self.exe)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                self.set_state(ProcessState::Stopped);
                ToolError::Spawn {
                    path: self.exe.clone(),
                    source,
                }
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            self.set_state(ProcessState::Stopped);
            return Err(ToolError::Communication("stdio not captured".into()));
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stdin = Arc::new(Mutex::new(stdin));
        let (stdout_tx, stdout_rx) = bounded::<String>(LINE_CHANNEL_CAP);
        let (stderr_tx, stderr_rx) = bounded::<String>(LINE_CHANNEL_CAP);
        spawn_stdout_reader(stdout, stdout_tx, Arc::downgrade(self), generation)?;
        spawn_stderr_reader(stderr, stderr_tx, Arc::clone(&stdin))?;

        let mut session = Session {
            generation,
            child,
            stdin,
            stdout_rx,
            stderr_rx,
            next_tag: 0,
        };
        match session.handshake(self.config.startup_timeout) {
            Ok(version) => {
                debug!(
                    "metadata tool: ready (version {}, pid {}, session {})",
                    version.as_deref().unwrap_or("unknown"),
                    session.child.id(),
                    generation
                );
                *lock(&self.version) = version;
                self.pid.store(session.child.id(), Ordering::SeqCst);
                *slot = Some(session);
                self.set_state(ProcessState::Ready);
                Ok(())
            }
            Err(e) => {
                session.kill();
                self.set_state(ProcessState::Stopped);
                Err(e)
            }
        }
    }

    /// Make sure `slot` holds a live process, restarting a dead one when allowed.
    fn ensure_live(self: &Arc<Self>, slot: &mut Option<Session>) -> Result<(), ToolError> {
        if slot.as_mut().is_some_and(Session::is_alive) {
            return Ok(());
        }
        if slot.is_some() {
            debug!("metadata tool: process found dead before command");
            self.discard(slot);
        }
        if !self.should_resurrect() {
            return Err(ToolError::NotRunning);
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.spawn_session(slot)
    }

    /// Kill and drop the current session; state becomes Stopped.
    fn discard(&self, slot: &mut Option<Session>) {
        if let Some(mut session) = slot.take() {
            session.kill();
        }
        self.pid.store(0, Ordering::SeqCst);
        self.set_state(ProcessState::Stopped);
    }

    /// Exit notification from the stdout reader of session `generation`.
    fn on_exit(self: &Arc<Self>, generation: u64) {
        let mut slot = lock(&self.session);
        if slot.as_ref().map(|s| s.generation) != Some(generation) {
            // Already stopped, discarded or replaced by whoever held the lock.
            return;
        }
        debug!("metadata tool: session {generation} exited");
        self.discard(&mut slot);
        if self.should_resurrect() {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.spawn_session(&mut slot) {
                warn!("metadata tool: resurrection failed: {e}");
            }
        }
    }
}

impl Session {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn write(&self, payload: &str) -> Result<(), ToolError> {
        let mut stdin = lock(&self.stdin);
        stdin
            .write_all(payload.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| ToolError::Communication(format!("write to stdin: {e}")))
    }

    /// Command 0: `-ver`. The first stdout line is the version.
    fn handshake(&mut self, timeout: Duration) -> Result<Option<String>, ToolError> {
        let tag = self.next_tag;
        self.next_tag += 1;
        self.write(&protocol::direct_payload(&CommandRequest::new("-ver"), tag))
            .map_err(|e| ToolError::Handshake(e.to_string()))?;
        let deadline = Instant::now() + timeout;
        let mut version = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.stdout_rx.recv_timeout(remaining) {
                Ok(line) if is_ready_for(&line, tag) => return Ok(version),
                Ok(line) => {
                    if version.is_none() {
                        version = Some(line.trim().to_string());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ToolError::Handshake(format!("no reply within {timeout:?}")));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ToolError::Handshake("process exited".into()));
                }
            }
        }
    }

    /// Write one command and read its response. Caller holds the session lock.
    fn exchange(
        &mut self,
        method: CommunicationMethod,
        request: &CommandRequest,
        config: &ToolConfig,
    ) -> Result<CommandResponse, ToolError> {
        let tag = self.next_tag;
        self.next_tag += 1;

        // Anything left over belongs to an earlier command.
        while self.stdout_rx.try_recv().is_ok() {}
        while self.stderr_rx.try_recv().is_ok() {}

        let arg_file = match method {
            CommunicationMethod::ViaFile => Some(write_arg_file(request)?),
            _ => None,
        };
        let payload = match &arg_file {
            Some(file) => protocol::via_file_payload(file.path(), tag),
            None => protocol::direct_payload(request, tag),
        };
        self.write(&payload)?;

        let deadline = Instant::now() + config.response_timeout;
        let mut output: Vec<String> = Vec::new();
        let outcome = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.stdout_rx.recv_timeout(remaining) {
                Ok(line) if is_ready_for(&line, tag) => break Ok(()),
                Ok(line) if is_ready_line(&line) => continue,
                Ok(line) => output.push(line),
                Err(e) => break Err(e),
            }
        };

        if !output.is_empty() {
            return match outcome {
                Ok(()) => Ok(CommandResponse::success(output.join("\n"))),
                // Late lines would leak into the next command: the session is spent.
                Err(_) => Err(ToolError::Communication(format!(
                    "command {tag} output ended without its sentinel"
                ))),
            };
        }

        // No stdout: a failing command reports on stderr, which has no terminator.
        let errors = collect_stderr(&self.stderr_rx, config.error_grace);
        if !errors.is_empty() {
            return Ok(CommandResponse::failure(errors.join("\n")));
        }
        match outcome {
            Ok(()) => Ok(CommandResponse::failure(String::new())),
            Err(RecvTimeoutError::Disconnected) => Err(ToolError::Communication(format!(
                "process exited during command {tag}"
            ))),
            Err(RecvTimeoutError::Timeout) => Err(ToolError::NoResponse {
                tag,
                timeout: config.response_timeout,
            }),
        }
    }
}

/// Wait up to `grace` for a first stderr line, then take whatever follows closely.
fn collect_stderr(rx: &Receiver<String>, grace: Duration) -> Vec<String> {
    let mut lines = Vec::new();
    if let Ok(first) = rx.recv_timeout(grace) {
        lines.push(first);
        while let Ok(next) = rx.recv_timeout(STDERR_SETTLE) {
            lines.push(next);
        }
    }
    lines
}

/// True once the stdout reader has hung up (EOF) before `deadline`.
fn wait_for_disconnect(rx: &Receiver<String>, deadline: Instant) -> bool {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

fn wait_for_exit(child: &mut Child, deadline: Instant) -> bool {
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
            _ => return false,
        }
    }
}

fn write_arg_file(request: &CommandRequest) -> Result<tempfile::NamedTempFile, ToolError> {
    let mut file = tempfile::Builder::new()
        .prefix("imgload-args-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(request.to_arg_file_contents().as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Read `\n`-terminated lines, lossily decoded, without the line ending. Empty lines are skipped.
fn for_each_line<R: Read>(reader: R, mut f: impl FnMut(String) -> bool) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if !line.is_empty() && !f(line.to_string()) {
                    return;
                }
            }
        }
    }
}

/// stdout reader: forwards lines; on EOF hangs up the channel, then reports the exit.
fn spawn_stdout_reader<R: Read + Send + 'static>(
    stdout: R,
    tx: Sender<String>,
    shared: Weak<Shared>,
    generation: u64,
) -> Result<(), ToolError> {
    thread::Builder::new()
        .name("tool-stdout".into())
        .spawn(move || {
            for_each_line(stdout, |line| tx.send(line).is_ok());
            drop(tx);
            if let Some(shared) = shared.upgrade() {
                shared.on_exit(generation);
            }
        })?;
    Ok(())
}

/// stderr reader: forwards lines and answers the exit prompt of the `(-k)` build.
fn spawn_stderr_reader<R: Read + Send + 'static>(
    stderr: R,
    tx: Sender<String>,
    stdin: Arc<Mutex<ChildStdin>>,
) -> Result<(), ToolError> {
    thread::Builder::new()
        .name("tool-stderr".into())
        .spawn(move || {
            for_each_line(stderr, |line| {
                if line.trim().eq_ignore_ascii_case(ToolConsts::EXIT_PROMPT) {
                    let mut stdin = lock(&stdin);
                    let _ = stdin.write_all(b"\n").and_then(|_| stdin.flush());
                    return true;
                }
                tx.send(line).is_ok()
            });
        })?;
    Ok(())
}
