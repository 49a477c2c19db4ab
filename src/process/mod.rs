//! Supervision of one ffmpeg invocation.
//!
//! [`EncodingProcess::start`] spawns ffmpeg with all three standard streams
//! piped and hands the rest of the lifecycle to background tasks:
//!
//! - a waiter task owns the child handle and publishes its exit status
//! - a stderr task drains the diagnostic channel so ffmpeg never blocks on it
//! - an event task probes the input, parses the progress channel and emits
//!   the job's lifecycle events, ending with exactly one `End` or `Error`

pub mod events;
pub mod progress;
pub mod stream;

pub use events::{EncodingEvent, EventKind, ProgressRecord, ProgressState};
pub use progress::ProgressParser;
pub use stream::{EventStream, Rendezvous};

#[cfg(unix)]
pub use nix::sys::signal::Signal;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{OnceCell, mpsc, watch};
use tracing::{debug, info, warn};

use crate::encoding::Encoding;
use crate::error::{CommandFailure, EncodeError, Result};
use crate::media::{FfmpegCommand, FfprobeClient, MediaInfo, Prober};
use stream::EventHub;

/// How a finished ffmpeg process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodingStatus {
    pub success: bool,
    pub code: Option<i32>,
    /// Terminating signal on unix.
    pub signal: Option<i32>,
}

impl EncodingStatus {
    /// Status reported when the exit status could not be collected.
    pub fn unknown() -> Self {
        Self {
            success: false,
            code: None,
            signal: None,
        }
    }
}

impl From<std::process::ExitStatus> for EncodingStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            success: status.success(),
            code: status.code(),
            signal,
        }
    }
}

type SharedBytes = Shared<BoxFuture<'static, Arc<Vec<u8>>>>;

/// Requests served by the waiter task, the only owner of the child handle.
#[derive(Debug, Clone, Copy)]
enum Control {
    Terminate,
    #[cfg(unix)]
    Signal(Signal),
}

/// State of a spawned process, shared with its background tasks.
struct Running {
    pid: Option<u32>,
    cmd: Vec<String>,
    progress_mode: bool,
    /// Pipe output whose stdout is left to the caller.
    keep_stdout: bool,
    stdin: Mutex<Option<ChildStdin>>,
    /// Only populated when stdout carries media rather than progress.
    stdout: Mutex<Option<ChildStdout>>,
    stdout_capture: OnceCell<Arc<Vec<u8>>>,
    progress_capture: OnceLock<Arc<Vec<u8>>>,
    stderr: SharedBytes,
    exit: watch::Receiver<Option<EncodingStatus>>,
    finished: watch::Receiver<bool>,
    control: mpsc::UnboundedSender<Control>,
    status: OnceCell<EncodingStatus>,
}

impl Running {
    fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    async fn wait_exit(&self) -> EncodingStatus {
        let mut exit = self.exit.clone();
        let status = match exit.wait_for(Option::is_some).await {
            Ok(status) => *status,
            Err(_) => None,
        };
        status.unwrap_or_else(EncodingStatus::unknown)
    }

    async fn wait_finished(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    fn request_termination(&self) {
        // fails only once the waiter reaped the child
        let _ = self.control.send(Control::Terminate);
    }

    /// Everything ffmpeg wrote to stdout, read at most once.
    ///
    /// In progress mode this is the text the event task consumed, so it
    /// resolves after the event task finished. For pipe outputs it reads
    /// whatever stdout the caller did not take.
    async fn capture_stdout(&self) -> Arc<Vec<u8>> {
        self.stdout_capture
            .get_or_init(|| async {
                if self.progress_mode {
                    self.wait_finished().await;
                    return self.progress_capture.get().cloned().unwrap_or_default();
                }

                let stdout = self
                    .stdout
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let mut buf = Vec::new();
                if let Some(mut stdout) = stdout {
                    if let Err(e) = stdout.read_to_end(&mut buf).await {
                        warn!("Failed to read ffmpeg stdout: {}", e);
                    }
                }
                Arc::new(buf)
            })
            .await
            .clone()
    }
}

/// One encoding job: a single ffmpeg process plus its event stream.
///
/// Nothing runs until [`start`](Self::start) is called, which may happen only
/// once. The process's own [`events`](Self::events) stream is subscribed on
/// construction and therefore sees every event; [`subscribe`](Self::subscribe)
/// adds further streams that see the events emitted after the call.
///
/// When the output is a pipe, stdout carries the encoded media. It is read
/// into memory and returned by [`output`](Self::output), unless the process
/// was built with [`keep_stdout`](Self::keep_stdout). A `pipe:0` input waits
/// for data written to [`take_stdin`](Self::take_stdin).
pub struct EncodingProcess {
    encoding: Arc<Encoding>,
    prober: Arc<dyn Prober>,
    hub: Arc<EventHub>,
    events: EventStream,
    started: AtomicBool,
    keep_stdout: bool,
    run: OnceLock<Arc<Running>>,
}

impl std::fmt::Debug for EncodingProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingProcess")
            .field("encoding", &self.encoding)
            .field("pid", &self.pid())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl EncodingProcess {
    pub fn new(encoding: impl Into<Arc<Encoding>>) -> Self {
        let encoding = encoding.into();
        let prober: Arc<dyn Prober> = Arc::new(FfprobeClient::for_encoding(&encoding));
        let hub = EventHub::new();
        let events = hub.subscribe();

        Self {
            encoding,
            prober,
            hub,
            events,
            started: AtomicBool::new(false),
            keep_stdout: false,
            run: OnceLock::new(),
        }
    }

    /// Replace the metadata source used for the input.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Leave the stdout of a pipe output to the caller, who claims it with
    /// [`take_stdout`](Self::take_stdout) and must read it to the end:
    /// ffmpeg blocks once the pipe is full, and no terminal event is emitted
    /// before it exits.
    pub fn keep_stdout(mut self) -> Self {
        self.keep_stdout = true;
        self
    }

    pub fn encoding(&self) -> &Arc<Encoding> {
        &self.encoding
    }

    /// OS process id, `None` before `start()`.
    pub fn pid(&self) -> Option<u32> {
        self.run.get().and_then(|run| run.pid)
    }

    /// Full command line, available once started.
    pub fn command(&self) -> Option<&[String]> {
        self.run.get().map(|run| run.cmd.as_slice())
    }

    /// The stream subscribed at construction.
    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// An additional stream receiving every event emitted from now on.
    pub fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    fn running(&self) -> Result<&Arc<Running>> {
        self.run.get().ok_or(EncodeError::ProcessNotStarted)
    }

    /// Spawn ffmpeg and begin producing events.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EncodeError::AlreadyStarted);
        }

        let silent = self.encoding.is_output_stream();
        let command = FfmpegCommand::from_encoding(&self.encoding, silent);
        let cmd = command.to_vec();
        debug!("Spawning: {}", cmd.join(" "));

        let mut process = command.to_command(self.encoding.cwd());
        process
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = process
            .spawn()
            .map_err(|e| EncodeError::from_spawn(e, self.encoding.binary()))?;

        let pid = child.id();
        info!(
            "Started ffmpeg (pid {:?}): {} -> {}",
            pid,
            self.encoding.input(),
            self.encoding.output()
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let progress_mode = !silent;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    warn!("Failed to read ffmpeg stderr: {}", e);
                }
            }
            Arc::new(buf)
        });
        let stderr: SharedBytes = async move { stderr_task.await.unwrap_or_default() }
            .boxed()
            .shared();

        let (exit_tx, exit) = watch::channel(None);
        let (finished_tx, finished) = watch::channel(false);
        let (stdout, progress_stdout) = if progress_mode {
            (None, stdout)
        } else {
            (stdout, None)
        };

        let (control, mut requests) = mpsc::unbounded_channel();

        let run = Arc::new(Running {
            pid,
            cmd,
            progress_mode,
            keep_stdout: self.keep_stdout && !progress_mode,
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            stdout_capture: OnceCell::new(),
            progress_capture: OnceLock::new(),
            stderr,
            exit,
            finished,
            control,
            status: OnceCell::new(),
        });
        let _ = self.run.set(run.clone());

        // Signals go through the task owning the child: until `wait()`
        // returns the pid stays reserved by the unreaped process.
        tokio::spawn(async move {
            let result = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(request) = requests.recv() => match request {
                        Control::Terminate => {
                            debug!("Terminating ffmpeg (pid {:?})", pid);
                            if let Err(e) = child.start_kill() {
                                warn!("Failed to kill ffmpeg: {}", e);
                            }
                            break child.wait().await;
                        }
                        #[cfg(unix)]
                        Control::Signal(signal) => {
                            if let Some(pid) = child.id() {
                                let pid = nix::unistd::Pid::from_raw(pid as i32);
                                if let Err(e) = nix::sys::signal::kill(pid, signal) {
                                    warn!("Failed to send {:?} to ffmpeg: {}", signal, e);
                                }
                            }
                        }
                    },
                }
            };
            let status = match result {
                Ok(status) => EncodingStatus::from(status),
                Err(e) => {
                    warn!("Failed to wait for ffmpeg: {}", e);
                    EncodingStatus::unknown()
                }
            };
            exit_tx.send_replace(Some(status));
        });

        self.hub.mark_started();
        let job = EventJob {
            encoding: self.encoding.clone(),
            prober: self.prober.clone(),
            hub: self.hub.clone(),
            run,
        };
        tokio::spawn(async move {
            job.produce(progress_stdout).await;
            finished_tx.send_replace(true);
        });

        Ok(())
    }

    /// Exit status, resolved once the terminal event was emitted and both
    /// output channels were captured.
    pub async fn status(&self) -> Result<EncodingStatus> {
        let run = self.running()?;
        let status = run
            .status
            .get_or_init(|| async {
                let _ = tokio::join!(run.wait_finished(), self.output(), self.error_output());
                run.wait_exit().await
            })
            .await;
        Ok(*status)
    }

    /// Everything ffmpeg wrote to stdout: the progress text for file outputs,
    /// the encoded media for pipe outputs (empty if the caller took stdout).
    pub async fn output(&self) -> Result<Arc<Vec<u8>>> {
        let run = self.running()?;
        Ok(run.capture_stdout().await)
    }

    /// Everything ffmpeg wrote to stderr.
    pub async fn error_output(&self) -> Result<Arc<Vec<u8>>> {
        let run = self.running()?;
        Ok(run.stderr.clone().await)
    }

    /// Send `signal` to the process. A no-op once it was reaped.
    ///
    /// Delivery is asynchronous; failures are logged.
    #[cfg(unix)]
    pub fn kill(&self, signal: Signal) -> Result<()> {
        let run = self.running()?;
        if run.has_exited() || run.control.send(Control::Signal(signal)).is_err() {
            debug!("ffmpeg (pid {:?}) already exited, not sending {:?}", run.pid, signal);
        }
        Ok(())
    }

    /// Forcefully stop the process.
    pub fn terminate(&self) -> Result<()> {
        let run = self.running()?;
        run.request_termination();
        Ok(())
    }

    /// Writer for a `pipe:0` input. Dropping it closes ffmpeg's stdin.
    pub fn take_stdin(&self) -> Option<ChildStdin> {
        let run = self.run.get()?;
        run.stdin.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Reader for a pipe output of a process built with
    /// [`keep_stdout`](Self::keep_stdout). `None` otherwise: file outputs
    /// carry progress records on stdout, and other pipe outputs are captured
    /// for [`output`](Self::output).
    pub fn take_stdout(&self) -> Option<ChildStdout> {
        let run = self.run.get()?;
        if !run.keep_stdout {
            return None;
        }
        run.stdout.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Release the pipes and the process's own event stream, and stop ffmpeg
    /// if it is still running. Safe to call repeatedly and before `start()`.
    pub fn close(&self) {
        if let Some(run) = self.run.get() {
            drop(run.stdin.lock().unwrap_or_else(PoisonError::into_inner).take());
            if run.keep_stdout {
                drop(run.stdout.lock().unwrap_or_else(PoisonError::into_inner).take());
            }
            if !run.has_exited() {
                debug!("Closing running ffmpeg (pid {:?})", run.pid);
                run.request_termination();
            }
        }
        if !self.events.is_disposed() {
            let _ = self.events.dispose();
        }
    }
}

/// Everything the event task needs, detached from the `EncodingProcess`.
struct EventJob {
    encoding: Arc<Encoding>,
    prober: Arc<dyn Prober>,
    hub: Arc<EventHub>,
    run: Arc<Running>,
}

impl EventJob {
    async fn produce(self, mut progress: Option<ChildStdout>) {
        self.hub.emit(EncodingEvent::Start {
            encoding: self.encoding.clone(),
        });

        let mut capture = Vec::new();
        let outcome = self.observe(progress.as_mut(), &mut capture).await;
        if let Err(e) = &outcome {
            warn!("Encoding of {} failed before exit: {}", self.encoding.output(), e);
            self.run.request_termination();
        }

        // keep the channel drained until ffmpeg exits
        if let Some(mut stdout) = progress {
            if let Err(e) = stdout.read_to_end(&mut capture).await {
                debug!("Progress channel closed with error: {}", e);
            }
        }
        let _ = self.run.progress_capture.set(Arc::new(capture));

        // media on a pipe output is read while waiting so ffmpeg can finish
        let status = if self.run.progress_mode || self.run.keep_stdout {
            self.run.wait_exit().await
        } else {
            let (_, status) = tokio::join!(self.run.capture_stdout(), self.run.wait_exit());
            status
        };
        let event = match outcome {
            Ok(()) if status.success => {
                info!("Finished encoding {}", self.encoding.output());
                EncodingEvent::End {
                    encoding: self.encoding.clone(),
                }
            }
            Ok(()) => self.error_event(status, None).await,
            Err(e) => self.error_event(status, Some(e)).await,
        };
        self.hub.emit(event);
    }

    /// Probe the input and follow the progress channel.
    async fn observe(
        &self,
        progress: Option<&mut ChildStdout>,
        capture: &mut Vec<u8>,
    ) -> Result<()> {
        if !self.encoding.has_input() {
            return Ok(());
        }

        let info = self.prober.probe(self.encoding.input()).await?;
        let total_frames = info.total_frames();
        self.emit_info(info);

        if let Some(reader) = progress {
            self.follow_progress(reader, total_frames, capture).await?;
        }
        Ok(())
    }

    fn emit_info(&self, info: MediaInfo) {
        self.hub.emit(EncodingEvent::Info {
            encoding: self.encoding.clone(),
            info: Arc::new(info),
        });
    }

    async fn follow_progress<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        total_frames: Option<u64>,
        capture: &mut Vec<u8>,
    ) -> Result<()> {
        let mut parser = ProgressParser::new(total_frames);
        let mut buf = vec![0u8; 8192];

        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            capture.extend_from_slice(&buf[..read]);
            for (percent, record) in parser.feed(&buf[..read]) {
                self.emit_progress(percent, record);
            }
            if parser.is_finished() {
                break;
            }
        }

        if let Some((percent, record)) = parser.finish() {
            self.emit_progress(percent, record);
        }
        Ok(())
    }

    fn emit_progress(&self, percent: Option<u8>, record: ProgressRecord) {
        self.hub.emit(EncodingEvent::Progress {
            encoding: self.encoding.clone(),
            percent,
            record,
        });
    }

    async fn error_event(&self, status: EncodingStatus, cause: Option<EncodeError>) -> EncodingEvent {
        let stderr = self.run.stderr.clone().await;
        let failure = CommandFailure {
            status: Some(status),
            stderr: stderr.as_ref().clone(),
            cmd: self.run.cmd.clone(),
            input: self
                .encoding
                .has_input()
                .then(|| self.encoding.input().to_string()),
            output: Some(self.encoding.output().to_string()),
            cwd: self.encoding.cwd().map(Into::into),
            source: cause.map(Box::new),
            ..CommandFailure::new("FFmpeg command failed.")
        };
        warn!("{}", failure.message);

        EncodingEvent::Error {
            encoding: self.encoding.clone(),
            error: Arc::new(EncodeError::CommandFailed(Box::new(failure))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockProber;
    use crate::media::info::{CodecType, MediaStream};
    use std::time::Duration;

    fn media_info(frames: &str) -> MediaInfo {
        MediaInfo {
            streams: vec![MediaStream {
                codec_type: Some(CodecType::Video),
                nb_frames: Some(frames.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    async fn collect(stream: &EventStream) -> Vec<EncodingEvent> {
        let mut events = Vec::new();
        let next = async {
            while let Some(event) = stream.next().await.unwrap() {
                events.push(event);
            }
        };
        tokio::time::timeout(Duration::from_secs(10), next)
            .await
            .expect("event stream must terminate");
        events
    }

    fn kinds(events: &[EncodingEvent]) -> Vec<EventKind> {
        events.iter().map(EncodingEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_usage_before_start() {
        let process = EncodingProcess::new(Encoding::new());

        assert!(process.pid().is_none());
        assert!(matches!(process.status().await, Err(EncodeError::ProcessNotStarted)));
        assert!(matches!(process.output().await, Err(EncodeError::ProcessNotStarted)));
        assert!(matches!(
            process.error_output().await,
            Err(EncodeError::ProcessNotStarted)
        ));
        assert!(matches!(
            process.events().next().await,
            Err(EncodeError::ProcessNotStarted)
        ));
        assert!(process.terminate().is_err());
        process.close();
        process.close();
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let mut encoding = Encoding::new();
        encoding.set_binary("ffencode-test-no-such-ffmpeg");
        let process = EncodingProcess::new(encoding);

        let err = process.start().unwrap_err();
        assert!(matches!(err, EncodeError::BinaryNotFound { .. }));
        assert!(matches!(
            process.events().next().await,
            Err(EncodeError::ProcessNotStarted)
        ));
    }

    #[cfg(unix)]
    mod fake_ffmpeg {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use tokio::io::AsyncWriteExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        const PROGRESS: &str = r#"
printf 'frame=10\nfps=25.0\nprogress=continue\n'
printf 'frame=20\nfps=25.0\nprogress=continue\n'
printf 'frame=40\nfps=25.0\nprogress=end\n'
"#;

        fn job(dir: &Path, body: &str) -> Encoding {
            let mut encoding = Encoding::new();
            encoding
                .set_binary(script(dir, body))
                .set_input("input.mp4")
                .set_output(dir.join("out.mp4").to_string_lossy().into_owned());
            encoding
        }

        fn prober(frames: &'static str) -> Arc<dyn Prober> {
            let mut prober = MockProber::new();
            prober
                .expect_probe()
                .returning(move |_| Ok(media_info(frames)));
            Arc::new(prober)
        }

        #[tokio::test]
        async fn test_successful_job_events() {
            let dir = tempfile::tempdir().unwrap();
            let process =
                EncodingProcess::new(job(dir.path(), PROGRESS)).with_prober(prober("40"));

            process.start().unwrap();
            assert!(process.pid().is_some());
            assert!(matches!(process.start(), Err(EncodeError::AlreadyStarted)));

            let events = collect(process.events()).await;
            assert_eq!(
                kinds(&events),
                [
                    EventKind::Start,
                    EventKind::Info,
                    EventKind::Progress,
                    EventKind::Progress,
                    EventKind::Progress,
                    EventKind::End,
                ]
            );

            let percents: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    EncodingEvent::Progress { percent, .. } => Some(*percent),
                    _ => None,
                })
                .collect();
            assert_eq!(percents, [Some(25), Some(50), Some(100)]);

            let status = process.status().await.unwrap();
            assert!(status.success);
            assert_eq!(status.code, Some(0));
            let output = process.output().await.unwrap();
            assert!(String::from_utf8_lossy(&output).contains("progress=end"));
            process.close();
        }

        #[tokio::test]
        async fn test_failed_job_emits_error() {
            let dir = tempfile::tempdir().unwrap();
            let body = "echo 'Invalid bitrate 192kk' >&2\nexit 1";
            let process = EncodingProcess::new(job(dir.path(), body)).with_prober(prober("40"));

            process.start().unwrap();
            let events = collect(process.events()).await;
            assert_eq!(
                kinds(&events),
                [EventKind::Start, EventKind::Info, EventKind::Error]
            );

            let EncodingEvent::Error { error, .. } = &events[2] else {
                panic!("expected error event");
            };
            let failure = error.command_failure().unwrap();
            assert_eq!(failure.status.unwrap().code, Some(1));
            assert!(failure.stderr_lossy().contains("192kk"));
            assert_eq!(failure.cmd, process.command().unwrap());
            assert!(failure.source.is_none());

            let status = process.status().await.unwrap();
            assert!(!status.success);
            let stderr = process.error_output().await.unwrap();
            assert!(!stderr.is_empty());
        }

        #[tokio::test]
        async fn test_unknown_frame_count_has_no_percent() {
            let dir = tempfile::tempdir().unwrap();
            let process =
                EncodingProcess::new(job(dir.path(), PROGRESS)).with_prober(prober("N/A"));

            process.start().unwrap();
            let events = collect(process.events()).await;
            assert!(events.iter().all(|e| match e {
                EncodingEvent::Progress { percent, .. } => percent.is_none(),
                _ => true,
            }));
            assert_eq!(events.last().map(EncodingEvent::kind), Some(EventKind::End));
        }

        #[tokio::test]
        async fn test_probe_failure_terminates_job() {
            let dir = tempfile::tempdir().unwrap();
            let mut prober = MockProber::new();
            prober
                .expect_probe()
                .returning(|_| Err(EncodeError::Config("probe unavailable".to_string())));
            let process = EncodingProcess::new(job(dir.path(), "exec sleep 30"))
                .with_prober(Arc::new(prober));

            process.start().unwrap();
            let events = collect(process.events()).await;
            assert_eq!(kinds(&events), [EventKind::Start, EventKind::Error]);

            let EncodingEvent::Error { error, .. } = &events[1] else {
                panic!("expected error event");
            };
            let cause = error.command_failure().unwrap().source.as_deref();
            assert!(matches!(cause, Some(EncodeError::Config(_))));
            assert!(!process.status().await.unwrap().success);
        }

        #[tokio::test]
        async fn test_kill_produces_terminal_error() {
            let dir = tempfile::tempdir().unwrap();
            let process = EncodingProcess::new(job(dir.path(), "exec sleep 30"))
                .with_prober(prober("40"));
            process.start().unwrap();

            let stream = process.subscribe();
            tokio::time::sleep(Duration::from_millis(100)).await;
            process.kill(Signal::SIGTERM).unwrap();

            let events = collect(&stream).await;
            assert_eq!(events.last().map(EncodingEvent::kind), Some(EventKind::Error));
            let status = process.status().await.unwrap();
            assert!(!status.success);
            assert_eq!(status.signal, Some(Signal::SIGTERM as i32));

            // already reaped
            process.kill(Signal::SIGTERM).unwrap();
        }

        #[tokio::test]
        async fn test_pipe_output_and_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let mut encoding = Encoding::new();
            encoding.set_binary(script(dir.path(), "cat"));
            let process = EncodingProcess::new(encoding);

            process.start().unwrap();
            let args = process.command().unwrap();
            assert!(!args.contains(&"-progress".to_string()));

            let mut stdin = process.take_stdin().unwrap();
            stdin.write_all(b"media bytes").await.unwrap();
            drop(stdin);

            let events = collect(process.events()).await;
            assert_eq!(kinds(&events), [EventKind::Start, EventKind::End]);
            assert_eq!(process.output().await.unwrap().as_slice(), b"media bytes");
            assert!(process.status().await.unwrap().success);
        }

        #[tokio::test]
        async fn test_large_pipe_output_is_drained() {
            let dir = tempfile::tempdir().unwrap();
            let mut encoding = Encoding::new();
            encoding
                .set_binary(script(dir.path(), "head -c 1048576 /dev/zero"))
                .set_input("input.mp4");
            let process = EncodingProcess::new(encoding).with_prober(prober("40"));

            process.start().unwrap();
            assert!(process.take_stdout().is_none());

            let events = collect(process.events()).await;
            assert_eq!(
                kinds(&events),
                [EventKind::Start, EventKind::Info, EventKind::End]
            );
            assert_eq!(process.output().await.unwrap().len(), 1_048_576);
            assert!(process.status().await.unwrap().success);
        }

        #[tokio::test]
        async fn test_keep_stdout_hands_pipe_to_caller() {
            let dir = tempfile::tempdir().unwrap();
            let mut encoding = Encoding::new();
            encoding.set_binary(script(dir.path(), "head -c 1048576 /dev/zero"));
            let process = EncodingProcess::new(encoding).keep_stdout();

            process.start().unwrap();
            let mut stdout = process.take_stdout().unwrap();
            assert!(process.take_stdout().is_none());

            let mut media = Vec::new();
            let (read, events) = tokio::join!(
                stdout.read_to_end(&mut media),
                collect(process.events())
            );
            assert_eq!(read.unwrap(), 1_048_576);
            assert_eq!(kinds(&events), [EventKind::Start, EventKind::End]);
            assert!(process.output().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_close_stops_running_job() {
            let dir = tempfile::tempdir().unwrap();
            let process = EncodingProcess::new(job(dir.path(), "exec sleep 30"))
                .with_prober(prober("40"));
            let stream = process.subscribe();

            process.start().unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            process.close();
            assert!(process.events().is_disposed());

            let events = collect(&stream).await;
            assert_eq!(events.last().map(EncodingEvent::kind), Some(EventKind::Error));
            let status = tokio::time::timeout(Duration::from_secs(5), process.status())
                .await
                .expect("closed process must exit")
                .unwrap();
            assert!(!status.success);
        }

        #[tokio::test]
        async fn test_permission_denied() {
            let dir = tempfile::tempdir().unwrap();
            let binary = dir.path().join("ffmpeg");
            std::fs::write(&binary, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();

            let mut encoding = Encoding::new();
            encoding.set_binary(binary);
            let err = EncodingProcess::new(encoding).start().unwrap_err();
            assert!(matches!(err, EncodeError::BinaryPermissionDenied { .. }));
        }
    }
}
