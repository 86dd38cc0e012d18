//! RTSP to HLS converter
//!
//! [`RtspHlsConverter`] owns one FFmpeg process at a time and a supervisor
//! task that watches it. The supervisor parses `-progress` output, waits for
//! the playlist to list its first segment, and restarts FFmpeg with
//! exponential backoff when it exits unexpectedly. Status changes are
//! reported on the channel returned by [`RtspHlsConverter::new`].

use crate::error::{MediaError, MediaResult};
use crate::ffmpeg::{self, FfmpegCommand, ProgressParser, ProgressUpdate};
use crate::playlist::MediaPlaylist;
use crate::stats::{ConversionState, ConversionStats};
use parking_lot::RwLock;
use rand::Rng;
use rtsphls_core::{is_rtsp_url, redact_credentials};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How the video stream is written into the HLS segments
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VideoEncoding {
    /// Remux the camera's stream without re-encoding
    #[default]
    Copy,
    /// Re-encode with libx264
    H264 {
        /// x264 preset name, e.g. `veryfast`
        preset: String,
        /// Target bitrate
        bitrate_kbps: u32,
    },
}

/// Converter configuration
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// FFmpeg binary, resolved through `PATH` when relative
    pub ffmpeg_path: PathBuf,
    /// Directory under which each session gets its own output directory
    pub output_root: PathBuf,
    /// `-rtsp_transport` value
    pub rtsp_transport: String,
    /// Target segment duration
    pub hls_time_secs: u32,
    /// Segments kept in the playlist
    pub hls_list_size: u32,
    /// Playlist file name inside the output directory
    pub playlist_name: String,
    /// Video handling
    pub video: VideoEncoding,
    /// Keep the audio track (re-encoded to AAC)
    pub include_audio: bool,
    /// Time allowed for the first segment to appear after a (re)start
    pub ready_timeout: Duration,
    /// Consecutive restarts before the conversion is marked failed
    pub max_restarts: u32,
    /// First restart delay; doubles on every consecutive restart
    pub restart_backoff: Duration,
    /// Upper bound for the restart delay
    pub max_restart_backoff: Duration,
    /// Timeout for `ffmpeg -version`
    pub probe_timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            output_root: std::env::temp_dir().join("rtsphls"),
            rtsp_transport: "tcp".to_string(),
            hls_time_secs: 2,
            hls_list_size: 5,
            playlist_name: "stream.m3u8".to_string(),
            video: VideoEncoding::Copy,
            include_audio: false,
            ready_timeout: Duration::from_secs(15),
            max_restarts: 5,
            restart_backoff: Duration::from_secs(1),
            max_restart_backoff: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl ConverterConfig {
    /// Check the configuration for values FFmpeg would reject
    pub fn validate(&self) -> MediaResult<()> {
        if self.hls_time_secs == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "hls_time_secs must be greater than 0".to_string(),
            });
        }
        if self.hls_list_size == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "hls_list_size must be greater than 0".to_string(),
            });
        }
        if !matches!(self.rtsp_transport.as_str(), "tcp" | "udp" | "http" | "udp_multicast") {
            return Err(MediaError::InvalidConfiguration {
                message: format!("unsupported rtsp_transport: {}", self.rtsp_transport),
            });
        }
        if self.playlist_name.is_empty() || self.playlist_name.contains('/') {
            return Err(MediaError::InvalidConfiguration {
                message: format!("invalid playlist name: {:?}", self.playlist_name),
            });
        }
        Ok(())
    }

    /// Restart delay for the given consecutive attempt (0-based), before jitter
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.restart_backoff
            .saturating_mul(factor)
            .min(self.max_restart_backoff)
    }
}

/// Notifications emitted by a converter
#[derive(Debug, Clone, PartialEq)]
pub enum ConverterEvent {
    /// State change, see [`ConversionState::as_status`]
    Status {
        /// Status word (`starting`, `ready`, `switching`, ...)
        status: String,
        /// Extra detail; the HLS URL for `ready`
        message: Option<String>,
    },
    /// Conversion error
    Error {
        /// Human readable description
        error: String,
    },
}

#[derive(Debug, Default)]
struct ConverterShared {
    state: ConversionState,
    rtsp_url: Option<String>,
    started_at: Option<Instant>,
    progress: ProgressUpdate,
    restarts: u32,
    switches: u32,
    last_error: Option<String>,
}

struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Supervisor {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Converter supervisor panicked: {}", e);
            }
        }
    }
}

/// Supervised FFmpeg conversion of one RTSP source into one HLS directory
pub struct RtspHlsConverter {
    config: ConverterConfig,
    output_dir: PathBuf,
    hls_url: String,
    shared: Arc<RwLock<ConverterShared>>,
    events: mpsc::UnboundedSender<ConverterEvent>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl RtspHlsConverter {
    /// Create a converter writing to `<output_root>/<session_key>`.
    ///
    /// `hls_url` is the URL players use to fetch the playlist; it is reported
    /// with the `ready` status.
    pub fn new(
        config: ConverterConfig,
        session_key: &str,
        hls_url: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ConverterEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let output_dir = config.output_root.join(session_key);

        let converter = Self {
            config,
            output_dir,
            hls_url: hls_url.into(),
            shared: Arc::new(RwLock::new(ConverterShared::default())),
            events,
            supervisor: Mutex::new(None),
        };

        (converter, receiver)
    }

    /// Whether the configured FFmpeg binary runs
    pub async fn is_ffmpeg_available(&self) -> bool {
        ffmpeg::is_ffmpeg_available(&self.config.ffmpeg_path, self.config.probe_timeout).await
    }

    /// Converter configuration
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Directory receiving playlist and segments
    pub fn hls_output_path(&self) -> &Path {
        &self.output_dir
    }

    /// Playlist file on disk
    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(&self.config.playlist_name)
    }

    /// URL players use to fetch the playlist
    pub fn hls_url(&self) -> &str {
        &self.hls_url
    }

    /// Current state
    pub fn state(&self) -> ConversionState {
        self.shared.read().state
    }

    /// Whether FFmpeg is supposed to be running
    pub fn is_converting(&self) -> bool {
        self.state().is_active()
    }

    /// Start converting `rtsp_url`.
    ///
    /// Fails if a conversion is already running or FFmpeg cannot be spawned.
    pub async fn start_conversion(&self, rtsp_url: &str) -> MediaResult<()> {
        self.config.validate()?;
        check_source(rtsp_url)?;

        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_some() && self.is_converting() {
            return Err(MediaError::InvalidState {
                message: "conversion already running".to_string(),
            });
        }
        if let Some(previous) = supervisor.take() {
            previous.shutdown().await;
        }

        info!(
            "🎬 Starting conversion of {} into {}",
            redact_credentials(rtsp_url),
            self.output_dir.display()
        );

        tokio::fs::create_dir_all(&self.output_dir).await?;
        clear_output(&self.output_dir).await?;

        {
            let mut shared = self.shared.write();
            *shared = ConverterShared {
                rtsp_url: Some(rtsp_url.to_string()),
                started_at: Some(Instant::now()),
                ..ConverterShared::default()
            };
        }

        let child = self.spawn_ffmpeg(rtsp_url)?;
        self.transition(ConversionState::Starting, None);
        *supervisor = Some(self.spawn_supervisor(rtsp_url, child));

        Ok(())
    }

    /// Point the conversion at a different source.
    ///
    /// The running FFmpeg is stopped, old segments are removed and a new
    /// process writes into the same directory.
    pub async fn switch_to_url(&self, rtsp_url: &str) -> MediaResult<()> {
        check_source(rtsp_url)?;

        let mut supervisor = self.supervisor.lock().await;
        let Some(previous) = supervisor.take() else {
            return Err(MediaError::InvalidState {
                message: "no conversion to switch".to_string(),
            });
        };

        info!("🔄 Switching conversion to {}", redact_credentials(rtsp_url));
        previous.shutdown().await;

        {
            let mut shared = self.shared.write();
            shared.switches += 1;
            shared.rtsp_url = Some(rtsp_url.to_string());
            shared.progress = ProgressUpdate::default();
            shared.last_error = None;
        }
        self.transition(ConversionState::Switching, None);

        clear_output(&self.output_dir).await?;
        let child = self.spawn_ffmpeg(rtsp_url)?;
        *supervisor = Some(self.spawn_supervisor(rtsp_url, child));

        Ok(())
    }

    /// Stop the conversion. Calling it again is a no-op.
    pub async fn stop_conversion(&self) {
        let Some(previous) = self.supervisor.lock().await.take() else {
            debug!("Stop requested with no conversion running");
            return;
        };

        previous.shutdown().await;
        self.transition(ConversionState::Stopped, None);
        info!("⏹️ Conversion stopped ({})", self.output_dir.display());
    }

    /// Stop and remove the output directory
    pub async fn cleanup(&self) -> MediaResult<()> {
        self.stop_conversion().await;
        match tokio::fs::remove_dir_all(&self.output_dir).await {
            Ok(()) => {
                debug!("Removed {}", self.output_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot of the conversion statistics
    pub async fn get_stats(&self) -> ConversionStats {
        let mut stats = {
            let shared = self.shared.read();
            ConversionStats {
                is_converting: shared.state.is_active(),
                state: shared.state,
                camera: None,
                rtsp_url: shared.rtsp_url.as_deref().map(redact_credentials),
                hls_url: self.hls_url.clone(),
                hls_output_path: self.output_dir.display().to_string(),
                uptime_secs: shared
                    .started_at
                    .filter(|_| shared.state.is_active())
                    .map(|t| t.elapsed().as_secs())
                    .unwrap_or(0),
                frames: shared.progress.frame,
                fps: shared.progress.fps,
                bitrate_kbps: shared.progress.bitrate_kbps,
                speed: shared.progress.speed,
                out_time_secs: shared.progress.out_time.as_secs_f64(),
                segment_count: 0,
                media_sequence: 0,
                restarts: shared.restarts,
                switches: shared.switches,
                last_error: shared.last_error.clone(),
            }
        };

        match MediaPlaylist::read(&self.playlist_path()).await {
            Ok(Some(playlist)) => {
                stats.segment_count = playlist.segments.len();
                stats.media_sequence = playlist.media_sequence;
            }
            Ok(None) => {}
            Err(e) => debug!("Playlist not readable yet: {}", e),
        }

        stats
    }

    fn spawn_ffmpeg(&self, rtsp_url: &str) -> MediaResult<Child> {
        FfmpegCommand::hls(&self.config, rtsp_url, &self.output_dir)
            .spawn()
            .inspect_err(|e| {
                error!("❌ Failed to spawn ffmpeg: {}", e);
                let mut shared = self.shared.write();
                shared.state = ConversionState::Failed;
                shared.last_error = Some(e.to_string());
            })
    }

    fn spawn_supervisor(&self, rtsp_url: &str, child: Child) -> Supervisor {
        let cancel = CancellationToken::new();
        let worker = Worker {
            config: self.config.clone(),
            output_dir: self.output_dir.clone(),
            playlist_path: self.playlist_path(),
            hls_url: self.hls_url.clone(),
            rtsp_url: rtsp_url.to_string(),
            shared: self.shared.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run(child));
        Supervisor { cancel, task }
    }

    fn transition(&self, state: ConversionState, message: Option<String>) {
        set_state(&self.shared, &self.events, state, message);
    }
}

impl Drop for RtspHlsConverter {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RtspHlsConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtspHlsConverter")
            .field("output_dir", &self.output_dir)
            .field("hls_url", &self.hls_url)
            .field("state", &self.state())
            .finish()
    }
}

/// Why one FFmpeg run ended
enum RunOutcome {
    Cancelled,
    Exited(String),
    ReadyTimeout,
}

/// State moved into the supervisor task
struct Worker {
    config: ConverterConfig,
    output_dir: PathBuf,
    playlist_path: PathBuf,
    hls_url: String,
    rtsp_url: String,
    shared: Arc<RwLock<ConverterShared>>,
    events: mpsc::UnboundedSender<ConverterEvent>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut child: Child) {
        let mut consecutive = 0u32;

        loop {
            let (outcome, became_ready) = self.watch(&mut child).await;
            if let Err(e) = child.kill().await {
                debug!("ffmpeg already gone: {}", e);
            }

            let reason = match outcome {
                RunOutcome::Cancelled => return,
                RunOutcome::Exited(reason) => reason,
                RunOutcome::ReadyTimeout => {
                    let reason = format!(
                        "no HLS segment within {:?}",
                        self.config.ready_timeout
                    );
                    self.emit(ConverterEvent::Error {
                        error: reason.clone(),
                    });
                    reason
                }
            };

            if became_ready {
                consecutive = 0;
            }

            warn!("⚠️ ffmpeg stopped for {}: {}", self.output_dir.display(), reason);
            self.shared.write().last_error = Some(reason.clone());

            if consecutive >= self.config.max_restarts {
                self.fail(format!(
                    "ffmpeg failed {} times in a row: {}",
                    consecutive + 1,
                    reason
                ));
                return;
            }

            let delay = jittered(self.config.backoff_for(consecutive));
            consecutive += 1;
            self.shared.write().restarts += 1;
            set_state(
                &self.shared,
                &self.events,
                ConversionState::Reconnecting,
                Some(reason),
            );
            info!(
                "Restarting ffmpeg in {:?} (attempt {}/{})",
                delay, consecutive, self.config.max_restarts
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            child = match FfmpegCommand::hls(&self.config, &self.rtsp_url, &self.output_dir).spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    self.fail(e.to_string());
                    return;
                }
            };
        }
    }

    /// Watch one FFmpeg process until it exits, is cancelled or never gets ready
    async fn watch(&self, child: &mut Child) -> (RunOutcome, bool) {
        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
        let mut parser = ProgressParser::new();

        let mut poll = tokio::time::interval(READY_POLL_INTERVAL);
        let deadline = tokio::time::sleep(self.config.ready_timeout);
        tokio::pin!(deadline);
        let mut ready = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return (RunOutcome::Cancelled, ready),

                status = child.wait() => {
                    self.drain_stderr(&mut stderr).await;
                    let reason = match status {
                        Ok(status) => self
                            .shared
                            .read()
                            .last_error
                            .clone()
                            .unwrap_or_else(|| format!("ffmpeg exited with {}", status)),
                        Err(e) => format!("failed to wait for ffmpeg: {}", e),
                    };
                    return (RunOutcome::Exited(reason), ready);
                }

                line = next_line(&mut stdout) => {
                    if let Some(update) = line.and_then(|l| parser.feed_line(&l)) {
                        self.shared.write().progress = update;
                    }
                }

                line = next_line(&mut stderr) => {
                    if let Some(line) = line {
                        self.record_stderr(&line);
                    }
                }

                _ = poll.tick(), if !ready => {
                    if self.playlist_ready().await {
                        ready = true;
                        self.shared.write().last_error = None;
                        info!("✅ HLS ready at {}", self.hls_url);
                        set_state(
                            &self.shared,
                            &self.events,
                            ConversionState::Converting,
                            Some(self.hls_url.clone()),
                        );
                    }
                }

                _ = &mut deadline, if !ready => return (RunOutcome::ReadyTimeout, ready),
            }
        }
    }

    /// Read what FFmpeg wrote to stderr before exiting
    async fn drain_stderr<R>(&self, stderr: &mut Option<Lines<R>>)
    where
        R: AsyncBufRead + Unpin,
    {
        let Some(reader) = stderr.as_mut() else {
            return;
        };
        let drained = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, async {
            while let Ok(Some(line)) = reader.next_line().await {
                self.record_stderr(&line);
            }
        })
        .await;
        if drained.is_err() {
            debug!("ffmpeg stderr still open after exit");
        }
        *stderr = None;
    }

    fn record_stderr(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        warn!("ffmpeg: {}", line);
        self.shared.write().last_error = Some(line.to_string());
    }

    async fn playlist_ready(&self) -> bool {
        match MediaPlaylist::read(&self.playlist_path).await {
            Ok(Some(playlist)) => playlist.is_ready(),
            Ok(None) => false,
            Err(e) => {
                // FFmpeg may be mid-write
                debug!("Playlist not parseable yet: {}", e);
                false
            }
        }
    }

    fn fail(&self, reason: String) {
        error!("❌ Conversion failed: {}", reason);
        {
            let mut shared = self.shared.write();
            shared.state = ConversionState::Failed;
            shared.last_error = Some(reason.clone());
        }
        self.emit(ConverterEvent::Error { error: reason });
    }

    fn emit(&self, event: ConverterEvent) {
        if self.events.send(event).is_err() {
            debug!("Converter event receiver dropped");
        }
    }
}

fn set_state(
    shared: &RwLock<ConverterShared>,
    events: &mpsc::UnboundedSender<ConverterEvent>,
    state: ConversionState,
    message: Option<String>,
) {
    shared.write().state = state;
    let event = ConverterEvent::Status {
        status: state.as_status().to_string(),
        message,
    };
    if events.send(event).is_err() {
        debug!("Converter event receiver dropped");
    }
}

fn check_source(rtsp_url: &str) -> MediaResult<()> {
    if is_rtsp_url(rtsp_url) {
        Ok(())
    } else {
        Err(MediaError::InvalidConfiguration {
            message: format!("not an RTSP URL: {}", redact_credentials(rtsp_url)),
        })
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.0..0.1);
    delay + delay.mul_f64(factor)
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let Some(reader) = lines.as_mut() else {
        return std::future::pending().await;
    };
    let line = reader.next_line().await.ok().flatten();
    if line.is_none() {
        *lines = None;
    }
    line
}

/// Remove playlists and segments left by a previous run
async fn clear_output(dir: &Path) -> MediaResult<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_hls = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("ts") | Some("m3u8") | Some("tmp")
        );
        if is_hls {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }

    if removed > 0 {
        debug!("Cleared {} HLS files from {}", removed, dir.display());
    }
    Ok(())
}
