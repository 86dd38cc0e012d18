//! FFmpeg command line, availability probe and progress parsing

use crate::converter::{ConverterConfig, VideoEncoding};
use crate::error::{MediaError, MediaResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::debug;

/// Segment file name pattern written next to the playlist
pub const SEGMENT_PATTERN: &str = "segment_%05d.ts";

/// FFmpeg invocation that pulls one RTSP source into an HLS directory
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl FfmpegCommand {
    /// Build the RTSP to HLS command for `input_url`, writing into `output_dir`
    pub fn hls(config: &ConverterConfig, input_url: &str, output_dir: &Path) -> Self {
        let segment_path = output_dir.join(SEGMENT_PATTERN);
        let playlist_path = output_dir.join(&config.playlist_name);

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-nostats".into(),
            // key=value progress blocks on stdout
            "-progress".into(),
            "pipe:1".into(),
            "-rtsp_transport".into(),
            config.rtsp_transport.clone(),
            "-i".into(),
            input_url.to_string(),
        ];

        match &config.video {
            VideoEncoding::Copy => {
                args.extend(["-c:v", "copy"].map(String::from));
            }
            VideoEncoding::H264 {
                preset,
                bitrate_kbps,
            } => {
                let gop = (config.hls_time_secs.max(1) * 30).to_string();
                args.extend([
                    "-c:v".to_string(),
                    "libx264".to_string(),
                    "-preset".to_string(),
                    preset.clone(),
                    "-tune".to_string(),
                    "zerolatency".to_string(),
                    "-b:v".to_string(),
                    format!("{}k", bitrate_kbps),
                    "-g".to_string(),
                    gop,
                    "-sc_threshold".to_string(),
                    "0".to_string(),
                ]);
            }
        }

        if config.include_audio {
            args.extend(["-c:a", "aac"].map(String::from));
        } else {
            args.push("-an".into());
        }

        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            config.hls_time_secs.to_string(),
            "-hls_list_size".to_string(),
            config.hls_list_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments+omit_endlist".to_string(),
            "-hls_segment_filename".to_string(),
            segment_path.to_string_lossy().into_owned(),
            "-y".to_string(),
            playlist_path.to_string_lossy().into_owned(),
        ]);

        Self {
            program: config.ffmpeg_path.clone(),
            args,
        }
    }

    /// Program that will be executed
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Spawn the process with piped stdout/stderr.
    ///
    /// The child is killed if its handle is dropped.
    pub fn spawn(&self) -> MediaResult<Child> {
        debug!("Spawning {} with {} args", self.program.display(), self.args.len());
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound {
                        path: self.program.display().to_string(),
                    }
                } else {
                    MediaError::Io { source: e }
                }
            })
    }
}

/// Run `<ffmpeg> -version` and return the first line of its output
pub async fn probe_ffmpeg(program: &Path, probe_timeout: Duration) -> MediaResult<String> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(probe_timeout, output)
        .await
        .map_err(|_| MediaError::Timeout {
            duration: probe_timeout,
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::FfmpegNotFound {
                    path: program.display().to_string(),
                }
            } else {
                MediaError::Io { source: e }
            }
        })?;

    if !output.status.success() {
        return Err(MediaError::FfmpegFailed {
            reason: format!("-version exited with {}", output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Whether the FFmpeg binary runs at all
pub async fn is_ffmpeg_available(program: &Path, probe_timeout: Duration) -> bool {
    match probe_ffmpeg(program, probe_timeout).await {
        Ok(version) => {
            debug!("FFmpeg available: {}", version);
            true
        }
        Err(e) => {
            debug!("FFmpeg unavailable: {}", e);
            false
        }
    }
}

/// One complete `-progress` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Frames written so far
    pub frame: u64,
    /// Current output frame rate
    pub fps: f32,
    /// Output bitrate, if FFmpeg knows it
    pub bitrate_kbps: Option<f32>,
    /// Bytes written, if FFmpeg knows it
    pub total_size: Option<u64>,
    /// Output timestamp reached
    pub out_time: Duration,
    /// Processing speed relative to real time
    pub speed: Option<f32>,
    /// `progress=end` was seen
    pub finished: bool,
}

/// Accumulates `key=value` lines from `-progress` into [`ProgressUpdate`]s
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: ProgressUpdate,
}

impl ProgressParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a snapshot when a block completes
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            "bitrate" => {
                self.current.bitrate_kbps = value
                    .strip_suffix("kbits/s")
                    .and_then(|v| v.trim().parse().ok());
            }
            "total_size" => {
                self.current.total_size = value.parse().ok();
            }
            // out_time_ms is microseconds as well
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time = Duration::from_micros(us.max(0) as u64);
                }
            }
            "out_time" => {
                if self.current.out_time.is_zero() {
                    if let Some(time) = parse_timestamp(value) {
                        self.current.out_time = time;
                    }
                }
            }
            "speed" => {
                self.current.speed = value
                    .strip_suffix('x')
                    .and_then(|v| v.trim().parse().ok());
            }
            "progress" => {
                let mut update = std::mem::take(&mut self.current);
                update.finished = value == "end";
                return Some(update);
            }
            _ => {}
        }

        None
    }
}

/// Parse `HH:MM:SS(.fraction)` into a duration
pub fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ConverterConfig {
        ConverterConfig {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ..ConverterConfig::default()
        }
    }

    #[test]
    fn test_hls_command_copies_by_default() {
        let config = test_config();
        let command = FfmpegCommand::hls(&config, "rtsp://cam/live", Path::new("/tmp/hls/s1"));
        let args = command.args();

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "rtsp://cam/live");
        assert!(args.windows(2).any(|w| w[0] == "-rtsp_transport" && w[1] == "tcp"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-hls_time" && w[1] == "2"));
        assert!(args.windows(2).any(|w| w[0] == "-hls_list_size" && w[1] == "5"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/hls/s1/stream.m3u8");
    }

    #[test]
    fn test_hls_command_transcodes_h264() {
        let mut config = test_config();
        config.video = VideoEncoding::H264 {
            preset: "veryfast".to_string(),
            bitrate_kbps: 1500,
        };
        config.include_audio = true;

        let command = FfmpegCommand::hls(&config, "rtsp://cam/live", Path::new("/out"));
        let args = command.args();
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-b:v" && w[1] == "1500k"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_progress_block() {
        let mut parser = ProgressParser::new();
        let lines = [
            "frame=250",
            "fps=25.02",
            "stream_0_0_q=-1.0",
            "bitrate=1024.5kbits/s",
            "total_size=1280000",
            "out_time_us=10000000",
            "out_time_ms=10000000",
            "out_time=00:00:10.000000",
            "dup_frames=0",
            "drop_frames=0",
            "speed=1.01x",
        ];
        for line in lines {
            assert!(parser.feed_line(line).is_none());
        }

        let update = parser.feed_line("progress=continue").unwrap();
        assert_eq!(update.frame, 250);
        assert!((update.fps - 25.02).abs() < 0.001);
        assert_eq!(update.bitrate_kbps, Some(1024.5));
        assert_eq!(update.total_size, Some(1_280_000));
        assert_eq!(update.out_time, Duration::from_secs(10));
        assert_eq!(update.speed, Some(1.01));
        assert!(!update.finished);

        // Next block starts fresh
        let update = parser.feed_line("progress=end").unwrap();
        assert_eq!(update.frame, 0);
        assert!(update.finished);
    }

    #[test]
    fn test_progress_not_available_values() {
        let mut parser = ProgressParser::new();
        parser.feed_line("bitrate=N/A");
        parser.feed_line("total_size=N/A");
        parser.feed_line("out_time_us=N/A");
        parser.feed_line("speed=N/A");
        parser.feed_line("garbage line");
        let update = parser.feed_line("progress=continue").unwrap();
        assert_eq!(update.bitrate_kbps, None);
        assert_eq!(update.total_size, None);
        assert_eq!(update.speed, None);
        assert!(update.out_time.is_zero());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("01:02:03.500000"),
            Some(Duration::from_millis(3_723_500))
        );
        assert_eq!(parse_timestamp("00:00:00"), Some(Duration::ZERO));
        assert_eq!(parse_timestamp("00:61:00"), None);
        assert_eq!(parse_timestamp("-577014:32:22.77"), None);
        assert_eq!(parse_timestamp("N/A"), None);
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let missing = Path::new("/nonexistent/bin/ffmpeg");
        let result = probe_ffmpeg(missing, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(MediaError::FfmpegNotFound { .. })));
        assert!(!is_ffmpeg_available(missing, Duration::from_secs(1)).await);
    }
}
