//! Progress normalization.
//!
//! Two tool output shapes reduce to the canonical [`Progress`]:
//! ffmpeg's key=value `-progress` records (with its plain `time=` log
//! lines as a secondary carrier), and the line-delimited JSON emitted
//! by the Python engines. Fragments with no extractable numeric signal
//! are dropped.

use serde::Deserialize;
use unmark_models::{Progress, Stage};

/// Suppresses regressions so one job's percent never decreases.
#[derive(Debug, Default)]
pub struct ProgressGate {
    last_percent: Option<u8>,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass an update through, clamping to 100 and enforcing
    /// monotonicity. Returns `None` when the update would regress.
    pub fn accept(&mut self, mut progress: Progress) -> Option<Progress> {
        progress.percent = progress.percent.min(100);
        if let Some(last) = self.last_percent {
            if progress.percent < last {
                return None;
            }
        }
        self.last_percent = Some(progress.percent);
        Some(progress)
    }
}

/// `min(100, round(elapsed / total * 100))`; unknown totals yield 0.
pub fn percent_of(elapsed_ms: i64, total_ms: i64) -> u8 {
    if total_ms <= 0 || elapsed_ms <= 0 {
        return 0;
    }
    (((elapsed_ms as f64 / total_ms as f64) * 100.0).round() as u64).min(100) as u8
}

/// Incremental parser for ffmpeg stderr.
///
/// ffmpeg writes key=value `-progress pipe:2` records interleaved with
/// its normal log lines; a `progress=` key closes one record and yields
/// an update. Plain `time=HH:MM:SS.cc ... speed=N.Nx` lines also carry
/// usable signal and are scanned as a fallback.
#[derive(Debug)]
pub struct FfmpegProgressParser {
    total_duration_ms: i64,
    out_time_ms: i64,
    frame: Option<u64>,
    fps: Option<f64>,
    speed: Option<f64>,
}

impl FfmpegProgressParser {
    /// `total_duration_ms` comes from the per-job metadata probe.
    pub fn new(total_duration_ms: i64) -> Self {
        Self {
            total_duration_ms,
            out_time_ms: 0,
            frame: None,
            fps: None,
            speed: None,
        }
    }

    /// Feed one stderr line; returns an update when a record completes.
    pub fn push_line(&mut self, line: &str) -> Option<Progress> {
        let line = line.trim();

        // `-progress` records are bare key=value lines; anything with
        // spaces is a normal log line.
        if !line.contains(' ') {
            if let Some((key, value)) = line.split_once('=') {
                return self.push_record_key(key, value);
            }
        }

        if line.contains("time=") {
            return self.scan_carrier(line);
        }

        None
    }

    fn push_record_key(&mut self, key: &str, value: &str) -> Option<Progress> {
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "out_time_ms" => {
                if let Ok(ms) = value.parse::<i64>() {
                    self.out_time_ms = ms;
                }
            }
            "out_time" => {
                if let Some(ms) = parse_clock(value) {
                    self.out_time_ms = ms;
                }
            }
            "frame" => {
                self.frame = value.parse().ok();
            }
            "fps" => {
                self.fps = value.parse().ok();
            }
            "speed" => {
                self.speed = parse_speed(value);
            }
            // "continue" or "end"; either way the record is complete
            "progress" => return Some(self.emit()),
            _ => {}
        }
        None
    }

    /// Scan a plain log line like
    /// `frame=  305 fps= 61 ... time=00:00:10.17 ... speed=2.03x`.
    fn scan_carrier(&mut self, line: &str) -> Option<Progress> {
        let elapsed = token_after(line, "time=").and_then(|t| parse_clock(&t))?;
        self.out_time_ms = elapsed;

        if let Some(speed) = token_after(line, "speed=").and_then(|t| parse_speed(&t)) {
            self.speed = Some(speed);
        }
        if let Some(fps) = token_after(line, "fps=").and_then(|t| t.parse().ok()) {
            self.fps = Some(fps);
        }
        if let Some(frame) = token_after(line, "frame=").and_then(|t| t.parse().ok()) {
            self.frame = Some(frame);
        }

        Some(self.emit())
    }

    fn emit(&self) -> Progress {
        Progress {
            stage: Stage::Processing,
            percent: percent_of(self.out_time_ms, self.total_duration_ms),
            fps: self.fps,
            speed: self.speed,
            frame: self.frame,
            total_frames: None,
        }
    }
}

/// Value following `key` on a log line, skipping padding spaces.
fn token_after(line: &str, key: &str) -> Option<String> {
    let rest = &line[line.find(key)? + key.len()..];
    let token: String = rest
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    (!token.is_empty()).then_some(token)
}

/// Parse `HH:MM:SS.frac` into milliseconds.
fn parse_clock(value: &str) -> Option<i64> {
    let mut parts = value.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0 || minutes < 0 || seconds < 0.0 {
        return None;
    }
    Some((hours * 3600 + minutes * 60) * 1000 + (seconds * 1000.0).round() as i64)
}

/// Parse `1.5x` or `N/A`.
fn parse_speed(value: &str) -> Option<f64> {
    value.strip_suffix('x')?.parse().ok()
}

/// One structured message from a line-delimited JSON engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    Progress {
        #[serde(default)]
        progress: Option<f64>,
        #[serde(default)]
        current_frame: Option<u64>,
        #[serde(default)]
        total_frames: Option<u64>,
        #[serde(default)]
        fps_speed: Option<f64>,
    },

    Info {
        #[serde(default)]
        message: Option<String>,
    },

    /// Model weights being fetched before processing starts
    DownloadProgress {
        #[serde(default)]
        progress: Option<f64>,
    },

    Complete {
        #[serde(default)]
        output: Option<String>,
    },

    /// The scripts report the text under either key
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl EngineMessage {
    /// Canonical progress update, when this message carries one.
    pub fn to_progress(&self) -> Option<Progress> {
        match self {
            EngineMessage::Progress {
                progress,
                current_frame,
                total_frames,
                fps_speed,
            } => {
                let percent = (*progress)?.round().clamp(0.0, 100.0) as u8;
                Some(Progress {
                    stage: Stage::Processing,
                    percent,
                    fps: *fps_speed,
                    speed: None,
                    frame: *current_frame,
                    total_frames: *total_frames,
                })
            }
            _ => None,
        }
    }

    /// Failure text, when this is an error message.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            EngineMessage::Error { message, error } => {
                message.as_deref().or(error.as_deref())
            }
            _ => None,
        }
    }
}

/// Parse one engine stdout line. Non-JSON lines and unknown message
/// kinds are incidental log noise, not errors.
pub fn parse_engine_line(line: &str) -> Option<EngineMessage> {
    serde_json::from_str(line.trim()).ok()
}
