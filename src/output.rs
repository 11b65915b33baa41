// ABOUTME: Output formatting for CLI feedback and transfer progress.
// ABOUTME: Supports normal (progress bars), quiet (CI), and JSON line output modes.

use crate::progress::render::{self, BAR_WIDTH};
use crate::progress::{EventLevel, ProgressSink, StatusRow};
use clap::ValueEnum;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// Human-friendly output with progress bars
    #[default]
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    /// The progress sink matching this mode.
    pub fn sink(self) -> Arc<dyn ProgressSink> {
        match self {
            OutputMode::Normal => Arc::new(TerminalSink::new()),
            OutputMode::Quiet => Arc::new(QuietSink),
            OutputMode::Json => Arc::new(JsonSink::new(std::io::stdout())),
        }
    }
}

/// Handles command results based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a plain line of command output, such as an image listing row.
    pub fn line(&self, message: &str) {
        if self.mode != OutputMode::Json {
            println!("{message}");
        }
    }

    /// Print a structured value: JSON in JSON mode, nothing otherwise.
    pub fn record<T: Serialize>(&self, value: &T) {
        if self.mode == OutputMode::Json
            && let Ok(json) = serde_json::to_string(value)
        {
            println!("{json}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "success",
                    message,
                    duration_secs: self.start_time.map(|_| self.elapsed_secs()),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.start_time.map(|_| self.elapsed_secs()),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

/// One bar per row plus a summary line, drawn on stderr.
pub struct TerminalSink {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    summary: ProgressBar,
}

impl TerminalSink {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let summary = multi.add(ProgressBar::new(0));
        summary.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            summary,
        }
    }

    fn row_style() -> ProgressStyle {
        let template = format!("{{prefix:16}} {{msg:12}} [{{bar:{BAR_WIDTH}}}] {{bytes}}/{{total_bytes}}");
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("++ ")
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalSink {
    fn render(&self, rows: &[StatusRow], elapsed: Duration) {
        let mut bars = self.bars.lock();
        for row in rows {
            let bar = bars.entry(row.key.clone()).or_insert_with(|| {
                let bar = self
                    .multi
                    .insert_before(&self.summary, ProgressBar::new(row.total));
                bar.set_style(Self::row_style());
                bar.set_prefix(render::short_key(&row.key).to_string());
                bar
            });
            bar.set_length(row.total);
            bar.set_position(row.offset.min(row.total));
            bar.set_message(row.state.as_str());
            if row.state.is_terminal() && !bar.is_finished() {
                bar.finish();
            }
        }
        self.summary.set_message(render::summary(rows, elapsed));
    }

    fn event(&self, level: EventLevel, step: &str, message: &str) {
        let line = match level {
            EventLevel::Info | EventLevel::Debug => format!("{step}: {message}"),
            _ => format!("{step} [{level}]: {message}"),
        };
        if self.multi.println(&line).is_err() {
            eprintln!("{line}");
        }
    }
}

/// Prints nothing but warnings and errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietSink;

impl ProgressSink for QuietSink {
    fn render(&self, _rows: &[StatusRow], _elapsed: Duration) {}

    fn event(&self, level: EventLevel, step: &str, message: &str) {
        if matches!(level, EventLevel::Warn | EventLevel::Error) {
            eprintln!("{step} [{level}]: {message}");
        }
    }
}

/// Writes one JSON object per row change and per event.
pub struct JsonSink<W> {
    out: Mutex<JsonState<W>>,
}

struct JsonState<W> {
    writer: W,
    last: HashMap<String, (String, u64)>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonProgress<'a> {
    id: &'a str,
    status: &'a str,
    progress_detail: ProgressDetail,
}

#[derive(Serialize)]
struct ProgressDetail {
    current: u64,
    total: u64,
}

#[derive(Serialize)]
struct JsonStep<'a> {
    level: EventLevel,
    step: &'a str,
    message: &'a str,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: Mutex::new(JsonState {
                writer,
                last: HashMap::new(),
            }),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().writer
    }

    fn emit<T: Serialize>(writer: &mut W, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            let _ = writeln!(writer, "{json}");
        }
    }
}

impl<W: Write + Send> ProgressSink for JsonSink<W> {
    fn render(&self, rows: &[StatusRow], _elapsed: Duration) {
        let mut out = self.out.lock();
        let JsonState { writer, last } = &mut *out;
        for row in rows {
            let current = (row.state.as_str().to_string(), row.offset);
            if last.get(&row.key) == Some(&current) {
                continue;
            }
            Self::emit(
                writer,
                &JsonProgress {
                    id: &row.key,
                    status: row.state.as_str(),
                    progress_detail: ProgressDetail {
                        current: row.offset,
                        total: row.total,
                    },
                },
            );
            last.insert(row.key.clone(), current);
        }
        let _ = writer.flush();
    }

    fn event(&self, level: EventLevel, step: &str, message: &str) {
        let mut out = self.out.lock();
        Self::emit(&mut out.writer, &JsonStep { level, step, message });
        let _ = out.writer.flush();
    }
}
