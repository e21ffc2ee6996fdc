use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result};
use chrono::SecondsFormat;

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Initializes the global logger once, writing to `path` in addition to
/// stderr. A failure here is never fatal to a core operation: callers treat
/// it as best-effort and fall back to stderr-only logging.
pub fn init_log_file(path: &Path) -> Result<()> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = Logger::new(path)?;
    let _ = LOGGER.set(logger);
    Ok(())
}

/// Initializes logging under a fresh `<harmony_dir>/logs/harmony-*.log` file
/// for this invocation, swallowing any failure (best-effort, per §12).
pub fn init_for_repository(harmony_dir: &Path) {
    let path = harmony_dir.join("logs").join(invocation_log_name());
    if let Err(e) = init_log_file(&path) {
        eprintln!("warning: failed to open log file {}: {e}", path.display());
    }
}

fn invocation_log_name() -> String {
    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    format!("harmony-{ts}-{}.log", std::process::id())
}

pub fn info(msg: impl AsRef<str>) {
    log_kv("INFO", msg.as_ref(), &[]);
}

pub fn warn(msg: impl AsRef<str>) {
    log_kv("WARN", msg.as_ref(), &[]);
}

pub fn error(msg: impl AsRef<str>) {
    log_kv("ERROR", msg.as_ref(), &[]);
}

pub fn info_kv(msg: &str, kv: &[(&str, &str)]) {
    log_kv("INFO", msg, kv);
}

fn log_kv(level: &str, msg: &str, kv: &[(&str, &str)]) {
    if let Some(logger) = LOGGER.get() {
        logger.write_kv(level, msg, kv);
    } else {
        eprintln!("{level} {msg}");
    }
}

struct Logger {
    file: Mutex<File>,
    mirror_to_stderr: bool,
}

impl Logger {
    fn new(path: &Path) -> Result<Self> {
        Self::new_with_stderr(path, true)
    }

    fn new_with_stderr(path: &Path, mirror_to_stderr: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            mirror_to_stderr,
        })
    }

    fn write_kv(&self, level: &str, msg: &str, kv: &[(&str, &str)]) {
        let ts = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut pretty_line = format!("{ts} {level} {msg}");
        for (k, v) in kv {
            pretty_line.push(' ');
            pretty_line.push_str(k);
            pretty_line.push('=');
            pretty_line.push_str(v);
        }
        pretty_line.push('\n');

        let mut slog_line = format!("time={ts} level={level} msg=\"{}\"", escape_slog_value(msg));
        for (k, v) in kv {
            slog_line.push(' ');
            slog_line.push_str(k);
            slog_line.push('=');
            slog_line.push_str(v);
        }
        slog_line.push('\n');
        if let Ok(mut f) = self.file.lock() {
            let _ = f.write_all(slog_line.as_bytes());
            let _ = f.flush();
        }
        if self.mirror_to_stderr {
            let mut out = std::io::stderr();
            let _ = out.write_all(pretty_line.as_bytes());
            let _ = out.flush();
        }
    }
}

fn escape_slog_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
