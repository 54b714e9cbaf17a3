//! Rolling File Logger
//!
//! Installs a `tracing` subscriber that writes to a size-rotated set of log
//! files and mirrors the most recent lines into an in-memory circular buffer.
//! Records emitted through the `log` facade are bridged automatically.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Rotate once the active file would grow past this many bytes
pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024;
/// Number of rotated files kept next to the active one
pub const DEFAULT_MAX_FILES: usize = 5;
/// Lines retained in the in-memory buffer
pub const DEFAULT_BUFFER_LINES: usize = 500;

static LOGGER: OnceLock<LogSink> = OnceLock::new();

/// Rotation settings for [`init_logger_with`]
#[derive(Debug, Clone, Copy)]
pub struct RollingOptions {
    pub max_bytes: u64,
    pub max_files: usize,
    pub buffer_lines: usize,
}

impl Default for RollingOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
            buffer_lines: DEFAULT_BUFFER_LINES,
        }
    }
}

/// Size-rotated log file set: `<name>.log`, `<name>.1.log`, ... `<name>.<max_files>.log`
struct RollingFile {
    dir: PathBuf,
    name: String,
    options: RollingOptions,
    file: File,
    size: u64,
    recent: VecDeque<String>,
}

impl RollingFile {
    fn open(dir: &Path, name: &str, options: RollingOptions) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = active_path(dir, name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            options,
            file,
            size,
            recent: VecDeque::with_capacity(options.buffer_lines),
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        // Drop the oldest, shift the rest up by one
        let oldest = rotated_path(&self.dir, &self.name, self.options.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.options.max_files).rev() {
            let from = rotated_path(&self.dir, &self.name, index);
            if from.exists() {
                fs::rename(&from, rotated_path(&self.dir, &self.name, index + 1))?;
            }
        }

        let active = active_path(&self.dir, &self.name);
        if self.options.max_files > 0 {
            fs::rename(&active, rotated_path(&self.dir, &self.name, 1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&active)?;
        self.size = 0;
        Ok(())
    }

    fn remember(&mut self, buf: &[u8]) {
        if self.options.buffer_lines == 0 {
            return;
        }
        for line in String::from_utf8_lossy(buf).lines() {
            if line.trim().is_empty() {
                continue;
            }
            if self.recent.len() == self.options.buffer_lines {
                self.recent.pop_front();
            }
            self.recent.push_back(line.to_string());
        }
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.options.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.size += buf.len() as u64;
        self.remember(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn active_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.log", name))
}

fn rotated_path(dir: &Path, name: &str, index: usize) -> PathBuf {
    dir.join(format!("{}.{}.log", name, index))
}

/// Cloneable handle the subscriber writes through
#[derive(Clone)]
struct LogSink {
    inner: Arc<Mutex<RollingFile>>,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        file.flush()
    }
}

/// Local wall-clock timestamps, millisecond precision
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Initialize the global logger with default rotation settings
pub fn init_logger(log_dir: impl AsRef<Path>, app_name: &str) -> Result<(), String> {
    init_logger_with(log_dir, app_name, RollingOptions::default())
}

/// Initialize the global logger
///
/// Fails when called twice in the same process.
pub fn init_logger_with(
    log_dir: impl AsRef<Path>,
    app_name: &str,
    options: RollingOptions,
) -> Result<(), String> {
    if LOGGER.get().is_some() {
        return Err("Logger already initialized".to_string());
    }

    let file = RollingFile::open(log_dir.as_ref(), app_name, options)
        .map_err(|e| format!("Failed to open log file: {}", e))?;
    let sink = LogSink {
        inner: Arc::new(Mutex::new(file)),
    };

    let writer_sink = sink.clone();
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_timer(LocalTimer)
        .with_target(true)
        .with_writer(move || writer_sink.clone())
        .try_init()
        .map_err(|e| format!("Failed to install subscriber: {}", e))?;

    LOGGER
        .set(sink)
        .map_err(|_| "Logger already initialized".to_string())?;

    log::info!("{} logger initialized", app_name);
    Ok(())
}

pub fn info(msg: &str) -> Result<(), String> {
    ensure_initialized()?;
    tracing::info!("{}", msg);
    Ok(())
}

pub fn warn(msg: &str) -> Result<(), String> {
    ensure_initialized()?;
    tracing::warn!("{}", msg);
    Ok(())
}

pub fn error(msg: &str) -> Result<(), String> {
    ensure_initialized()?;
    tracing::error!("{}", msg);
    Ok(())
}

/// The last `n` lines written, oldest first
pub fn recent_lines(n: usize) -> Vec<String> {
    let Some(sink) = LOGGER.get() else {
        return Vec::new();
    };
    match sink.inner.lock() {
        Ok(file) => {
            let skip = file.recent.len().saturating_sub(n);
            file.recent.iter().skip(skip).cloned().collect()
        }
        Err(_) => Vec::new(),
    }
}

fn ensure_initialized() -> Result<(), String> {
    if LOGGER.get().is_none() {
        return Err("Logger not initialized".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_bytes: u64, max_files: usize) -> RollingOptions {
        RollingOptions {
            max_bytes,
            max_files,
            buffer_lines: 3,
        }
    }

    #[test]
    fn test_rotation_keeps_bounded_file_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = RollingFile::open(dir.path(), "app", options(16, 2)).unwrap();

        for i in 0..10 {
            file.write_all(format!("line number {}\n", i).as_bytes()).unwrap();
        }
        file.flush().unwrap();

        assert!(active_path(dir.path(), "app").exists());
        assert!(rotated_path(dir.path(), "app", 1).exists());
        assert!(rotated_path(dir.path(), "app", 2).exists());
        assert!(!rotated_path(dir.path(), "app", 3).exists());

        let active = fs::read_to_string(active_path(dir.path(), "app")).unwrap();
        assert_eq!(active, "line number 9\n");
    }

    #[test]
    fn test_circular_buffer_keeps_latest_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = RollingFile::open(dir.path(), "app", options(1024, 1)).unwrap();

        for i in 0..5 {
            file.write_all(format!("entry {}\n", i).as_bytes()).unwrap();
        }

        let recent: Vec<_> = file.recent.iter().cloned().collect();
        assert_eq!(recent, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_helpers_fail_before_init() {
        if LOGGER.get().is_none() {
            assert!(info("hello").is_err());
            assert!(recent_lines(10).is_empty());
        }
    }
}
