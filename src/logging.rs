//! Tracing subscriber setup.
//!
//! Logs go to stderr by default. With `logging.file` set, the file is rotated
//! on startup (`graph-relay.log` → `.1` → `.2` → `.3`) and written through a
//! line-flushing writer so nothing is lost on a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::EnvFilter;

use crate::config::{expand_home, LoggingConfig};

/// Rotated log files kept next to the live one.
const KEEP_ROTATED: u32 = 3;

/// Install the global subscriber. Returns the log file path, if any.
///
/// `RUST_LOG` overrides the configured filter.
pub fn init_tracing(config: &LoggingConfig) -> io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (writer, log_path) = match config.file.as_deref() {
        Some(raw) => {
            let path = PathBuf::from(expand_home(raw));
            let file = open_rotated(&path)?;
            (BoxMakeWriter::new(SyncFileWriter::new(file)), Some(path))
        }
        None => (BoxMakeWriter::new(io::stderr), None),
    };
    let ansi = log_path.is_none();

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(false)
            .try_init()
    };
    installed.map_err(|e| io::Error::other(format!("tracing init failed: {e}")))?;

    Ok(log_path)
}

fn open_rotated(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    rotate_log_file(path, KEEP_ROTATED)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// `base` with a `.{n}` suffix appended to the file name.
fn rotated_name(base: &Path, n: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `base` into `base.1`, each `base.{n}` into `base.{n+1}`, and drop
/// whatever sat at `base.{keep}`. Gaps in the chain are fine.
fn rotate_log_file(base: &Path, keep: u32) -> io::Result<()> {
    if keep == 0 {
        return ignore_missing(fs::remove_file(base));
    }
    ignore_missing(fs::remove_file(rotated_name(base, keep)))?;
    for n in (1..keep).rev() {
        ignore_missing(fs::rename(rotated_name(base, n), rotated_name(base, n + 1)))?;
    }
    ignore_missing(fs::rename(base, rotated_name(base, 1)))
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Shared log file that is flushed after every record, so a crash loses at
/// most the line being written.
#[derive(Clone)]
struct SyncFileWriter {
    file: Arc<Mutex<File>>,
}

impl SyncFileWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        // A panic mid-write leaves at worst a torn line; keep logging.
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut file)
    }
}

impl Write for SyncFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| {
            file.write_all(buf)?;
            file.flush()?;
            Ok(buf.len())
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> MakeWriter<'a> for SyncFileWriter {
    type Writer = SyncFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
