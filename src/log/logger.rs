use crate::log::{log_msg::LogMsg, logger_handle::LoggerHandle};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

/// Bounded, non-blocking logger that writes to a per-process log file.
///
/// Producers hold a cloneable [`LoggerHandle`]; a background thread drains
/// the queue and flushes periodically. A full queue drops messages rather
/// than stalling the media path.
pub struct Logger {
    handle: LoggerHandle,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Create `logs/` next to the executable and start the logger there.
    #[must_use]
    pub fn start_default(app_name: &str, cap: usize) -> Self {
        let base = exe_dir_fallback_cwd().join("logs");
        Self::start_in_dir(base, app_name, cap)
    }

    /// Start the logger in a specific directory.
    /// Creates the directory if missing and chooses a per-PID file name.
    pub fn start_in_dir<D: AsRef<Path>>(dir: D, app_name: &str, cap: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let fname = format!("{}-pid{}.log", app_name, std::process::id());
        let file_path = dir.join(&fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap);
        let handle = LoggerHandle { tx };
        let file_path_clone = file_path.clone();

        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || {
                // Try target file -> temp file -> sink (never panic).
                let writer: Box<dyn Write + Send> = if let Ok(f) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path_clone)
                {
                    Box::new(f)
                } else {
                    let fallback = std::env::temp_dir().join("restreamer-fallback.log");
                    match OpenOptions::new().create(true).append(true).open(&fallback) {
                        Ok(f) => Box::new(f),
                        Err(_) => Box::new(io::sink()),
                    }
                };

                let mut out: BufWriter<Box<dyn Write + Send>> = BufWriter::new(writer);
                let mut lines_written: u32 = 0;

                while let Ok(m) = rx.recv() {
                    let _ = writeln!(&mut out, "[{:?}] {} {} | {}", m.level, m.ts_ms, m.target, m.text);
                    lines_written = lines_written.wrapping_add(1);
                    if lines_written % 100 == 0 {
                        let _ = out.flush();
                    }
                }

                let _ = out.flush();
            })
            .ok();

        Self {
            handle,
            _thread,
            file_path,
        }
    }

    /// Give modules a cloneable sink they can keep.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Expose the chosen file path (nice for debugging).
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Logs next to the executable (target/{debug,release}), or current dir on error.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}
