use std::sync::mpsc;

use crate::log::{self, log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink};

/// Lightweight, cloneable handle to the process logger.
///
/// `LoggerHandle` is a thin sink that enqueues `LogMsg` into a bounded
/// `SyncSender`. Calls to [`try_log`](Self::try_log) are non-blocking: if
/// the queue is full, the message is dropped and an error is returned.
///
/// Typical usage is to obtain it from your `Logger` and clone it per
/// module/thread.
#[derive(Clone)]
pub struct LoggerHandle {
    pub(super) tx: mpsc::SyncSender<LogMsg>,
}

impl LogSink for LoggerHandle {
    #[inline]
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let _ = self.try_log(level, msg, target);
    }
}

impl LoggerHandle {
    /// Attempts to enqueue a log message without blocking.
    ///
    /// The message carries a millisecond timestamp and the given `target`
    /// (e.g., `module_path!()`).
    ///
    /// # Errors
    /// Returns:
    /// - `Err(TrySendError::Full(_))` when the bounded queue is at capacity
    ///   (the message is dropped).
    /// - `Err(TrySendError::Disconnected(_))` when the logger worker has
    ///   been dropped.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), mpsc::TrySendError<LogMsg>> {
        let msg = LogMsg {
            level,
            ts_ms: log::now_millis(),
            text: text.into(),
            target,
        };
        self.tx.try_send(msg)
    }
}
