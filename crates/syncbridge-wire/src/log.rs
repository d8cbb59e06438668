//! Session logger.
//!
//! Entries are kept in a [`LogBlock`], the shape the protocol carries in
//! responses, and mirrored to `tracing`. Blocks received from the server are
//! merged into the local one.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use syncbridge_core::Value;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Key of the level inside a wire log block.
    pub const fn wire_key(self) -> &'static str {
        match self {
            LogLevel::Error => "err",
            LogLevel::Warning => "war",
            LogLevel::Info => "msg",
            LogLevel::Debug => "deb",
        }
    }
}

/// Leveled log entries, in the wire shape `{err, war, msg, deb}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBlock {
    pub err: Vec<String>,
    pub war: Vec<String>,
    pub msg: Vec<String>,
    pub deb: Vec<String>,
}

impl LogBlock {
    pub fn is_empty(&self) -> bool {
        self.err.is_empty() && self.war.is_empty() && self.msg.is_empty() && self.deb.is_empty()
    }

    pub fn entries(&self, level: LogLevel) -> &[String] {
        match level {
            LogLevel::Error => &self.err,
            LogLevel::Warning => &self.war,
            LogLevel::Info => &self.msg,
            LogLevel::Debug => &self.deb,
        }
    }

    fn entries_mut(&mut self, level: LogLevel) -> &mut Vec<String> {
        match level {
            LogLevel::Error => &mut self.err,
            LogLevel::Warning => &mut self.war,
            LogLevel::Info => &mut self.msg,
            LogLevel::Debug => &mut self.deb,
        }
    }

    /// Wire form; empty levels are left out.
    pub fn to_value(&self) -> Value {
        let mut value = Value::empty_map();
        for level in [LogLevel::Error, LogLevel::Warning, LogLevel::Info, LogLevel::Debug] {
            let entries = self.entries(level);
            if !entries.is_empty() {
                value.insert(
                    level.wire_key(),
                    Value::List(entries.iter().map(|e| Value::from(e.as_str())).collect()),
                );
            }
        }
        value
    }

    /// Read a wire block. Each level may be a list, a map of entries or a
    /// single text; anything else is ignored.
    pub fn from_value(value: &Value) -> Self {
        let mut block = LogBlock::default();
        for level in [LogLevel::Error, LogLevel::Warning, LogLevel::Info, LogLevel::Debug] {
            let entries: Vec<String> = match value.get(level.wire_key()) {
                Some(Value::List(items)) => items.iter().filter_map(Value::scalar_text).collect(),
                Some(Value::Map(map)) => map.values().filter_map(Value::scalar_text).collect(),
                Some(scalar) => scalar.scalar_text().into_iter().collect(),
                None => Vec::new(),
            };
            *block.entries_mut(level) = entries;
        }
        block
    }
}

/// Thread-safe session logger.
pub struct Logger {
    block: Mutex<LogBlock>,
    debug: bool,
}

impl Logger {
    /// Create a logger. Debug entries are only kept when `debug` is set.
    pub fn new(debug: bool) -> Self {
        Self {
            block: Mutex::new(LogBlock::default()),
            debug,
        }
    }

    /// Record an entry and mirror it to `tracing`.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
        }
        if level == LogLevel::Debug && !self.debug {
            return;
        }
        self.block.lock().unwrap().entries_mut(level).push(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Merge a block produced by the remote side.
    pub fn merge_remote(&self, remote: &LogBlock) {
        for level in [LogLevel::Error, LogLevel::Warning, LogLevel::Info, LogLevel::Debug] {
            for entry in remote.entries(level) {
                self.log(level, format!("[remote] {}", entry));
            }
        }
    }

    /// Drop info and debug entries, keeping errors and warnings.
    pub fn retain_alerts(&self) {
        let mut block = self.block.lock().unwrap();
        block.msg.clear();
        block.deb.clear();
    }

    pub fn has_errors(&self) -> bool {
        !self.block.lock().unwrap().err.is_empty()
    }

    /// Copy of the current block.
    pub fn snapshot(&self) -> LogBlock {
        self.block.lock().unwrap().clone()
    }

    /// Take the current block, leaving an empty one.
    pub fn take(&self) -> LogBlock {
        std::mem::take(&mut *self.block.lock().unwrap())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_recorded() {
        let logger = Logger::new(true);
        logger.error("boom");
        logger.warning("careful");
        logger.info("hello");
        logger.debug("details");

        let block = logger.snapshot();
        assert_eq!(block.err, vec!["boom"]);
        assert_eq!(block.war, vec!["careful"]);
        assert_eq!(block.msg, vec!["hello"]);
        assert_eq!(block.deb, vec!["details"]);
        assert!(logger.has_errors());
    }

    #[test]
    fn test_debug_entries_need_debug_mode() {
        let logger = Logger::new(false);
        logger.debug("details");
        assert!(logger.snapshot().is_empty());
    }

    #[test]
    fn test_retain_alerts() {
        let logger = Logger::new(true);
        logger.warning("careful");
        logger.info("hello");
        logger.debug("details");
        logger.retain_alerts();

        let block = logger.snapshot();
        assert_eq!(block.war.len(), 1);
        assert!(block.msg.is_empty());
        assert!(block.deb.is_empty());
    }

    #[test]
    fn test_merge_remote() {
        let logger = Logger::new(false);
        let remote = LogBlock::from_value(&Value::from_pairs([
            ("err", Value::List(vec!["denied".into()])),
            ("msg", Value::from("synced")),
            ("war", Value::from_pairs([("0", "slow")])),
        ]));
        logger.merge_remote(&remote);

        let block = logger.take();
        assert_eq!(block.err, vec!["[remote] denied"]);
        assert_eq!(block.msg, vec!["[remote] synced"]);
        assert_eq!(block.war, vec!["[remote] slow"]);
        assert!(logger.snapshot().is_empty());
    }

    #[test]
    fn test_wire_form_skips_empty_levels() {
        let block = LogBlock {
            err: vec!["boom".into()],
            ..LogBlock::default()
        };
        let value = block.to_value();
        assert_eq!(value.as_map().unwrap().len(), 1);
        assert_eq!(LogBlock::from_value(&value), block);
    }
}
