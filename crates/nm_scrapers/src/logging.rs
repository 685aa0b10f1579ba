use std::collections::VecDeque;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Tags log lines with a chain of prefixes, e.g. `[bbc] [save]`.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    prefixes: VecDeque<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push_back(prefix.into());
        self
    }

    fn line(&self, message: &str) -> String {
        let mut line = self.prefixes.iter().map(|p| format!("[{}] ", p)).collect::<String>();
        line.push_str(message);
        line
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}", self.line(message));
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{}", self.line(message));
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}", self.line(message));
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!("{}", self.line(message));
    }
}

/// Install the global subscriber once. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_logging() -> Logger {
    if !tracing::dispatcher::has_been_set() {
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        });
    }
    Logger::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        let logger = Logger::new().with_prefix("bbc").with_prefix("save");
        assert_eq!(logger.line("stored 3"), "[bbc] [save] stored 3");
        assert_eq!(Logger::new().line("stored 0"), "stored 0");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging();
        init_logging().info("still fine");
    }
}
