//! Non-fatal diagnostic callback used by the connector and link.

use std::sync::Arc;

/// Receives protocol and I/O diagnostics. Implementations must not block.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Forwards diagnostics to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, message: &str) {
        tracing::debug!(target: "presence_core::ipc", "{}", message);
    }
}

/// Optional sink handle; reports are dropped when no sink is installed.
#[derive(Clone, Default)]
pub struct Reporter {
    sink: Option<Arc<dyn ErrorSink>>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn silent() -> Self {
        Self { sink: None }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn report(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink.report(message);
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("installed", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every message for later assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl ErrorSink for RecordingSink {
        fn report(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::RecordingSink;
    use super::*;

    #[test]
    fn silent_reporter_drops_messages() {
        Reporter::silent().report("nobody listens");
    }

    #[test]
    fn installed_sink_receives_messages() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());
        reporter.report("first");
        reporter.clone().report("second");
        assert_eq!(sink.messages(), vec!["first", "second"]);
    }
}
