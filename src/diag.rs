//! Diagnostics sink for progress messages during index preparation.
//!
//! Index preparation can take a while on large annotation files, and the
//! operations it performs (compression, index construction) are worth
//! surfacing to users. Rather than logging through global state, the
//! preparation path accepts any [`DiagnosticsSink`]:
//!
//! - [`NoopSink`]: discards everything (the default for [`crate::AnnotationSet::new`])
//! - [`LogSink`]: forwards to the `log` facade, so embedding applications
//!   see the messages through whatever logger they installed

/// Receiver for informational messages emitted during index preparation.
pub trait DiagnosticsSink {
    /// Report a progress message.
    fn info(&self, message: &str);
}

/// A sink that discards all messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticsSink for NoopSink {
    fn info(&self, _message: &str) {}
}

/// A sink that forwards messages to the `log` crate at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn info(&self, message: &str) {
        log::info!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CollectingSink {
        messages: RefCell<Vec<String>>,
    }

    impl DiagnosticsSink for CollectingSink {
        fn info(&self, message: &str) {
            self.messages.borrow_mut().push(message.to_string());
        }
    }

    #[test]
    fn test_noop_sink_accepts_messages() {
        let sink = NoopSink;
        sink.info("ignored");
    }

    #[test]
    fn test_custom_sink_collects_messages() {
        let sink = CollectingSink {
            messages: RefCell::new(Vec::new()),
        };
        sink.info("compressing a.bed");
        sink.info("indexing a.bed.gz");
        assert_eq!(
            *sink.messages.borrow(),
            vec!["compressing a.bed", "indexing a.bed.gz"]
        );
    }
}
