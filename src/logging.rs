//! Log routing for clients.
//!
//! A client logs through its own [`LogSink`] instead of whatever subscriber
//! happens to be global, so several clients in one process can write to
//! different places. Background tasks are wrapped with [`LogSink::scope`].

use crate::config::{ConfigError, LoggingConfig};
use std::future::Future;
use tracing::instrument::{Instrumented, WithDispatch};
use tracing::{dispatcher, info_span, Dispatch, Instrument, Span};
use tracing_subscriber::FmtSubscriber;

#[derive(Clone, Debug)]
pub struct LogSink {
    dispatch: Dispatch,
    span: Span,
}

impl LogSink {
    /// Logs to whatever subscriber is current on the calling thread.
    pub fn current(serial: &str) -> Self {
        dispatcher::get_default(|dispatch| Self::new(dispatch.clone(), serial))
    }

    pub fn new(dispatch: Dispatch, serial: &str) -> Self {
        // the span has to be registered with the dispatch that will record it
        let span = dispatcher::with_default(&dispatch, || info_span!("printer", serial = %serial));
        Self { dispatch, span }
    }

    /// Drops everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            span: Span::none(),
        }
    }

    /// Runs `f` synchronously with this sink as the default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    /// Wraps a future so every poll logs to this sink inside the client span.
    pub fn scope<F: Future>(&self, future: F) -> WithDispatch<Instrumented<F>> {
        use tracing::instrument::WithSubscriber;
        future
            .instrument(self.span.clone())
            .with_subscriber(self.dispatch.clone())
    }
}

/// Builds the pretty fmt sink at the configured level.
pub fn build_dispatch(config: &LoggingConfig) -> Result<Dispatch, ConfigError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.max_level()?)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .finish();
    Ok(Dispatch::new(subscriber))
}
