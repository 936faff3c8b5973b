//! Per-process services handed to every port.
//!
//! A [`ProcessContext`] is built once by the process entry point and passed
//! down explicitly. It owns the channel endpoint, the process's logical clock,
//! the diagnostics sink and the loaded configuration. Clones share all of it.

use crate::channel::{ChannelHub, ProcessChannel};
use crate::config::AppConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::types::{LogicalClock, ProcessId};
use std::sync::Arc;

struct ContextInner {
    channel: Arc<dyn ProcessChannel>,
    clock: LogicalClock,
    diagnostics: Diagnostics,
    config: AppConfig,
}

#[derive(Clone)]
pub struct ProcessContext {
    inner: Arc<ContextInner>,
}

impl ProcessContext {
    pub fn new(channel: Arc<dyn ProcessChannel>, diagnostics: Diagnostics, config: AppConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                channel,
                clock: LogicalClock::new(),
                diagnostics,
                config,
            }),
        }
    }

    /// Open the endpoint for `process` on `hub`, applying the channel settings from `config`.
    pub fn on_hub(
        hub: &ChannelHub,
        process: ProcessId,
        diagnostics: Diagnostics,
        config: AppConfig,
    ) -> Result<Self> {
        let endpoint = hub
            .endpoint(process)?
            .with_receive_timeout(config.channel.receive_timeout());
        Ok(Self::new(Arc::new(endpoint), diagnostics, config))
    }

    pub fn process_id(&self) -> ProcessId {
        self.inner.channel.local_process()
    }

    pub fn channel(&self) -> &dyn ProcessChannel {
        self.inner.channel.as_ref()
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.inner.clock
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("process", &self.process_id())
            .field("clock", &self.inner.clock.now())
            .finish_non_exhaustive()
    }
}
