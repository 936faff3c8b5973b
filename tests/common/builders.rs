//! Test data builders for creating test objects

use pipeport::{AppConfig, ChannelHub, Diagnostics, MemorySink, ProcessContext, ProcessId};
use std::sync::Arc;

/// Builder for a process context on a shared hub
pub struct ContextBuilder<'a> {
    hub: &'a ChannelHub,
    process: ProcessId,
    config: AppConfig,
    sink: Option<MemorySink>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(hub: &'a ChannelHub, process: u32) -> Self {
        Self {
            hub,
            process: ProcessId(process),
            config: AppConfig::default(),
            sink: None,
        }
    }

    pub fn receive_timeout_ms(mut self, millis: u64) -> Self {
        self.config.channel.receive_timeout_ms = Some(millis);
        self
    }

    /// Record diagnostics into `sink` instead of logging them.
    pub fn sink(mut self, sink: &MemorySink) -> Self {
        self.sink = Some(sink.clone());
        self
    }

    pub fn build(self) -> ProcessContext {
        let diagnostics = match self.sink {
            Some(sink) => Diagnostics::new(Arc::new(sink)),
            None => Diagnostics::default(),
        };
        ProcessContext::on_hub(self.hub, self.process, diagnostics, self.config)
            .expect("endpoint should open")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let hub = ChannelHub::new();
        let ctx = ContextBuilder::new(&hub, 3).receive_timeout_ms(40).build();

        assert_eq!(ctx.process_id(), ProcessId(3));
        assert_eq!(ctx.config().channel.receive_timeout_ms, Some(40));
        assert_eq!(hub.processes(), vec![ProcessId(3)]);
    }
}
