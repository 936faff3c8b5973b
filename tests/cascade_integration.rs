//! Three processes chained through a relay: generator -> relay -> consumer

mod common;

use common::builders::ContextBuilder;
use common::generated;
use common::harness::{ProducerProcess, IMAGE_POINTS};
use pipeport::{
    ChannelHub, CompleteOutcome, ConsumerPort, DataKind, GeneratorSource, MetadataOutcome,
    ProcessContext, ProcessId, RequestOutcome, Tag,
};

struct Chain {
    source: ProducerProcess,
    generator: GeneratorSource,
    relay: ProducerProcess,
    port: ConsumerPort,
    context: ProcessContext,
}

/// Process 2 generates, process 1 relays it under tag 100, process 0 consumes.
fn chain(hub: &ChannelHub) -> Chain {
    let (source, generator) = ProducerProcess::image(hub, 2, 200);

    let relay_context = ContextBuilder::new(hub, 1).build();
    let mut upstream = ConsumerPort::new(relay_context.clone(), ProcessId(2), Tag(200));
    upstream.typed_output(DataKind::ImageData);
    let relay = ProducerProcess::serve(relay_context, Tag(100), upstream);

    let context = ContextBuilder::new(hub, 0).build();
    let mut port = ConsumerPort::new(context.clone(), ProcessId(1), Tag(100));
    port.typed_output(DataKind::ImageData);

    Chain {
        source,
        generator,
        relay,
        port,
        context,
    }
}

impl Chain {
    fn shutdown(self) -> (u64, u64) {
        let relayed = self.relay.stop(&self.context);
        let generated = self.source.stop(&self.context);
        (relayed, generated)
    }
}

#[test]
fn test_data_flows_through_relay() {
    let hub = ChannelHub::new();
    let mut c = chain(&hub);

    assert_eq!(c.port.refresh_metadata().unwrap(), MetadataOutcome::Stale);
    c.port.update().unwrap();
    assert_eq!(
        c.port.output().unwrap().scalars(),
        Some(&generated(1.0, IMAGE_POINTS)[..])
    );
    assert_eq!(c.generator.executions(), 1);

    let relay_stats = c.relay.stats.snapshot();
    assert_eq!(relay_stats.metadata_requests, 1);
    assert_eq!(relay_stats.executions, 1);
    c.shutdown();
}

#[test]
fn test_unchanged_chain_moves_no_data() {
    let hub = ChannelHub::new();
    let mut c = chain(&hub);
    c.port.refresh_metadata().unwrap();
    c.port.update().unwrap();

    assert_eq!(c.port.refresh_metadata().unwrap(), MetadataOutcome::Fresh);
    assert_eq!(c.port.request_data_if_stale().unwrap(), RequestOutcome::UpToDate);

    assert_eq!(c.generator.executions(), 1);
    assert_eq!(c.source.stats.snapshot().data_requests, 1);
    assert_eq!(c.relay.stats.snapshot().data_requests, 1);
    c.shutdown();
}

#[test]
fn test_upstream_change_propagates_with_newer_times() {
    let hub = ChannelHub::new();
    let mut c = chain(&hub);
    c.port.refresh_metadata().unwrap();
    c.port.update().unwrap();
    let first = c.port.validity_time();

    c.generator.set_scale(4.0);
    assert_eq!(c.port.refresh_metadata().unwrap(), MetadataOutcome::Stale);
    c.port.update().unwrap();

    assert!(c.port.validity_time() > first);
    assert!(c.port.validity_time() > c.generator.modified_time());
    assert_eq!(
        c.port.output().unwrap().scalars(),
        Some(&generated(4.0, IMAGE_POINTS)[..])
    );
    assert_eq!(c.generator.executions(), 2);

    let (relayed, sourced) = c.shutdown();
    assert_eq!(relayed, 4);
    assert_eq!(sourced, 4);
}

#[test]
fn test_source_failure_reaches_the_end_of_the_chain() {
    let hub = ChannelHub::new();
    let (source, flaky) = ProducerProcess::flaky_image(&hub, 2, 200);
    let relay_context = ContextBuilder::new(&hub, 1).build();
    let mut upstream = ConsumerPort::new(relay_context.clone(), ProcessId(2), Tag(200));
    upstream.typed_output(DataKind::ImageData);
    let relay = ProducerProcess::serve(relay_context, Tag(100), upstream);
    let context = ContextBuilder::new(&hub, 0).build();
    let mut port = ConsumerPort::new(context.clone(), ProcessId(1), Tag(100));
    port.typed_output(DataKind::ImageData);

    flaky.fail_next(1);
    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Stale);
    assert_eq!(port.request_data_if_stale().unwrap(), RequestOutcome::Requested);
    assert_eq!(port.complete_data().unwrap(), CompleteOutcome::UpstreamFailed);
    assert!(port.is_stale());
    assert_eq!(relay.stats.snapshot().failures, 1);

    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Stale);
    port.update().unwrap();
    assert_eq!(
        port.output().unwrap().scalars(),
        Some(&generated(1.0, IMAGE_POINTS)[..])
    );
    assert_eq!(flaky.generator().executions(), 1);

    relay.stop(&context);
    source.stop(&context);
}
