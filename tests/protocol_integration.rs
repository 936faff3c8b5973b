//! End-to-end demand cycles between a consumer and producer processes

mod common;

use common::builders::ContextBuilder;
use common::harness::{ProducerProcess, IMAGE_POINTS};
use common::generated;
use pipeport::pipeline::POINTS_PER_PIECE;
use pipeport::{
    ChannelHub, CompleteOutcome, ConsumerPort, Controller, DataKind, Extent, GeneratorSource,
    MemorySink, MetadataOutcome, PortError, PortScheduler, PortState, ProcessChannel, ProcessId,
    ProducerPort, RequestOutcome, Severity, Tag,
};

fn consumer(hub: &ChannelHub, producer: &ProducerProcess) -> ConsumerPort {
    let context = ContextBuilder::new(hub, 0).build();
    let mut port = ConsumerPort::new(context, producer.process, producer.tag);
    port.typed_output(DataKind::ImageData);
    port
}

fn fetch(port: &mut ConsumerPort) {
    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Stale);
    assert_eq!(port.request_data_if_stale().unwrap(), RequestOutcome::Requested);
    assert_eq!(port.complete_data().unwrap(), CompleteOutcome::Received);
}

/// Separate process used only to send control triggers.
fn control_context(hub: &ChannelHub, process: u32) -> pipeport::ProcessContext {
    ContextBuilder::new(hub, process).build()
}

#[test]
fn test_first_cycle_transfers_then_idle() {
    let hub = ChannelHub::new();
    let (producer, generator) = ProducerProcess::image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let context = control_context(&hub, 9);

    fetch(&mut port);
    assert_eq!(port.data_time(), generator.modified_time());
    assert_eq!(
        port.output().unwrap().scalars(),
        Some(&generated(1.0, IMAGE_POINTS)[..])
    );

    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Fresh);
    assert_eq!(port.request_data_if_stale().unwrap(), RequestOutcome::UpToDate);
    assert_eq!(port.state(), PortState::Idle);

    let served = producer.stop(&context);
    assert_eq!(served, 3, "two metadata requests and one data request");
    assert_eq!(generator.executions(), 1);
}

#[test]
fn test_fresh_cycle_sends_only_the_metadata_trigger() {
    let hub = ChannelHub::new();
    let (producer, _generator) = ProducerProcess::image(&hub, 1, 100);
    let context = ContextBuilder::new(&hub, 0).build();
    let mut port = ConsumerPort::new(context.clone(), producer.process, producer.tag);
    port.typed_output(DataKind::ImageData);
    fetch(&mut port);

    let before = context.channel().stats();
    port.refresh_metadata().unwrap();
    port.request_data_if_stale().unwrap();
    let after = context.channel().stats();

    assert_eq!(after.triggers_sent - before.triggers_sent, 1);
    assert_eq!(after.messages_sent, before.messages_sent);

    producer.stop(&context);
}

#[test]
fn test_modified_stage_transfers_once() {
    let hub = ChannelHub::new();
    let (producer, generator) = ProducerProcess::image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let control = control_context(&hub, 9);

    fetch(&mut port);
    let first = port.data_time();

    generator.set_scale(2.0);
    fetch(&mut port);
    assert!(port.data_time() > first);
    assert_eq!(
        port.output().unwrap().scalars(),
        Some(&generated(2.0, IMAGE_POINTS)[..])
    );

    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Fresh);
    producer.stop(&control);
    assert_eq!(generator.executions(), 2);
}

#[test]
fn test_released_upstream_forces_transfer() {
    let hub = ChannelHub::new();
    let (producer, generator) = ProducerProcess::image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let control = control_context(&hub, 9);

    fetch(&mut port);
    let held = port.data_time();

    generator.release_data();
    fetch(&mut port);
    assert_eq!(port.data_time(), held);
    assert!(!port.output().unwrap().is_released());

    let stats = producer.stats.snapshot();
    assert_eq!(stats.executions, 2);
    producer.stop(&control);
}

#[test]
fn test_local_release_is_served_from_cache() {
    let hub = ChannelHub::new();
    let (producer, generator) = ProducerProcess::image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let control = control_context(&hub, 9);

    fetch(&mut port);
    port.typed_output(DataKind::ImageData).release_data();

    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Fresh);
    assert_eq!(port.request_data_if_stale().unwrap(), RequestOutcome::Requested);
    assert_eq!(port.complete_data().unwrap(), CompleteOutcome::Received);
    assert_eq!(
        port.output().unwrap().scalars(),
        Some(&generated(1.0, IMAGE_POINTS)[..])
    );

    let stats = producer.stats.snapshot();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.resends, 1);
    producer.stop(&control);
    assert_eq!(generator.executions(), 1);
}

#[test]
fn test_upstream_kind_change_replaces_output() {
    let hub = ChannelHub::new();
    let (producer, generator) = ProducerProcess::image(&hub, 1, 100);
    let sink = MemorySink::new();
    let context = ContextBuilder::new(&hub, 0).sink(&sink).build();
    let mut port = ConsumerPort::new(context.clone(), producer.process, producer.tag);
    port.typed_output(DataKind::ImageData);
    fetch(&mut port);

    generator.set_kind(DataKind::PolyData);
    fetch(&mut port);

    let output = port.output().unwrap();
    assert_eq!(output.kind(), DataKind::PolyData);
    assert_eq!(output.scalars().unwrap().len(), POINTS_PER_PIECE);
    assert_eq!(sink.count(Severity::Warning), 1);
    producer.stop(&context);
}

#[test]
fn test_sub_extent_request() {
    let hub = ChannelHub::new();
    let (producer, _generator) = ProducerProcess::image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let control = control_context(&hub, 9);

    port.typed_output(DataKind::ImageData)
        .set_update_extent(Extent::Structured([1, 2, 0, 0, 0, 0]));
    fetch(&mut port);

    let output = port.output().unwrap();
    assert_eq!(output.scalars(), Some(&[0.0, 1.0][..]));
    assert_eq!(output.descriptor().extent, common::harness::IMAGE_EXTENT);
    producer.stop(&control);
}

#[test]
fn test_failed_execution_keeps_sub_extent_and_retries() {
    let hub = ChannelHub::new();
    let (producer, source) = ProducerProcess::flaky_image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let control = control_context(&hub, 9);
    let sub = Extent::Structured([1, 2, 0, 0, 0, 0]);
    port.typed_output(DataKind::ImageData).set_update_extent(sub);

    source.fail_next(1);
    assert_eq!(port.refresh_metadata().unwrap(), MetadataOutcome::Stale);
    assert_eq!(port.request_data_if_stale().unwrap(), RequestOutcome::Requested);
    assert_eq!(port.complete_data().unwrap(), CompleteOutcome::UpstreamFailed);
    assert!(port.is_stale());
    assert_eq!(port.data_time(), pipeport::TimeStamp::ZERO);
    assert_eq!(port.output().unwrap().update_extent(), sub);

    fetch(&mut port);
    let output = port.output().unwrap();
    assert_eq!(output.scalars(), Some(&[0.0, 1.0][..]));
    assert_eq!(output.update_extent(), sub);

    assert_eq!(producer.stats.snapshot().failures, 1);
    producer.stop(&control);
}

#[test]
fn test_failed_execution_is_not_a_confirmation() {
    let hub = ChannelHub::new();
    let (producer, source) = ProducerProcess::flaky_image(&hub, 1, 100);
    let mut ports = vec![consumer(&hub, &producer)];
    let control = control_context(&hub, 9);
    let mut scheduler = PortScheduler::new();
    assert_eq!(scheduler.update_all(&mut ports).unwrap().received, 1);
    let held = ports[0].data_time();

    source.generator().set_scale(2.0);
    source.fail_next(1);
    let report = scheduler.update_all(&mut ports).unwrap();
    assert_eq!(report.stale, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.confirmed, 0);
    assert_eq!(report.received, 0);

    let port = &ports[0];
    assert!(port.is_stale());
    assert_eq!(port.data_time(), held);
    assert!(port.upstream_time() > port.data_time());
    assert_eq!(
        port.output().unwrap().scalars(),
        Some(&generated(1.0, IMAGE_POINTS)[..])
    );

    let report = scheduler.update_all(&mut ports).unwrap();
    assert_eq!(report.received, 1);
    assert!(!ports[0].is_stale());
    assert_eq!(
        ports[0].output().unwrap().scalars(),
        Some(&generated(2.0, IMAGE_POINTS)[..])
    );
    producer.stop(&control);
}

#[test]
fn test_two_ports_on_one_remote_process() {
    let hub = ChannelHub::new();
    let upstream = ContextBuilder::new(&hub, 1).build();
    let image = GeneratorSource::new(
        DataKind::ImageData,
        common::harness::IMAGE_EXTENT,
        upstream.clock().clone(),
    );
    let mesh = GeneratorSource::new(
        DataKind::PolyData,
        DataKind::PolyData.empty_extent(),
        upstream.clock().clone(),
    );
    let mut controller = Controller::new(upstream.clone());
    controller
        .register_producer(ProducerPort::new(upstream.clone(), Tag(100), image.clone()))
        .unwrap();
    controller
        .register_producer(ProducerPort::new(upstream, Tag(102), mesh.clone()))
        .unwrap();
    let handle = std::thread::spawn(move || controller.serve());

    let context = ContextBuilder::new(&hub, 0).build();
    let mut ports = vec![
        ConsumerPort::new(context.clone(), ProcessId(1), Tag(100)),
        ConsumerPort::new(context.clone(), ProcessId(1), Tag(102)),
    ];
    ports[0].typed_output(DataKind::ImageData);
    ports[1].typed_output(DataKind::PolyData);

    let mut scheduler = PortScheduler::new();
    let report = scheduler.update_all(&mut ports).unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.received, 2);
    assert_eq!(ports[0].output().unwrap().scalars().unwrap().len(), IMAGE_POINTS);
    assert_eq!(
        ports[1].output().unwrap().scalars().unwrap().len(),
        POINTS_PER_PIECE
    );

    mesh.set_scale(3.0);
    let report = scheduler.update_all(&mut ports).unwrap();
    assert_eq!(report.stale, 1);
    assert_eq!(report.received, 1);
    assert_eq!(
        ports[1].output().unwrap().scalars(),
        Some(&generated(3.0, POINTS_PER_PIECE)[..])
    );

    pipeport::channel::send_break(&context, ProcessId(1)).unwrap();
    assert_eq!(handle.join().unwrap().unwrap(), 7);
}

#[test]
fn test_silent_producer_times_out() {
    let hub = ChannelHub::new();
    let _silent = hub.endpoint(ProcessId(1)).unwrap();
    let context = ContextBuilder::new(&hub, 0)
        .receive_timeout_ms(common::test_timeout().as_millis() as u64)
        .build();
    let mut port = ConsumerPort::new(context, ProcessId(1), Tag(100));
    port.typed_output(DataKind::ImageData);

    let err = port.refresh_metadata().unwrap_err();
    assert!(err.is_channel_failure());
    assert!(err.to_string().contains("Timeout"));
    assert_eq!(port.state(), PortState::Idle);
}

#[test]
fn test_producer_vanishing_mid_request_fails_the_receive() {
    let hub = ChannelHub::new();
    let endpoint = hub.endpoint(ProcessId(1)).unwrap();
    let vanisher = std::thread::spawn(move || {
        endpoint.receive_rmi().unwrap();
        drop(endpoint);
    });

    let context = ContextBuilder::new(&hub, 0).build();
    let mut port = ConsumerPort::new(context, ProcessId(1), Tag(100));
    port.typed_output(DataKind::ImageData);

    let err = port.refresh_metadata().unwrap_err();
    assert!(err.is_channel_failure());
    vanisher.join().unwrap();
}

#[test]
fn test_stopped_producer_is_a_channel_failure() {
    let hub = ChannelHub::new();
    let (producer, _generator) = ProducerProcess::image(&hub, 1, 100);
    let mut port = consumer(&hub, &producer);
    let control = control_context(&hub, 9);
    fetch(&mut port);
    producer.stop(&control);

    let err = port.refresh_metadata().unwrap_err();
    assert!(err.is_channel_failure());
    let mut source = &err;
    while let PortError::WithContext { source: inner, .. } = source {
        source = &**inner;
    }
    assert!(matches!(source, PortError::Channel(_)));
}

#[test]
fn test_suppressed_warnings() {
    let hub = ChannelHub::new();
    let sink = MemorySink::new();
    let context = ContextBuilder::new(&hub, 0).sink(&sink).build();
    context.diagnostics().set_warnings_enabled(false);

    let mut port = ConsumerPort::new(context.clone(), ProcessId(1), Tag(100));
    assert_eq!(port.complete_data().unwrap(), CompleteOutcome::NothingPending);
    assert!(sink.messages().is_empty());

    // Errors are still delivered.
    assert!(matches!(
        port.refresh_metadata().unwrap(),
        MetadataOutcome::Skipped(_)
    ));
    assert_eq!(sink.count(Severity::Error), 1);
}
