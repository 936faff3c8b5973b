//! pipeport demo
//!
//! Runs two producer processes and one consumer process inside this OS
//! process, connected by a [`ChannelHub`], and drives a few demand cycles.
//! The log shows which cycles move data and which are answered from
//! metadata alone.
//!
//! Usage: `pipeport [CONFIG]`. Without an argument the platform config file
//! is used if present.

use anyhow::{anyhow, Context};
use pipeport::{
    channel::{send_break, ChannelHub, Controller},
    config::LoggingConfig,
    pipeline::{GeneratorSource, PortScheduler},
    port::{ProducerStatsHandle, TransferTimer},
    AppConfig, ConsumerPort, DataKind, Diagnostics, Extent, ProcessContext, ProcessId,
    ProducerPort,
};
use std::path::PathBuf;
use std::thread::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONSUMER: ProcessId = ProcessId(0);

fn load_config() -> AppConfig {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| AppConfig::default_path().filter(|p| p.exists()));
    match path {
        Some(path) => AppConfig::load_or_default(path),
        None => AppConfig::default(),
    }
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "pipeport.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

struct Upstream {
    process: ProcessId,
    generator: GeneratorSource,
    stats: ProducerStatsHandle,
    handle: JoinHandle<pipeport::Result<u64>>,
}

fn spawn_producer(
    hub: &ChannelHub,
    config: &AppConfig,
    process: ProcessId,
    port_index: usize,
    kind: DataKind,
    extent: Extent,
) -> anyhow::Result<Upstream> {
    let context = ProcessContext::on_hub(hub, process, Diagnostics::default(), config.clone())?;
    let generator = GeneratorSource::new(kind, extent, context.clock().clone());
    let port = ProducerPort::new(
        context.clone(),
        config.protocol.port_tag(port_index),
        generator.clone(),
    );
    let stats = port.stats_handle();

    let mut controller = Controller::new(context);
    controller.register_producer(port)?;
    let handle = std::thread::Builder::new()
        .name(format!("producer-{}", process))
        .spawn(move || controller.serve())?;

    Ok(Upstream {
        process,
        generator,
        stats,
        handle,
    })
}

fn main() -> anyhow::Result<()> {
    let config = load_config();
    let _guard = init_logging(&config.logging)?;

    tracing::info!("Starting pipeport demo");

    let hub = ChannelHub::new();
    let image = spawn_producer(
        &hub,
        &config,
        ProcessId(1),
        0,
        DataKind::ImageData,
        Extent::Structured([0, 3, 0, 3, 0, 0]),
    )?;
    let mesh = spawn_producer(
        &hub,
        &config,
        ProcessId(2),
        1,
        DataKind::PolyData,
        DataKind::PolyData.empty_extent(),
    )?;

    let context = ProcessContext::on_hub(&hub, CONSUMER, Diagnostics::default(), config.clone())?;
    let mut ports = vec![
        ConsumerPort::new(context.clone(), image.process, config.protocol.port_tag(0)),
        ConsumerPort::new(context.clone(), mesh.process, config.protocol.port_tag(1)),
    ];
    ports[0].typed_output(DataKind::ImageData);
    ports[1].typed_output(DataKind::PolyData);
    for port in &mut ports {
        port.set_hooks(Box::new(TransferTimer::new()));
    }

    let mut scheduler = PortScheduler::new();

    let report = scheduler.update_all(&mut ports)?;
    tracing::info!("Cycle 1 (initial fetch): {:?}", report);

    let report = scheduler.update_all(&mut ports)?;
    tracing::info!("Cycle 2 (nothing changed): {:?}", report);

    image.generator.set_scale(2.5);
    let report = scheduler.update_all(&mut ports)?;
    tracing::info!("Cycle 3 (image stage modified): {:?}", report);

    mesh.generator.release_data();
    let report = scheduler.update_all(&mut ports)?;
    tracing::info!("Cycle 4 (mesh stage released its output): {:?}", report);

    for port in &ports {
        tracing::info!(
            "Port {} from process {}: data time {}, published {}, values {:?}",
            port.tag(),
            port.remote_process(),
            port.data_time(),
            port.validity_time(),
            port.output().and_then(|o| o.scalars())
        );
    }

    for upstream in [image, mesh] {
        send_break(&context, upstream.process)?;
        let served = upstream
            .handle
            .join()
            .map_err(|_| anyhow!("producer {} panicked", upstream.process))??;
        tracing::info!(
            "Producer {} served {} requests: {:?}",
            upstream.process,
            served,
            upstream.stats.snapshot()
        );
    }

    tracing::info!(
        "Totals after {} cycles: {:?}, channel {:?}",
        scheduler.cycles(),
        scheduler.totals(),
        context.channel().stats()
    );
    Ok(())
}
