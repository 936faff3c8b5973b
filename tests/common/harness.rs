//! Producer processes running on their own threads

use pipeport::channel::send_break;
use pipeport::pipeline::PipelineSource;
use pipeport::port::ProducerStatsHandle;
use pipeport::{
    ChannelHub, Controller, DataKind, Extent, GeneratorSource, ProcessContext, ProcessId,
    ProducerPort, Tag,
};
use std::thread::JoinHandle;

use super::builders::ContextBuilder;
use super::sources::FlakySource;

/// Whole extent used by image producers in the tests: 4 x 2 points.
pub const IMAGE_EXTENT: Extent = Extent::Structured([0, 3, 0, 1, 0, 0]);

pub const IMAGE_POINTS: usize = 8;

/// A process serving one producer port until it receives a break.
pub struct ProducerProcess {
    pub process: ProcessId,
    pub tag: Tag,
    pub stats: ProducerStatsHandle,
    handle: Option<JoinHandle<pipeport::Result<u64>>>,
}

impl ProducerProcess {
    /// Serve `source` on `tag` from `context`'s process.
    pub fn serve<S>(context: ProcessContext, tag: Tag, source: S) -> Self
    where
        S: PipelineSource + Send + 'static,
    {
        let process = context.process_id();
        let port = ProducerPort::new(context.clone(), tag, source);
        let stats = port.stats_handle();
        let mut controller = Controller::new(context);
        controller
            .register_producer(port)
            .expect("fresh controller accepts the port");
        let handle = std::thread::spawn(move || controller.serve());
        Self {
            process,
            tag,
            stats,
            handle: Some(handle),
        }
    }

    /// Serve a generator of `kind` over `extent` on a new process.
    pub fn generator(
        hub: &ChannelHub,
        process: u32,
        tag: i32,
        kind: DataKind,
        extent: Extent,
    ) -> (Self, GeneratorSource) {
        let context = ContextBuilder::new(hub, process).build();
        let generator = GeneratorSource::new(kind, extent, context.clock().clone());
        let served = Self::serve(context, Tag(tag), generator.clone());
        (served, generator)
    }

    /// Serve an image generator on a new process.
    pub fn image(hub: &ChannelHub, process: u32, tag: i32) -> (Self, GeneratorSource) {
        Self::generator(hub, process, tag, DataKind::ImageData, IMAGE_EXTENT)
    }

    /// Serve an image generator that can be told to fail, on a new process.
    pub fn flaky_image(hub: &ChannelHub, process: u32, tag: i32) -> (Self, FlakySource) {
        let context = ContextBuilder::new(hub, process).build();
        let generator =
            GeneratorSource::new(DataKind::ImageData, IMAGE_EXTENT, context.clock().clone());
        let source = FlakySource::new(generator);
        let served = Self::serve(context, Tag(tag), source.clone());
        (served, source)
    }

    /// Send a break from `from` and wait for the serve loop to return.
    ///
    /// Returns the number of requests handled.
    pub fn stop(mut self, from: &ProcessContext) -> u64 {
        send_break(from, self.process).expect("break trigger");
        self.join()
    }

    /// Wait for the serve loop to return on its own.
    pub fn join(&mut self) -> u64 {
        self.handle
            .take()
            .expect("joined once")
            .join()
            .expect("producer thread panicked")
            .expect("producer loop failed")
    }

    /// Wait for the serve loop and return its result, failure included.
    pub fn join_result(mut self) -> pipeport::Result<u64> {
        self.handle
            .take()
            .expect("joined once")
            .join()
            .expect("producer thread panicked")
    }
}
