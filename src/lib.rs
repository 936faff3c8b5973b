//! # pipeport: demand-driven pipeline ports across processes
//!
//! A pipeline stage on one process can consume the output of a stage on
//! another. The downstream side holds a [`ConsumerPort`], the upstream side a
//! [`ProducerPort`]; the pair keeps the consumer's copy current while moving
//! data only when it actually changed.
//!
//! ## Architecture
//!
//! - **Ports**: the consumer state machine and the producer's request handlers
//! - **Channel**: point-to-point messages plus remote method triggers, with an
//!   in-process realisation over crossbeam queues
//! - **Pipeline**: the [`PipelineSource`] seam and the multi-port scheduler
//! - **Context**: per-process clock, diagnostics and configuration, passed
//!   down explicitly
//!
//! Staleness is decided from logical validity times alone. Each process keeps
//! a Lamport clock that witnesses every time it learns from upstream, so a
//! consumer always publishes a time at least as new as its input's.
//!
//! ## Example
//!
//! ```ignore
//! use pipeport::{
//!     channel::{ChannelHub, Controller},
//!     pipeline::GeneratorSource,
//!     AppConfig, ConsumerPort, DataKind, Diagnostics, Extent, ProcessContext, ProcessId,
//!     ProducerPort, Tag,
//! };
//!
//! let hub = ChannelHub::new();
//! let upstream = ProcessContext::on_hub(&hub, ProcessId(1), Diagnostics::default(), AppConfig::default())?;
//! let source = GeneratorSource::new(DataKind::ImageData, Extent::Structured([0, 7, 0, 0, 0, 0]), upstream.clock().clone());
//! let mut controller = Controller::new(upstream.clone());
//! controller.register_producer(ProducerPort::new(upstream, Tag(100), source))?;
//! std::thread::spawn(move || controller.serve());
//!
//! let local = ProcessContext::on_hub(&hub, ProcessId(0), Diagnostics::default(), AppConfig::default())?;
//! let mut port = ConsumerPort::new(local, ProcessId(1), Tag(100));
//! port.typed_output(DataKind::ImageData);
//! port.refresh_metadata()?;
//! port.update()?;
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod port;
pub mod types;

// Re-export commonly used types
pub use channel::{ChannelHub, Controller, Endpoint, ProcessChannel, RmiHandler};
pub use config::AppConfig;
pub use context::ProcessContext;
pub use diagnostics::{DiagnosticSink, Diagnostics, MemorySink, Severity, TracingSink};
pub use error::{PortError, Result};
pub use pipeline::{GeneratorSource, PipelineSource, PortScheduler};
pub use port::{
    CompleteOutcome, ConsumerPort, MetadataOutcome, PortState, ProducerPort, RequestOutcome,
    SkipReason, TransferHooks,
};
pub use types::{DataKind, DataObject, Extent, LogicalClock, OutputDescriptor, ProcessId, Tag, TimeStamp};
