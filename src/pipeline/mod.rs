//! Local pipeline stages and the scheduling of port demand cycles.
//!
//! - [`PipelineSource`] is the seam between a producer port and the stage it
//!   drives. [`GeneratorSource`] is a small built-in stage; a
//!   [`ConsumerPort`](crate::port::ConsumerPort) is one too, which is how a
//!   process relays data from upstream to downstream.
//! - [`PortScheduler`] runs demand cycles over the consumer ports of a
//!   multi-input stage.

pub mod scheduler;
pub mod source;

pub use scheduler::{CycleReport, PortScheduler};
pub use source::{GeneratorSource, PipelineSource, POINTS_PER_PIECE};
