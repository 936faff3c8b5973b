//! Process channel: ordered point-to-point messaging plus remote method triggers.
//!
//! The ports only ever talk to a [`ProcessChannel`]. The crate ships one
//! realisation, [`ChannelHub`], where every "process" is an [`Endpoint`]
//! inside the current OS process and messages travel serialised over
//! crossbeam queues. Other transports implement the same trait.
//!
//! # Ordering
//!
//! Messages between an ordered pair of processes on one tag are delivered in
//! send order. Nothing is promised across tags or across process pairs.
//!
//! # Message tags
//!
//! The protocol uses four well-known message tags, shared by all ports. Every
//! envelope also names the port it belongs to, so a reply arriving for the
//! wrong port is detected instead of silently installed.

pub mod controller;
pub mod hub;

pub use controller::{send_break, Controller, RmiHandler};
pub use hub::{ChannelHub, Endpoint};

use crate::error::Result;
use crate::types::{DataKind, DataObject, Extent, OutputDescriptor, ProcessId, Tag, TimeStamp};
use serde::{Deserialize, Serialize};

/// Producer → consumer: descriptor reply of the metadata phase.
pub const INFORMATION_TRANSFER_TAG: Tag = Tag(22_341);
/// Consumer → producer: extent requested for the data phase.
pub const UPDATE_EXTENT_TAG: Tag = Tag(22_342);
/// Producer → consumer: the data payload, or notice that the stage failed.
pub const DATA_TRANSFER_TAG: Tag = Tag(22_343);
/// Both directions: consumer's current data time, then the producer's new one.
pub const NEW_DATA_TIME_TAG: Tag = Tag(22_344);
/// RMI tag that makes [`Controller::serve`] return.
pub const BREAK_RMI_TAG: Tag = Tag(239_954);

/// Everything that travels on a message tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope {
    Descriptor {
        port: Tag,
        kind: DataKind,
        descriptor: OutputDescriptor,
    },
    UpdateExtent {
        port: Tag,
        extent: Extent,
    },
    DataTime {
        port: Tag,
        time: TimeStamp,
    },
    Data {
        port: Tag,
        object: DataObject,
    },
    /// Sent in place of `Data` when the producer's stage failed to execute.
    SourceFailed {
        port: Tag,
        reason: String,
    },
}

impl Envelope {
    pub fn port(&self) -> Tag {
        match self {
            Envelope::Descriptor { port, .. }
            | Envelope::UpdateExtent { port, .. }
            | Envelope::DataTime { port, .. }
            | Envelope::Data { port, .. }
            | Envelope::SourceFailed { port, .. } => *port,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Envelope::Descriptor { .. } => "descriptor",
            Envelope::UpdateExtent { .. } => "update extent",
            Envelope::DataTime { .. } => "data time",
            Envelope::Data { .. } => "data",
            Envelope::SourceFailed { .. } => "source failure",
        }
    }
}

/// A request to run the handler registered under `tag`, sent by `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmiRequest {
    pub from: ProcessId,
    pub tag: Tag,
}

/// Traffic counters for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Messages sent with [`ProcessChannel::send`]
    pub messages_sent: u64,
    /// Messages received with [`ProcessChannel::receive`]
    pub messages_received: u64,
    /// Triggers sent with [`ProcessChannel::trigger_remote`]
    pub triggers_sent: u64,
    /// Triggers taken off this endpoint's RMI queue
    pub triggers_received: u64,
    /// Encoded bytes sent, triggers included
    pub bytes_sent: u64,
}

impl ChannelStats {
    /// Everything this endpoint put on the wire.
    pub fn outgoing(&self) -> u64 {
        self.messages_sent + self.triggers_sent
    }
}

/// Communication primitives consumed by the ports.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessChannel: Send + Sync {
    /// The process this channel belongs to.
    fn local_process(&self) -> ProcessId;

    /// Ask `process` to run the handler registered under `tag`. Never blocks.
    fn trigger_remote(&self, process: ProcessId, tag: Tag) -> Result<()>;

    /// Send one message to `process` on `tag`. Never blocks.
    fn send(&self, process: ProcessId, tag: Tag, message: Envelope) -> Result<()>;

    /// Block until a message from `process` on `tag` arrives.
    fn receive(&self, process: ProcessId, tag: Tag) -> Result<Envelope>;

    /// Block until a trigger addressed to this process arrives.
    fn receive_rmi(&self) -> Result<RmiRequest>;

    /// Take a queued trigger if there is one.
    fn try_receive_rmi(&self) -> Result<Option<RmiRequest>>;

    /// Traffic counters so far.
    fn stats(&self) -> ChannelStats;
}
