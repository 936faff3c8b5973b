//! Consumer side of the port pair.
//!
//! The consumer port owns one local [`DataObject`] and keeps it in step with
//! the remote stage using only logical times:
//!
//! - `upstream_time` is the validity time the producer last reported.
//! - `data_time` is the validity time of the payload held locally.
//! - the port's own `modified` time is what it publishes downstream. It is
//!   drawn from the local clock after witnessing the remote time, so it is
//!   never earlier than anything learned from upstream.
//!
//! A port is driven by one thread. Phase calls made out of order are reported
//! through diagnostics and leave the state untouched.

use crate::channel::{
    Envelope, DATA_TRANSFER_TAG, INFORMATION_TRANSFER_TAG, NEW_DATA_TIME_TAG, UPDATE_EXTENT_TAG,
};
use crate::context::ProcessContext;
use crate::error::{PortError, Result, ResultExt};
use crate::pipeline::PipelineSource;
use crate::port::{
    CompleteOutcome, MetadataOutcome, PortState, RequestOutcome, SkipReason, TransferHooks,
};
use crate::types::{DataKind, DataObject, Extent, OutputDescriptor, ProcessId, Tag, TimeStamp};

/// What arrived on the data tag.
enum Transfer {
    Payload(DataObject),
    Failed(String),
}

/// Local proxy for a pipeline stage running on another process.
pub struct ConsumerPort {
    context: ProcessContext,
    remote_process: ProcessId,
    tag: Tag,
    output: Option<DataObject>,
    upstream_time: TimeStamp,
    data_time: TimeStamp,
    modified: TimeStamp,
    stale: bool,
    transfer_pending: bool,
    state: PortState,
    hooks: Option<Box<dyn TransferHooks>>,
}

impl ConsumerPort {
    /// Port for the producer registered under `tag` on `remote_process`.
    ///
    /// The producer answers metadata requests on `tag` and data requests on `tag + 1`.
    pub fn new(context: ProcessContext, remote_process: ProcessId, tag: Tag) -> Self {
        let modified = context.clock().tick();
        Self {
            context,
            remote_process,
            tag,
            output: None,
            upstream_time: TimeStamp::ZERO,
            data_time: TimeStamp::ZERO,
            modified,
            stale: false,
            transfer_pending: false,
            state: PortState::Idle,
            hooks: None,
        }
    }

    pub fn remote_process(&self) -> ProcessId {
        self.remote_process
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    /// Validity time the producer reported in the last metadata phase.
    pub fn upstream_time(&self) -> TimeStamp {
        self.upstream_time
    }

    /// Validity time of the payload held locally.
    pub fn data_time(&self) -> TimeStamp {
        self.data_time
    }

    /// Validity time this port publishes to its own downstream.
    pub fn validity_time(&self) -> TimeStamp {
        self.modified
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn transfer_pending(&self) -> bool {
        self.transfer_pending
    }

    pub fn output(&self) -> Option<&DataObject> {
        self.output.as_ref()
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn TransferHooks>) {
        self.hooks = Some(hooks);
    }

    pub fn clear_hooks(&mut self) -> Option<Box<dyn TransferHooks>> {
        self.hooks.take()
    }

    /// The local output as `kind`, created on first use.
    ///
    /// An existing output of another kind is replaced by a fresh, released
    /// object of `kind`.
    pub fn typed_output(&mut self, kind: DataKind) -> &mut DataObject {
        match self.output.as_ref().map(DataObject::kind) {
            Some(current) if current == kind => {}
            Some(current) => {
                self.context.diagnostics().warning(format!(
                    "Port {}: changing data type of output from {} to {}",
                    self.tag, current, kind
                ));
                self.output = Some(DataObject::new(kind));
            }
            None => {
                self.output = Some(DataObject::new(kind));
            }
        }
        self.output.get_or_insert_with(|| DataObject::new(kind))
    }

    /// Metadata phase: ask the producer for its descriptor and decide staleness.
    ///
    /// Blocks until the descriptor arrives.
    pub fn refresh_metadata(&mut self) -> Result<MetadataOutcome> {
        if self.transfer_pending {
            self.context.diagnostics().warning(format!(
                "Port {}: metadata refresh while a transfer is pending; complete the data phase first",
                self.tag
            ));
            return Ok(MetadataOutcome::Skipped(SkipReason::TransferPending));
        }
        if self.output.is_none() {
            self.context
                .diagnostics()
                .error(format!("Port {}: No output.", self.tag));
            return Ok(MetadataOutcome::Skipped(SkipReason::NoOutput));
        }

        self.state = PortState::MetadataRequested;
        let received = self.receive_descriptor();
        let (kind, descriptor) = match received {
            Ok(reply) => reply,
            Err(e) => {
                self.state = PortState::Idle;
                return Err(e.with_context(format!("Port {} metadata phase", self.tag)));
            }
        };

        if self.output.as_ref().map(DataObject::kind) != Some(kind) {
            self.typed_output(kind);
        }

        let clock = self.context.clock().clone();
        clock.witness(descriptor.validity_time);

        self.upstream_time = descriptor.validity_time;
        // Release always forces a transfer, whatever the times say.
        self.stale = descriptor.validity_time > self.data_time || descriptor.released;
        if self.stale || self.modified < descriptor.validity_time {
            self.modified = clock.tick();
        }

        let published = self.modified;
        if let Some(output) = self.output.as_mut() {
            let locally_released = output.is_released();
            output.set_descriptor(OutputDescriptor {
                extent: descriptor.extent,
                validity_time: published,
                locality: 1.0,
                released: locally_released,
            });
        }
        self.state = PortState::MetadataKnown;

        tracing::debug!(
            "Port {}: upstream time {} (held {}, released {}) -> {}",
            self.tag,
            descriptor.validity_time,
            self.data_time,
            descriptor.released,
            if self.stale { "stale" } else { "fresh" }
        );

        Ok(if self.stale {
            MetadataOutcome::Stale
        } else {
            MetadataOutcome::Fresh
        })
    }

    fn receive_descriptor(&self) -> Result<(DataKind, OutputDescriptor)> {
        let channel = self.context.channel();
        channel.trigger_remote(self.remote_process, self.tag)?;
        match channel.receive(self.remote_process, INFORMATION_TRANSFER_TAG)? {
            Envelope::Descriptor {
                port,
                kind,
                descriptor,
            } if port == self.tag => Ok((kind, descriptor)),
            _ => Err(self.unexpected(INFORMATION_TRANSFER_TAG, "descriptor")),
        }
    }

    /// Start the data phase if the output needs new data. Never blocks.
    ///
    /// Sends the data-phase trigger, the requested extent and the time of the
    /// data held locally, then returns. Call [`complete_data`] to receive.
    ///
    /// [`complete_data`]: ConsumerPort::complete_data
    pub fn request_data_if_stale(&mut self) -> Result<RequestOutcome> {
        if self.transfer_pending {
            self.context.diagnostics().warning(format!(
                "Port {}: Transfer should have been received.",
                self.tag
            ));
            return Ok(RequestOutcome::AlreadyPending);
        }
        let Some(output) = self.output.as_ref() else {
            self.context
                .diagnostics()
                .error(format!("Port {}: No output.", self.tag));
            return Ok(RequestOutcome::NoOutput);
        };

        let locally_released = output.is_released();
        if !self.stale && !locally_released {
            self.state = PortState::Idle;
            tracing::trace!("Port {}: data is current, no transfer", self.tag);
            return Ok(RequestOutcome::UpToDate);
        }

        let extent = output.update_extent();
        // Without a payload we hold nothing the producer could confirm.
        let held_time = if locally_released {
            TimeStamp::ZERO
        } else {
            self.data_time
        };
        self.send_request(extent, held_time)
            .with_context(|| format!("Port {} data request", self.tag))?;

        self.transfer_pending = true;
        self.state = PortState::TransferRequested;
        tracing::debug!(
            "Port {}: requested {:?} from process {} (holding time {})",
            self.tag,
            extent,
            self.remote_process,
            held_time
        );
        Ok(RequestOutcome::Requested)
    }

    fn send_request(&self, extent: Extent, held_time: TimeStamp) -> Result<()> {
        let data_tag = self.tag.offset(1).ok_or_else(|| {
            PortError::Config(format!("port tag {} leaves no room for its data tag", self.tag))
        })?;
        let channel = self.context.channel();
        channel.trigger_remote(self.remote_process, data_tag)?;
        channel.send(
            self.remote_process,
            UPDATE_EXTENT_TAG,
            Envelope::UpdateExtent {
                port: self.tag,
                extent,
            },
        )?;
        channel.send(
            self.remote_process,
            NEW_DATA_TIME_TAG,
            Envelope::DataTime {
                port: self.tag,
                time: held_time,
            },
        )
    }

    /// Finish the data phase: block for the payload and the producer's new time.
    ///
    /// Returns immediately when no transfer is pending. Ports that share a
    /// remote process must complete in the order they requested.
    pub fn complete_data(&mut self) -> Result<CompleteOutcome> {
        if !self.transfer_pending {
            self.context.diagnostics().warning(format!(
                "Port {}: complete_data was called when no data was needed.",
                self.tag
            ));
            return Ok(CompleteOutcome::NothingPending);
        }

        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_transfer_start(self.tag);
        }
        let received = self.receive_transfer();
        if let Some(hooks) = self.hooks.as_mut() {
            let delivered = matches!(received, Ok((Transfer::Payload(_), _)));
            hooks.on_transfer_end(self.tag, delivered);
        }

        self.transfer_pending = false;
        self.state = PortState::Idle;
        let (transfer, new_time) =
            received.map_err(|e| e.with_context(format!("Port {} data phase", self.tag)))?;

        let object = match transfer {
            Transfer::Payload(object) => object,
            Transfer::Failed(reason) => {
                self.context.diagnostics().warning(format!(
                    "Port {}: upstream stage failed, keeping data time {}: {}",
                    self.tag, self.data_time, reason
                ));
                return Ok(CompleteOutcome::UpstreamFailed);
            }
        };

        let outcome = self.install(object, new_time);

        if new_time < self.data_time {
            self.context.diagnostics().warning(format!(
                "Port {}: producer reported data time {} older than held {}",
                self.tag, new_time, self.data_time
            ));
        } else {
            self.data_time = new_time;
        }
        self.context.clock().witness(new_time);

        self.stale = false;
        tracing::debug!(
            "Port {}: transfer complete ({:?}), data time {}",
            self.tag,
            outcome,
            self.data_time
        );
        Ok(outcome)
    }

    fn receive_transfer(&self) -> Result<(Transfer, TimeStamp)> {
        let channel = self.context.channel();
        let transfer = match channel.receive(self.remote_process, DATA_TRANSFER_TAG)? {
            Envelope::Data { port, object } if port == self.tag => Transfer::Payload(object),
            Envelope::SourceFailed { port, reason } if port == self.tag => {
                Transfer::Failed(reason)
            }
            _ => return Err(self.unexpected(DATA_TRANSFER_TAG, "data")),
        };
        let time = match channel.receive(self.remote_process, NEW_DATA_TIME_TAG)? {
            Envelope::DataTime { port, time } if port == self.tag => time,
            _ => return Err(self.unexpected(NEW_DATA_TIME_TAG, "data time")),
        };
        Ok((transfer, time))
    }

    /// Install a received object while keeping this port's own descriptor.
    fn install(&mut self, object: DataObject, new_time: TimeStamp) -> CompleteOutcome {
        let kind = object.kind();
        let holds_payload = self
            .output
            .as_ref()
            .map(|o| o.kind() == kind && !o.is_released())
            .unwrap_or(false);

        // An empty reply no newer than our payload confirms what we hold.
        if object.scalars().is_none() && holds_payload && new_time <= self.data_time {
            return CompleteOutcome::Confirmed;
        }

        let output = self.typed_output(kind);
        let saved = output.descriptor().clone();
        output.take_payload_from(object);
        let released = output.scalars().is_none();
        output.set_descriptor(OutputDescriptor {
            locality: 1.0,
            released,
            ..saved
        });
        CompleteOutcome::Received
    }

    /// Both phases in one call for a port that is not overlapped with others.
    pub fn update(&mut self) -> Result<()> {
        if self.request_data_if_stale()? == RequestOutcome::Requested {
            self.complete_data()?;
        }
        Ok(())
    }

    fn unexpected(&self, tag: Tag, expected: &'static str) -> PortError {
        PortError::UnexpectedMessage {
            from: self.remote_process,
            tag,
            expected,
        }
    }
}

impl std::fmt::Debug for ConsumerPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerPort")
            .field("remote_process", &self.remote_process)
            .field("tag", &self.tag)
            .field("state", &self.state)
            .field("upstream_time", &self.upstream_time)
            .field("data_time", &self.data_time)
            .field("modified", &self.modified)
            .field("stale", &self.stale)
            .field("transfer_pending", &self.transfer_pending)
            .field("output_kind", &self.output.as_ref().map(DataObject::kind))
            .finish()
    }
}

/// A consumer port can itself be the stage behind a producer port, which
/// chains processes: metadata requests cascade upstream before replying.
impl PipelineSource for ConsumerPort {
    fn update_information(&mut self) -> Result<(DataKind, OutputDescriptor)> {
        match self.refresh_metadata()? {
            MetadataOutcome::Skipped(reason) => Err(PortError::Source(format!(
                "port {} metadata refresh skipped: {}",
                self.tag, reason
            ))),
            _ => {
                let output = self.output.as_ref().ok_or_else(|| {
                    PortError::Source(format!("port {} has no output", self.tag))
                })?;
                Ok((output.kind(), output.descriptor().clone()))
            }
        }
    }

    fn update_data(&mut self, extent: Extent) -> Result<DataObject> {
        let kind = self
            .output
            .as_ref()
            .map(DataObject::kind)
            .ok_or_else(|| PortError::Source(format!("port {} has no output", self.tag)))?;
        self.typed_output(kind).set_update_extent(extent);
        if self.request_data_if_stale()? == RequestOutcome::Requested
            && self.complete_data()? == CompleteOutcome::UpstreamFailed
        {
            return Err(PortError::Source(format!(
                "port {}: upstream stage on process {} failed",
                self.tag, self.remote_process
            )));
        }
        Ok(self.typed_output(kind).clone())
    }
}
