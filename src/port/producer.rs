//! Producer side of the port pair.
//!
//! A [`ProducerPort`] wraps a local [`PipelineSource`] and answers the two
//! triggers a [`ConsumerPort`](crate::port::ConsumerPort) sends: metadata on
//! its base tag and data on base + 1. Every request gets a reply, including
//! when the source fails, so a consumer blocked in `complete_data` is never
//! left hanging by this side.

use crate::channel::{
    Envelope, RmiHandler, DATA_TRANSFER_TAG, INFORMATION_TRANSFER_TAG, NEW_DATA_TIME_TAG,
    UPDATE_EXTENT_TAG,
};
use crate::context::ProcessContext;
use crate::error::{PortError, Result};
use crate::pipeline::PipelineSource;
use crate::types::{DataKind, DataObject, Extent, OutputDescriptor, ProcessId, Tag, TimeStamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of what a producer port has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub metadata_requests: u64,
    pub data_requests: u64,
    /// Requests that executed the source
    pub executions: u64,
    /// Requests answered from the cached output
    pub resends: u64,
    /// Requests answered with an empty confirmation
    pub confirmations: u64,
    /// Requests where the source failed
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    metadata_requests: AtomicU64,
    data_requests: AtomicU64,
    executions: AtomicU64,
    resends: AtomicU64,
    confirmations: AtomicU64,
    failures: AtomicU64,
}

/// Shared view of a producer's counters, readable from another thread while
/// the port itself is owned by a [`Controller`](crate::channel::Controller).
#[derive(Debug, Clone, Default)]
pub struct ProducerStatsHandle {
    counters: Arc<Counters>,
}

impl ProducerStatsHandle {
    pub fn snapshot(&self) -> ProducerStats {
        let c = &self.counters;
        ProducerStats {
            metadata_requests: c.metadata_requests.load(Ordering::Relaxed),
            data_requests: c.data_requests.load(Ordering::Relaxed),
            executions: c.executions.load(Ordering::Relaxed),
            resends: c.resends.load(Ordering::Relaxed),
            confirmations: c.confirmations.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// How a data request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Resend,
    Confirm,
    Execute,
}

pub struct ProducerPort<S: PipelineSource> {
    context: ProcessContext,
    tag: Tag,
    source: S,
    cache: Option<DataObject>,
    last_kind: Option<DataKind>,
    /// Descriptor sent to each consumer whose data request is still to come.
    awaiting_data: HashMap<ProcessId, (DataKind, OutputDescriptor)>,
    stats: ProducerStatsHandle,
}

impl<S: PipelineSource> ProducerPort<S> {
    pub fn new(context: ProcessContext, tag: Tag, source: S) -> Self {
        Self {
            context,
            tag,
            source,
            cache: None,
            last_kind: None,
            awaiting_data: HashMap::new(),
            stats: ProducerStatsHandle::default(),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> ProducerStatsHandle {
        self.stats.clone()
    }

    /// Drop the cached output; the next data request executes the source.
    pub fn release_cache(&mut self) {
        self.cache = None;
    }

    /// Answer a metadata trigger from `remote`.
    pub fn serve_metadata(&mut self, remote: ProcessId) -> Result<()> {
        ProducerStatsHandle::bump(&self.stats.counters.metadata_requests);

        let (kind, descriptor) = match self.source.update_information() {
            Ok(info) => info,
            Err(e) => {
                self.context.diagnostics().error(format!(
                    "Port {}: metadata update failed: {}",
                    self.tag, e
                ));
                ProducerStatsHandle::bump(&self.stats.counters.failures);
                let kind = self.last_kind.unwrap_or(DataKind::PolyData);
                let mut descriptor = OutputDescriptor::new(kind.empty_extent());
                descriptor.validity_time = self.context.clock().now();
                (kind, descriptor)
            }
        };
        self.context.clock().witness(descriptor.validity_time);
        self.last_kind = Some(kind);
        self.awaiting_data.insert(remote, (kind, descriptor.clone()));

        tracing::debug!(
            "Port {}: descriptor to process {} (time {}, released {})",
            self.tag,
            remote,
            descriptor.validity_time,
            descriptor.released
        );
        self.context.channel().send(
            remote,
            INFORMATION_TRANSFER_TAG,
            Envelope::Descriptor {
                port: self.tag,
                kind,
                descriptor,
            },
        )
    }

    /// Answer a data trigger from `remote`: read the request, then reply with
    /// a payload followed by the authoritative validity time.
    pub fn serve_data(&mut self, remote: ProcessId) -> Result<()> {
        ProducerStatsHandle::bump(&self.stats.counters.data_requests);

        let extent = match self.context.channel().receive(remote, UPDATE_EXTENT_TAG)? {
            Envelope::UpdateExtent { port, extent } if port == self.tag => extent,
            _ => return Err(self.unexpected(remote, UPDATE_EXTENT_TAG, "update extent")),
        };
        let consumer_time = match self.context.channel().receive(remote, NEW_DATA_TIME_TAG)? {
            Envelope::DataTime { port, time } if port == self.tag => time,
            _ => return Err(self.unexpected(remote, NEW_DATA_TIME_TAG, "data time")),
        };

        let announced = self.awaiting_data.remove(&remote);
        if announced.is_none() {
            self.context.diagnostics().warning(format!(
                "Port {}: data request from process {} without a metadata request; serving anyway",
                self.tag, remote
            ));
        }

        let (payload, time) = match self.produce(extent, consumer_time, announced) {
            Ok((object, time)) => (
                Envelope::Data {
                    port: self.tag,
                    object,
                },
                time,
            ),
            Err(e) => {
                ProducerStatsHandle::bump(&self.stats.counters.failures);
                self.context
                    .diagnostics()
                    .error(format!("Port {}: source failed: {}", self.tag, e));
                (
                    Envelope::SourceFailed {
                        port: self.tag,
                        reason: e.to_string(),
                    },
                    consumer_time,
                )
            }
        };

        let channel = self.context.channel();
        channel.send(remote, DATA_TRANSFER_TAG, payload)?;
        channel.send(
            remote,
            NEW_DATA_TIME_TAG,
            Envelope::DataTime {
                port: self.tag,
                time,
            },
        )
    }

    fn decide(
        &self,
        kind: DataKind,
        source: &OutputDescriptor,
        extent: Extent,
        consumer_time: TimeStamp,
    ) -> Reply {
        if source.released {
            return Reply::Execute;
        }
        let cached = self.cache.as_ref().filter(|c| {
            c.kind() == kind && c.update_extent() == extent && !c.is_released()
        });
        match cached {
            Some(c) if c.descriptor().validity_time >= source.validity_time => {
                if consumer_time >= source.validity_time {
                    Reply::Confirm
                } else {
                    Reply::Resend
                }
            }
            _ => Reply::Execute,
        }
    }

    fn produce(
        &mut self,
        extent: Extent,
        consumer_time: TimeStamp,
        announced: Option<(DataKind, OutputDescriptor)>,
    ) -> Result<(DataObject, TimeStamp)> {
        // Reuse what the metadata phase learned rather than propagating again.
        let (kind, source) = match announced {
            Some(info) => info,
            None => self.source.update_information()?,
        };
        self.last_kind = Some(kind);

        let reply = self.decide(kind, &source, extent, consumer_time);
        tracing::debug!(
            "Port {}: {:?} for {:?} (source time {}, consumer time {})",
            self.tag,
            reply,
            extent,
            source.validity_time,
            consumer_time
        );

        match reply {
            Reply::Confirm => {
                ProducerStatsHandle::bump(&self.stats.counters.confirmations);
                let mut empty = DataObject::new(kind);
                empty.set_update_extent(extent);
                Ok((empty, source.validity_time))
            }
            Reply::Resend => {
                ProducerStatsHandle::bump(&self.stats.counters.resends);
                let cached = self
                    .cache
                    .clone()
                    .ok_or_else(|| PortError::Source("cache vanished".into()))?;
                let time = cached.descriptor().validity_time;
                Ok((cached, time))
            }
            Reply::Execute => {
                ProducerStatsHandle::bump(&self.stats.counters.executions);
                let object = self.source.update_data(extent)?;
                let time = object.descriptor().validity_time.max(source.validity_time);
                self.context.clock().witness(time);
                self.cache = Some(object.clone());
                Ok((object, time))
            }
        }
    }

    fn unexpected(&self, remote: ProcessId, tag: Tag, expected: &'static str) -> PortError {
        PortError::UnexpectedMessage {
            from: remote,
            tag,
            expected,
        }
    }
}

impl<S: PipelineSource + Send> RmiHandler for ProducerPort<S> {
    fn rmi_tags(&self) -> Vec<Tag> {
        std::iter::once(self.tag).chain(self.tag.offset(1)).collect()
    }

    fn handle_rmi(&mut self, remote: ProcessId, tag: Tag) -> Result<()> {
        if tag == self.tag {
            self.serve_metadata(remote)
        } else if Some(tag) == self.tag.offset(1) {
            self.serve_data(remote)
        } else {
            Err(PortError::Config(format!(
                "producer port {} has no handler for tag {}",
                self.tag, tag
            )))
        }
    }
}

impl<S: PipelineSource> std::fmt::Debug for ProducerPort<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerPort")
            .field("tag", &self.tag)
            .field("cached", &self.cache.is_some())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
