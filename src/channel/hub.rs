//! In-process realisation of the process channel.
//!
//! A [`ChannelHub`] hands out one [`Endpoint`] per [`ProcessId`]. Each
//! endpoint is meant to be driven by its own thread, which plays the role of
//! that process's single thread of control.
//!
//! Every envelope is encoded with `serde_json` on send and decoded on
//! receive, so nothing is ever shared by reference between endpoints.
//!
//! Queues are unbounded: sends never block, which is what lets a consumer
//! issue several data requests before waiting on any of them.

use crate::channel::{ChannelStats, Envelope, ProcessChannel, RmiRequest};
use crate::error::{PortError, Result};
use crate::types::{ProcessId, Tag};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How often a blocked receive re-checks whether its peer has gone away.
const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(20);

type Wire = Vec<u8>;
type Queue = (Sender<Wire>, Receiver<Wire>);

/// (source, destination, tag)
type QueueKey = (ProcessId, ProcessId, Tag);

#[derive(Default)]
struct HubState {
    queues: HashMap<QueueKey, Queue>,
    rmi: HashMap<ProcessId, Queue>,
    open: HashSet<ProcessId>,
    closed: HashSet<ProcessId>,
}

#[derive(Default)]
struct HubInner {
    state: Mutex<HubState>,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A panicking endpoint thread leaves the maps themselves intact.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn queue(&self, key: QueueKey) -> Queue {
        let mut state = self.lock();
        state.queues.entry(key).or_insert_with(unbounded).clone()
    }

    fn rmi_queue(&self, process: ProcessId) -> Option<Queue> {
        self.lock().rmi.get(&process).cloned()
    }

    fn is_closed(&self, process: ProcessId) -> bool {
        self.lock().closed.contains(&process)
    }
}

/// Shared registry of queues between in-process endpoints.
#[derive(Clone, Default)]
pub struct ChannelHub {
    inner: Arc<HubInner>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the endpoint for `process`.
    ///
    /// Fails if an endpoint for that id is already open.
    pub fn endpoint(&self, process: ProcessId) -> Result<Endpoint> {
        let mut state = self.inner.lock();
        if !state.open.insert(process) {
            return Err(PortError::Channel(format!(
                "endpoint for process {} already exists",
                process
            )));
        }
        state.closed.remove(&process);
        state.rmi.entry(process).or_insert_with(unbounded);
        tracing::debug!("Opened endpoint for process {}", process);
        Ok(Endpoint {
            process,
            hub: self.inner.clone(),
            receive_timeout: None,
            counters: Counters::default(),
        })
    }

    /// Processes with an open endpoint.
    pub fn processes(&self) -> Vec<ProcessId> {
        let mut ids: Vec<_> = self.inner.lock().open.iter().copied().collect();
        ids.sort();
        ids
    }
}

#[derive(Default)]
struct Counters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    triggers_sent: AtomicU64,
    triggers_received: AtomicU64,
    bytes_sent: AtomicU64,
}

/// One process's view of the hub.
///
/// Dropping the endpoint disconnects the process: peers blocked on a receive
/// from it fail once its queued messages are drained.
pub struct Endpoint {
    process: ProcessId,
    hub: Arc<HubInner>,
    receive_timeout: Option<Duration>,
    counters: Counters,
}

impl Endpoint {
    /// Bound every blocking receive by `timeout`. `None` waits forever.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout
    }

    fn ensure_peer(&self, process: ProcessId) -> Result<()> {
        let state = self.hub.lock();
        if state.closed.contains(&process) {
            return Err(PortError::Channel(format!(
                "process {} has disconnected",
                process
            )));
        }
        if !state.open.contains(&process) {
            return Err(PortError::UnknownProcess(process));
        }
        Ok(())
    }

    /// Blocking receive that notices a disconnected peer and honours the timeout.
    fn recv_wire(&self, rx: &Receiver<Wire>, from: ProcessId, tag: Tag) -> Result<Wire> {
        let deadline = self.receive_timeout.map(|t| Instant::now() + t);
        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.timeout_error(from, tag));
                    }
                    (deadline - now).min(DISCONNECT_POLL_INTERVAL)
                }
                None => DISCONNECT_POLL_INTERVAL,
            };
            match rx.recv_timeout(wait) {
                Ok(wire) => return Ok(wire),
                Err(RecvTimeoutError::Timeout) => {
                    if from != self.process && self.hub.is_closed(from) {
                        // Late messages are still delivered before reporting the loss.
                        return match rx.try_recv() {
                            Ok(wire) => Ok(wire),
                            Err(_) => Err(PortError::Channel(format!(
                                "process {} disconnected while process {} waited on tag {}",
                                from, self.process, tag
                            ))),
                        };
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PortError::Channel(format!(
                        "queue from process {} on tag {} closed",
                        from, tag
                    )));
                }
            }
        }
    }

    fn timeout_error(&self, from: ProcessId, tag: Tag) -> PortError {
        let millis = self
            .receive_timeout
            .map(|t| t.as_millis() as u64)
            .unwrap_or_default();
        PortError::Timeout { from, tag, millis }
    }

    fn decode_rmi(&self, wire: &[u8]) -> Result<RmiRequest> {
        let request: RmiRequest = serde_json::from_slice(wire)?;
        self.counters.triggers_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            "Process {} received trigger {} from {}",
            self.process,
            request.tag,
            request.from
        );
        Ok(request)
    }
}

impl ProcessChannel for Endpoint {
    fn local_process(&self) -> ProcessId {
        self.process
    }

    fn trigger_remote(&self, process: ProcessId, tag: Tag) -> Result<()> {
        self.ensure_peer(process)?;
        let (tx, _) = self
            .hub
            .rmi_queue(process)
            .ok_or(PortError::UnknownProcess(process))?;
        let wire = serde_json::to_vec(&RmiRequest {
            from: self.process,
            tag,
        })?;
        let len = wire.len() as u64;
        tx.send(wire)
            .map_err(|_| PortError::Channel(format!("RMI queue of process {} closed", process)))?;
        self.counters.triggers_sent.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_sent.fetch_add(len, Ordering::Relaxed);
        tracing::trace!("Process {} triggered {} on {}", self.process, tag, process);
        Ok(())
    }

    fn send(&self, process: ProcessId, tag: Tag, message: Envelope) -> Result<()> {
        self.ensure_peer(process)?;
        let (tx, _) = self.hub.queue((self.process, process, tag));
        let wire = serde_json::to_vec(&message)?;
        let len = wire.len() as u64;
        tx.send(wire)
            .map_err(|_| PortError::Channel(format!("queue to process {} closed", process)))?;
        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_sent.fetch_add(len, Ordering::Relaxed);
        tracing::trace!(
            "Process {} sent {} to {} on tag {} ({} bytes)",
            self.process,
            message.label(),
            process,
            tag,
            len
        );
        Ok(())
    }

    fn receive(&self, process: ProcessId, tag: Tag) -> Result<Envelope> {
        let (_, rx) = self.hub.queue((process, self.process, tag));
        let wire = self.recv_wire(&rx, process, tag)?;
        let message: Envelope = serde_json::from_slice(&wire)?;
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
        Ok(message)
    }

    fn receive_rmi(&self) -> Result<RmiRequest> {
        let (_, rx) = self
            .hub
            .rmi_queue(self.process)
            .ok_or(PortError::UnknownProcess(self.process))?;
        // Triggers wait for as long as it takes; the timeout only bounds replies.
        let wire = rx
            .recv()
            .map_err(|_| PortError::Channel(format!("RMI queue of process {} closed", self.process)))?;
        self.decode_rmi(&wire)
    }

    fn try_receive_rmi(&self) -> Result<Option<RmiRequest>> {
        let (_, rx) = self
            .hub
            .rmi_queue(self.process)
            .ok_or(PortError::UnknownProcess(self.process))?;
        match rx.try_recv() {
            Ok(wire) => self.decode_rmi(&wire).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PortError::Channel(format!(
                "RMI queue of process {} closed",
                self.process
            ))),
        }
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            triggers_sent: self.counters.triggers_sent.load(Ordering::Relaxed),
            triggers_received: self.counters.triggers_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let mut state = self.hub.lock();
        state.open.remove(&self.process);
        state.closed.insert(self.process);
        tracing::debug!("Closed endpoint for process {}", self.process);
    }
}
