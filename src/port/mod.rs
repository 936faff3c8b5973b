//! Consumer and producer ports.
//!
//! A [`ConsumerPort`] stands in, on the downstream process, for a pipeline
//! stage that runs on another process. The matching [`ProducerPort`] on that
//! process answers its requests by driving the real stage.
//!
//! # Demand cycle
//!
//! ```text
//! consumer                              producer
//! ────────                              ────────
//! refresh_metadata()  ── RMI tag ─────► update_information()
//!                     ◄─ descriptor ──
//! request_data_if_stale()
//!        (stale only) ── RMI tag+1 ───►
//!                     ── extent ──────►
//!                     ── data time ───► execute / resend / confirm
//! complete_data()     ◄─ data ────────
//!                     ◄─ new time ────
//! ```
//!
//! `request_data_if_stale` returns as soon as the request is on the wire, so a
//! stage with several inputs can start every upstream transfer before waiting
//! on the first one.

pub mod consumer;
pub mod hooks;
pub mod producer;

pub use consumer::ConsumerPort;
pub use hooks::{TransferHooks, TransferTimer};
pub use producer::{ProducerPort, ProducerStats, ProducerStatsHandle};

use std::fmt;

/// Where a consumer port is in its demand cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortState {
    #[default]
    Idle,
    /// Trigger sent, waiting on the descriptor.
    MetadataRequested,
    /// Descriptor received and compared; no data request issued yet.
    MetadataKnown,
    /// Data request sent, payload not yet received.
    TransferRequested,
}

/// Why a metadata refresh did not talk to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No output exists yet; call `typed_output` first.
    NoOutput,
    /// The previous data phase is unresolved; call `complete_data` first.
    TransferPending,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoOutput => f.write_str("no output"),
            SkipReason::TransferPending => f.write_str("transfer pending"),
        }
    }
}

/// Result of [`ConsumerPort::refresh_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOutcome {
    /// The producer has newer (or released) output; a transfer is needed.
    Stale,
    /// Local data is as new as the producer's.
    Fresh,
    /// Nothing was sent; the cycle was aborted.
    Skipped(SkipReason),
}

/// Result of [`ConsumerPort::request_data_if_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Trigger, extent and data time were sent.
    Requested,
    /// Nothing to fetch; no message sent.
    UpToDate,
    /// A transfer is already outstanding; no message sent.
    AlreadyPending,
    /// No output exists yet; no message sent.
    NoOutput,
}

/// Result of [`ConsumerPort::complete_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// New payload installed.
    Received,
    /// The producer confirmed the local payload is current; it was kept.
    Confirmed,
    /// The remote stage failed to execute. The held payload and data time
    /// are unchanged and the port stays stale.
    UpstreamFailed,
    /// No transfer was pending.
    NothingPending,
}
