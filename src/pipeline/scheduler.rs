//! Demand cycles over several consumer ports.
//!
//! A stage with more than one remote input drives all of them from one
//! thread. The overlapped cycle issues every data request before blocking on
//! the first reply, so upstream processes compute concurrently.

use crate::error::Result;
use crate::port::{CompleteOutcome, ConsumerPort, MetadataOutcome, RequestOutcome};

/// What one demand cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Ports whose metadata was refreshed
    pub refreshed: usize,
    /// Ports whose refresh was skipped
    pub skipped: usize,
    /// Ports found stale in the metadata phase
    pub stale: usize,
    /// Data requests sent
    pub requested: usize,
    /// Transfers that installed a new payload
    pub received: usize,
    /// Transfers that confirmed the held payload
    pub confirmed: usize,
    /// Transfers answered with a remote stage failure
    pub failed: usize,
}

impl CycleReport {
    /// True when nothing moved beyond the metadata phase.
    pub fn is_idle(&self) -> bool {
        self.requested == 0
    }

    fn absorb(&mut self, other: &CycleReport) {
        self.refreshed += other.refreshed;
        self.skipped += other.skipped;
        self.stale += other.stale;
        self.requested += other.requested;
        self.received += other.received;
        self.confirmed += other.confirmed;
        self.failed += other.failed;
    }

    fn count_metadata(&mut self, outcome: MetadataOutcome) {
        match outcome {
            MetadataOutcome::Stale => {
                self.refreshed += 1;
                self.stale += 1;
            }
            MetadataOutcome::Fresh => self.refreshed += 1,
            MetadataOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    fn count_complete(&mut self, outcome: CompleteOutcome) {
        match outcome {
            CompleteOutcome::Received => self.received += 1,
            CompleteOutcome::Confirmed => self.confirmed += 1,
            CompleteOutcome::UpstreamFailed => self.failed += 1,
            CompleteOutcome::NothingPending => {}
        }
    }
}

/// Runs demand cycles and keeps running totals.
#[derive(Debug, Default)]
pub struct PortScheduler {
    cycles: u64,
    totals: CycleReport,
}

impl PortScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn totals(&self) -> CycleReport {
        self.totals
    }

    /// Refresh every port, request every stale one, then complete them in request order.
    pub fn update_all(&mut self, ports: &mut [ConsumerPort]) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for port in ports.iter_mut() {
            report.count_metadata(port.refresh_metadata()?);
        }

        let mut pending = Vec::with_capacity(ports.len());
        for (i, port) in ports.iter_mut().enumerate() {
            if port.request_data_if_stale()? == RequestOutcome::Requested {
                pending.push(i);
            }
        }
        report.requested = pending.len();

        for i in pending {
            report.count_complete(ports[i].complete_data()?);
        }

        self.finish(report)
    }

    /// The same cycle one port at a time: each transfer completes before the next starts.
    pub fn update_serial(&mut self, ports: &mut [ConsumerPort]) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for port in ports.iter_mut() {
            report.count_metadata(port.refresh_metadata()?);
            if port.request_data_if_stale()? == RequestOutcome::Requested {
                report.requested += 1;
                report.count_complete(port.complete_data()?);
            }
        }
        self.finish(report)
    }

    fn finish(&mut self, report: CycleReport) -> Result<CycleReport> {
        self.cycles += 1;
        self.totals.absorb(&report);
        tracing::debug!("Demand cycle {}: {:?}", self.cycles, report);
        Ok(report)
    }
}
