//! Hooks around the data transfer of a consumer port.

use crate::types::Tag;
use std::time::Instant;

/// Callbacks bracketing the blocking part of [`complete_data`].
///
/// `on_transfer_end` runs whenever `on_transfer_start` ran, including when
/// the receive fails.
///
/// [`complete_data`]: crate::port::ConsumerPort::complete_data
pub trait TransferHooks: Send {
    fn on_transfer_start(&mut self, _port: Tag) {}

    fn on_transfer_end(&mut self, _port: Tag, _succeeded: bool) {}
}

/// Logs how long each transfer blocked.
#[derive(Debug, Default)]
pub struct TransferTimer {
    started: Option<Instant>,
    transfers: u64,
}

impl TransferTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed transfers observed so far.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }
}

impl TransferHooks for TransferTimer {
    fn on_transfer_start(&mut self, _port: Tag) {
        self.started = Some(Instant::now());
    }

    fn on_transfer_end(&mut self, port: Tag, succeeded: bool) {
        let elapsed = self.started.take().map(|t| t.elapsed()).unwrap_or_default();
        if succeeded {
            self.transfers += 1;
            tracing::debug!("Port {} transfer finished in {:?}", port, elapsed);
        } else {
            tracing::warn!("Port {} transfer failed after {:?}", port, elapsed);
        }
    }
}
