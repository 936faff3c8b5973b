//! Configuration sections
//!
//! - [`ChannelConfig`] - Blocking behaviour of the process channel
//! - [`LoggingConfig`] - Log filter and optional log directory
//! - [`ProtocolConfig`] - Tag assignment for the ports a process creates

use crate::types::Tag;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,pipeport=debug";

/// Default base tag for the first port pair
pub const DEFAULT_BASE_TAG: i32 = 100;

/// Settings for the process channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Upper bound for every blocking receive, in milliseconds.
    ///
    /// Unset means wait forever: a hung producer hangs its consumer.
    #[serde(default)]
    pub receive_timeout_ms: Option<u64>,
}

impl ChannelConfig {
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for a daily rolling log file, in addition to stderr.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
        }
    }
}

/// Tag assignment for port pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Base tag of the first port pair.
    #[serde(default = "default_base_tag")]
    pub base_tag: i32,

    /// Distance between the base tags of consecutive port pairs.
    ///
    /// Must be at least 2: each pair uses `tag` and `tag + 1`.
    #[serde(default = "default_tag_stride")]
    pub tag_stride: i32,
}

fn default_base_tag() -> i32 {
    DEFAULT_BASE_TAG
}

fn default_tag_stride() -> i32 {
    2
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            base_tag: default_base_tag(),
            tag_stride: default_tag_stride(),
        }
    }
}

impl ProtocolConfig {
    /// Base tag of the `index`-th port pair.
    pub fn port_tag(&self, index: usize) -> Tag {
        Tag(self.base_tag + self.tag_stride.max(2) * index as i32)
    }
}
