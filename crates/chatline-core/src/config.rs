//! Core tuning knobs.

use crate::log::Retention;
use crate::nickname::CasePolicy;
use serde::{Deserialize, Serialize};

/// History limit used when nothing else is configured.
pub const DEFAULT_MAX_HISTORY: usize = 100;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Smallest per-session queue that survives a join without being drained:
/// the connect prompt plus `nickname_set`, `message_history`, the welcome
/// status and `users_list`.
pub const MIN_OUTBOUND_BUFFER: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidConfig {
    #[error("outbound_buffer must be at least {MIN_OUTBOUND_BUFFER}, got {0}")]
    OutboundBufferTooSmall(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub case_policy: CasePolicy,
    /// Number of events kept for replay. `0` keeps everything.
    pub max_history: usize,
    /// Per-session outbound queue capacity.
    pub outbound_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            case_policy: CasePolicy::Sensitive,
            max_history: DEFAULT_MAX_HISTORY,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl CoreConfig {
    pub fn retention(&self) -> Retention {
        Retention::from_max(self.max_history)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.outbound_buffer < MIN_OUTBOUND_BUFFER {
            return Err(InvalidConfig::OutboundBufferTooSmall(self.outbound_buffer));
        }
        Ok(())
    }
}
