//! Engine configuration

use serde::{Deserialize, Serialize};

/// Tunables for the workflow engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum automatic transitions fired in one call chain
    #[serde(default = "default_max_automatic_chain")]
    pub max_automatic_chain: usize,

    /// How often a unit of work is retried after a version conflict
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,

    /// Buffered stage-entry events per subscriber
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_max_automatic_chain() -> usize {
    16
}

fn default_commit_retries() -> u32 {
    3
}

fn default_event_channel_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_automatic_chain: default_max_automatic_chain(),
            commit_retries: default_commit_retries(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_automatic_chain(mut self, max: usize) -> Self {
        self.max_automatic_chain = max;
        self
    }

    pub fn with_commit_retries(mut self, retries: u32) -> Self {
        self.commit_retries = retries;
        self
    }
}
