//! Router configuration.

use serde::Deserialize;

/// Default JSON body limit: 1 MiB.
pub const DEFAULT_MAX_JSON_BYTES: usize = 1024 * 1024;

/// Settings consumed when the route table and router are built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Number of shards each regex bucket is split into. Defaults to the
    /// number of logical CPUs.
    pub parallel_search: usize,
    /// Largest body [`Request::json`](crate::Request::json) will decode.
    pub max_json_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            parallel_search: num_cpus::get(),
            max_json_bytes: DEFAULT_MAX_JSON_BYTES,
        }
    }
}

impl RouterConfig {
    /// Sets the shard count.
    #[must_use]
    pub const fn parallel_search(mut self, shards: usize) -> Self {
        self.parallel_search = shards;
        self
    }

    /// Sets the JSON body limit.
    #[must_use]
    pub const fn max_json_bytes(mut self, bytes: usize) -> Self {
        self.max_json_bytes = bytes;
        self
    }
}
