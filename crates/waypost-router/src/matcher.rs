//! Sharded regex search over the candidates sharing a literal prefix.
//!
//! Candidates are split once, at build time, into near-equal shards. A
//! lookup scans every shard on the blocking pool and keeps the match with
//! the lowest declaration index, so the answer never depends on how the
//! list was sharded or which shard finished first.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::endpoint::Route;
use crate::path::PathPattern;

/// A parameterized route together with its compiled pattern.
pub struct CompiledRoute<P> {
    pub pattern: PathPattern,
    pub route: Arc<Route<P>>,
}

impl<P> CompiledRoute<P> {
    /// Normalized declared path.
    pub fn full_name(&self) -> &str {
        self.pattern.full_name()
    }
}

/// Splits `len` items into at most `shards` contiguous ranges.
///
/// The first `len % shards` ranges hold one extra item. No range is empty,
/// and concatenating the ranges yields `0..len`.
///
/// ```
/// use waypost_router::matcher::partition;
///
/// assert_eq!(partition(5, 2), vec![0..3, 3..5]);
/// assert_eq!(partition(2, 4), vec![0..1, 1..2]);
/// assert!(partition(3, 0).is_empty());
/// ```
pub fn partition(len: usize, shards: usize) -> Vec<Range<usize>> {
    if len == 0 || shards == 0 {
        return Vec::new();
    }
    let shards = shards.min(len);
    let base = len / shards;
    let extra = len % shards;

    let mut ranges = Vec::with_capacity(shards);
    let mut start = 0;
    for i in 0..shards {
        let size = if i < extra { base + 1 } else { base };
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// The candidates of one bucket, in declaration order, and their shards.
pub struct ShardedCandidates<P> {
    candidates: Arc<[CompiledRoute<P>]>,
    shards: Vec<Range<usize>>,
}

impl<P: Send + Sync + 'static> ShardedCandidates<P> {
    /// Freezes `candidates` and splits them into `parallelism` shards.
    /// A parallelism of zero is treated as one.
    pub fn new(candidates: Vec<CompiledRoute<P>>, parallelism: usize) -> Self {
        let shards = partition(candidates.len(), parallelism.max(1));
        Self {
            candidates: candidates.into(),
            shards,
        }
    }

    /// Returns the first declared candidate matching `path`.
    pub async fn find(&self, path: &str) -> Option<&CompiledRoute<P>> {
        let index = if self.shards.len() <= 1 {
            self.candidates.iter().position(|c| c.pattern.is_match(path))
        } else {
            self.find_parallel(path).await
        };
        index.map(|i| &self.candidates[i])
    }

    async fn find_parallel(&self, path: &str) -> Option<usize> {
        let best = Arc::new(AtomicUsize::new(usize::MAX));
        let path: Arc<str> = Arc::from(path);
        let mut set = JoinSet::new();

        for shard in &self.shards {
            let shard = shard.clone();
            let candidates = Arc::clone(&self.candidates);
            let best = Arc::clone(&best);
            let path = Arc::clone(&path);
            set.spawn_blocking(move || scan_shard(&candidates, shard, &path, &best));
        }

        let mut winner: Option<usize> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(index)) => {
                    winner = Some(winner.map_or(index, |w| w.min(index)));
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Shard search task failed");
                }
            }
        }
        winner
    }
}

impl<P> ShardedCandidates<P> {
    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns true if the bucket holds no candidates.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The shard ranges.
    pub fn shards(&self) -> &[Range<usize>] {
        &self.shards
    }

    /// Candidates in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRoute<P>> {
        self.candidates.iter()
    }
}

/// Scans one shard, giving up once a lower index has already matched.
fn scan_shard<P>(
    candidates: &[CompiledRoute<P>],
    shard: Range<usize>,
    path: &str,
    best: &AtomicUsize,
) -> Option<usize> {
    for index in shard {
        if index >= best.load(Ordering::Acquire) {
            return None;
        }
        if candidates[index].pattern.is_match(path) {
            best.fetch_min(index, Ordering::AcqRel);
            return Some(index);
        }
    }
    None
}
