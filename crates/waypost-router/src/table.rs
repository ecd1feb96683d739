//! The route table: built once from endpoint declarations, then read-only.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RouterConfig;
use crate::endpoint::{Endpoint, Route};
use crate::error::{Result, RouterError};
use crate::matcher::{CompiledRoute, ShardedCandidates};
use crate::param::ParamSyntax;
use crate::path::{normalize, PathPattern};
use crate::request::PathParams;

/// A successful lookup.
pub struct Resolved<P> {
    pub route: Arc<Route<P>>,
    pub params: PathParams,
}

/// Flattens a tree of [`Endpoint`]s into a [`RouteTable`].
pub struct RouteTableBuilder<P> {
    prefix: String,
    parallel_search: usize,
    endpoints: Vec<Endpoint<P>>,
}

impl<P: Send + Sync + 'static> Default for RouteTableBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync + 'static> RouteTableBuilder<P> {
    /// Creates a builder with one shard per logical CPU.
    pub fn new() -> Self {
        Self::from_config(&RouterConfig::default())
    }

    /// Creates a builder using the shard count from `config`.
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            prefix: String::new(),
            parallel_search: config.parallel_search,
            endpoints: Vec::new(),
        }
    }

    /// Mounts every endpoint below `prefix`.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the number of shards per regex bucket.
    #[must_use]
    pub const fn parallel_search(mut self, shards: usize) -> Self {
        self.parallel_search = shards;
        self
    }

    /// Adds a top-level endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint<P>) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Adds several top-level endpoints, keeping their order.
    #[must_use]
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint<P>>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Builds the table.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found: a duplicated path or
    /// pattern, or a malformed parameter.
    pub fn try_build(self) -> Result<RouteTable<P>> {
        let syntax = ParamSyntax::new();
        let mut statics: HashMap<String, Arc<Route<P>>> = HashMap::new();
        let mut buckets: HashMap<String, Vec<CompiledRoute<P>>> = HashMap::new();
        let mut bucket_order: Vec<String> = Vec::new();

        let mut pending: Vec<(String, Endpoint<P>)> = self
            .endpoints
            .into_iter()
            .rev()
            .map(|e| (self.prefix.clone(), e))
            .collect();

        // Depth-first, children right after their parent, siblings in order.
        while let Some((parent, endpoint)) = pending.pop() {
            let full_name = normalize(&format!("{parent}/{}", endpoint.name()));
            let (route, children) = endpoint.into_parts(full_name.clone());
            let route = Arc::new(route);

            if syntax.is_param_path(&full_name) {
                let pattern = PathPattern::compile(&syntax, &full_name)?;
                let bucket = buckets.entry(pattern.prefix().to_string()).or_insert_with(|| {
                    bucket_order.push(pattern.prefix().to_string());
                    Vec::new()
                });
                if let Some(existing) = bucket.iter().find(|c| c.pattern.as_str() == pattern.as_str())
                {
                    return Err(RouterError::DuplicatePattern {
                        path: full_name,
                        pattern: existing.full_name().to_string(),
                    });
                }
                debug!(
                    path = %full_name,
                    prefix = %pattern.prefix(),
                    pattern = %pattern.as_str(),
                    methods = ?route.methods(),
                    "Registered pattern route"
                );
                bucket.push(CompiledRoute {
                    pattern,
                    route: Arc::clone(&route),
                });
            } else {
                let trimmed = full_name.trim_end_matches('/').to_string();
                for key in [full_name.clone(), trimmed] {
                    if statics.contains_key(&key) {
                        return Err(RouterError::DuplicatePath { path: full_name });
                    }
                    statics.insert(key, Arc::clone(&route));
                }
                debug!(path = %full_name, methods = ?route.methods(), "Registered static route");
            }

            for child in children.into_iter().rev() {
                pending.push((full_name.clone(), child));
            }
        }

        let pattern_count: usize = buckets.values().map(Vec::len).sum();
        let buckets: HashMap<String, ShardedCandidates<P>> = buckets
            .into_iter()
            .map(|(prefix, candidates)| {
                (prefix, ShardedCandidates::new(candidates, self.parallel_search))
            })
            .collect();

        info!(
            static_routes = statics.len() / 2,
            pattern_routes = pattern_count,
            buckets = buckets.len(),
            parallel_search = self.parallel_search,
            "Route table built"
        );
        debug!(prefixes = ?bucket_order, "Regex buckets");

        Ok(RouteTable { statics, buckets })
    }

    /// Builds the table.
    ///
    /// # Panics
    ///
    /// Panics on any configuration error; a server with an ambiguous route
    /// table must not start.
    pub fn build(self) -> RouteTable<P> {
        match self.try_build() {
            Ok(table) => table,
            Err(err) => panic!("invalid route table: {err}"),
        }
    }
}

/// Static routes keyed by path, and regex candidates keyed by literal
/// prefix.
pub struct RouteTable<P> {
    statics: HashMap<String, Arc<Route<P>>>,
    buckets: HashMap<String, ShardedCandidates<P>>,
}

impl<P: Send + Sync + 'static> RouteTable<P> {
    /// Starts a builder.
    pub fn builder() -> RouteTableBuilder<P> {
        RouteTableBuilder::new()
    }

    /// Builds a table from top-level endpoints mounted under `prefix`.
    ///
    /// # Panics
    ///
    /// Panics on any configuration error, see [`RouteTableBuilder::build`].
    pub fn build(
        endpoints: impl IntoIterator<Item = Endpoint<P>>,
        prefix: &str,
        parallel_search: usize,
    ) -> Self {
        RouteTableBuilder::new()
            .prefix(prefix)
            .parallel_search(parallel_search)
            .endpoints(endpoints)
            .build()
    }

    /// Fallible form of [`RouteTable::build`].
    ///
    /// # Errors
    ///
    /// See [`RouteTableBuilder::try_build`].
    pub fn try_build(
        endpoints: impl IntoIterator<Item = Endpoint<P>>,
        prefix: &str,
        parallel_search: usize,
    ) -> Result<Self> {
        RouteTableBuilder::new()
            .prefix(prefix)
            .parallel_search(parallel_search)
            .endpoints(endpoints)
            .try_build()
    }

    /// Resolves a request path to a route and its parameters.
    ///
    /// Static routes win outright. Otherwise every bucket whose prefix
    /// starts the path is searched, longest prefix first.
    pub async fn resolve(&self, path: &str) -> Option<Resolved<P>> {
        let normalized = normalize(path);

        if let Some(route) = self.statics.get(path).or_else(|| self.statics.get(&normalized)) {
            return Some(Resolved {
                route: Arc::clone(route),
                params: PathParams::new(),
            });
        }

        for end in normalized.rmatch_indices('/').map(|(i, _)| i + 1) {
            let Some(bucket) = self.buckets.get(&normalized[..end]) else {
                continue;
            };
            if let Some(found) = bucket.find(&normalized).await {
                return Some(Resolved {
                    route: Arc::clone(&found.route),
                    params: found.pattern.extract(&normalized),
                });
            }
        }
        None
    }
}

impl<P> RouteTable<P> {
    /// Looks up a static route by exact path.
    pub fn get_static(&self, path: &str) -> Option<&Arc<Route<P>>> {
        self.statics.get(path)
    }

    /// Number of distinct static routes.
    pub fn static_len(&self) -> usize {
        self.statics.len() / 2
    }

    /// Number of parameterized routes across all buckets.
    pub fn pattern_len(&self) -> usize {
        self.buckets.values().map(ShardedCandidates::len).sum()
    }

    /// The regex bucket for a literal prefix.
    pub fn bucket(&self, prefix: &str) -> Option<&ShardedCandidates<P>> {
        self.buckets.get(prefix)
    }

    /// Every route, static and parameterized, without duplicates.
    pub fn routes(&self) -> Vec<&Arc<Route<P>>> {
        let mut routes: Vec<&Arc<Route<P>>> = self
            .statics
            .iter()
            .filter(|(key, _)| key.ends_with('/'))
            .map(|(_, route)| route)
            .collect();
        routes.extend(self.buckets.values().flat_map(|b| b.iter().map(|c| &c.route)));
        routes.sort_by(|a, b| a.full_name().cmp(b.full_name()));
        routes
    }
}
