//! Hierarchical path resolution with a memoizing cache.
//!
//! Paths such as `root/odi/x` are canonicalized, then resolved one segment
//! at a time from a well-known root identifier. Only the full canonical path
//! is cached. Entries are never evicted, so the cache is only correct while
//! path → identifier bindings stay stable for the resolver's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::errors::PathError;
use crate::interpreter::ToolInvoker;
use crate::normalizer::normalize;

pub const DEFAULT_ROOT_MARKER: &str = "root";

/// Canonicalizes `path` using the default `root` marker.
pub fn normalize_path(path: &str) -> String {
    canonical_path(path, DEFAULT_ROOT_MARKER)
}

/// Trims, drops empty segments, and strips a leading root marker (compared
/// case-insensitively). The empty string denotes the root itself.
pub fn canonical_path(path: &str, root_marker: &str) -> String {
    let mut segments = path.trim().split('/').filter(|segment| !segment.is_empty()).peekable();

    if segments.peek().is_some_and(|first| first.eq_ignore_ascii_case(root_marker)) {
        segments.next();
    }

    segments.collect::<Vec<_>>().join("/")
}

/// Finds a named child under a parent identifier.
#[async_trait]
pub trait SegmentLookup: Send + Sync {
    /// `Ok(None)` when the parent has no child with that name.
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<String>, PathError>;
}

#[async_trait]
impl<T> SegmentLookup for Arc<T>
where
    T: SegmentLookup + ?Sized,
{
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<String>, PathError> {
        (**self).find_child(parent_id, name).await
    }
}

/// Canonical path → resolved identifier.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: RwLock<HashMap<String, String>>,
}

impl PathCache {
    pub async fn get(&self, path: &str) -> Option<String> {
        self.entries.read().await.get(path).cloned()
    }

    pub(crate) async fn insert(&self, path: impl Into<String>, id: impl Into<String>) {
        self.entries.write().await.insert(path.into(), id.into());
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct PathResolverOptions {
    pub root_id: String,
    pub root_marker: String,
    /// Serialize cache misses so concurrent callers for one path share a
    /// single lookup chain. When off, racing callers may look up the same
    /// path more than once; the last insert wins.
    pub coalesce_misses: bool,
}

impl PathResolverOptions {
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            root_marker: DEFAULT_ROOT_MARKER.to_string(),
            coalesce_misses: false,
        }
    }
}

/// Owns its cache; dropping the resolver drops every memoized entry.
pub struct PathResolver<L> {
    lookup: L,
    options: PathResolverOptions,
    cache: PathCache,
    miss_gate: Mutex<()>,
}

impl<L> PathResolver<L>
where
    L: SegmentLookup,
{
    pub fn new(lookup: L, options: PathResolverOptions) -> Self {
        Self { lookup, options, cache: PathCache::default(), miss_gate: Mutex::new(()) }
    }

    pub fn root_id(&self) -> &str {
        &self.options.root_id
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn canonicalize(&self, path: &str) -> String {
        canonical_path(path, &self.options.root_marker)
    }

    /// Canonicalizes `path`, then resolves it.
    pub async fn resolve(&self, path: &str) -> Result<String, PathError> {
        let canonical = self.canonicalize(path);
        self.resolve_canonical(&canonical).await
    }

    pub async fn resolve_canonical(&self, canonical: &str) -> Result<String, PathError> {
        if canonical.is_empty() {
            return Ok(self.options.root_id.clone());
        }

        if let Some(id) = self.cache.get(canonical).await {
            debug!(event_name = "paths.cache.hit", path = canonical, "path cache hit");
            return Ok(id);
        }

        if !self.options.coalesce_misses {
            return self.resolve_uncached(canonical).await;
        }

        let _gate = self.miss_gate.lock().await;
        if let Some(id) = self.cache.get(canonical).await {
            debug!(event_name = "paths.cache.hit", path = canonical, "path cache hit after wait");
            return Ok(id);
        }
        self.resolve_uncached(canonical).await
    }

    async fn resolve_uncached(&self, canonical: &str) -> Result<String, PathError> {
        debug!(event_name = "paths.cache.miss", path = canonical, "resolving path segments");

        let mut parent_id = self.options.root_id.clone();
        for segment in canonical.split('/') {
            parent_id = self.lookup.find_child(&parent_id, segment).await?.ok_or_else(|| {
                PathError::NotFound { segment: segment.to_string(), parent_id: parent_id.clone() }
            })?;
        }

        self.cache.insert(canonical, parent_id.clone()).await;
        Ok(parent_id)
    }
}

/// Resolves a segment by calling a tool with `{parent_arg: parent, name_arg: name}`.
///
/// The normalized result may be the child id as a string, a mapping with an
/// `id` field, or null when no child matches.
pub struct ToolSegmentLookup<I> {
    invoker: I,
    tool: String,
    parent_arg: String,
    name_arg: String,
}

impl<I> ToolSegmentLookup<I>
where
    I: ToolInvoker,
{
    pub fn new(
        invoker: I,
        tool: impl Into<String>,
        parent_arg: impl Into<String>,
        name_arg: impl Into<String>,
    ) -> Self {
        Self {
            invoker,
            tool: tool.into(),
            parent_arg: parent_arg.into(),
            name_arg: name_arg.into(),
        }
    }
}

#[async_trait]
impl<I> SegmentLookup for ToolSegmentLookup<I>
where
    I: ToolInvoker,
{
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<String>, PathError> {
        let mut args = Map::new();
        args.insert(self.parent_arg.clone(), Value::String(parent_id.to_string()));
        args.insert(self.name_arg.clone(), Value::String(name.to_string()));

        let raw = self
            .invoker
            .invoke(&self.tool, &args)
            .await
            .map_err(|error| PathError::Lookup(format!("{}: {error}", self.tool)))?;

        match normalize(&raw) {
            Value::Null => Ok(None),
            Value::String(id) if id.trim().is_empty() => Ok(None),
            Value::String(id) => Ok(Some(id)),
            Value::Object(mapping) => match mapping.get("id") {
                Some(Value::String(id)) => Ok(Some(id.clone())),
                Some(Value::Null) | None => Ok(None),
                Some(other) => Err(PathError::Lookup(format!(
                    "{} returned a non-string id: {other}",
                    self.tool
                ))),
            },
            other => Err(PathError::Lookup(format!(
                "{} returned an unexpected result: {other}",
                self.tool
            ))),
        }
    }
}
