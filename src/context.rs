//! Per-request global ID resolution
//!
//! A [`GlobalIdContext`] is built once per request from the collections that
//! can appear in global IDs. It encodes IDs, decodes them back to collection
//! entries and keys, and resolves them to records through an optional
//! [`Hydrator`] and the collection's [`DataLoader`](crate::DataLoader).
//!
//! Malformed IDs and unknown collections are never errors; they resolve to
//! `None`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pleme_global_id::GlobalIdContext;
//!
//! let globals = GlobalIdContext::builder()
//!     .collection(users)
//!     .collection(posts)
//!     .hydrator(visible_only)
//!     .build()?;
//!
//! let id = globals.to_id("User", &user_id);
//! assert_eq!(globals.key_of(&id), Some(user_id));
//! let user = globals.resolve(&id).await?;
//! ```

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::codec::GlobalIdCodec;
use crate::config::LoaderConfig;
use crate::dataloaders::{Collection, NodeRecord};
use crate::key::NodeKey;
use crate::registry::{CollectionEntry, CollectionRegistry};
use crate::{BoxError, GlobalIdError, Result};

/// Custom record loading, tried before the collection's loader
///
/// Returning `Ok(None)` falls through to the loader. Whatever a hydrator
/// returns is never stored in the loader's cache.
#[async_trait]
pub trait Hydrator<K, R>: Send + Sync
where
    K: NodeKey,
    R: NodeRecord,
{
    async fn hydrate(
        &self,
        entry: &CollectionEntry<K, R>,
        key: &K,
    ) -> std::result::Result<Option<R>, BoxError>;
}

struct ContextInner<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    registry: CollectionRegistry<K, R>,
    hydrator: Option<Arc<dyn Hydrator<K, R>>>,
}

/// Global ID resolution context for one request
///
/// Cheap to clone; clones share the same loaders.
pub struct GlobalIdContext<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    inner: Arc<ContextInner<K, R>>,
}

impl<K, R> GlobalIdContext<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    /// Create a context with default loader settings and no hydrator
    pub fn new(collections: impl IntoIterator<Item = Arc<dyn Collection<K, R>>>) -> Result<Self> {
        collections
            .into_iter()
            .fold(Self::builder(), GlobalIdContextBuilder::collection)
            .build()
    }

    pub fn builder() -> GlobalIdContextBuilder<K, R> {
        GlobalIdContextBuilder::default()
    }

    /// A new context over the same collections and hydrator, with empty caches
    pub fn fresh(&self) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                registry: self.inner.registry.fresh(),
                hydrator: self.inner.hydrator.clone(),
            }),
        }
    }

    pub fn registry(&self) -> &CollectionRegistry<K, R> {
        &self.inner.registry
    }

    /// Encode a global ID
    ///
    /// The tag is not checked against the registry.
    pub fn to_id(&self, tag: &str, key: &K) -> String {
        GlobalIdCodec::encode(tag, key)
    }

    /// Encode a global ID using a collection's own tag
    pub fn to_id_for(&self, collection: &dyn Collection<K, R>, key: &K) -> String {
        GlobalIdCodec::encode(collection.tag(), key)
    }

    /// Collection entry (descriptor and loader) for a global ID
    ///
    /// `None` if the ID is malformed or names an unknown collection. Never fetches.
    pub fn data(&self, id: &str) -> Option<&CollectionEntry<K, R>> {
        let decoded = GlobalIdCodec::decode(id);
        let (tag, _) = decoded.parts()?;
        self.inner.registry.lookup(tag)
    }

    /// Key of a global ID, or `None` if the ID is malformed
    pub fn key_of(&self, id: &str) -> Option<K> {
        GlobalIdCodec::decode_key(id)
    }

    /// Resolve a global ID to its record
    ///
    /// Tries the hydrator first, if one is configured and it finds the record,
    /// otherwise loads through the collection's loader. `Ok(None)` covers
    /// malformed IDs, unknown collections and records that no longer exist.
    pub async fn resolve(&self, id: &str) -> Result<Option<R>> {
        let decoded = GlobalIdCodec::decode(id);
        let Some((tag, raw_key)) = decoded.parts() else {
            trace!(id, "malformed global id");
            return Ok(None);
        };
        let Some(entry) = self.inner.registry.lookup(tag) else {
            trace!(id, tag, "global id names an unknown collection");
            return Ok(None);
        };
        let Some(key) = K::from_canonical(raw_key) else {
            trace!(id, tag, "global id key does not parse");
            return Ok(None);
        };

        if let Some(hydrator) = &self.inner.hydrator {
            let hydrated = hydrator.hydrate(entry, &key).await.map_err(|source| {
                warn!(collection = tag, error = %source, "hydration failed");
                GlobalIdError::Hydrate {
                    collection: tag.to_string(),
                    source: Arc::from(source),
                }
            })?;
            if hydrated.is_some() {
                return Ok(hydrated);
            }
        }

        entry.loader().load(key).await
    }

    /// Resolve many global IDs, in order
    ///
    /// IDs are resolved concurrently, so lookups in the same collection share
    /// batches. Fails if any lookup fails.
    pub async fn resolve_many<I, S>(&self, ids: I) -> Result<Vec<Option<R>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = ids.into_iter().collect();
        try_join_all(ids.iter().map(|id| self.resolve(id.as_ref()))).await
    }
}

impl<K, R> Clone for GlobalIdContext<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, R> std::fmt::Debug for GlobalIdContext<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalIdContext")
            .field("registry", &self.inner.registry)
            .field("hydrator", &self.inner.hydrator.is_some())
            .finish()
    }
}

/// Builder for [`GlobalIdContext`]
pub struct GlobalIdContextBuilder<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    collections: Vec<Arc<dyn Collection<K, R>>>,
    hydrator: Option<Arc<dyn Hydrator<K, R>>>,
    config: LoaderConfig,
}

impl<K, R> Default for GlobalIdContextBuilder<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            hydrator: None,
            config: LoaderConfig::default(),
        }
    }
}

impl<K, R> GlobalIdContextBuilder<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    /// Register a collection
    pub fn collection(mut self, collection: Arc<dyn Collection<K, R>>) -> Self {
        self.collections.push(collection);
        self
    }

    /// Register several collections
    pub fn collections(
        mut self,
        collections: impl IntoIterator<Item = Arc<dyn Collection<K, R>>>,
    ) -> Self {
        self.collections.extend(collections);
        self
    }

    /// Set the hydration override
    pub fn hydrator(mut self, hydrator: Arc<dyn Hydrator<K, R>>) -> Self {
        self.hydrator = Some(hydrator);
        self
    }

    /// Set loader configuration for every collection
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the context
    ///
    /// Fails if two collections share a tag.
    pub fn build(self) -> Result<GlobalIdContext<K, R>> {
        let registry = CollectionRegistry::new(self.collections, &self.config)?;
        Ok(GlobalIdContext {
            inner: Arc::new(ContextInner {
                registry,
                hydrator: self.hydrator,
            }),
        })
    }
}
