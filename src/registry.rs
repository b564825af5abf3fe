//! Collection registry
//!
//! Maps collection tags to their descriptor and a private [`DataLoader`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::dataloaders::{Collection, DataLoader, NodeRecord};
use crate::key::NodeKey;
use crate::{GlobalIdError, Result};

/// A registered collection and its loader
pub struct CollectionEntry<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    collection: Arc<dyn Collection<K, R>>,
    loader: DataLoader<K, R>,
}

impl<K, R> CollectionEntry<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    pub fn collection(&self) -> &Arc<dyn Collection<K, R>> {
        &self.collection
    }

    pub fn loader(&self) -> &DataLoader<K, R> {
        &self.loader
    }

    pub fn tag(&self) -> &str {
        self.collection.tag()
    }
}

impl<K, R> fmt::Debug for CollectionEntry<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionEntry")
            .field("tag", &self.tag())
            .field("loader", &self.loader)
            .finish()
    }
}

/// Registry of resolvable collections, keyed by tag
///
/// Duplicate tags are rejected when the registry is built.
pub struct CollectionRegistry<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    entries: HashMap<String, CollectionEntry<K, R>>,
    /// Tags in registration order
    order: Vec<String>,
    config: LoaderConfig,
}

impl<K, R> CollectionRegistry<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    /// Build a registry, creating one loader per collection
    pub fn new(
        collections: impl IntoIterator<Item = Arc<dyn Collection<K, R>>>,
        config: &LoaderConfig,
    ) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut order = Vec::new();

        for collection in collections {
            let tag = collection.tag().to_string();
            if entries.contains_key(&tag) {
                return Err(GlobalIdError::DuplicateCollection(tag));
            }

            let loader = DataLoader::new(collection.clone(), config.clone());
            entries.insert(tag.clone(), CollectionEntry { collection, loader });
            order.push(tag);
        }

        Ok(Self {
            entries,
            order,
            config: config.clone(),
        })
    }

    /// Same collections with new, empty loaders
    pub fn fresh(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(tag, entry)| {
                let loader = DataLoader::new(entry.collection.clone(), self.config.clone());
                let entry = CollectionEntry {
                    collection: entry.collection.clone(),
                    loader,
                };
                (tag.clone(), entry)
            })
            .collect();

        Self {
            entries,
            order: self.order.clone(),
            config: self.config.clone(),
        }
    }

    /// Look up a collection by tag
    pub fn lookup(&self, tag: &str) -> Option<&CollectionEntry<K, R>> {
        self.entries.get(tag)
    }

    /// Registered tags, in registration order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, R> fmt::Debug for CollectionRegistry<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionRegistry")
            .field("tags", &self.order)
            .finish()
    }
}
