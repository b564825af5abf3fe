//! # pleme-global-id
//!
//! Global object identifiers for Pleme GraphQL services.
//!
//! ## Features
//!
//! - **Opaque IDs** - `base64(tag:key)` global IDs that round-trip to a collection tag and key
//! - **Collection Registry** - one batching cache per registered collection, per request
//! - **DataLoader** - coalesces node lookups into one bulk fetch and memoizes them
//! - **Hydration Override** - plug in custom node loading, falling back to the loader
//! - **GraphQL Integration** - `ID` helpers and an Axum handler that builds a context per request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pleme_global_id::GlobalIdContext;
//!
//! // Once per request
//! let globals = GlobalIdContext::new(vec![users.clone(), posts.clone()])?;
//!
//! let id = globals.to_id("User", &user.id);
//! let node = globals.resolve(&id).await?;
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod dataloaders;
pub mod graphql;
pub mod handler;
pub mod key;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{DecodedId, GlobalIdCodec};
pub use config::LoaderConfig;
pub use context::{GlobalIdContext, GlobalIdContextBuilder, Hydrator};
pub use dataloaders::{Collection, DataLoader, NodeRecord};
pub use graphql::{global_id_context, key_from_graphql_id, resolve_node, to_graphql_id};
pub use handler::{graphql_handler, ContextFactory};
pub use key::NodeKey;
pub use registry::{CollectionEntry, CollectionRegistry};

use std::sync::Arc;
use thiserror::Error;

/// Error type returned by collection fetches and hydrators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared form of [`BoxError`], so one failure can reach every waiter of a batch
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Global ID errors
///
/// Malformed IDs and unknown collections are not errors; they resolve to `None`.
#[derive(Error, Debug, Clone)]
pub enum GlobalIdError {
    #[error("Duplicate collection tag: {0}")]
    DuplicateCollection(String),

    #[error("Fetch from collection '{collection}' failed: {source}")]
    Fetch {
        collection: String,
        source: SharedError,
    },

    #[error("Hydration for collection '{collection}' failed: {source}")]
    Hydrate {
        collection: String,
        source: SharedError,
    },

    #[error("Batch for collection '{collection}' was abandoned before completing")]
    BatchAbandoned { collection: String },
}

/// Result type for global ID operations
pub type Result<T> = std::result::Result<T, GlobalIdError>;
