//! In-memory collection and schema used by the unit tests

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema, ID};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{resolve_node, BoxError, Collection};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct User {
    pub id: Uuid,
    pub name: String,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }
}

/// Collection backed by a map that records every bulk fetch it receives.
///
/// Results come back in reverse key order so callers can't rely on position.
pub(crate) struct MemoryCollection {
    tag: String,
    records: Mutex<HashMap<Uuid, User>>,
    calls: Mutex<Vec<Vec<Uuid>>>,
    failing: AtomicBool,
}

impl MemoryCollection {
    pub fn new(tag: &str, users: impl IntoIterator<Item = User>) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            records: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn remove(&self, id: &Uuid) {
        self.records.lock().unwrap().remove(id);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<Uuid>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Collection<Uuid, User> for MemoryCollection {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn find_by_keys(&self, keys: &[Uuid]) -> Result<Vec<User>, BoxError> {
        self.calls.lock().unwrap().push(keys.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err("storage unavailable".into());
        }
        let records = self.records.lock().unwrap();
        Ok(keys
            .iter()
            .rev()
            .filter_map(|k| records.get(k).cloned())
            .collect())
    }

    fn key_of(&self, record: &User) -> Uuid {
        record.id
    }
}

/// Schema root exposing one collection through global IDs
pub(crate) struct UserQuery;

#[Object]
impl UserQuery {
    async fn user_name(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<String>> {
        let user = resolve_node::<Uuid, User>(ctx, &id).await?;
        Ok(user.map(|u| u.name))
    }
}

pub(crate) type UserSchema = Schema<UserQuery, EmptyMutation, EmptySubscription>;

pub(crate) fn user_schema() -> UserSchema {
    Schema::new(UserQuery, EmptyMutation, EmptySubscription)
}
