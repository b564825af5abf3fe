//! async-graphql integration
//!
//! The request's [`GlobalIdContext`] travels in async-graphql request data.
//! [`graphql_handler`](crate::handler::graphql_handler) puts it there, or add
//! it yourself with `Request::data`.

use async_graphql::{Context, ID};

use crate::codec::GlobalIdCodec;
use crate::context::GlobalIdContext;
use crate::dataloaders::NodeRecord;
use crate::key::NodeKey;

/// Encode a global ID as a GraphQL `ID`
pub fn to_graphql_id<K: NodeKey>(tag: &str, key: &K) -> ID {
    ID(GlobalIdCodec::encode(tag, key))
}

/// Key of a GraphQL `ID`, or `None` if it is not a well-formed global ID
pub fn key_from_graphql_id<K: NodeKey>(id: &ID) -> Option<K> {
    GlobalIdCodec::decode_key(id.as_str())
}

/// Get the GlobalIdContext from GraphQL context
///
/// # Example
///
/// ```rust,no_run
/// use async_graphql::Context;
/// use pleme_global_id::graphql::global_id_context;
///
/// fn resolver(ctx: &Context<'_>) -> bool {
///     global_id_context::<uuid::Uuid, String>(ctx).is_some()
/// }
/// ```
pub fn global_id_context<'a, K, R>(ctx: &Context<'a>) -> Option<&'a GlobalIdContext<K, R>>
where
    K: NodeKey,
    R: NodeRecord,
{
    ctx.data_opt::<GlobalIdContext<K, R>>()
}

/// Resolve a node by its GraphQL `ID`
///
/// Fails only if the request carries no GlobalIdContext or the lookup itself
/// fails; unknown or malformed IDs give `Ok(None)`.
pub async fn resolve_node<K, R>(ctx: &Context<'_>, id: &ID) -> async_graphql::Result<Option<R>>
where
    K: NodeKey,
    R: NodeRecord,
{
    let globals = global_id_context::<K, R>(ctx)
        .ok_or_else(|| async_graphql::Error::new("Global ID context missing from request"))?;
    Ok(globals.resolve(id.as_str()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{user_schema, MemoryCollection, User};
    use crate::Collection;
    use async_graphql::{value, Request};
    use std::sync::Arc;
    use uuid::Uuid;

    fn user_name_query(id: &ID) -> String {
        format!(r#"{{ userName(id: "{}") }}"#, id.as_str())
    }

    #[test]
    fn test_graphql_id_round_trip() {
        let key = Uuid::new_v4();
        let id = to_graphql_id("User", &key);
        assert_eq!(key_from_graphql_id::<Uuid>(&id), Some(key));
        assert_eq!(key_from_graphql_id::<Uuid>(&ID::from("")), None);
    }

    #[tokio::test]
    async fn test_resolve_node_from_request_data() {
        let bill = User::new("Bill");
        let users = MemoryCollection::new("User", [bill.clone()]);
        let globals =
            GlobalIdContext::new([users.clone() as Arc<dyn Collection<Uuid, User>>]).unwrap();

        let request = Request::new(user_name_query(&to_graphql_id("User", &bill.id))).data(globals);
        let response = user_schema().execute(request).await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.data, value!({ "userName": "Bill" }));
    }

    #[tokio::test]
    async fn test_resolve_node_bad_id_is_null() {
        let users = MemoryCollection::new("User", []);
        let globals =
            GlobalIdContext::new([users.clone() as Arc<dyn Collection<Uuid, User>>]).unwrap();

        let request = Request::new(user_name_query(&ID::from("nope"))).data(globals);
        let response = user_schema().execute(request).await;

        assert!(response.errors.is_empty());
        assert_eq!(response.data, value!({ "userName": null }));
        assert_eq!(users.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_node_without_context_errors() {
        let id = to_graphql_id("User", &Uuid::new_v4());
        let response = user_schema().execute(user_name_query(&id)).await;

        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.contains("Global ID context missing"));
    }
}
