//! GraphQL handler with per-request global ID context
//!
//! Every request gets a fresh [`GlobalIdContext`], so loader caches never
//! outlive the request that filled them.

use async_graphql::{Request, Response, Schema};
use axum::{extract::Extension, Json};
use std::sync::Arc;

use crate::context::GlobalIdContext;
use crate::dataloaders::NodeRecord;
use crate::key::NodeKey;

/// Builds a [`GlobalIdContext`] for each request
///
/// Wraps an already-built context whose collections and hydrator are shared
/// by all requests. Tags were checked when that context was built, so
/// creating a request context cannot fail.
pub struct ContextFactory<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    template: GlobalIdContext<K, R>,
}

impl<K, R> ContextFactory<K, R>
where
    K: NodeKey,
    R: NodeRecord,
{
    pub fn new(template: GlobalIdContext<K, R>) -> Self {
        Self { template }
    }

    /// Build a fresh context with empty caches
    pub fn create(&self) -> GlobalIdContext<K, R> {
        self.template.fresh()
    }
}

/// Standard GraphQL handler with global ID context injection
///
/// Builds a context from the [`ContextFactory`] extension and injects it into
/// the request, where [`resolve_node`](crate::graphql::resolve_node) finds it.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{routing::post, Extension, Router};
/// use async_graphql::{EmptyMutation, EmptySubscription, Schema};
/// use pleme_global_id::{graphql_handler, ContextFactory};
/// use std::sync::Arc;
///
/// # struct Query;
/// # #[async_graphql::Object]
/// # impl Query { async fn ok(&self) -> bool { true } }
/// # fn example(globals: pleme_global_id::GlobalIdContext<uuid::Uuid, String>) {
/// let schema = Schema::new(Query, EmptyMutation, EmptySubscription);
/// let app: Router = Router::new()
///     .route(
///         "/graphql",
///         post(graphql_handler::<Query, EmptyMutation, EmptySubscription, uuid::Uuid, String>),
///     )
///     .layer(Extension(schema))
///     .layer(Extension(Arc::new(ContextFactory::new(globals))));
/// # }
/// ```
pub async fn graphql_handler<Query, Mutation, Subscription, K, R>(
    Extension(schema): Extension<Schema<Query, Mutation, Subscription>>,
    Extension(factory): Extension<Arc<ContextFactory<K, R>>>,
    req: Json<Request>,
) -> Json<Response>
where
    Query: async_graphql::ObjectType + 'static,
    Mutation: async_graphql::ObjectType + 'static,
    Subscription: async_graphql::SubscriptionType + 'static,
    K: NodeKey,
    R: NodeRecord,
{
    let request = req.0.data(factory.create());

    // Execute query
    let response = schema.execute(request).await;

    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::to_graphql_id;
    use crate::testing::{user_schema, MemoryCollection, User};
    use crate::dataloaders::Collection;
    use async_graphql::value;
    use uuid::Uuid;

    fn factory(users: &Arc<MemoryCollection>) -> Arc<ContextFactory<Uuid, User>> {
        let collection: Arc<dyn Collection<Uuid, User>> = users.clone();
        let globals = GlobalIdContext::new([collection]).unwrap();
        Arc::new(ContextFactory::new(globals))
    }

    #[tokio::test]
    async fn test_factory_contexts_share_collections_not_caches() {
        let bill = User::new("Bill");
        let users = MemoryCollection::new("User", [bill.clone()]);
        let factory = factory(&users);
        let id = to_graphql_id("User", &bill.id);

        let first = factory.create();
        let second = factory.create();
        assert_eq!(second.registry().tags().collect::<Vec<_>>(), vec!["User"]);

        assert_eq!(first.resolve(&id).await.unwrap(), Some(bill.clone()));
        assert_eq!(first.resolve(&id).await.unwrap(), Some(bill.clone()));
        assert_eq!(users.fetch_count(), 1);

        assert_eq!(second.resolve(&id).await.unwrap(), Some(bill));
        assert_eq!(users.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_handler_injects_context() {
        let bill = User::new("Bill");
        let users = MemoryCollection::new("User", [bill.clone()]);
        let id = to_graphql_id("User", &bill.id);
        let query = format!(
            r#"{{ a: userName(id: "{id}") b: userName(id: "{id}") }}"#,
            id = id.as_str()
        );

        let Json(response) = graphql_handler(
            Extension(user_schema()),
            Extension(factory(&users)),
            Json(Request::new(query)),
        )
        .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.data, value!({ "a": "Bill", "b": "Bill" }));
        assert_eq!(users.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_handler_caches_do_not_outlive_request() {
        let bill = User::new("Bill");
        let users = MemoryCollection::new("User", [bill.clone()]);
        let factory = factory(&users);
        let schema = user_schema();
        let query = format!(
            r#"{{ userName(id: "{}") }}"#,
            to_graphql_id("User", &bill.id).as_str()
        );

        for _ in 0..2 {
            let Json(response) = graphql_handler(
                Extension(schema.clone()),
                Extension(factory.clone()),
                Json(Request::new(query.clone())),
            )
            .await;
            assert_eq!(response.data, value!({ "userName": "Bill" }));
        }

        assert_eq!(users.fetch_count(), 2);
    }
}
