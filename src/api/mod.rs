//! HTTP surface: health check, the caller's own profile, and by-id access
//! to licenses, compliance checks, notifications and jurisdictions.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::{AuthGate, Authenticated, IdentityVerifier, authenticate};
use crate::db::{Entity, Store, StoreError, UpdateOutcome};
use crate::model::{
    ComplianceCheck, ComplianceCheckUpdate, EntityPatch, Jurisdiction, License, LicenseUpdate,
    Notification, NotificationUpdate, User, UserUpdate,
};
use crate::types::EntityId;

/// Build the application router.
///
/// Every route sits behind the authentication gate; routes that need a
/// caller take [`Authenticated`] and answer 401 for anonymous requests.
/// Jurisdictions are reference data and readable anonymously.
pub fn create_router<V: IdentityVerifier>(store: Store, gate: Arc<AuthGate<V>>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/me", get(get_me).patch(update_me))
        .route(
            "/licenses/{id}",
            get(get_entity::<License>).patch(patch_entity::<LicenseUpdate>),
        )
        .route(
            "/compliance-checks/{id}",
            get(get_entity::<ComplianceCheck>).patch(patch_entity::<ComplianceCheckUpdate>),
        )
        .route(
            "/notifications/{id}",
            get(get_entity::<Notification>).patch(patch_entity::<NotificationUpdate>),
        )
        .route("/jurisdictions/{id}", get(get_jurisdiction))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(gate, authenticate::<V>)),
        )
        .with_state(store)
}

/// Handler errors.
#[derive(Debug)]
pub enum ApiError {
    /// The caller has no user row.
    UserNotFound,
    /// No row with the requested id.
    NotFound,
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            Self::NotFound | Self::Store(StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "Not found")
            }
            Self::Store(StoreError::Pool(e)) => {
                error!("Store unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
            Self::Store(e) => {
                error!("Store request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn health_check(State(store): State<Store>) -> (StatusCode, Json<Value>) {
    let timestamp = chrono::Utc::now().to_rfc3339();
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "timestamp": timestamp })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "timestamp": timestamp })),
            )
        }
    }
}

async fn current_user(store: &Store, caller: &Authenticated) -> Result<User, ApiError> {
    store
        .find_user_by_subject(caller.0.subject_id())
        .await?
        .ok_or(ApiError::UserNotFound)
}

async fn get_me(
    State(store): State<Store>,
    caller: Authenticated,
) -> Result<Json<User>, ApiError> {
    Ok(Json(current_user(&store, &caller).await?))
}

async fn update_me(
    State(store): State<Store>,
    caller: Authenticated,
    Json(patch): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = current_user(&store, &caller).await?;
    let id = EntityId::new(user.id.as_str());

    match store.apply_update::<User>(&id, patch.to_update()).await? {
        UpdateOutcome::Updated(updated) => Ok(Json(updated)),
        UpdateOutcome::NoOp => Ok(Json(user)),
    }
}

async fn load<E: Entity>(store: &Store, id: &EntityId) -> Result<E, ApiError> {
    store.find_by_id::<E>(id).await?.ok_or(ApiError::NotFound)
}

async fn get_entity<E>(
    State(store): State<Store>,
    _caller: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<E>, ApiError>
where
    E: Entity + Serialize + Send + 'static,
{
    Ok(Json(load(&store, &EntityId::new(id)).await?))
}

async fn get_jurisdiction(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> Result<Json<Jurisdiction>, ApiError> {
    Ok(Json(load(&store, &EntityId::new(id)).await?))
}

/// Apply a partial update; an empty patch returns the row unchanged.
async fn patch_entity<P: EntityPatch>(
    State(store): State<Store>,
    _caller: Authenticated,
    Path(id): Path<String>,
    Json(patch): Json<P>,
) -> Result<Json<P::Entity>, ApiError> {
    let id = EntityId::new(id);
    match store.apply_update::<P::Entity>(&id, patch.to_update()).await? {
        UpdateOutcome::Updated(entity) => Ok(Json(entity)),
        UpdateOutcome::NoOp => Ok(Json(load(&store, &id).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Principal, VerificationError};
    use crate::db::{DatabaseConfig, create_pool};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use std::future::Future;
    use tower::ServiceExt;

    struct StaticVerifier;

    impl IdentityVerifier for StaticVerifier {
        fn verify(
            &self,
            token: &str,
        ) -> impl Future<Output = Result<Principal, VerificationError>> + Send {
            let result = match token {
                "good-token" => Principal::new("uid-1", None).ok_or(VerificationError::Rejected(
                    "empty subject".to_string(),
                )),
                _ => Err(VerificationError::Rejected("unknown token".to_string())),
            };
            async move { result }
        }
    }

    fn app() -> Router {
        // Closed port: every store call fails fast with a pool error.
        let config = DatabaseConfig {
            url: "postgres://tester@127.0.0.1:1/none".to_string(),
            max_connections: 1,
        };
        let store = Store::new(create_pool(&config).unwrap());
        create_router(store, Arc::new(AuthGate::new(StaticVerifier)))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_me_requires_principal() {
        let response = app()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["error"],
            "Authentication required"
        );
    }

    #[tokio::test]
    async fn test_bad_token_rejected_before_handler() {
        let response = app()
            .oneshot(
                Request::patch("/me")
                    .header(header::AUTHORIZATION, "Bearer forged")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"firstName":"Jane"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["error"],
            "Invalid authentication token"
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_503() {
        let response = app()
            .oneshot(
                Request::get("/me")
                    .header(header::AUTHORIZATION, "Bearer good-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "unavailable");
    }

    async fn send(request: Request<Body>) -> Response {
        app().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_entity_routes_require_principal() {
        let response = send(Request::get("/licenses/l-1").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            Request::patch("/notifications/n-1")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"isRead":true}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_jurisdiction_readable_anonymously() {
        // Reaches the store (and its outage) instead of being rejected.
        let response =
            send(Request::get("/jurisdictions/j-co").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_patch_reloads_row() {
        // A NoOp patch still has to load the current row, which hits the store.
        let response = send(
            Request::patch("/compliance-checks/c-1")
                .header(header::AUTHORIZATION, "Bearer good-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_invalid_status_label_is_client_error() {
        let response = send(
            Request::patch("/licenses/l-1")
                .header(header::AUTHORIZATION, "Bearer good-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"LAPSED"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::UserNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::Store(StoreError::NotFound {
            table: "users",
            id: EntityId::new("u-1"),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
