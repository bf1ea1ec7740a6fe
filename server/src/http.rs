use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        FromRef, FromRequestParts, Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{self, HeaderName, HeaderValue, Method, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use platform_api::{ApiError, ApiResult};
use platform_authn::{Claims, JwtConfig, bearer_token};
use products_profiles::{NewProfile, ProfilePatch, ProfileResponse, ProfileService, ProfileStore};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};
use uuid::Uuid;

pub type DynProfileService = ProfileService<Arc<dyn ProfileStore>>;

#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<DynProfileService>,
    pub jwt: Arc<JwtConfig>,
    pub cors_allowed_origins: Arc<Vec<String>>,
}

impl FromRef<AppState> for Arc<JwtConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "profile server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    let cors = cors_layer(&state.cors_allowed_origins);
    Router::new()
        .route("/health", get(health_handler))
        .route("/me", get(me_handler))
        .route("/profiles", post(create_handler))
        .route(
            "/profiles/{profile_id}",
            get(get_handler).patch(update_handler).delete(delete_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Claims of a request carrying a valid bearer token. Anything else is
/// rejected with 401 before the handler runs.
#[derive(Clone, Debug)]
pub struct Authenticated(pub Claims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    Arc<JwtConfig>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let token = bearer_token(header).ok_or(ApiError::Unauthorized)?;
        let jwt = Arc::<JwtConfig>::from_ref(state);
        let claims = jwt.decode_token(token).map_err(|err| {
            debug!(%err, "rejected bearer token");
            ApiError::Unauthorized
        })?;
        Ok(Self(claims))
    }
}

fn profile_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
}

async fn me_handler(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
) -> ApiResult<ProfileResponse> {
    state.profiles.get_by_user_id(&claims, claims.sub).await
}

async fn get_handler(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ProfileResponse> {
    let id = profile_id(path)?;
    state.profiles.get(&claims, id).await
}

async fn create_handler(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    body: Result<Json<NewProfile>, JsonRejection>,
) -> ApiResult<ProfileResponse> {
    let input = json_body(body)?;
    state.profiles.create(&claims, input).await
}

async fn update_handler(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ProfilePatch>, JsonRejection>,
) -> ApiResult<ProfileResponse> {
    let id = profile_id(path)?;
    let patch = json_body(body)?;
    state.profiles.update(&claims, id, patch).await
}

async fn delete_handler(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ProfileResponse> {
    let id = profile_id(path)?;
    state.profiles.delete(&claims, id).await
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use products_profiles::{DeleteMode, MemoryProfileStore, Profile, ProfileName};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct Harness {
        router: Router,
        jwt: JwtConfig,
        store: MemoryProfileStore,
    }

    fn profile(user_id: Uuid, username: &str) -> Profile {
        let now = Utc::now().into();
        Profile {
            id: Uuid::new_v4(),
            user_id,
            username: username.to_string(),
            name: ProfileName {
                first: username.to_string(),
                last: "User".into(),
                preferred: None,
            },
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn harness(delete_mode: DeleteMode) -> Harness {
        let store = MemoryProfileStore::new();
        let jwt = JwtConfig::new(SECRET).unwrap();
        let service: DynProfileService =
            ProfileService::new(Arc::new(store.clone()) as Arc<dyn ProfileStore>)
                .with_delete_mode(delete_mode);
        let state = AppState {
            profiles: Arc::new(service),
            jwt: Arc::new(jwt.clone()),
            cors_allowed_origins: Arc::new(vec![]),
        };
        Harness {
            router: build_router(state),
            jwt,
            store,
        }
    }

    impl Harness {
        fn token(&self, sub: Uuid, role: &str) -> String {
            self.jwt.issue_token(sub, role).unwrap()
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => request
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let h = harness(DeleteMode::Disabled).await;
        let (status, body) = h.send(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn missing_or_bad_tokens_are_unauthorized() {
        let h = harness(DeleteMode::Disabled).await;
        let (status, body) = h.send(Method::GET, "/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
        assert_eq!(body["message"], "User is unauthorized.");

        let (status, _) = h.send(Method::GET, "/me", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let other = JwtConfig::new("fedcba9876543210fedcba9876543210").unwrap();
        let forged = other.issue_token(Uuid::new_v4(), "admin").unwrap();
        let (status, _) = h.send(Method::GET, "/me", Some(&forged), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_returns_the_callers_profile() {
        let h = harness(DeleteMode::Disabled).await;
        let user = Uuid::new_v4();
        h.store.insert(profile(user, "Researcher")).await.unwrap();
        let token = h.token(user, "researcher");

        let (status, body) = h.send(Method::GET, "/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "OK");
        assert_eq!(body["details"]["profile"]["username"], "Researcher");
        assert_eq!(body["details"]["profile"]["userId"], user.to_string());
    }

    #[tokio::test]
    async fn create_is_limited_to_admins() {
        let h = harness(DeleteMode::Disabled).await;
        let body = json!({
            "userId": Uuid::new_v4(),
            "username": "Created",
            "name": { "first": "New", "last": "User" }
        });

        let annotator = h.token(Uuid::new_v4(), "annotator");
        let (status, resp) = h
            .send(Method::POST, "/profiles", Some(&annotator), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(resp["message"], "User is forbidden from creating profiles.");

        let admin = h.token(Uuid::new_v4(), "admin");
        let (status, resp) = h.send(Method::POST, "/profiles", Some(&admin), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["details"]["profile"]["username"], "Created");
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn malformed_requests_are_bad_requests() {
        let h = harness(DeleteMode::Disabled).await;
        let admin = h.token(Uuid::new_v4(), "admin");

        let (status, resp) = h
            .send(Method::GET, "/profiles/not-a-uuid", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["status"], 400);

        let (status, _) = h
            .send(Method::POST, "/profiles", Some(&admin), Some(json!({ "username": 7 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_with_null_clears_the_avatar() {
        let h = harness(DeleteMode::Disabled).await;
        let owner = Uuid::new_v4();
        let mut row = profile(owner, "Researcher");
        row.avatar_url = Some("https://x/a.png".into());
        let row = h.store.insert(row).await.unwrap();
        let token = h.token(owner, "researcher");

        let (status, resp) = h
            .send(
                Method::PATCH,
                &format!("/profiles/{}", row.id),
                Some(&token),
                Some(json!({ "avatarUrl": null })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(resp["details"]["profile"].get("avatarUrl").is_none());
        assert_eq!(resp["details"]["profile"]["username"], "Researcher");
    }

    #[tokio::test]
    async fn patch_follows_the_ownership_rule() {
        let h = harness(DeleteMode::Disabled).await;
        let owner = Uuid::new_v4();
        let own = h.store.insert(profile(owner, "Researcher")).await.unwrap();
        let other = h.store.insert(profile(Uuid::new_v4(), "Other")).await.unwrap();
        let token = h.token(owner, "researcher");

        let (status, resp) = h
            .send(
                Method::PATCH,
                &format!("/profiles/{}", own.id),
                Some(&token),
                Some(json!({ "username": "NewName", "userId": Uuid::new_v4() })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["details"]["profile"]["username"], "NewName");
        assert_eq!(resp["details"]["profile"]["userId"], owner.to_string());

        let (status, resp) = h
            .send(
                Method::PATCH,
                &format!("/profiles/{}", other.id),
                Some(&token),
                Some(json!({ "username": "Stolen" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(resp["message"], "User is forbidden from updating this profile.");
    }

    #[tokio::test]
    async fn missing_profiles_are_internal_errors() {
        let h = harness(DeleteMode::Disabled).await;
        let token = h.token(Uuid::new_v4(), "annotator");
        let missing = Uuid::new_v4();
        let (status, resp) = h
            .send(Method::GET, &format!("/profiles/{missing}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp["message"], "Something went wrong when fetching profile");
        assert_eq!(resp["details"]["profileId"], missing.to_string());
    }

    #[tokio::test]
    async fn delete_depends_on_the_configured_mode() {
        let disabled = harness(DeleteMode::Disabled).await;
        let row = disabled.store.insert(profile(Uuid::new_v4(), "Target")).await.unwrap();
        let admin = disabled.token(Uuid::new_v4(), "admin");
        let (status, resp) = disabled
            .send(Method::DELETE, &format!("/profiles/{}", row.id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp["message"], "Method not implemented.");

        let soft = harness(DeleteMode::Soft).await;
        let row = soft.store.insert(profile(Uuid::new_v4(), "Target")).await.unwrap();
        let admin = soft.token(Uuid::new_v4(), "admin");
        let uri = format!("/profiles/{}", row.id);
        let (status, _) = soft.send(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = soft.send(Method::GET, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let h = harness(DeleteMode::Disabled).await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
