//! HTTP Routes
//!
//! # Endpoints
//! - `GET /` - バナー
//! - `POST /login` - 管理者ログイン（JWT を返す）
//! - `/api/*` - Bearer トークン必須。people / question / shop の CRUD
//! - `PUT /uploads/*key` - 署名付き URL による画像アップロード（LocalBlobStore 使用時）

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use log::{info, warn};
use rtmcs_core::app::{App, Collection};
use rtmcs_core::domain::{CollectionKind, Item, Person, Question, Record};
use rtmcs_core::impls::LocalBlobStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{AuthError, AuthState, require_bearer};
use crate::error::ApiError;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub app: App,
    pub auth: Arc<AuthState>,
}

/// URL のコレクション名と `App` のフィールドを結びつける
pub trait Routed: CollectionKind + Sized {
    fn collection(app: &App) -> &Collection<Self>;
}

impl Routed for Person {
    fn collection(app: &App) -> &Collection<Self> {
        &app.people
    }
}

impl Routed for Question {
    fn collection(app: &App) -> &Collection<Self> {
        &app.questions
    }
}

impl Routed for Item {
    fn collection(app: &App) -> &Collection<Self> {
        &app.items
    }
}

pub fn router(app: App, auth: AuthState, uploads: Option<Arc<LocalBlobStore>>) -> Router {
    let auth = Arc::new(auth);
    let state = AppState {
        app,
        auth: auth.clone(),
    };

    let api = Router::new()
        .route("/checkToken", get(check_token))
        .route("/refreshToken", get(refresh_token))
        .nest("/people", collection_routes::<Person>())
        .nest("/question", collection_routes::<Question>())
        .nest("/shop", collection_routes::<Item>())
        .layer(middleware::from_fn_with_state(auth, require_bearer));

    let mut router = Router::new()
        .route("/", get(banner))
        .route("/login", post(login))
        .nest("/api", api)
        .with_state(state);

    if let Some(store) = uploads {
        router = router.merge(upload_routes(store));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    router.layer(cors)
}

fn collection_routes<K: Routed>() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records::<K>).post(create_record::<K>))
        .route(
            "/:id",
            get(get_record::<K>)
                .post(replace_record::<K>)
                .delete(delete_record::<K>),
        )
        .route("/:id/imageUploadURL/:variant", get(image_upload_url::<K>))
}

fn upload_routes(store: Arc<LocalBlobStore>) -> Router {
    Router::new()
        .route("/uploads/*key", put(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(store)
}

// ==================
// Auth
// ==================

async fn banner() -> &'static str {
    "RTMCS Server"
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if !state.auth.admin.matches(&body.username, &body.password) {
        warn!("rejected login for {:?}", body.username);
        return Ok((StatusCode::UNAUTHORIZED, Json(json!({ "msg": "Unauthorized" }))));
    }
    let token = state.auth.jwt.issue()?;
    info!("admin logged in");
    Ok((StatusCode::OK, Json(json!({ "token": token }))))
}

async fn check_token() -> Json<Value> {
    Json(json!({ "msg": "success" }))
}

async fn refresh_token(State(state): State<AppState>) -> Result<Json<Value>, AuthError> {
    let token = state.auth.jwt.issue()?;
    Ok(Json(json!({ "token": token })))
}

// ==================
// Collections
// ==================

async fn list_records<K: Routed>(
    State(state): State<AppState>,
) -> Result<Json<Vec<Record>>, ApiError> {
    Ok(Json(K::collection(&state.app).list().await?))
}

async fn get_record<K: Routed>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(K::collection(&state.app).get(&id).await?))
}

async fn create_record<K: Routed>(
    State(state): State<AppState>,
    Json(payload): Json<Record>,
) -> Result<Json<Value>, ApiError> {
    let id = K::collection(&state.app).create(payload).await?;
    Ok(Json(json!({ "id": id.to_string() })))
}

async fn replace_record<K: Routed>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Record>,
) -> Result<Json<Value>, ApiError> {
    K::collection(&state.app).replace(&id, payload).await?;
    Ok(Json(json!({ "msg": "success" })))
}

async fn delete_record<K: Routed>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    K::collection(&state.app).delete(&id).await?;
    Ok(Json(json!({ "msg": "success" })))
}

async fn image_upload_url<K: Routed>(
    State(state): State<AppState>,
    Path((id, variant)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let url = K::collection(&state.app)
        .image_upload_url(&id, &variant)
        .await?;
    Ok(Json(json!({ "url": url })))
}

// ==================
// Uploads
// ==================

#[derive(Debug, Deserialize)]
struct UploadQuery {
    expires: i64,
    content_type: String,
    signature: String,
}

async fn upload(
    State(store): State<Arc<LocalBlobStore>>,
    Path(key): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let sent_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if sent_type.is_some_and(|sent| sent != query.content_type) {
        return Ok(StatusCode::FORBIDDEN);
    }
    if !store.verify_upload(&key, query.expires, &query.content_type, &query.signature) {
        warn!("rejected upload for {key}: bad or expired signature");
        return Ok(StatusCode::FORBIDDEN);
    }
    store
        .put_bytes(&key, &body)
        .await
        .map_err(|e| ApiError(e.into()))?;
    info!("stored upload {key} ({} bytes)", body.len());
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AdminCredentials, JwtManager};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use rtmcs_core::app::AppBuilder;
    use rtmcs_core::domain::Document;
    use rtmcs_core::impls::InMemoryBlobStore;
    use rtmcs_core::ports::{BlobStore, Clock, SystemClock};
    use rtmcs_core::store::keys::{IMAGE_CONTENT_TYPE, IMAGE_UPLOAD_TTL};
    use tower::ServiceExt;

    const SECRET: &str = "route_test_secret";

    fn auth_state() -> AuthState {
        AuthState {
            jwt: JwtManager::new(SECRET),
            admin: AdminCredentials {
                username: "admin".to_string(),
                password: "pw".to_string(),
            },
        }
    }

    fn test_app(blob: Arc<InMemoryBlobStore>) -> App {
        AppBuilder::new(blob)
            .baseline(Document::default())
            .build()
            .unwrap()
    }

    fn token() -> String {
        JwtManager::new(SECRET).issue().unwrap()
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token()));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_banner_is_public() {
        let router = router(test_app(Arc::new(InMemoryBlobStore::new())), auth_state(), None);
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"RTMCS Server");
    }

    #[tokio::test]
    async fn test_login() {
        let router = router(test_app(Arc::new(InMemoryBlobStore::new())), auth_state(), None);
        let login = |user: &str, pass: &str| {
            Request::builder()
                .method(Method::POST)
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": user, "password": pass }).to_string(),
                ))
                .unwrap()
        };

        let (status, body) = send(&router, login("admin", "pw")).await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap();
        assert!(JwtManager::new(SECRET).validate(token).is_ok());

        let (status, body) = send(&router, login("admin", "nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "msg": "Unauthorized" }));
    }

    #[tokio::test]
    async fn test_api_requires_bearer_token() {
        let router = router(test_app(Arc::new(InMemoryBlobStore::new())), auth_state(), None);

        let (status, body) = send(
            &router,
            Request::builder().uri("/api/people").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let foreign = JwtManager::new("someone_else").issue().unwrap();
        let (status, _) = send(
            &router,
            Request::builder()
                .uri("/api/checkToken")
                .header(header::AUTHORIZATION, format!("Bearer {foreign}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&router, request(Method::GET, "/api/checkToken", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "msg": "success" }));
    }

    #[tokio::test]
    async fn test_refresh_token_issues_valid_token() {
        let router = router(test_app(Arc::new(InMemoryBlobStore::new())), auth_state(), None);
        let (status, body) = send(&router, request(Method::GET, "/api/refreshToken", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(JwtManager::new(SECRET).validate(body["token"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_crud_round() {
        let router = router(test_app(Arc::new(InMemoryBlobStore::new())), auth_state(), None);

        let (status, body) = send(
            &router,
            request(Method::POST, "/api/shop", Some(json!({ "name": "badge", "price": 3 }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("item-"));

        let (_, listed) = send(&router, request(Method::GET, "/api/shop", None)).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        // 質問リストには入らない
        let (_, questions) = send(&router, request(Method::GET, "/api/question", None)).await;
        assert_eq!(questions, json!([]));

        let uri = format!("/api/shop/{id}");
        let (status, body) = send(
            &router,
            request(Method::POST, &uri, Some(json!({ "id": id, "name": "pin" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "msg": "success" }));
        let (_, item) = send(&router, request(Method::GET, &uri, None)).await;
        assert_eq!(item["name"], json!("pin"));

        let (status, _) = send(&router, request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&router, request(Method::GET, &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "msg": "Not found" }));
    }

    #[tokio::test]
    async fn test_image_upload_url_routes() {
        let router = router(test_app(Arc::new(InMemoryBlobStore::new())), auth_state(), None);

        let (status, body) = send(
            &router,
            request(Method::GET, "/api/question/q1/imageUploadURL/default", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].as_str().unwrap().contains("images/questions/q1_default.png"));

        let (status, _) = send(
            &router,
            request(Method::GET, "/api/question/q1/imageUploadURL/sideways", None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &router,
            request(Method::GET, "/api/shop/i1/imageUploadURL/anything", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].as_str().unwrap().contains("images/shop/i1.png"));
    }

    #[tokio::test]
    async fn test_storage_outage_is_bad_gateway() {
        let blob = Arc::new(InMemoryBlobStore::new());
        blob.fail_gets(true);
        let router = router(test_app(blob), auth_state(), None);

        let (status, _) = send(&router, request(Method::GET, "/api/people", None)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_signed_upload_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(
            dir.path(),
            "http://localhost:3004/uploads",
            b"upload_secret",
            Arc::new(SystemClock) as Arc<dyn Clock>,
        ));
        let router = router(
            test_app(Arc::new(InMemoryBlobStore::new())),
            auth_state(),
            Some(store.clone()),
        );

        let url = store
            .signed_upload_url("images/shop/i1.png", IMAGE_UPLOAD_TTL, IMAGE_CONTENT_TYPE)
            .await
            .unwrap();
        let path_and_query = url.trim_start_matches("http://localhost:3004");

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri(path_and_query)
                    .header(header::CONTENT_TYPE, IMAGE_CONTENT_TYPE)
                    .body(Body::from("png-bytes"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.get("images/shop/i1.png").await.unwrap(), "png-bytes");

        let tampered = path_and_query.replace("i1.png", "i2.png");
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri(tampered)
                    .body(Body::from("evil"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
