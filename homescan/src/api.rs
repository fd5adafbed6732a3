//! HTTP surface of the dashboard backend, mounted under `/api`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use homescan_core::{
    AppSettings, ManualService, NewProfile, Profile, ProfileId, ProfilePatch, Service, ServiceId, ServicePatch,
    SettingsPatch,
};
use scan_engine::{ScanEngine, ScanReport, ScanStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::Auth;
use crate::errors::{ApiJson, ApiQuery, AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScanEngine>,
    pub auth: Arc<Auth>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/{id}", put(update_profile).delete(delete_profile))
        .route("/profiles/{id}/set-guest-default", post(set_guest_default))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/services", get(list_services))
        .route("/services/manual", post(create_manual_service))
        .route("/services/{id}", post(update_service).delete(delete_service))
        .route("/reorder-services", post(reorder_services))
        .route("/scan", post(trigger_scan))
        .route("/scan/status", get(scan_status))
        .with_state(state);
    Router::new().nest("/api", api)
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Rejects the request unless it carries a live admin token.
pub struct Admin;

impl FromRequestParts<AppState> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer(parts) {
            Some(token) if state.auth.validate(token) => Ok(Admin),
            Some(_) => Err(AppError::unauthorized("invalid or expired token")),
            None => Err(AppError::unauthorized("missing bearer token")),
        }
    }
}

/// Anyone; `admin` tells whether they presented a live token.
pub struct Caller {
    pub admin: bool,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Caller { admin: bearer(parts).is_some_and(|t| state.auth.validate(t)) })
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": homescan_core::version() }))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

async fn login(State(st): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> AppResult<Json<TokenResponse>> {
    let token = st
        .auth
        .login(&req.username, &req.password)
        .ok_or_else(|| AppError::unauthorized("incorrect username or password"))?;
    Ok(Json(TokenResponse { access_token: token, token_type: "bearer" }))
}

// --- profiles ---

async fn list_profiles(State(st): State<AppState>, caller: Caller) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(st.engine.list_profiles(caller.admin)?))
}

async fn create_profile(
    State(st): State<AppState>,
    _: Admin,
    ApiJson(new): ApiJson<NewProfile>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    Ok((StatusCode::CREATED, Json(st.engine.create_profile(&new)?)))
}

async fn update_profile(
    State(st): State<AppState>,
    _: Admin,
    Path(id): Path<ProfileId>,
    ApiJson(patch): ApiJson<ProfilePatch>,
) -> AppResult<Json<Profile>> {
    Ok(Json(st.engine.update_profile(id, &patch)?))
}

async fn delete_profile(State(st): State<AppState>, _: Admin, Path(id): Path<ProfileId>) -> AppResult<Json<Profile>> {
    Ok(Json(st.engine.delete_profile(id).await?))
}

async fn set_guest_default(State(st): State<AppState>, _: Admin, Path(id): Path<ProfileId>) -> AppResult<Json<Profile>> {
    Ok(Json(st.engine.set_guest_default(id)?))
}

// --- settings ---

async fn get_settings(State(st): State<AppState>) -> Json<AppSettings> {
    Json(st.engine.settings())
}

async fn update_settings(
    State(st): State<AppState>,
    _: Admin,
    ApiJson(patch): ApiJson<SettingsPatch>,
) -> AppResult<Json<AppSettings>> {
    Ok(Json(st.engine.update_settings(&patch)?))
}

// --- services ---

#[derive(Deserialize)]
struct ServicesQuery {
    profile_id: Option<ProfileId>,
    #[serde(default)]
    include_hidden: bool,
}

/// Without `profile_id` the guest-default profile is listed.
async fn list_services(
    State(st): State<AppState>,
    caller: Caller,
    ApiQuery(q): ApiQuery<ServicesQuery>,
) -> AppResult<Json<Vec<Service>>> {
    let profile_id = match q.profile_id {
        Some(id) => id,
        None => st
            .engine
            .list_profiles(false)?
            .first()
            .map(|p| p.id)
            .ok_or_else(|| AppError::not_found("no guest default profile"))?,
    };
    Ok(Json(st.engine.list_services(profile_id, q.include_hidden && caller.admin)?))
}

async fn create_manual_service(
    State(st): State<AppState>,
    _: Admin,
    ApiJson(manual): ApiJson<ManualService>,
) -> AppResult<(StatusCode, Json<Service>)> {
    Ok((StatusCode::CREATED, Json(st.engine.create_manual_service(manual).await?)))
}

async fn update_service(
    State(st): State<AppState>,
    _: Admin,
    Path(id): Path<ServiceId>,
    ApiJson(patch): ApiJson<ServicePatch>,
) -> AppResult<Json<Service>> {
    Ok(Json(st.engine.update_service(id, &patch).await?))
}

async fn delete_service(State(st): State<AppState>, _: Admin, Path(id): Path<ServiceId>) -> AppResult<Json<Service>> {
    Ok(Json(st.engine.delete_service(id).await?))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReorderRequest {
    ordered_ids: Vec<ServiceId>,
    profile_id: Option<ProfileId>,
}

async fn reorder_services(
    State(st): State<AppState>,
    _: Admin,
    ApiJson(req): ApiJson<ReorderRequest>,
) -> AppResult<Json<Value>> {
    st.engine.reorder(req.profile_id, &req.ordered_ids).await?;
    Ok(Json(json!({ "status": "ok" })))
}

// --- scans ---

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScanRequest {
    profile_id: ProfileId,
    target_ip: Option<String>,
}

/// Runs the scan to completion and answers with its report.
async fn trigger_scan(State(st): State<AppState>, _: Admin, ApiJson(req): ApiJson<ScanRequest>) -> AppResult<Json<ScanReport>> {
    Ok(Json(st.engine.trigger_scan(req.profile_id, req.target_ip.as_deref()).await?))
}

#[derive(Deserialize)]
struct StatusQuery {
    profile_id: ProfileId,
}

async fn scan_status(State(st): State<AppState>, _: Admin, ApiQuery(q): ApiQuery<StatusQuery>) -> AppResult<Json<ScanStatus>> {
    Ok(Json(st.engine.scan_status(q.profile_id)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use axum::response::Response;
    use catalog_sqlite::Db;
    use homescan_core::{DetectedService, Detector, DetectorError, Target};
    use scan_engine::EngineConfig;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::Credentials;

    /// Answers every scan with the same services.
    struct FixedDetector(Vec<DetectedService>);

    #[async_trait]
    impl Detector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn detect(&self, _target: &Target) -> Result<Vec<DetectedService>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn app() -> Router {
        let detector = FixedDetector(vec![
            DetectedService::new("127.0.0.1", 22, "ssh", "OpenSSH 9.2"),
            DetectedService::new("127.0.0.1", 3000, "http", "Grafana"),
        ]);
        let db = Db::open_in_memory().unwrap();
        let engine = ScanEngine::new(db, Arc::new(detector), EngineConfig::default()).unwrap();
        let auth = Auth::new(Credentials { username: "admin".into(), password: "pw".into() }, Duration::from_secs(60));
        router(AppState { engine: Arc::new(engine), auth: Arc::new(auth) })
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(v) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn token(app: &Router) -> String {
        let resp = send(app, Method::POST, "/api/login", None, Some(json!({"username": "admin", "password": "pw"}))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_and_settings_are_public() {
        let app = app();
        assert_eq!(send(&app, Method::GET, "/api/health", None, None).await.status(), StatusCode::OK);
        let settings = json_body(send(&app, Method::GET, "/api/settings", None, None).await).await;
        assert_eq!(settings["site_title"], "HomePageScan");
    }

    #[tokio::test]
    async fn login_and_bearer_checks() {
        let app = app();
        let bad = send(&app, Method::POST, "/api/login", None, Some(json!({"username": "admin", "password": "x"}))).await;
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(bad).await["error"]["kind"], "unauthorized");

        let anon = send(&app, Method::POST, "/api/scan", None, Some(json!({"profile_id": 1}))).await;
        assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);
        let forged = send(&app, Method::POST, "/api/scan", Some("nope"), Some(json!({"profile_id": 1}))).await;
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        let t = token(&app).await;
        let ok = send(&app, Method::POST, "/api/scan", Some(&t), Some(json!({"profile_id": 1}))).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json_body(ok).await["inserted"], 2);
    }

    #[tokio::test]
    async fn guests_see_only_the_guest_profile_and_visible_services() {
        let app = app();
        let t = token(&app).await;
        let created = send(&app, Method::POST, "/api/profiles", Some(&t), Some(json!({"name": "office"}))).await;
        assert_eq!(created.status(), StatusCode::CREATED);
        send(&app, Method::POST, "/api/scan", Some(&t), Some(json!({"profile_id": 1}))).await;

        let all = json_body(send(&app, Method::GET, "/api/profiles", Some(&t), None).await).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
        let guest = json_body(send(&app, Method::GET, "/api/profiles", None, None).await).await;
        assert_eq!(guest.as_array().unwrap().len(), 1);
        assert_eq!(guest[0]["name"], "Default");

        let services = json_body(send(&app, Method::GET, "/api/services", None, None).await).await;
        let first = services[0]["id"].as_i64().unwrap();
        let hide = send(&app, Method::POST, &format!("/api/services/{first}"), Some(&t), Some(json!({"is_visible": false}))).await;
        assert_eq!(hide.status(), StatusCode::OK);

        let anon = json_body(send(&app, Method::GET, "/api/services?profile_id=1&include_hidden=true", None, None).await).await;
        assert_eq!(anon.as_array().unwrap().len(), 1);
        let admin =
            json_body(send(&app, Method::GET, "/api/services?profile_id=1&include_hidden=true", Some(&t), None).await).await;
        assert_eq!(admin.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn curation_survives_rescan_and_rejects_owned_fields() {
        let app = app();
        let t = token(&app).await;
        send(&app, Method::POST, "/api/scan", Some(&t), Some(json!({"profile_id": 1}))).await;
        let services = json_body(send(&app, Method::GET, "/api/services?profile_id=1", None, None).await).await;
        let id = services[1]["id"].as_i64().unwrap();
        let uri = format!("/api/services/{id}");

        let sneaky = send(&app, Method::POST, &uri, Some(&t), Some(json!({"sort_order": 0}))).await;
        assert_eq!(sneaky.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(sneaky).await["error"]["kind"], "invalid_body");

        let named = send(&app, Method::POST, &uri, Some(&t), Some(json!({"custom_name": "Dashboards"}))).await;
        assert_eq!(json_body(named).await["custom_name"], "Dashboards");

        send(&app, Method::POST, "/api/scan", Some(&t), Some(json!({"profile_id": 1}))).await;
        let after = json_body(send(&app, Method::GET, "/api/services?profile_id=1", None, None).await).await;
        assert_eq!(after[1]["custom_name"], "Dashboards");
        assert_eq!(after.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reorder_and_manual_errors_use_api_statuses() {
        let app = app();
        let t = token(&app).await;
        send(&app, Method::POST, "/api/scan", Some(&t), Some(json!({"profile_id": 1}))).await;
        let services = json_body(send(&app, Method::GET, "/api/services?profile_id=1", None, None).await).await;
        let (a, b) = (services[0]["id"].as_i64().unwrap(), services[1]["id"].as_i64().unwrap());

        let partial = send(&app, Method::POST, "/api/reorder-services", Some(&t), Some(json!({"ordered_ids": [b]}))).await;
        assert_eq!(partial.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(partial).await["error"]["kind"], "invalid_ordering");

        let ok = send(&app, Method::POST, "/api/reorder-services", Some(&t), Some(json!({"ordered_ids": [b, a]}))).await;
        assert_eq!(ok.status(), StatusCode::OK);
        let now = json_body(send(&app, Method::GET, "/api/services?profile_id=1", None, None).await).await;
        assert_eq!(now[0]["id"].as_i64(), Some(b));

        let manual = json!({"profile_id": 1, "ip": "127.0.0.1", "port": 3000});
        let dup = send(&app, Method::POST, "/api/services/manual", Some(&t), Some(manual)).await;
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let gone = send(&app, Method::DELETE, "/api/services/999", Some(&t), None).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);

        let default = send(&app, Method::DELETE, "/api/profiles/1", Some(&t), None).await;
        assert_eq!(default.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn scan_status_reports_last_outcome() {
        let app = app();
        let t = token(&app).await;
        send(&app, Method::POST, "/api/scan", Some(&t), Some(json!({"profile_id": 1, "target_ip": "127.0.0.1"}))).await;
        let status = json_body(send(&app, Method::GET, "/api/scan/status?profile_id=1", Some(&t), None).await).await;
        assert_eq!(status["in_progress"], false);
        assert_eq!(status["last_report"]["total"], 2);

        let missing = send(&app, Method::GET, "/api/scan/status?profile_id=42", Some(&t), None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_query_strings_get_json_errors() {
        let app = app();
        let t = token(&app).await;
        for (uri, token) in [
            ("/api/services?profile_id=abc", None),
            ("/api/services?profile_id=1&include_hidden=maybe", None),
            ("/api/scan/status", Some(t.as_str())),
        ] {
            let resp = send(&app, Method::GET, uri, token, None).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = json_body(resp).await;
            assert_eq!(body["error"]["kind"], "invalid_query", "{uri}");
            assert_eq!(body["error"]["status"], 400);
        }
    }

    #[tokio::test]
    async fn guest_default_profile_is_kept_until_replaced() {
        let app = app();
        let t = token(&app).await;
        let renamed = send(&app, Method::PUT, "/api/profiles/1", Some(&t), Some(json!({"name": "home"}))).await;
        assert_eq!(renamed.status(), StatusCode::OK);
        let refused = send(&app, Method::DELETE, "/api/profiles/1", Some(&t), None).await;
        assert_eq!(refused.status(), StatusCode::CONFLICT);

        let office = json_body(send(&app, Method::POST, "/api/profiles", Some(&t), Some(json!({"name": "office"}))).await).await;
        let office_id = office["id"].as_i64().unwrap();
        let moved = send(&app, Method::POST, &format!("/api/profiles/{office_id}/set-guest-default"), Some(&t), None).await;
        assert_eq!(moved.status(), StatusCode::OK);
        let deleted = send(&app, Method::DELETE, "/api/profiles/1", Some(&t), None).await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let guest = json_body(send(&app, Method::GET, "/api/profiles", None, None).await).await;
        assert_eq!(guest[0]["id"].as_i64(), Some(office_id));
    }
}
