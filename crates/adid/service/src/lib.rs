//! HTTP surface of the adid operator.
//!
//! Two parallel transports carry the same signed envelope shapes: redirect
//! endpoints serialize the signed response into a `data` query parameter on
//! the caller's return URL, JSON endpoints return it as the response body.
//! CORS on the JSON surface is intentionally permissive (reflected origin,
//! credentials allowed) — authenticity comes from the signature protocol,
//! not from origin checks.

#![deny(unsafe_code)]

use adid_crypto::PartnerDirectory;
use adid_model::{cookies, endpoints, params, Envelope, IdPrefsBody, NewIdBody, ReadRequest};
use adid_protocol::{CookieWrite, ExchangeError, ExchangeHandler, OperatorConfig, StoredState};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cookie::Cookie;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use url::Url;

/// Service bootstrap errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cannot derive a registrable cookie domain from host '{0}'")]
    CookieDomain(String),
}

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ExchangeHandler>,
    /// Registrable domain all operator cookies are scoped to.
    pub cookie_domain: Arc<str>,
}

impl AppState {
    pub fn new(config: OperatorConfig, partners: PartnerDirectory) -> Result<Self, ServiceError> {
        let cookie_domain = registrable_domain(&config.host)
            .ok_or_else(|| ServiceError::CookieDomain(config.host.clone()))?;
        Ok(Self {
            handler: Arc::new(ExchangeHandler::new(config, partners)),
            cookie_domain: cookie_domain.into(),
        })
    }
}

/// eTLD+1 of the operator host (port stripped), per the public suffix list.
pub fn registrable_domain(host: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host);
    psl::domain_str(host).map(str::to_string)
}

pub fn build_router(state: AppState) -> Router {
    // Reflect whatever origin calls us; a wildcard would be refused by
    // browsers once credentials are allowed.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let json_routes = Router::new()
        .route(endpoints::JSON_READ, get(json_read))
        .route(endpoints::JSON_WRITE, post(json_write))
        .route(endpoints::JSON_NEW_ID, get(json_new_id))
        .route(endpoints::JSON_VERIFY_3PC, get(json_verify_3pc))
        .layer(cors);

    Router::new()
        .route(endpoints::REDIRECT_READ, get(redirect_read))
        .route(endpoints::REDIRECT_WRITE, get(redirect_write))
        .merge(json_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            // Our own response failed to serialize; everything else is the
            // caller's fault and terminal for the request.
            ApiError::Exchange(ExchangeError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Exchange(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    sender: String,
    receiver: String,
    timestamp: u64,
    signature: String,
}

impl From<ReadParams> for ReadRequest {
    fn from(params: ReadParams) -> Self {
        ReadRequest {
            sender: params.sender,
            receiver: params.receiver,
            timestamp: params.timestamp,
            signature: params.signature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RedirectReadParams {
    sender: String,
    receiver: String,
    timestamp: u64,
    signature: String,
    #[serde(rename = "returnUrl")]
    return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedirectWriteParams {
    /// JSON-serialized signed write request.
    data: String,
    #[serde(rename = "returnUrl")]
    return_url: Option<String>,
}

async fn redirect_read(
    State(state): State<AppState>,
    Query(query): Query<RedirectReadParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = parse_return_url(query.return_url.as_deref())?;
    let request = ReadRequest {
        sender: query.sender,
        receiver: query.receiver,
        timestamp: query.timestamp,
        signature: query.signature,
    };
    let stored = read_stored_state(&headers);
    let outcome = state.handler.read(&request, stored)?;
    redirect_with_data(&state, target, &outcome.response, &outcome.cookies)
}

async fn redirect_write(
    State(state): State<AppState>,
    Query(query): Query<RedirectWriteParams>,
) -> Result<Response, ApiError> {
    let target = parse_return_url(query.return_url.as_deref())?;
    let request: Envelope<IdPrefsBody> = serde_json::from_str(&query.data)
        .map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    let outcome = state.handler.write(request)?;
    redirect_with_data(&state, target, &outcome.response, &outcome.cookies)
}

async fn json_read(
    State(state): State<AppState>,
    Query(params): Query<ReadParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let request = ReadRequest::from(params);
    let stored = read_stored_state(&headers);
    let outcome = state.handler.read(&request, stored)?;
    let mut response = Json(outcome.response).into_response();
    apply_cookie_writes(response.headers_mut(), &state.cookie_domain, &outcome.cookies);
    Ok(response)
}

async fn json_write(
    State(state): State<AppState>,
    body: String,
) -> Result<Response, ApiError> {
    let request: Envelope<IdPrefsBody> =
        serde_json::from_str(&body).map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    let outcome = state.handler.write(request)?;
    let mut response = Json(outcome.response).into_response();
    apply_cookie_writes(response.headers_mut(), &state.cookie_domain, &outcome.cookies);
    Ok(response)
}

async fn json_new_id(
    State(state): State<AppState>,
    Query(params): Query<ReadParams>,
) -> Result<Json<Envelope<NewIdBody>>, ApiError> {
    let request = ReadRequest::from(params);
    let outcome = state.handler.new_id(&request)?;
    Ok(Json(outcome.response))
}

/// Unsigned by design: there is no partner identity to verify, only the
/// question of whether the browser returned our marker cookie.
async fn json_verify_3pc(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let stored = read_stored_state(&headers);
    let outcome = state.handler.probe(&stored);
    let mut response = Json(outcome.cookie_returned).into_response();
    apply_cookie_writes(response.headers_mut(), &state.cookie_domain, &outcome.cookies);
    response
}

fn redirect_with_data<T: serde::Serialize>(
    state: &AppState,
    mut target: Url,
    payload: &T,
    writes: &[CookieWrite],
) -> Result<Response, ApiError> {
    let data =
        serde_json::to_string(payload).map_err(|e| ExchangeError::Encode(e.to_string()))?;
    target.query_pairs_mut().append_pair(params::DATA, &data);
    let mut response = Redirect::to(target.as_str()).into_response();
    apply_cookie_writes(response.headers_mut(), &state.cookie_domain, writes);
    Ok(response)
}

/// A usable return target is an absolute http(s) URL; anything else rejects
/// the redirect-transport request before any protocol work happens.
fn parse_return_url(raw: Option<&str>) -> Result<Url, ApiError> {
    let raw = raw
        .filter(|value| !value.trim().is_empty())
        .ok_or(ExchangeError::MissingReturnTarget)?;
    let url = Url::parse(raw).map_err(|_| ExchangeError::MissingReturnTarget)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ExchangeError::MissingReturnTarget.into());
    }
    Ok(url)
}

/// Decode the operator's cookies out of the request jar. Unreadable or
/// corrupted values are treated as absent, same as a first visit.
fn read_stored_state(headers: &HeaderMap) -> StoredState {
    let mut state = StoredState::empty();
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for parsed in Cookie::split_parse_encoded(raw.to_owned()) {
            let Ok(c) = parsed else { continue };
            match c.name() {
                cookies::IDENTIFIER => state.identifier = serde_json::from_str(c.value()).ok(),
                cookies::PREFERENCES => state.preferences = serde_json::from_str(c.value()).ok(),
                cookies::TEST_3PC => state.probe_marker = Some(c.value().to_string()),
                _ => {}
            }
        }
    }
    state
}

fn apply_cookie_writes(headers: &mut HeaderMap, domain: &str, writes: &[CookieWrite]) {
    for write in writes {
        let built = match write {
            CookieWrite::Set {
                name,
                value,
                max_age,
            } => Cookie::build((*name, value.clone()))
                .domain(domain.to_owned())
                .path("/")
                .max_age(cookie::time::Duration::seconds(max_age.as_secs() as i64))
                .same_site(cookie::SameSite::None)
                .secure(true)
                .build(),
            CookieWrite::Clear { name } => Cookie::build((*name, ""))
                .domain(domain.to_owned())
                .path("/")
                .max_age(cookie::time::Duration::ZERO)
                .build(),
        };
        if let Ok(value) = HeaderValue::from_str(&built.encoded().to_string()) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
