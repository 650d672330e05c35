// HTTP handlers for the session demo service
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::session::{Session, SessionError, SessionExpiry, SessionManager, SessionState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// What `GET /session` reports about the current session
#[derive(Serialize)]
pub struct SessionSummary {
    pub state: SessionState,
    pub has_key: bool,
    pub data: Map<String, Value>,
    pub expiry_age: i64,
    pub expiry_date: DateTime<Utc>,
    pub expire_at_browser_close: bool,
}

impl SessionSummary {
    fn of(session: &Session) -> Self {
        Self {
            state: session.state(),
            has_key: session.session_key().is_some(),
            data: session
                .items()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
            expiry_age: session.get_expiry_age(),
            expiry_date: session.get_expiry_date(),
            expire_at_browser_close: session.get_expire_at_browser_close(),
        }
    }
}

/// Body of `POST /session/expiry`
///
/// `at` wins over `seconds`; neither reverts to the default expiry and
/// `seconds: 0` makes the cookie a browser-session cookie.
#[derive(Debug, Default, Deserialize)]
pub struct ExpiryRequest {
    pub seconds: Option<i64>,
    pub at: Option<DateTime<Utc>>,
}

impl ExpiryRequest {
    #[must_use]
    pub fn into_expiry(self) -> SessionExpiry {
        self.at
            .map_or_else(|| SessionExpiry::from_seconds(self.seconds), SessionExpiry::At)
    }
}

/// Register the demo routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(health))
        .route("/session", web::get().to(show_session))
        .route("/session/flush", web::post().to(flush_session))
        .route("/session/cycle", web::post().to(cycle_session))
        .route("/session/expiry", web::post().to(set_session_expiry))
        .route("/session/{name}", web::put().to(set_session_value))
        .route("/session/{name}", web::delete().to(delete_session_value))
        .route("/visits", web::get().to(count_visits));
}

/// Health check
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        message: "satchel session service is running".to_string(),
    })
}

/// Report the current session without modifying it
///
/// # Errors
///
/// Returns an error if the session store is unavailable.
pub async fn show_session(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    let summary = SessionSummary::of(&session);
    respond(&manager, &mut session, &summary).await
}

/// Store the JSON request body under `name`
///
/// # Errors
///
/// Returns an error if the session store is unavailable.
pub async fn set_session_value(
    req: HttpRequest,
    name: web::Path<String>,
    value: web::Json<Value>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    let previous = session.insert(name.into_inner(), value.into_inner())?;
    respond(&manager, &mut session, &json!({ "previous": previous })).await
}

/// Remove `name` from the session
///
/// # Errors
///
/// Returns an error if the session store is unavailable.
pub async fn delete_session_value(
    req: HttpRequest,
    name: web::Path<String>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    let removed = session.remove(&name);
    respond(&manager, &mut session, &json!({ "removed": removed })).await
}

/// Log out: drop all data and continue under a new key
///
/// # Errors
///
/// Returns an error if the session store is unavailable.
pub async fn flush_session(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    session.flush().await?;
    respond(&manager, &mut session, &json!({ "flushed": true })).await
}

/// Keep the data but move it to a new key
///
/// # Errors
///
/// Returns an error if the session store is unavailable.
pub async fn cycle_session(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    session.cycle_key().await?;
    respond(&manager, &mut session, &json!({ "cycled": true })).await
}

/// Override the session expiry
///
/// # Errors
///
/// Returns `InvalidExpiry` (400) for past or negative expiries, or an error
/// if the session store is unavailable.
pub async fn set_session_expiry(
    req: HttpRequest,
    body: web::Json<ExpiryRequest>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    session.set_expiry(body.into_inner().into_expiry())?;
    let summary = SessionSummary::of(&session);
    respond(&manager, &mut session, &summary).await
}

/// Count requests per visitor
///
/// # Errors
///
/// Returns an error if the session store is unavailable.
pub async fn count_visits(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let mut session = load_session(&req, &manager).await?;
    let visits = session.get_as::<u64>("visits").ok().flatten().unwrap_or(0) + 1;
    session.insert("visits", visits)?;
    respond(&manager, &mut session, &json!({ "visits": visits })).await
}

/// Join every `Cookie` header on the request into one header value
#[must_use]
pub fn cookie_header(req: &HttpRequest) -> Option<String> {
    let values: Vec<&str> = req
        .headers()
        .get_all(header::COOKIE)
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join("; "))
    }
}

async fn load_session(req: &HttpRequest, manager: &SessionManager) -> Result<Session, SessionError> {
    manager.get_session(cookie_header(req).as_deref()).await
}

async fn respond<T: Serialize>(
    manager: &SessionManager,
    session: &mut Session,
    body: &T,
) -> Result<HttpResponse, SessionError> {
    let set_cookie = manager.finish(session).await?;
    let mut response = HttpResponse::Ok();
    if let Some(set_cookie) = set_cookie {
        debug!("Issuing session cookie ({:?})", session.state());
        response.append_header((header::SET_COOKIE, set_cookie));
    }
    Ok(response.json(body))
}
