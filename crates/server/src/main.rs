use std::{net::SocketAddr, path::PathBuf};

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use portal::{render::page::escape_html, Portal, PortalRequest, PortalResponse};
use shared::{
    domain::SessionId,
    error::{ApiError, ErrorCode},
};
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use url::form_urlencoded;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const SESSION_COOKIE: &str = "portal.session";
const MAX_FORM_BYTES: usize = 256 * 1024;

#[derive(Debug, Parser)]
#[command(name = "portal-server", about = "Serves the portlet portal")]
struct Args {
    /// Settings file; `portal.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    prefix: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    if let Some(prefix) = args.prefix {
        settings.prefix = prefix;
    }
    settings.validate()?;

    let portal = Portal::new(settings.portal_settings());
    portlets::register_all(&portal).await?;
    let app = build_router(AppState::new(portal));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, prefix = %settings.prefix, "portal listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    let exchange = state.portal.urls().event_exchange_path();
    Router::new()
        .route("/healthz", get(healthz))
        .route(&exchange, get(ws_handler))
        .fallback(portal_handler)
        .layer(RequestBodyLimitLayer::new(MAX_FORM_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(SessionId::new)
}

fn session_cookie(session: &SessionId, path: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={session}; Path={path}; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

/// Query parameters followed by url-encoded form fields.
fn request_params(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = uri
        .query()
        .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        params.extend(form_urlencoded::parse(body).into_owned());
    }
    params
}

fn not_found() -> Response {
    let code = ErrorCode::NotFound;
    (
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::NOT_FOUND),
        Json(ApiError::new(code, "not found")),
    )
        .into_response()
}

fn into_http(response: PortalResponse) -> Response {
    match response {
        PortalResponse::Page {
            body,
            content_language,
        } => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            if let Some(value) = content_language.and_then(|l| HeaderValue::from_str(&l).ok()) {
                headers.insert(header::CONTENT_LANGUAGE, value);
            }
            (StatusCode::OK, headers, body).into_response()
        }
        PortalResponse::Resource(resource) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&resource.content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            );
            (StatusCode::OK, headers, resource.body).into_response()
        }
        PortalResponse::NotFound | PortalResponse::NotPortal => not_found(),
        PortalResponse::Error { status, body } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Html(format!(
                "<!DOCTYPE html><html><head><title>Portal error</title></head>\
                 <body><h1>Portal error</h1><pre>{}</pre></body></html>",
                escape_html(&body)
            )),
        )
            .into_response(),
    }
}

async fn portal_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let existing = session_from_headers(&headers);
    let session = existing.clone().unwrap_or_else(SessionId::generate);

    let mut request = PortalRequest::new(session.clone(), uri.path());
    request.params = request_params(&uri, &headers, &body);
    request.accept_language = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let response = state.portal.handle_request(request).await;
    let is_page = matches!(response, PortalResponse::Page { .. });
    let mut response = into_http(response);
    if existing.is_none() && is_page {
        if let Some(cookie) = session_cookie(&session, &state.cookie_path) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let Some(session) = session_from_headers(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(ErrorCode::Validation, "missing session cookie")),
        )
            .into_response();
    };
    ws.on_upgrade(move |socket| ws_connection(state, socket, session))
}

async fn ws_connection(state: AppState, socket: WebSocket, session: SessionId) {
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<String>();
    let connection = state.portal.client_connected(&session, updates_tx);

    let send_task = tokio::spawn(async move {
        while let Some(text) = updates_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                if let Err(error) = state.portal.client_message(&session, &text).await {
                    debug!(%session, %error, "client message dropped");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.portal.client_disconnected(&session, connection);
    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
