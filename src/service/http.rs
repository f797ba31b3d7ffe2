use std::sync::Arc;

use async_trait::async_trait;
use http::{header, Method, Response, StatusCode};
use log::{error, info, warn};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde_json::json;

use crate::{
    config::Gateway,
    core::{
        envelope::ChatRequest,
        error::{BridgeError, BridgeResult},
    },
    orchestration::RequestOrchestrator,
    utils::response::{content_type, CommonErrors, ResponseBuilder},
};

const SERVICE_NAME: &str = "Credit Card Assistant Bridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Chat,
    Health,
    Banner,
    MethodNotAllowed,
    NotFound,
}

fn route(method: &Method, path: &str) -> Endpoint {
    let (endpoint, allowed) = match path {
        "/chat" => (Endpoint::Chat, Method::POST),
        "/health" => (Endpoint::Health, Method::GET),
        "/" => (Endpoint::Banner, Method::GET),
        _ => return Endpoint::NotFound,
    };
    if *method == allowed {
        endpoint
    } else {
        Endpoint::MethodNotAllowed
    }
}

fn parse_chat_request(content_type: Option<&str>, body: &[u8]) -> BridgeResult<ChatRequest> {
    match content_type {
        Some(ct) if ct.trim().starts_with(content_type::APPLICATION_JSON) => {}
        _ => {
            return Err(BridgeError::Validation(
                "Content-Type must be application/json".to_string(),
            ))
        }
    }

    let request: ChatRequest = serde_json::from_slice(body)
        .map_err(|e| BridgeError::Validation(format!("Invalid request body: {e}")))?;
    if request.message.trim().is_empty() {
        return Err(BridgeError::Validation(
            "message must not be empty".to_string(),
        ));
    }
    Ok(request)
}

/// Map a failed submission to the caller-facing status.
fn error_response(err: &BridgeError) -> Response<Vec<u8>> {
    match err {
        BridgeError::Transport(_) => {
            CommonErrors::service_unavailable("Message queue service unavailable")
        }
        BridgeError::Timeout(_) => CommonErrors::gateway_timeout("Request timeout"),
        BridgeError::Validation(msg) => CommonErrors::bad_request(msg),
        other => CommonErrors::internal_server_error(&other.to_string()),
    }
}

/// Synchronous front door in front of the lanes.
pub struct GatewayHttpApp {
    orchestrator: Arc<RequestOrchestrator>,
}

impl GatewayHttpApp {
    pub fn new(orchestrator: Arc<RequestOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn gateway_http_service(
        cfg: &Gateway,
        orchestrator: Arc<RequestOrchestrator>,
    ) -> Service<Self> {
        let app = Self::new(orchestrator);
        let mut service = Service::new("Gateway HTTP".to_string(), app);
        service.add_tcp(&cfg.address.to_string());
        service
    }

    async fn read_body(http_session: &mut ServerSession) -> BridgeResult<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(bytes) = http_session
            .read_request_body()
            .await
            .map_err(|e| BridgeError::Validation(format!("Failed to read body: {e}")))?
        {
            body.extend_from_slice(&bytes);
        }
        Ok(body)
    }

    async fn chat(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        let content_type = http_session
            .get_header(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let request = match Self::read_body(http_session)
            .await
            .and_then(|body| parse_chat_request(content_type.as_deref(), &body))
        {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected chat request: {e}");
                return error_response(&e);
            }
        };

        match self.orchestrator.submit(request).await {
            Ok(response) => ResponseBuilder::success_json(&response),
            Err(e) => {
                error!("Chat request failed: {e}");
                error_response(&e)
            }
        }
    }
}

#[async_trait]
impl ServeHttp for GatewayHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        let endpoint = {
            let req_header = http_session.req_header();
            route(&req_header.method, req_header.uri.path())
        };

        match endpoint {
            Endpoint::Chat => self.chat(http_session).await,
            Endpoint::Health => ResponseBuilder::success_json(&json!({"status": "healthy"})),
            Endpoint::Banner => {
                info!("Banner requested");
                ResponseBuilder::success_json(&json!({
                    "message": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }))
            }
            Endpoint::MethodNotAllowed => CommonErrors::method_not_allowed(),
            Endpoint::NotFound => CommonErrors::not_found(),
        }
    }
}
