use async_trait::async_trait;
use http::{Response, StatusCode};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde::Serialize;

use crate::{
    config::Status,
    core::status::Readiness,
    utils::response::{CommonErrors, ResponseBuilder},
};

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// HTTP application for the readiness probe.
///
/// `/status/ready` answers 200 once the broker topology has been declared
/// and 503 before that, independent of the front-door listener.
pub struct StatusHttpApp {
    readiness: Readiness,
}

impl StatusHttpApp {
    pub fn new(readiness: Readiness) -> Self {
        Self { readiness }
    }

    pub fn status_http_service(cfg: &Status, readiness: Readiness) -> Service<Self> {
        let app = Self::new(readiness);
        let mut service = Service::new("Status HTTP".to_string(), app);
        service.add_tcp(&cfg.address.to_string());
        service
    }

    fn ready_response(&self) -> Response<Vec<u8>> {
        if self.readiness.is_ready() {
            let response = StatusResponse {
                status: "ok".to_string(),
                error: None,
            };
            ResponseBuilder::json(StatusCode::OK, &response)
        } else {
            let response = StatusResponse {
                status: "error".to_string(),
                error: Some("Broker topology not declared yet".to_string()),
            };
            ResponseBuilder::json(StatusCode::SERVICE_UNAVAILABLE, &response)
        }
    }
}

#[async_trait]
impl ServeHttp for StatusHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        match http_session.req_header().uri.path() {
            "/status/ready" => self.ready_response(),
            _ => CommonErrors::not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::ReadySource;

    #[test]
    fn test_ready_follows_readiness() {
        let readiness = Readiness::new();
        let app = StatusHttpApp::new(readiness.clone());

        let response = app.ready_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.body(),
            br#"{"status":"error","error":"Broker topology not declared yet"}"#
        );

        readiness.mark_ready(ReadySource::Memory);
        let response = app.ready_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), br#"{"status":"ok"}"#);
    }
}
