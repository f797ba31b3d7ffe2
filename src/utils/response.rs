//! Response helpers shared by the front door and the status endpoint.

use http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

/// Standard content types
pub mod content_type {
    pub const APPLICATION_JSON: &str = "application/json";
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// Unified response builder
pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn with_status(
        status: StatusCode,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Response<Vec<u8>> {
        let mut builder = Response::builder().status(status);

        if let Some(ct) = content_type {
            match HeaderValue::from_str(ct) {
                Ok(header_value) => {
                    builder = builder.header(header::CONTENT_TYPE, header_value);
                }
                Err(e) => {
                    log::error!("Invalid content type '{}': {}", ct, e);
                }
            }
        }

        builder.body(body).unwrap_or_else(|e| {
            log::error!("Failed to build response: {}", e);
            Self::fallback()
        })
    }

    /// Build a JSON response with the given status
    pub fn json<T: Serialize>(status: StatusCode, data: &T) -> Response<Vec<u8>> {
        match serde_json::to_vec(data) {
            Ok(json_body) => {
                Self::with_status(status, json_body, Some(content_type::APPLICATION_JSON))
            }
            Err(e) => {
                log::error!("Failed to serialize JSON response: {}", e);
                Self::fallback()
            }
        }
    }

    pub fn success_json<T: Serialize>(data: &T) -> Response<Vec<u8>> {
        Self::json(StatusCode::OK, data)
    }

    /// `{"detail": message}` error body
    pub fn error_json(status: StatusCode, message: &str) -> Response<Vec<u8>> {
        Self::json(status, &ErrorBody { detail: message })
    }

    fn fallback() -> Response<Vec<u8>> {
        let mut resp = Response::new(b"Internal Server Error".to_vec());
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        resp
    }
}

/// Common error response helpers
pub struct CommonErrors;

impl CommonErrors {
    pub fn bad_request(message: &str) -> Response<Vec<u8>> {
        ResponseBuilder::error_json(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Response<Vec<u8>> {
        ResponseBuilder::error_json(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn method_not_allowed() -> Response<Vec<u8>> {
        ResponseBuilder::error_json(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    pub fn service_unavailable(message: &str) -> Response<Vec<u8>> {
        ResponseBuilder::error_json(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn gateway_timeout(message: &str) -> Response<Vec<u8>> {
        ResponseBuilder::error_json(StatusCode::GATEWAY_TIMEOUT, message)
    }

    pub fn internal_server_error(message: &str) -> Response<Vec<u8>> {
        ResponseBuilder::error_json(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}
