use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::health::{ConnectionController, ConnectionState, ErrorRecord, Mode};
use crate::service::{DataSource, DataSourceRouter};

/// Operator API for inspecting and steering the connection controller
pub struct AdminApi {
    controller: Arc<ConnectionController>,
    router: Arc<DataSourceRouter>,
}

#[derive(Serialize)]
struct StatusResponse {
    url: String,
    state: ConnectionState,
    active_source: DataSource,
    active_source_name: String,
    can_serve: bool,
    retry_pending: bool,
    errors: Vec<ErrorRecord>,
}

#[derive(Serialize)]
struct CheckResponse {
    available: bool,
    state: ConnectionState,
}

impl AdminApi {
    pub fn new(controller: Arc<ConnectionController>, router: Arc<DataSourceRouter>) -> Self {
        Self { controller, router }
    }

    /// Handle admin API request
    pub async fn handle<B>(&self, req: Request<B>) -> Response<BoxBody<Bytes, hyper::Error>> {
        let path = req.uri().path().to_owned();
        let method = req.method().clone();
        let force = !req
            .uri()
            .query()
            .is_some_and(|q| q.split('&').any(|pair| pair == "force=false"));

        match (method.as_str(), path.as_str()) {
            ("GET", "/ping") => self.ping(),
            ("GET", "/api/status") => self.status(),
            ("POST", "/api/check") => self.check(force).await,
            ("POST", "/api/reset") => self.reset(),
            ("POST", "/api/mode/live") => self.set_mode(Mode::Live),
            ("POST", "/api/mode/fallback") => self.set_mode(Mode::Fallback),
            (_, "/api/check" | "/api/reset" | "/api/mode/live" | "/api/mode/fallback") => {
                self.error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
            }
            _ => self.not_found(),
        }
    }

    /// Current state, routing decision and recent failures
    fn status(&self) -> Response<BoxBody<Bytes, hyper::Error>> {
        let state = self.controller.snapshot();
        let status = StatusResponse {
            url: self.controller.health_check_url().to_string(),
            retry_pending: state.retry_pending(),
            state,
            active_source: self.router.active_source(),
            active_source_name: self.router.active_name().to_string(),
            can_serve: self.router.can_serve(),
            errors: self.controller.error_history(),
        };

        self.json_response(&status)
    }

    async fn check(&self, force: bool) -> Response<BoxBody<Bytes, hyper::Error>> {
        info!(force, "Availability check requested via admin API");
        let available = self.controller.check_availability(force).await;

        self.json_response(&CheckResponse {
            available,
            state: self.controller.snapshot(),
        })
    }

    fn reset(&self) -> Response<BoxBody<Bytes, hyper::Error>> {
        info!("Attempt reset requested via admin API");
        self.controller.reset_attempts();
        self.json_response(&self.controller.snapshot())
    }

    fn set_mode(&self, mode: Mode) -> Response<BoxBody<Bytes, hyper::Error>> {
        info!(%mode, "Mode change requested via admin API");
        self.controller.set_mode(mode);
        self.json_response(&self.controller.snapshot())
    }

    fn ping(&self) -> Response<BoxBody<Bytes, hyper::Error>> {
        Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Self::full_body("OK"))
            .unwrap()
    }

    fn not_found(&self) -> Response<BoxBody<Bytes, hyper::Error>> {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("content-type", "application/json")
            .body(Self::full_body(r#"{"error":"Not Found"}"#))
            .unwrap()
    }

    fn error_response(&self, status: StatusCode, message: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        #[derive(Serialize)]
        struct ErrorResponse<'a> {
            error: &'a str,
        }
        let body = serde_json::to_string(&ErrorResponse { error: message })
            .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, message));
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Self::full_body(body))
            .unwrap()
    }

    fn json_response<T: Serialize>(&self, data: &T) -> Response<BoxBody<Bytes, hyper::Error>> {
        match serde_json::to_string(data) {
            Ok(json) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .body(Self::full_body(json))
                .unwrap(),
            Err(_) => self.error_response(StatusCode::INTERNAL_SERVER_ERROR, "Serialization failed"),
        }
    }

    #[inline]
    fn full_body<T: Into<Bytes>>(content: T) -> BoxBody<Bytes, hyper::Error> {
        Full::new(content.into())
            .map_err(|never| match never {})
            .boxed()
    }
}
