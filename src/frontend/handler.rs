//! Request handling for the session front end.
//!
//! Control endpoints change the backend pool; every other request is a
//! session lookup answered with the chosen backend's address.

use crate::backend::SessionRouter;
use crate::config::FrontendConfig;
use crate::metrics::{MetricsCollector, RouteKind};
use crate::util::RequestId;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Response header carrying the selected backend.
pub const SELECTED_BACKEND_HEADER: &str = "x-selected-backend";

/// Request/response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Query parameter naming a backend on control endpoints.
const ADDRESS_PARAM: &str = "address";

/// Errors surfaced to front end clients.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("method {0} not allowed on control endpoint")]
    MethodNotAllowed(Method),

    #[error("missing 'address' query parameter")]
    MissingAddress,

    #[error("invalid backend address '{0}'")]
    InvalidAddress(String),

    #[error("missing or empty {0} header")]
    MissingSession(HeaderName),

    #[error("{0} header is not valid text")]
    InvalidSession(HeaderName),

    #[error("backend {0} is already registered")]
    AlreadyRegistered(SocketAddr),

    #[error("backend {0} is not registered")]
    UnknownBackend(SocketAddr),

    #[error("session '{0}' is not bound to any backend")]
    UnknownSession(String),

    #[error("no backends available")]
    NoBackendsAvailable,
}

impl RequestError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RequestError::MissingAddress
            | RequestError::InvalidAddress(_)
            | RequestError::MissingSession(_)
            | RequestError::InvalidSession(_) => StatusCode::BAD_REQUEST,
            RequestError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            RequestError::UnknownBackend(_) | RequestError::UnknownSession(_) => {
                StatusCode::NOT_FOUND
            }
            RequestError::NoBackendsAvailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Which endpoint a request path maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Register,
    Unregister,
    EndSession,
    Select,
}

/// Resolved endpoint paths and header names.
#[derive(Debug, Clone)]
pub(crate) struct Routes {
    session_header: HeaderName,
    register_path: String,
    unregister_path: String,
    end_session_path: String,
}

impl Routes {
    /// Build routes from front end configuration.
    ///
    /// Falls back to the default `room-id` header when the configured name
    /// is unusable; configuration validation rejects that case earlier.
    pub(crate) fn from_config(config: &FrontendConfig) -> Self {
        let session_header = HeaderName::from_bytes(config.session_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("room-id"));

        Self {
            session_header,
            register_path: config.register_path.clone(),
            unregister_path: config.unregister_path.clone(),
            end_session_path: config.end_session_path.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Endpoint {
        if path == self.register_path {
            Endpoint::Register
        } else if path == self.unregister_path {
            Endpoint::Unregister
        } else if path == self.end_session_path {
            Endpoint::EndSession
        } else {
            Endpoint::Select
        }
    }
}

/// Everything a request handler needs, shared across connections.
pub(crate) struct HandlerContext {
    pub(crate) router: Arc<SessionRouter>,
    pub(crate) routes: Routes,
    pub(crate) metrics: MetricsCollector,
}

/// Handle one front end request.
#[instrument(skip_all, fields(
    request_id = %request_id,
    method = %req.method(),
    path = %req.uri().path(),
))]
pub(crate) async fn handle_request<B>(
    req: Request<B>,
    ctx: Arc<HandlerContext>,
    request_id: RequestId,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let endpoint = ctx.routes.endpoint(req.uri().path());

    let result = match endpoint {
        Endpoint::Register => require_post(&req).and_then(|()| register(&req, &ctx.router)),
        Endpoint::Unregister => require_post(&req).and_then(|()| unregister(&req, &ctx.router)),
        Endpoint::EndSession => require_post(&req)
            .and_then(|()| end_session(&req, &ctx.routes.session_header, &ctx.router)),
        Endpoint::Select => select(&req, &ctx.routes.session_header, &ctx.router),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, status = %e.status(), "request rejected");
            text_response(e.status(), format!("{}\n", e))
        }
    };

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let route = if endpoint == Endpoint::Select {
        RouteKind::Select
    } else {
        RouteKind::Control
    };
    ctx.metrics.record_request(route, start.elapsed());

    Ok(response)
}

fn require_post<B>(req: &Request<B>) -> Result<(), RequestError> {
    if req.method() == Method::POST {
        Ok(())
    } else {
        Err(RequestError::MethodNotAllowed(req.method().clone()))
    }
}

fn register<B>(req: &Request<B>, router: &SessionRouter) -> Result<Response<Full<Bytes>>, RequestError> {
    let address = backend_address(req)?;
    if !router.register(address) {
        return Err(RequestError::AlreadyRegistered(address));
    }
    Ok(text_response(StatusCode::OK, format!("registered {}\n", address)))
}

fn unregister<B>(req: &Request<B>, router: &SessionRouter) -> Result<Response<Full<Bytes>>, RequestError> {
    let address = backend_address(req)?;
    if !router.unregister(address) {
        return Err(RequestError::UnknownBackend(address));
    }
    Ok(text_response(StatusCode::OK, format!("unregistered {}\n", address)))
}

fn end_session<B>(
    req: &Request<B>,
    header: &HeaderName,
    router: &SessionRouter,
) -> Result<Response<Full<Bytes>>, RequestError> {
    let session_id = session_id(req, header)?;
    if !router.end_session(session_id) {
        return Err(RequestError::UnknownSession(session_id.to_string()));
    }
    Ok(text_response(StatusCode::OK, format!("ended {}\n", session_id)))
}

fn select<B>(
    req: &Request<B>,
    header: &HeaderName,
    router: &SessionRouter,
) -> Result<Response<Full<Bytes>>, RequestError> {
    let session_id = session_id(req, header)?;

    let Some(address) = router.select(session_id).address() else {
        return Err(RequestError::NoBackendsAvailable);
    };

    let mut response = text_response(StatusCode::OK, format!("{}\n", address));
    if let Ok(value) = HeaderValue::from_str(&address.to_string()) {
        response.headers_mut().insert(SELECTED_BACKEND_HEADER, value);
    }
    Ok(response)
}

/// Extract the backend address from the `address` query parameter.
fn backend_address<B>(req: &Request<B>) -> Result<SocketAddr, RequestError> {
    let query = req.uri().query().unwrap_or_default();
    let raw = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == ADDRESS_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or(RequestError::MissingAddress)?;

    raw.trim().parse().map_err(|_| {
        warn!(address = %raw, "rejecting unparseable backend address");
        RequestError::InvalidAddress(raw)
    })
}

/// Extract the session id from the configured header.
fn session_id<'a, B>(req: &'a Request<B>, header: &HeaderName) -> Result<&'a str, RequestError> {
    let value = req
        .headers()
        .get(header)
        .ok_or_else(|| RequestError::MissingSession(header.clone()))?;
    let session_id = value
        .to_str()
        .map_err(|_| RequestError::InvalidSession(header.clone()))?
        .trim();

    if session_id.is_empty() {
        return Err(RequestError::MissingSession(header.clone()));
    }
    Ok(session_id)
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain"),
    );
    response
}
