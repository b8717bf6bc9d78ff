use crate::{
    common::data::{
        ClearFilter, ClearResult, Error as DataError, ErrorResponse, ExpectationDefinition,
        HttpRequest, RequestMatcher, StatusResponse,
    },
    server::{
        handler::Error::{
            RequestBodyDeserializeError, RequestConversionError, ResponseBodyConversionError,
            ResponseBodySerializeError, RouteNotFound, StateManagerError,
        },
        state,
        state::StateManager,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use path_tree::PathTree;
use serde::{
    de::{DeserializeOwned, Error as _},
    Serialize,
};
use serde_json::Value;
use std::{convert::TryFrom, sync::Arc};
use thiserror::Error;

/// All admin routes live below this path on the primary port.
pub const ADMIN_PATH_PREFIX: &str = "/mockserver";

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot deserialize request body: {0}")]
    RequestBodyDeserializeError(serde_json::Error),
    #[error("cannot serialize response body: {0}")]
    ResponseBodySerializeError(serde_json::Error),
    #[error("cannot convert response body: {0}")]
    ResponseBodyConversionError(http::Error),
    #[error("cannot modify state: {0}")]
    StateManagerError(#[from] state::Error),
    #[error("cannot convert request to internal data structure: {0}")]
    RequestConversionError(String),
    #[error("no admin route for {0} {1}")]
    RouteNotFound(Method, String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestBodyDeserializeError(_)
            | RequestConversionError(_)
            | StateManagerError(state::Error::InvalidExpectation(_)) => StatusCode::BAD_REQUEST,
            RouteNotFound(_, _) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the connection must not be reused after the error response.
    pub fn closes_connection(&self) -> bool {
        matches!(self, RequestConversionError(_)) || self.status_code().is_server_error()
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        match err {
            StateManagerError(state::Error::InvalidExpectation(validation)) => validation.into(),
            _ => ErrorResponse::new(err),
        }
    }
}

enum RoutePath {
    Expectation,
    Clear,
    Reset,
    Retrieve,
    Status,
}

#[async_trait]
pub(crate) trait Handler {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

pub struct ExpectationHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    path_tree: PathTree<RoutePath>,
    state: Arc<S>,
    ports: Vec<u16>,
    admin_only: bool,
}

#[async_trait]
impl<S> Handler for ExpectationHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        tracing::trace!("Routing incoming request: {:?}", req);

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if let Some((matched_path, _)) = self.path_tree.find(&path) {
            match matched_path {
                RoutePath::Expectation => match method {
                    Method::PUT | Method::POST => return self.handle_add_expectations(req),
                    _ => {}
                },
                RoutePath::Clear => match method {
                    Method::PUT => return self.handle_clear(req),
                    _ => {}
                },
                RoutePath::Reset => match method {
                    Method::PUT => return self.handle_reset(),
                    _ => {}
                },
                RoutePath::Retrieve => match method {
                    Method::PUT | Method::GET => return self.handle_retrieve(req),
                    _ => {}
                },
                RoutePath::Status => match method {
                    Method::PUT | Method::GET => return self.handle_status(),
                    _ => {}
                },
            }
        }

        if self.admin_only || is_admin_path(&path) {
            return Err(RouteNotFound(method, path));
        }

        self.serve_expectation(req).await
    }
}

impl<S> ExpectationHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    /// Creates a handler. `ports` is reported by the status route. An `admin_only` handler
    /// answers every non-admin request with `404` instead of consulting the store.
    pub fn new(state: Arc<S>, ports: Vec<u16>, admin_only: bool) -> Self {
        let mut path_tree: PathTree<RoutePath> = PathTree::new();
        #[allow(unused_must_use)]
        {
            path_tree.insert("/mockserver/expectation", RoutePath::Expectation);
            path_tree.insert("/mockserver/clear", RoutePath::Clear);
            path_tree.insert("/mockserver/reset", RoutePath::Reset);
            path_tree.insert("/mockserver/retrieve", RoutePath::Retrieve);
            path_tree.insert("/mockserver/status", RoutePath::Status);
        }

        Self {
            path_tree,
            state,
            ports,
            admin_only,
        }
    }

    fn handle_add_expectations(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let payload: Value = parse_json_body(&req)?;

        if payload.is_array() {
            let definitions: Vec<ExpectationDefinition> =
                serde_json::from_value(payload).map_err(RequestBodyDeserializeError)?;
            let active = self.state.add_all(definitions)?;
            return response(StatusCode::CREATED, Some(active));
        }

        let definition: ExpectationDefinition =
            serde_json::from_value(payload).map_err(RequestBodyDeserializeError)?;
        let active = self.state.add(definition)?;
        response(StatusCode::CREATED, Some(active))
    }

    fn handle_clear(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let filter = parse_filter(req.body())?;
        let removed = self.state.clear(filter.as_ref())?;
        response(StatusCode::OK, Some(ClearResult { removed }))
    }

    fn handle_reset(&self) -> Result<Response<Bytes>, Error> {
        self.state.reset()?;
        response::<()>(StatusCode::OK, None)
    }

    fn handle_retrieve(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let filter = parse_filter(req.body())?;
        let expectations = self.state.retrieve(filter.as_ref())?;
        response(StatusCode::OK, Some(expectations))
    }

    fn handle_status(&self) -> Result<Response<Bytes>, Error> {
        response(
            StatusCode::OK,
            Some(StatusResponse {
                ports: self.ports.clone(),
            }),
        )
    }

    async fn serve_expectation(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let internal_request = HttpRequest::try_from(&req)
            .map_err(|err: DataError| RequestConversionError(err.to_string()))?;

        let prepared = match self.state.claim(&internal_request)? {
            Some(prepared) => prepared,
            None => return response::<()>(StatusCode::NOT_FOUND, None),
        };

        let mut res = Response::new(prepared.body);
        *res.status_mut() = prepared.status;
        for (name, value) in prepared.headers {
            res.headers_mut().append(name, value);
        }

        if let Some(delay) = prepared.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(res)
    }
}

fn is_admin_path(path: &str) -> bool {
    path == ADMIN_PATH_PREFIX
        || path
            .strip_prefix(ADMIN_PATH_PREFIX)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// Parses the optional filter of the clear and retrieve routes. An empty body selects
/// everything.
fn parse_filter(body: &Bytes) -> Result<Option<ClearFilter>, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_slice(body).map_err(RequestBodyDeserializeError)?;

    if let Some(fields) = value.as_object() {
        match (fields.len(), fields.get("id")) {
            (1, Some(Value::String(id))) => return Ok(Some(ClearFilter::Id(id.clone()))),
            (_, Some(_)) => {
                return Err(RequestBodyDeserializeError(serde_json::Error::custom(
                    "`id` must be a string and cannot be combined with other filter fields",
                )))
            }
            _ => {}
        }
    }

    let nested = value
        .as_object_mut()
        .and_then(|fields| fields.remove("httpRequest"));
    let matcher = nested.unwrap_or(value);

    let matcher: RequestMatcher =
        serde_json::from_value(matcher).map_err(RequestBodyDeserializeError)?;
    Ok(Some(ClearFilter::Matcher(matcher)))
}

/// Builds the response for a request that could not be handled.
pub(crate) fn error_response(err: &Error) -> Result<Response<Bytes>, Error> {
    let mut res = response(err.status_code(), Some(ErrorResponse::from(err)))?;
    if err.closes_connection() {
        res.headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    Ok(res)
}

fn response<T>(status: StatusCode, body: Option<T>) -> Result<Response<Bytes>, Error>
where
    T: Serialize,
{
    let mut builder = Response::builder().status(status);

    if let Some(body_obj) = body {
        builder = builder.header(header::CONTENT_TYPE, "application/json");

        let body_bytes = serde_json::to_vec(&body_obj).map_err(ResponseBodySerializeError)?;

        return builder
            .body(Bytes::from(body_bytes))
            .map_err(ResponseBodyConversionError);
    }

    builder
        .body(Bytes::new())
        .map_err(ResponseBodyConversionError)
}

fn parse_json_body<T>(req: &Request<Bytes>) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(req.body().as_ref()).map_err(RequestBodyDeserializeError)
}
