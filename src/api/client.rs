use crate::common::{
    data::{
        ActiveExpectation, ClearResult, ErrorResponse, ExpectationDefinition, RequestMatcher,
        StatusResponse,
    },
    http::{Error as HttpClientError, ExpectoHttpClient, HttpClient},
};
use bytes::Bytes;
use http::{header, Method, Request, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to send HTTP request: {0}")]
    HttpClientError(#[from] HttpClientError),
    #[error("cannot build request: {0}")]
    RequestBuildError(#[from] http::Error),
    #[error("cannot serialize request body: {0}")]
    SerializeError(serde_json::Error),
    #[error("cannot deserialize response body: {0}")]
    DeserializeError(serde_json::Error),
    #[error("server rejected the request with status {status}: {message}")]
    Rejected {
        status: StatusCode,
        message: String,
        field: Option<String>,
    },
}

/// Talks to the admin API of an expectation server running in another process.
///
/// ```no_run
/// use expecto::{ExpectationClient, ExpectationDefinition, RequestMatcher, ResponseTemplate};
///
/// # async fn run() -> Result<(), expecto::ClientError> {
/// let client = ExpectationClient::new("localhost", 1080);
/// client
///     .upsert(&ExpectationDefinition::new(
///         RequestMatcher {
///             path: Some("/view/cart".into()),
///             ..Default::default()
///         },
///         ResponseTemplate::with_body("some_response_body"),
///     ))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ExpectationClient {
    base_url: String,
    http_client: Arc<dyn HttpClient + Send + Sync + 'static>,
}

impl ExpectationClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base_url(format!("http://{}:{}", host, port))
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::with_base_url(format!("http://{}", addr))
    }

    fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            http_client: Arc::new(ExpectoHttpClient::new()),
        }
    }

    /// Registers an expectation. An expectation with the id of a stored one replaces it.
    pub async fn upsert(
        &self,
        definition: &ExpectationDefinition,
    ) -> Result<ActiveExpectation, Error> {
        self.send(Method::PUT, "/mockserver/expectation", Some(definition))
            .await
    }

    /// Registers several expectations at once. Nothing is stored if one of them is invalid.
    pub async fn upsert_all(
        &self,
        definitions: &[ExpectationDefinition],
    ) -> Result<Vec<ActiveExpectation>, Error> {
        self.send(Method::PUT, "/mockserver/expectation", Some(definitions))
            .await
    }

    /// Removes all expectations, or only those whose matcher declares every field of `filter`
    /// identically. Returns the number of removed expectations.
    pub async fn clear(&self, filter: Option<&RequestMatcher>) -> Result<usize, Error> {
        let body = filter.map(|matcher| json!({ "httpRequest": matcher }));
        let result: ClearResult = self
            .send(Method::PUT, "/mockserver/clear", body.as_ref())
            .await?;
        Ok(result.removed)
    }

    pub async fn clear_by_id(&self, id: &str) -> Result<usize, Error> {
        let result: ClearResult = self
            .send(Method::PUT, "/mockserver/clear", Some(&json!({ "id": id })))
            .await?;
        Ok(result.removed)
    }

    pub async fn reset(&self) -> Result<(), Error> {
        self.send_raw(Method::PUT, "/mockserver/reset", Bytes::new())
            .await?;
        Ok(())
    }

    /// Lists active expectations in the order they are matched.
    pub async fn retrieve(
        &self,
        filter: Option<&RequestMatcher>,
    ) -> Result<Vec<ActiveExpectation>, Error> {
        let body = filter.map(|matcher| json!({ "httpRequest": matcher }));
        self.send(Method::PUT, "/mockserver/retrieve", body.as_ref())
            .await
    }

    pub async fn status(&self) -> Result<StatusResponse, Error> {
        self.send::<(), _>(Method::GET, "/mockserver/status", None)
            .await
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = match body {
            Some(body) => Bytes::from(serde_json::to_vec(body).map_err(Error::SerializeError)?),
            None => Bytes::new(),
        };

        let res_body = self.send_raw(method, path, body).await?;
        serde_json::from_slice(&res_body).map_err(Error::DeserializeError)
    }

    async fn send_raw(&self, method: Method, path: &str, body: Bytes) -> Result<Bytes, Error> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{}{}", self.base_url, path));

        if !body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        let res = self.http_client.send(builder.body(body)?).await?;

        if !res.status().is_success() {
            let status = res.status();
            let (message, field) = match serde_json::from_slice::<ErrorResponse>(res.body()) {
                Ok(err) => (err.message, err.field),
                Err(_) => (String::from_utf8_lossy(res.body()).to_string(), None),
            };
            return Err(Error::Rejected {
                status,
                message,
                field,
            });
        }

        Ok(res.into_body())
    }
}
