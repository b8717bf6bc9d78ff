use crate::common::data::Error::RequestConversionError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use headers::{Cookie, HeaderMapExt};
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{collections::BTreeMap, convert::TryFrom, fmt, str::FromStr, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cannot convert request to internal structure: {0}")]
    RequestConversionError(String),
}

/// Describes why an expectation could not be accepted. `field` is the dotted path of the
/// offending field in the wire format, e.g. `httpRequest.headers.accept`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new<F: Into<String>, M: ToString>(field: F, message: M) -> Self {
        ValidationError {
            field: field.into(),
            message: message.to_string(),
        }
    }
}

// *************************************************************************************************
// Incoming requests
// *************************************************************************************************

/// A fully buffered HTTP request as it is seen by the matcher engine.
///
/// Header names are stored in lower case. Query parameters are URL-decoded. The path never
/// contains the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    /// Creates a request without headers or body. `target` may contain a query string.
    pub fn new(method: &str, target: &str) -> Self {
        let mut parts = target.splitn(2, '?');
        let path = normalize_path(parts.next().unwrap_or(""));
        let query = parts.next().map(parse_query).unwrap_or_default();

        HttpRequest {
            method: method.to_string(),
            path,
            query,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if name.eq_ignore_ascii_case("cookie") {
            if let Ok(value) = HeaderValue::from_str(value) {
                let mut headers = HeaderMap::new();
                headers.insert(header::COOKIE, value);
                self.cookies.extend(parse_cookies(&headers));
            }
        }
        self.headers.push((name.to_lowercase(), value.to_string()));
        self
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Returns all values of a header. The name is compared case-insensitively.
    pub fn header_values<'a>(&'a self, name: &str) -> Vec<&'a str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

impl TryFrom<&http::Request<Bytes>> for HttpRequest {
    type Error = Error;

    fn try_from(req: &http::Request<Bytes>) -> Result<Self, Self::Error> {
        let headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().map_err(|err| {
                    RequestConversionError(format!("header '{}': {}", name, err))
                })?;
                Ok((name.as_str().to_lowercase(), value.to_string()))
            })
            .collect::<Result<Vec<(String, String)>, Error>>()?;

        let cookies = parse_cookies(req.headers());

        Ok(HttpRequest {
            method: req.method().as_str().to_string(),
            path: normalize_path(req.uri().path()),
            query: req.uri().query().map(parse_query).unwrap_or_default(),
            headers,
            cookies,
            body: req.body().clone(),
        })
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .typed_get::<Cookie>()
        .map(|cookie| {
            cookie
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

// *************************************************************************************************
// Expectations (wire format)
// *************************************************************************************************

/// An expectation as it is sent to the admin API: what to match and what to answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectationDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub http_request: RequestMatcher,
    #[serde(default)]
    pub http_response: ResponseTemplate,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Times>,
}

impl ExpectationDefinition {
    pub fn new(http_request: RequestMatcher, http_response: ResponseTemplate) -> Self {
        ExpectationDefinition {
            http_request,
            http_response,
            ..Default::default()
        }
    }

    /// The number of times this expectation may be used, or `None` if unlimited.
    pub fn remaining_uses(&self) -> Option<usize> {
        match &self.times {
            Some(times) if !times.unlimited => times.remaining_times,
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Times {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_times: Option<usize>,
    #[serde(default)]
    pub unlimited: bool,
}

/// Optional per-field predicates. An absent field matches everything.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ValuePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, ValuePattern>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<BTreeMap<String, ValuePattern>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<BTreeMap<String, ValuePattern>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyPattern>,
}

impl RequestMatcher {
    /// Returns true if every field declared in `filter` is declared identically in this matcher.
    /// Used to select expectations for clearing and retrieval.
    pub fn matches_filter(&self, filter: &RequestMatcher) -> bool {
        fn same<T: PartialEq>(ours: &Option<T>, theirs: &Option<T>) -> bool {
            theirs.is_none() || ours == theirs
        }

        fn includes(
            ours: &Option<BTreeMap<String, ValuePattern>>,
            theirs: &Option<BTreeMap<String, ValuePattern>>,
        ) -> bool {
            match (ours, theirs) {
                (_, None) => true,
                (None, Some(theirs)) => theirs.is_empty(),
                (Some(ours), Some(theirs)) => theirs.iter().all(|(k, v)| ours.get(k) == Some(v)),
            }
        }

        let method_matches = match (&self.method, &filter.method) {
            (_, None) => true,
            (Some(ours), Some(theirs)) => ours.eq_ignore_ascii_case(theirs),
            (None, Some(_)) => false,
        };

        method_matches
            && same(&self.path, &filter.path)
            && includes(&self.headers, &filter.headers)
            && includes(&self.query_string_parameters, &filter.query_string_parameters)
            && includes(&self.cookies, &filter.cookies)
            && same(&self.body, &filter.body)
    }
}

/// A pattern for a path, header, query parameter or cookie value.
///
/// On the wire a plain string is an exact match, otherwise an object with exactly one of the
/// keys `exact`, `regex` or `glob`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePattern {
    Exact(String),
    Regex(String),
    Glob(String),
}

impl From<&str> for ValuePattern {
    fn from(value: &str) -> Self {
        ValuePattern::Exact(value.to_string())
    }
}

impl From<String> for ValuePattern {
    fn from(value: String) -> Self {
        ValuePattern::Exact(value)
    }
}

impl fmt::Display for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePattern::Exact(v) => write!(f, "{}", v),
            ValuePattern::Regex(v) => write!(f, "{} (regex)", v),
            ValuePattern::Glob(v) => write!(f, "{} (glob)", v),
        }
    }
}

impl Serialize for ValuePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ValuePattern::Exact(value) => serializer.serialize_str(value),
            ValuePattern::Regex(value) => single_entry(serializer, "regex", value),
            ValuePattern::Glob(value) => single_entry(serializer, "glob", value),
        }
    }
}

impl<'de> Deserialize<'de> for ValuePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        enum Tagged {
            Exact(String),
            Regex(String),
            Glob(String),
        }

        #[derive(Deserialize)]
        #[serde(untagged, expecting = "a string or an object with one of `exact`, `regex`, `glob`")]
        enum Repr {
            Plain(String),
            Tagged(Tagged),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(v) | Repr::Tagged(Tagged::Exact(v)) => ValuePattern::Exact(v),
            Repr::Tagged(Tagged::Regex(v)) => ValuePattern::Regex(v),
            Repr::Tagged(Tagged::Glob(v)) => ValuePattern::Glob(v),
        })
    }
}

/// A pattern for the request body.
///
/// On the wire a plain string is an exact match, otherwise an object with exactly one of the
/// keys `exact`, `base64`, `regex`, `json` or `jsonPartial`.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyPattern {
    Exact(String),
    Base64(String),
    Regex(String),
    Json(Value),
    JsonPartial(Value),
}

impl From<&str> for BodyPattern {
    fn from(value: &str) -> Self {
        BodyPattern::Exact(value.to_string())
    }
}

impl Serialize for BodyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BodyPattern::Exact(value) => serializer.serialize_str(value),
            BodyPattern::Base64(value) => single_entry(serializer, "base64", value),
            BodyPattern::Regex(value) => single_entry(serializer, "regex", value),
            BodyPattern::Json(value) => single_entry(serializer, "json", value),
            BodyPattern::JsonPartial(value) => single_entry(serializer, "jsonPartial", value),
        }
    }
}

impl<'de> Deserialize<'de> for BodyPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        enum Tagged {
            Exact(String),
            Base64(String),
            Regex(String),
            Json(Value),
            JsonPartial(Value),
        }

        #[derive(Deserialize)]
        #[serde(
            untagged,
            expecting = "a string or an object with one of `exact`, `base64`, `regex`, `json`, `jsonPartial`"
        )]
        enum Repr {
            Plain(String),
            Tagged(Tagged),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(v) | Repr::Tagged(Tagged::Exact(v)) => BodyPattern::Exact(v),
            Repr::Tagged(Tagged::Base64(v)) => BodyPattern::Base64(v),
            Repr::Tagged(Tagged::Regex(v)) => BodyPattern::Regex(v),
            Repr::Tagged(Tagged::Json(v)) => BodyPattern::Json(v),
            Repr::Tagged(Tagged::JsonPartial(v)) => BodyPattern::JsonPartial(v),
        })
    }
}

fn single_entry<S: Serializer, V: Serialize + ?Sized>(
    serializer: S,
    key: &str,
    value: &V,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

// *************************************************************************************************
// Responses
// *************************************************************************************************

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NameValuePair {
    pub name: String,
    pub value: String,
}

impl NameValuePair {
    pub fn new(name: &str, value: &str) -> Self {
        NameValuePair {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged, expecting = "a string or an object with a `base64` key")]
pub enum ResponseBody {
    Text(String),
    Binary { base64: String },
}

/// The response to write when an expectation matches. Headers are written in declared order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResponseTemplate {
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<NameValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
    /// Milliseconds to wait before the response is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

fn default_status_code() -> u16 {
    200
}

impl Default for ResponseTemplate {
    fn default() -> Self {
        ResponseTemplate {
            status_code: default_status_code(),
            headers: Vec::new(),
            body: None,
            delay: None,
        }
    }
}

impl ResponseTemplate {
    pub fn with_body(body: &str) -> Self {
        ResponseTemplate {
            body: Some(ResponseBody::Text(body.to_string())),
            ..Default::default()
        }
    }

    /// Validates the template and converts it into the structures the listener writes.
    pub fn prepare(&self, field: &str) -> Result<PreparedResponse, ValidationError> {
        let status = StatusCode::from_u16(self.status_code)
            .map_err(|err| ValidationError::new(format!("{}.statusCode", field), err))?;

        let headers = self
            .headers
            .iter()
            .enumerate()
            .map(|(idx, pair)| {
                let name = HeaderName::from_str(&pair.name).map_err(|err| {
                    ValidationError::new(format!("{}.headers[{}].name", field, idx), err)
                })?;
                let value = HeaderValue::from_str(&pair.value).map_err(|err| {
                    ValidationError::new(format!("{}.headers[{}].value", field, idx), err)
                })?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let body = match &self.body {
            None => Bytes::new(),
            Some(ResponseBody::Text(text)) => Bytes::from(text.clone()),
            Some(ResponseBody::Binary { base64 }) => Bytes::from(
                BASE64
                    .decode(base64)
                    .map_err(|err| ValidationError::new(format!("{}.body.base64", field), err))?,
            ),
        };

        check_header_layout(&headers, body.len(), field)?;

        Ok(PreparedResponse {
            status,
            headers,
            body,
            delay: self.delay.map(Duration::from_millis),
        })
    }
}

/// Headers are written grouped by name, so repeated names must be adjacent to keep the declared
/// order. A declared `Content-Length` replaces the computed one and has to match the body.
fn check_header_layout(
    headers: &[(HeaderName, HeaderValue)],
    body_len: usize,
    field: &str,
) -> Result<(), ValidationError> {
    let mut content_length_seen = false;

    for (idx, (name, value)) in headers.iter().enumerate() {
        let repeats_previous = idx > 0 && headers[idx - 1].0 == *name;
        if !repeats_previous && headers[..idx].iter().any(|(seen, _)| seen == name) {
            return Err(ValidationError::new(
                format!("{}.headers[{}].name", field, idx),
                format!("header '{}' must directly follow its other values", name),
            ));
        }

        if *name == header::CONTENT_LENGTH {
            if content_length_seen {
                return Err(ValidationError::new(
                    format!("{}.headers[{}].name", field, idx),
                    "content-length must not be declared more than once",
                ));
            }
            content_length_seen = true;

            let declared = value.to_str().ok().and_then(|v| v.trim().parse::<usize>().ok());
            if declared != Some(body_len) {
                return Err(ValidationError::new(
                    format!("{}.headers[{}].value", field, idx),
                    format!("content-length must equal the body size of {} bytes", body_len),
                ));
            }
        }
    }

    Ok(())
}

/// A validated [`ResponseTemplate`], ready to be written to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
    pub delay: Option<Duration>,
}

// *************************************************************************************************
// Admin API payloads
// *************************************************************************************************

/// An expectation as it is held by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExpectation {
    pub id: String,
    pub http_request: RequestMatcher,
    pub http_response: ResponseTemplate,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_times: Option<usize>,
}

/// Selects expectations for the clear and retrieve operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ClearFilter {
    Id(String),
    Matcher(RequestMatcher),
}

impl ClearFilter {
    pub fn selects(&self, expectation: &ActiveExpectation) -> bool {
        match self {
            ClearFilter::Id(id) => &expectation.id == id,
            ClearFilter::Matcher(filter) => expectation.http_request.matches_filter(filter),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClearResult {
    pub removed: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub ports: Vec<u16>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new<T>(message: &T) -> ErrorResponse
    where
        T: ToString,
    {
        ErrorResponse {
            message: message.to_string(),
            field: None,
        }
    }
}

impl From<&ValidationError> for ErrorResponse {
    fn from(err: &ValidationError) -> Self {
        ErrorResponse {
            message: err.message.clone(),
            field: Some(err.field.clone()),
        }
    }
}
