//! `expecto` is a standalone HTTP expectation server.
//!
//! Clients register *expectations* over an admin API. Each expectation pairs a request matcher
//! with a canned response. Every other request that reaches the server is answered with the
//! response of the best matching expectation, or with an empty `404` if nothing matches.
//!
//! # Matching
//! A matcher declares optional predicates for the method, path, headers, query parameters,
//! cookies and body of a request. All declared predicates must hold. Paths and values can be
//! matched exactly, by a regular expression that must match the whole value, or by a glob
//! pattern in which `*` does not cross `/`.
//!
//! When several expectations match, the one with the highest `priority` wins. Among equal
//! priorities the most recently registered expectation wins. An expectation limited by
//! `times.remainingTimes` is removed once it is used up.
//!
//! # Admin API
//! The admin API lives under `/mockserver/` on the primary port and, optionally, on a dedicated
//! admin port:
//!
//! | Route                     | Methods   | Effect                                          |
//! |---------------------------|-----------|-------------------------------------------------|
//! | `/mockserver/expectation` | PUT, POST | registers one expectation or an array (`201`)   |
//! | `/mockserver/clear`       | PUT       | removes all or filtered expectations            |
//! | `/mockserver/reset`       | PUT       | removes all expectations                        |
//! | `/mockserver/retrieve`    | PUT, GET  | lists active expectations in match order        |
//! | `/mockserver/status`      | PUT, GET  | reports the bound ports                         |
//!
//! ```json
//! {
//!   "httpRequest": { "method": "GET", "path": "/view/cart",
//!                    "queryStringParameters": { "cartId": "055CA455-1DF7-45BB-8535-4F83E7266092" } },
//!   "httpResponse": { "statusCode": 200, "body": "some_response_body" }
//! }
//! ```
//!
//! # Embedding
//! ```no_run
//! use expecto::{ExpectationDefinition, RequestMatcher, ResponseTemplate, ServerBuilder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = ServerBuilder::new().build()?.start().await?;
//!
//! server.store().add(ExpectationDefinition::new(
//!     RequestMatcher {
//!         method: Some("GET".into()),
//!         path: Some("/view/cart".into()),
//!         ..Default::default()
//!     },
//!     ResponseTemplate::with_body("some_response_body"),
//! ))?;
//!
//! let url = server.url("/view/cart");
//! // ... send requests to `url` ...
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Standalone mode
//! With the `standalone` feature the crate builds the `expecto` binary. It is configured with
//! command line arguments or `EXPECTO_*` environment variables and shuts down gracefully on
//! Ctrl-C.

mod api;
mod common;
mod server;

pub use common::data::{
    ActiveExpectation, BodyPattern, ClearFilter, ClearResult, ErrorResponse,
    ExpectationDefinition, HttpRequest, NameValuePair, PreparedResponse, RequestMatcher,
    ResponseBody, ResponseTemplate, StatusResponse, Times, ValidationError, ValuePattern,
};
pub use server::{
    builder::{Error as BuilderError, ServerBuilder},
    matchers::{matches, CompiledMatcher},
    persistence::{deserialize_expectations, Error as PersistenceError},
    state::{Error as StoreError, ExpectationStore},
    Error as ServerError, ExpectationServer, HandlerError, ListenerState, ServerConfig,
    ServerHandle, ADMIN_PATH_PREFIX,
};

#[cfg(feature = "remote")]
pub use api::{ClientError, ExpectationClient};
