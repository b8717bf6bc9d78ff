use crate::{
    common::data::{BodyPattern, HttpRequest, ValidationError},
    server::matchers::{patterns::anchored_regex, Matcher},
};
use assert_json_diff::{assert_json_matches_no_panic, CompareMode, Config};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use regex::Regex;
use serde_json::Value;

pub(crate) enum BodyMatcher {
    Exact(Bytes),
    Regex(Regex),
    Json(Value),
    JsonPartial(Value),
}

impl BodyMatcher {
    pub(crate) fn new(pattern: &BodyPattern, field: &str) -> Result<Self, ValidationError> {
        Ok(match pattern {
            BodyPattern::Exact(text) => BodyMatcher::Exact(Bytes::from(text.clone())),
            BodyPattern::Base64(encoded) => BodyMatcher::Exact(Bytes::from(
                BASE64
                    .decode(encoded)
                    .map_err(|err| ValidationError::new(format!("{}.base64", field), err))?,
            )),
            BodyPattern::Regex(regex) => {
                BodyMatcher::Regex(anchored_regex(regex, &format!("{}.regex", field))?)
            }
            BodyPattern::Json(value) => BodyMatcher::Json(value.clone()),
            BodyPattern::JsonPartial(value) => BodyMatcher::JsonPartial(value.clone()),
        })
    }
}

impl Matcher for BodyMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        match self {
            BodyMatcher::Exact(expected) => expected == &req.body,
            BodyMatcher::Regex(regex) => std::str::from_utf8(&req.body)
                .map(|body| regex.is_match(body))
                .unwrap_or(false),
            BodyMatcher::Json(expected) => {
                parse_json(&req.body).map_or(false, |actual| &actual == expected)
            }
            BodyMatcher::JsonPartial(expected) => parse_json(&req.body).map_or(false, |actual| {
                let config = Config::new(CompareMode::Inclusive);
                assert_json_matches_no_panic(&actual, expected, config).is_ok()
            }),
        }
    }
}

fn parse_json(body: &Bytes) -> Option<Value> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::trace!("request body is not JSON: {}", err);
            None
        }
    }
}
