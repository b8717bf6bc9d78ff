use crate::common::data::{HttpRequest, RequestMatcher, ValidationError};

mod body_matcher;
mod key_value_matcher;
mod method_matcher;
mod path_matcher;
pub(crate) mod patterns;
pub(crate) mod sources;

use body_matcher::BodyMatcher;
use key_value_matcher::KeyValueMatcher;
use method_matcher::MethodMatcher;
use path_matcher::PathMatcher;
use sources::KeyValueSource;

/// A single field predicate. All matchers of an expectation must agree for a request to match.
pub(crate) trait Matcher {
    fn matches(&self, req: &HttpRequest) -> bool;
}

/// A [`RequestMatcher`] with all of its patterns compiled. Absent fields contribute no matcher,
/// so an empty `RequestMatcher` matches every request.
pub struct CompiledMatcher {
    matchers: Vec<Box<dyn Matcher + Send + Sync>>,
}

impl CompiledMatcher {
    /// Compiles a matcher. `field` is the wire path of the matcher, used in error messages.
    pub fn compile(def: &RequestMatcher, field: &str) -> Result<Self, ValidationError> {
        let mut matchers: Vec<Box<dyn Matcher + Send + Sync>> = Vec::new();

        if let Some(method) = &def.method {
            matchers.push(Box::new(MethodMatcher::new(
                method,
                &format!("{}.method", field),
            )?));
        }

        if let Some(path) = &def.path {
            matchers.push(Box::new(PathMatcher::new(
                path,
                &format!("{}.path", field),
            )?));
        }

        let key_value_fields = [
            (KeyValueSource::Header, &def.headers),
            (KeyValueSource::QueryParameter, &def.query_string_parameters),
            (KeyValueSource::Cookie, &def.cookies),
        ];

        for (source, entries) in key_value_fields {
            if let Some(entries) = entries {
                let field = format!("{}.{}", field, source.field_name());
                matchers.push(Box::new(KeyValueMatcher::new(source, entries, &field)?));
            }
        }

        if let Some(body) = &def.body {
            matchers.push(Box::new(BodyMatcher::new(body, &format!("{}.body", field))?));
        }

        Ok(CompiledMatcher { matchers })
    }

    pub fn matches(&self, req: &HttpRequest) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// Evaluates a matcher against a request without storing it.
pub fn matches(matcher: &RequestMatcher, req: &HttpRequest) -> Result<bool, ValidationError> {
    Ok(CompiledMatcher::compile(matcher, "httpRequest")?.matches(req))
}
