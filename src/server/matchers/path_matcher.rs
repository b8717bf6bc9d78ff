use crate::{
    common::data::{HttpRequest, ValidationError, ValuePattern},
    server::matchers::{patterns::CompiledPattern, Matcher},
};

/// Matches the request path. The query string is never part of the compared value.
pub(crate) struct PathMatcher {
    pattern: CompiledPattern,
}

impl PathMatcher {
    pub(crate) fn new(pattern: &ValuePattern, field: &str) -> Result<Self, ValidationError> {
        if let ValuePattern::Exact(path) = pattern {
            if path.contains('?') {
                return Err(ValidationError::new(
                    field,
                    "path must not contain a query string, use queryStringParameters instead",
                ));
            }
        }

        Ok(PathMatcher {
            pattern: CompiledPattern::compile(pattern, field)?,
        })
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        self.pattern.is_match(&req.path)
    }
}
