use crate::{
    common::data::{HttpRequest, ValidationError},
    server::matchers::Matcher,
};

pub(crate) struct MethodMatcher {
    method: String,
}

impl MethodMatcher {
    pub(crate) fn new(method: &str, field: &str) -> Result<Self, ValidationError> {
        http::Method::from_bytes(method.as_bytes())
            .map_err(|err| ValidationError::new(field, err))?;

        Ok(MethodMatcher {
            method: method.to_string(),
        })
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        self.method.eq_ignore_ascii_case(&req.method)
    }
}
