use crate::{
    common::data::{HttpRequest, ValidationError, ValuePattern},
    server::matchers::{patterns::CompiledPattern, sources::KeyValueSource, Matcher},
};
use std::collections::BTreeMap;

/// Matches headers, query parameters or cookies. Every declared entry must be present with at
/// least one value that satisfies its pattern. Entries the matcher does not mention are ignored.
pub(crate) struct KeyValueMatcher {
    source: KeyValueSource,
    entries: Vec<(String, CompiledPattern)>,
}

impl KeyValueMatcher {
    pub(crate) fn new(
        source: KeyValueSource,
        entries: &BTreeMap<String, ValuePattern>,
        field: &str,
    ) -> Result<Self, ValidationError> {
        let entries = entries
            .iter()
            .map(|(name, pattern)| {
                if name.is_empty() {
                    return Err(ValidationError::new(field, "name must not be empty"));
                }
                let compiled = CompiledPattern::compile(pattern, &format!("{}.{}", field, name))?;
                Ok((name.clone(), compiled))
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(KeyValueMatcher { source, entries })
    }
}

impl Matcher for KeyValueMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        self.entries.iter().all(|(name, pattern)| {
            self.source
                .values(req, name)
                .iter()
                .any(|value| pattern.is_match(value))
        })
    }
}
