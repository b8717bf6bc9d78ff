use crate::common::data::{ValidationError, ValuePattern};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

/// A compiled [`ValuePattern`].
#[derive(Debug, Clone)]
pub(crate) enum CompiledPattern {
    Exact(String),
    Regex(Regex),
    Glob(GlobMatcher),
}

impl CompiledPattern {
    pub(crate) fn compile(pattern: &ValuePattern, field: &str) -> Result<Self, ValidationError> {
        Ok(match pattern {
            ValuePattern::Exact(value) => CompiledPattern::Exact(value.clone()),
            ValuePattern::Regex(value) => CompiledPattern::Regex(anchored_regex(value, field)?),
            ValuePattern::Glob(value) => {
                let glob = GlobBuilder::new(value)
                    .literal_separator(true)
                    .build()
                    .map_err(|err| ValidationError::new(field, err))?;
                CompiledPattern::Glob(glob.compile_matcher())
            }
        })
    }

    pub(crate) fn is_match(&self, value: &str) -> bool {
        match self {
            CompiledPattern::Exact(expected) => expected == value,
            CompiledPattern::Regex(regex) => regex.is_match(value),
            CompiledPattern::Glob(glob) => glob.is_match(value),
        }
    }
}

/// Compiles a regex that has to match the whole input, not just a part of it.
pub(crate) fn anchored_regex(pattern: &str, field: &str) -> Result<Regex, ValidationError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|err| ValidationError::new(field, err))
}
