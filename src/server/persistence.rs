use crate::{
    common::data::ExpectationDefinition,
    server::{
        persistence::Error::{DeserializationError, FileReadError},
        state,
        state::StateManager,
    },
};
use serde::Deserialize;
use serde_yaml::{Deserializer, Value as YamlValue};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read expectation file: {0}")]
    FileReadError(String),
    #[error("cannot deserialize expectations: {0}")]
    DeserializationError(String),
    #[error("cannot modify state: {0}")]
    StateError(#[from] state::Error),
}

/// Loads the expectations of a JSON or YAML file into the store. Either all of them are stored
/// or none. Returns the number of stored expectations.
pub fn read_expectation_file<S>(path: &Path, state: &S) -> Result<usize, Error>
where
    S: StateManager + Send + Sync + 'static,
{
    tracing::info!("Loading expectations from '{}'", path.to_string_lossy());

    let content = std::fs::read_to_string(path)
        .map_err(|err| FileReadError(format!("{}: {}", path.to_string_lossy(), err)))?;
    let definitions = deserialize_expectations(&content)?;
    let count = definitions.len();

    state.add_all(definitions)?;

    tracing::info!("Loaded {} expectation(s)", count);
    Ok(count)
}

/// Parses one or more documents. Each document holds a single expectation or a list of them.
/// JSON input is accepted since it is valid YAML.
pub fn deserialize_expectations(content: &str) -> Result<Vec<ExpectationDefinition>, Error> {
    let mut definitions = Vec::new();

    for document in Deserializer::from_str(content) {
        let value =
            YamlValue::deserialize(document).map_err(|err| DeserializationError(err.to_string()))?;

        match value {
            YamlValue::Null => {}
            YamlValue::Sequence(_) => {
                let list: Vec<ExpectationDefinition> = serde_yaml::from_value(value)
                    .map_err(|err| DeserializationError(err.to_string()))?;
                definitions.extend(list);
            }
            _ => {
                let definition: ExpectationDefinition = serde_yaml::from_value(value)
                    .map_err(|err| DeserializationError(err.to_string()))?;
                definitions.push(definition);
            }
        }
    }

    Ok(definitions)
}
