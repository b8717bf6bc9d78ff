use crate::{
    common::data::{
        ActiveExpectation, ClearFilter, ExpectationDefinition, HttpRequest, PreparedResponse,
        ValidationError,
    },
    server::{matchers::CompiledMatcher, state::Error::LockPoisoned},
};
use std::{
    cmp::Reverse,
    sync::{Mutex, MutexGuard},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    InvalidExpectation(#[from] ValidationError),
    #[error("expectation store is unusable because a lock holder panicked")]
    LockPoisoned,
}

struct StoredExpectation {
    active: ActiveExpectation,
    sequence: u64,
    matcher: CompiledMatcher,
    response: PreparedResponse,
}

impl StoredExpectation {
    /// Sort key: higher priority first, then the most recent registration.
    fn order(&self) -> (Reverse<i32>, Reverse<u64>) {
        (Reverse(self.active.priority), Reverse(self.sequence))
    }
}

struct CompiledExpectation {
    definition: ExpectationDefinition,
    remaining_times: Option<usize>,
    matcher: CompiledMatcher,
    response: PreparedResponse,
}

/// Validates a definition. `prefix` is prepended to the field of any validation error.
fn compile(
    definition: ExpectationDefinition,
    prefix: &str,
) -> Result<CompiledExpectation, ValidationError> {
    let matcher =
        CompiledMatcher::compile(&definition.http_request, &format!("{}httpRequest", prefix))?;
    let response = definition
        .http_response
        .prepare(&format!("{}httpResponse", prefix))?;
    let remaining_times = definition.remaining_uses();

    if remaining_times == Some(0) {
        return Err(ValidationError::new(
            format!("{}times.remainingTimes", prefix),
            "must be greater than zero",
        ));
    }

    if definition.id.as_deref() == Some("") {
        return Err(ValidationError::new(format!("{}id", prefix), "must not be empty"));
    }

    Ok(CompiledExpectation {
        definition,
        remaining_times,
        matcher,
        response,
    })
}

#[derive(Default)]
struct ExpectationStoreState {
    next_id: u64,
    next_sequence: u64,
    expectations: Vec<StoredExpectation>,
}

impl ExpectationStoreState {
    fn insert(&mut self, compiled: CompiledExpectation) -> ActiveExpectation {
        let CompiledExpectation {
            definition,
            remaining_times,
            matcher,
            response,
        } = compiled;

        let id = match definition.id {
            Some(id) => {
                let before = self.expectations.len();
                self.expectations.retain(|e| e.active.id != id);
                if self.expectations.len() != before {
                    tracing::debug!("Replacing expectation with id={}", id);
                }
                id
            }
            None => loop {
                self.next_id += 1;
                let id = self.next_id.to_string();
                if !self.expectations.iter().any(|e| e.active.id == id) {
                    break id;
                }
            },
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let active = ActiveExpectation {
            id,
            http_request: definition.http_request,
            http_response: definition.http_response,
            priority: definition.priority,
            remaining_times,
        };

        tracing::debug!("Adding new expectation with id={}", active.id);

        self.expectations.push(StoredExpectation {
            active: active.clone(),
            sequence,
            matcher,
            response,
        });

        active
    }

    /// Indexes of all expectations matching `req`, in the order they are tried.
    fn matching_indexes(&self, req: &HttpRequest) -> Vec<usize> {
        let mut indexes: Vec<usize> = self
            .expectations
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matcher.matches(req))
            .map(|(idx, _)| idx)
            .collect();

        indexes.sort_by_key(|idx| self.expectations[*idx].order());
        indexes
    }

    fn sorted(&self) -> Vec<&StoredExpectation> {
        let mut all: Vec<&StoredExpectation> = self.expectations.iter().collect();
        all.sort_by_key(|e| e.order());
        all
    }
}

pub(crate) trait StateManager {
    fn add(&self, definition: ExpectationDefinition) -> Result<ActiveExpectation, Error>;
    fn add_all(
        &self,
        definitions: Vec<ExpectationDefinition>,
    ) -> Result<Vec<ActiveExpectation>, Error>;
    fn find_matches(&self, req: &HttpRequest) -> Result<Vec<ActiveExpectation>, Error>;
    fn claim(&self, req: &HttpRequest) -> Result<Option<PreparedResponse>, Error>;
    fn clear(&self, filter: Option<&ClearFilter>) -> Result<usize, Error>;
    fn retrieve(&self, filter: Option<&ClearFilter>) -> Result<Vec<ActiveExpectation>, Error>;
    fn reset(&self) -> Result<(), Error>;
}

/// The process-wide set of expectations, shared by all connections of a server.
///
/// Every operation runs in a single critical section and returns owned snapshots, so the lock is
/// never held while a response is written.
#[derive(Default)]
pub struct ExpectationStore {
    state: Mutex<ExpectationStoreState>,
}

impl ExpectationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ExpectationStoreState>, Error> {
        self.state.lock().map_err(|_| LockPoisoned)
    }

    /// Validates and stores an expectation. An expectation that reuses the id of a stored one
    /// replaces it.
    pub fn add(&self, definition: ExpectationDefinition) -> Result<ActiveExpectation, Error> {
        StateManager::add(self, definition)
    }

    /// Stores several expectations at once. Nothing is stored if any of them is invalid.
    pub fn add_all(
        &self,
        definitions: Vec<ExpectationDefinition>,
    ) -> Result<Vec<ActiveExpectation>, Error> {
        StateManager::add_all(self, definitions)
    }

    /// All expectations matching the request, in the order they would be used.
    pub fn find_matches(&self, req: &HttpRequest) -> Result<Vec<ActiveExpectation>, Error> {
        StateManager::find_matches(self, req)
    }

    /// Picks the expectation that answers `req`, uses it up once and returns its response.
    pub fn claim(&self, req: &HttpRequest) -> Result<Option<PreparedResponse>, Error> {
        StateManager::claim(self, req)
    }

    /// Removes the expectations selected by `filter`, or all of them. Returns how many were
    /// removed.
    pub fn clear(&self, filter: Option<&ClearFilter>) -> Result<usize, Error> {
        StateManager::clear(self, filter)
    }

    pub fn retrieve(&self, filter: Option<&ClearFilter>) -> Result<Vec<ActiveExpectation>, Error> {
        StateManager::retrieve(self, filter)
    }

    pub fn reset(&self) -> Result<(), Error> {
        StateManager::reset(self)
    }
}

impl StateManager for ExpectationStore {
    fn add(&self, definition: ExpectationDefinition) -> Result<ActiveExpectation, Error> {
        let compiled = compile(definition, "")?;
        let mut state = self.lock()?;
        Ok(state.insert(compiled))
    }

    fn add_all(
        &self,
        definitions: Vec<ExpectationDefinition>,
    ) -> Result<Vec<ActiveExpectation>, Error> {
        let compiled = definitions
            .into_iter()
            .enumerate()
            .map(|(idx, def)| compile(def, &format!("[{}].", idx)))
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let mut state = self.lock()?;
        Ok(compiled.into_iter().map(|c| state.insert(c)).collect())
    }

    fn find_matches(&self, req: &HttpRequest) -> Result<Vec<ActiveExpectation>, Error> {
        let state = self.lock()?;

        Ok(state
            .matching_indexes(req)
            .into_iter()
            .map(|idx| state.expectations[idx].active.clone())
            .collect())
    }

    fn claim(&self, req: &HttpRequest) -> Result<Option<PreparedResponse>, Error> {
        let mut state = self.lock()?;

        let idx = match state.matching_indexes(req).into_iter().next() {
            Some(idx) => idx,
            None => {
                tracing::debug!(
                    "Could not match any expectation to request {} {}",
                    req.method,
                    req.path
                );
                return Ok(None);
            }
        };

        let stored = &mut state.expectations[idx];
        let response = stored.response.clone();

        tracing::debug!(
            "Matched expectation with id={} to request {} {}",
            stored.active.id,
            req.method,
            req.path
        );

        if let Some(remaining) = stored.active.remaining_times.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                let removed = state.expectations.remove(idx);
                tracing::debug!("Expectation with id={} is used up", removed.active.id);
            }
        }

        Ok(Some(response))
    }

    fn clear(&self, filter: Option<&ClearFilter>) -> Result<usize, Error> {
        let mut state = self.lock()?;

        let before = state.expectations.len();
        match filter {
            None => state.expectations.clear(),
            Some(filter) => state.expectations.retain(|e| !filter.selects(&e.active)),
        }
        let removed = before - state.expectations.len();

        tracing::debug!("Cleared {} expectation(s)", removed);

        Ok(removed)
    }

    fn retrieve(&self, filter: Option<&ClearFilter>) -> Result<Vec<ActiveExpectation>, Error> {
        let state = self.lock()?;

        Ok(state
            .sorted()
            .into_iter()
            .filter(|e| filter.map_or(true, |f| f.selects(&e.active)))
            .map(|e| e.active.clone())
            .collect())
    }

    fn reset(&self) -> Result<(), Error> {
        self.clear(None)?;
        tracing::trace!("Expectation store reset");
        Ok(())
    }
}
