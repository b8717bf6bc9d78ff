use crate::server::{
    persistence::{self, read_expectation_file},
    state::ExpectationStore,
    ExpectationServer, ServerConfig,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot load initial expectations: {0}")]
    InitFileError(#[from] persistence::Error),
    #[error("the admin port must differ from the primary port {0}")]
    PortConflict(u16),
}

/// Configures an [`ExpectationServer`].
///
/// Every setting has an `_option` variant so that optional command line arguments can be passed
/// through without branching.
#[derive(Default)]
pub struct ServerBuilder {
    port: Option<u16>,
    admin_port: Option<u16>,
    expose: Option<bool>,
    print_access_log: Option<bool>,
    drain_timeout: Option<Duration>,
    init_file: Option<PathBuf>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the primary port. Without a port, a free one is picked when the server starts.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn port_option(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Additionally serves the admin API, and only the admin API, on this port. `0` picks a free
    /// port.
    pub fn admin_port(mut self, port: u16) -> Self {
        self.admin_port = Some(port);
        self
    }

    pub fn admin_port_option(mut self, port: Option<u16>) -> Self {
        self.admin_port = port;
        self
    }

    /// Binds to all interfaces instead of the loopback interface.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }

    pub fn expose_option(mut self, expose: Option<bool>) -> Self {
        self.expose = expose;
        self
    }

    /// Logs one line per served request at info level.
    pub fn print_access_log(mut self, enabled: bool) -> Self {
        self.print_access_log = Some(enabled);
        self
    }

    pub fn print_access_log_option(mut self, enabled: Option<bool>) -> Self {
        self.print_access_log = enabled;
        self
    }

    /// How long open connections may take to finish after shutdown was requested.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    pub fn drain_timeout_option(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// A JSON or YAML file with expectations to register before the server starts.
    pub fn init_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.init_file = Some(path.into());
        self
    }

    pub fn init_file_option<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.init_file = path.map(Into::into);
        self
    }

    /// Builds the server with an empty store.
    pub fn build(self) -> Result<ExpectationServer, Error> {
        self.build_with_store(Arc::new(ExpectationStore::new()))
    }

    /// Builds the server around an existing store, e.g. to share it between servers.
    pub fn build_with_store(self, store: Arc<ExpectationStore>) -> Result<ExpectationServer, Error> {
        if let (Some(port), Some(admin_port)) = (self.port, self.admin_port) {
            if port != 0 && port == admin_port {
                return Err(Error::PortConflict(port));
            }
        }

        if let Some(path) = &self.init_file {
            read_expectation_file(path, store.as_ref())?;
        }

        Ok(ExpectationServer::new(
            store,
            ServerConfig {
                port: self.port.unwrap_or(0),
                admin_port: self.admin_port,
                expose: self.expose.unwrap_or(false),
                print_access_log: self.print_access_log.unwrap_or(false),
                drain_timeout: self.drain_timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT),
            },
        ))
    }
}
