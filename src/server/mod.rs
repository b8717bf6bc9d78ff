use crate::server::{
    handler::ExpectationHandler,
    server::{bind, Listener, ListenerConfig},
    state::ExpectationStore,
};
use futures_util::FutureExt;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};

pub mod builder;
mod handler;
pub(crate) mod matchers;
pub mod persistence;
mod server;
pub mod state;

pub use handler::{Error as HandlerError, ADMIN_PATH_PREFIX};
pub use server::{Error, ListenerState};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub admin_port: Option<u16>,
    pub expose: bool,
    pub print_access_log: bool,
    pub drain_timeout: Duration,
}

/// A configured, not yet started expectation server. Create one with
/// [`ServerBuilder`](builder::ServerBuilder).
pub struct ExpectationServer {
    store: Arc<ExpectationStore>,
    config: ServerConfig,
}

impl ExpectationServer {
    pub(crate) fn new(store: Arc<ExpectationStore>, config: ServerConfig) -> Self {
        ExpectationServer { store, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<ExpectationStore> {
        self.store.clone()
    }

    /// Binds all ports and starts serving in the background.
    ///
    /// Binding happens before this returns, so expectations registered through the returned
    /// handle are visible to the first request.
    pub async fn start(self) -> Result<ServerHandle, Error> {
        let host = if self.config.expose {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };

        let (primary_tcp, address) = bind(SocketAddr::new(host, self.config.port)).await?;
        let admin = match self.config.admin_port {
            Some(port) => Some(bind(SocketAddr::new(host, port)).await?),
            None => None,
        };
        let admin_address = admin.as_ref().map(|(_, addr)| *addr);

        let ports: Vec<u16> = std::iter::once(address.port())
            .chain(admin_address.map(|addr| addr.port()))
            .collect();

        let listener_config = || ListenerConfig {
            print_access_log: self.config.print_access_log,
            drain_timeout: self.config.drain_timeout,
        };

        let primary = Listener::new(
            ExpectationHandler::new(self.store.clone(), ports.clone(), false),
            listener_config(),
        );
        let admin = admin.map(|(tcp, _)| {
            let listener = Listener::new(
                ExpectationHandler::new(self.store.clone(), ports.clone(), true),
                listener_config(),
            );
            (listener, tcp)
        });

        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();
        let shutdown = async move {
            // A dropped sender also stops the server.
            let _ = shutdown_receiver.await;
        }
        .shared();

        let (state_sender, state_receiver) = watch::channel(ListenerState::Listening);

        let task = tokio::spawn(async move {
            let primary = primary.run_accept_loop(primary_tcp, shutdown.clone(), &state_sender);

            let results = match admin {
                Some((admin, admin_tcp)) => {
                    let admin = admin.run_accept_loop(admin_tcp, shutdown, &state_sender);
                    let (primary, admin) = tokio::join!(primary, admin);
                    vec![primary, admin]
                }
                None => vec![primary.await],
            };

            for err in results.into_iter().filter_map(Result::err) {
                tracing::error!("listener failed: {}", err);
            }

            state_sender.send_replace(ListenerState::Stopped);
            tracing::info!("Server stopped");
        });

        Ok(ServerHandle {
            address,
            admin_address,
            store: self.store,
            state: state_receiver,
            shutdown: Some(shutdown_sender),
            task: Some(task),
        })
    }
}

/// A running server. Dropping the handle stops the server without waiting for it.
pub struct ServerHandle {
    address: SocketAddr,
    admin_address: Option<SocketAddr>,
    store: Arc<ExpectationStore>,
    state: watch::Receiver<ListenerState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The address of the primary port.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// The address of the dedicated admin port, if one was configured.
    pub fn admin_address(&self) -> Option<SocketAddr> {
        self.admin_address
    }

    /// Builds a URL for `path` on the primary port.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub fn store(&self) -> Arc<ExpectationStore> {
        self.store.clone()
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change of the listeners.
    pub fn state_changes(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    /// Stops accepting connections and waits until open connections are drained or the drain
    /// timeout has elapsed.
    pub async fn shutdown(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!("server task failed: {}", err);
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }
}
