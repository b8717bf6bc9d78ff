use crate::server::{
    handler,
    handler::Handler,
    server::Error::{BufferError, LocalSocketAddrError, SocketBindError},
};
use futures_util::FutureExt;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    server::graceful::GracefulShutdown,
};
use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch, task::JoinSet};

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind to socket addr {0}: {1}")]
    SocketBindError(SocketAddr, io::Error),
    #[error("cannot obtain local address: {0}")]
    LocalSocketAddrError(io::Error),
    #[error("buffering error: {0}")]
    BufferError(hyper::Error),
    #[error("cannot process request: {0}")]
    RouterError(#[from] handler::Error),
}

/// Lifecycle of the listening sockets of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Accepting connections and serving requests.
    Listening,
    /// No longer accepting connections. Open connections finish their current request.
    Draining,
    /// All connections are closed.
    Stopped,
}

pub(crate) struct ListenerConfig {
    pub print_access_log: bool,
    pub drain_timeout: Duration,
}

/// Binds a TCP listener. Port `0` picks a free port.
pub(crate) async fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SocketBindError(addr, e))?;
    let local_addr = listener.local_addr().map_err(LocalSocketAddrError)?;
    Ok((listener, local_addr))
}

/// Serves HTTP/1 connections accepted from one socket, one task per connection.
pub(crate) struct Listener<H>
where
    H: Handler + Send + Sync + 'static,
{
    handler: H,
    config: ListenerConfig,
}

impl<H> Listener<H>
where
    H: Handler + Send + Sync + 'static,
{
    pub fn new(handler: H, config: ListenerConfig) -> Self {
        Listener { handler, config }
    }

    /// Accepts connections until `shutdown` resolves, then drains them.
    ///
    /// The socket is closed before `state` is moved to [`ListenerState::Draining`]. Connections
    /// that are still open after the drain timeout are aborted.
    pub async fn run_accept_loop<F>(
        self,
        listener: TcpListener,
        shutdown: F,
        state: &watch::Sender<ListenerState>,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr().map_err(LocalSocketAddrError)?;
        let drain_timeout = self.config.drain_timeout;
        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        let server = Arc::new(self);
        let graceful = GracefulShutdown::new();
        let mut connection_builder = http1::Builder::new();
        connection_builder
            .timer(TokioTimer::new())
            .auto_date_header(false);
        let mut connections = JoinSet::new();

        tracing::info!("Listening on {}", addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, remote_address)) => {
                            tracing::trace!("new TCP connection from {}", remote_address);

                            let server = server.clone();
                            let connection = connection_builder.serve_connection(
                                TokioIo::new(tcp_stream),
                                service_fn(move |req| server.clone().service(req, remote_address)),
                            );
                            let connection = graceful.watch(connection);

                            connections.spawn(async move {
                                if let Err(err) = connection.await {
                                    tracing::debug!("connection from {} closed: {}", remote_address, err);
                                }
                            });
                        }
                        Err(err) => {
                            tracing::error!("TCP error: {:?}", err);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        drop(listener);
        state.send_replace(ListenerState::Draining);
        tracing::info!(
            "Stopped listening on {}, draining {} connection(s)",
            addr,
            connections.len()
        );

        if tokio::time::timeout(drain_timeout, graceful.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                "Drain timeout of {:?} elapsed on {}, aborting {} connection(s)",
                drain_timeout,
                addr,
                connections.len()
            );
            connections.abort_all();
        }

        while connections.join_next().await.is_some() {}

        Ok(())
    }

    async fn service(
        self: Arc<Self>,
        req: Request<Incoming>,
        remote_address: SocketAddr,
    ) -> Result<Response<Full<Bytes>>, Error> {
        tracing::trace!("New HTTP request received: {}", req.uri());

        let method = req.method().clone();
        let uri = req.uri().clone();

        // A body that cannot be read fails the connection without touching the store.
        let req = buffer_request(req).await.map_err(BufferError)?;

        let res = match self.handler.handle(req).await {
            Ok(res) => res,
            Err(err) => {
                if err.status_code().is_server_error() {
                    tracing::error!("failed to process request: {}", err);
                } else {
                    tracing::debug!("rejected request {} {}: {}", method, uri, err);
                }
                handler::error_response(&err)?
            }
        };

        if self.config.print_access_log {
            tracing::info!(
                "{} \"{} {}\" {} {}",
                remote_address,
                method,
                uri,
                res.status().as_u16(),
                res.body().len()
            );
        }

        Ok(to_service_response(res))
    }
}

async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, body))
}

fn to_service_response(response: Response<Bytes>) -> Response<Full<Bytes>> {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Full::new(body))
}
