//! Server assembly: runtime configuration, listener, and the engine
//! shared by every connection coroutine.
//!
//! `T` scheduler threads poll one shared coroutine runtime. The listener
//! runs in its own coroutine and spawns a fresh connection coroutine per
//! accepted socket; every blocking network call inside those coroutines
//! is a cooperative suspension point. `SIGINT`/`SIGTERM` flip a shutdown
//! flag, wake the acceptor, and [`Server::run`] returns.

pub mod conn;
pub mod request;
pub mod response;

pub use request::{read_request, HttpRequest};
pub use response::{HttpResponse, ResponseHandle};

use crate::config::{ServerConfig, MIN_STACK_SIZE};
use crate::db::DbPool;
use crate::router::Router;
use crate::session::SessionStore;
use may::net::TcpListener;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, trace};

/// Shared state every request resolves against.
pub struct Engine {
    pub name: String,
    pub sessions: SessionStore,
    pub pool: Option<DbPool>,
    pub(crate) routes: Router,
    pub(crate) ws_routes: Router,
    pub(crate) payload_limit: usize,
    pub(crate) read_timeout: Duration,
}

/// An HTTP/WebSocket server ready to start.
pub struct Server {
    config: ServerConfig,
    routes: Router,
    ws_routes: Router,
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: may::coroutine::JoinHandle<()>,
}

impl Server {
    pub fn new(config: ServerConfig, routes: Router, ws_routes: Router) -> Self {
        Server {
            config,
            routes,
            ws_routes,
        }
    }

    /// Bind the listener and start accepting.
    ///
    /// Fatal conditions (bind/listen failure, database pool
    /// initialization failure) surface here as errors.
    pub fn start(self) -> io::Result<ServerHandle> {
        let config = self.config;
        may::config().set_workers(config.thread_num.max(1));
        may::config().set_stack_size(config.stack_size.max(MIN_STACK_SIZE));

        let pool = if config.conn_str.is_empty() {
            None
        } else {
            match DbPool::connect(&config.conn_str, config.conn_num) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    error!(error = %e, "db connection initialization failed");
                    return Err(io::Error::other(e));
                }
            }
        };

        let engine = Arc::new(Engine {
            name: config.name.clone(),
            sessions: SessionStore::new(),
            pool,
            routes: self.routes,
            ws_routes: self.ws_routes,
            payload_limit: config.payload_limit,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        });

        let listener = TcpListener::bind(("0.0.0.0", config.port))?;
        let addr = listener.local_addr()?;
        info!(
            addr = %addr,
            threads = config.thread_num,
            routes = engine.routes.len(),
            ws_routes = engine.ws_routes.len(),
            "listener started"
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_shutdown = shutdown.clone();
        let handle = unsafe {
            may::coroutine::spawn(move || accept_loop(listener, engine, accept_shutdown))
        };
        Ok(ServerHandle {
            addr,
            shutdown,
            handle,
        })
    }

    /// Start the server and block until `SIGINT`/`SIGTERM`.
    pub fn run(self) -> io::Result<()> {
        let name = self.config.name.clone();
        let handle = self.start()?;

        let shutdown = handle.shutdown.clone();
        let addr = handle.addr;
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            // Wake the acceptor so it observes the flag.
            let _ = std::net::TcpStream::connect(addr);
        })
        .map_err(io::Error::other)?;

        info!("{name} started");
        handle
            .join()
            .map_err(|e| io::Error::other(format!("listener failed: {e:?}")))?;
        info!("exiting {name}");
        Ok(())
    }
}

impl ServerHandle {
    /// The bound address; useful with port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the listener answers TCP connects.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if std::net::TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting and join the listener coroutine. Connections in
    /// flight finish on their own coroutines.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = std::net::TcpStream::connect(self.addr);
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
    }

    /// Wait for the listener coroutine to finish.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

fn accept_loop(listener: TcpListener, engine: Arc<Engine>, shutdown: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                trace!("listener accepted a connection");
                let engine = engine.clone();
                let _ = unsafe {
                    may::coroutine::spawn(move || conn::serve_connection(engine, stream))
                };
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
    info!("listener stopped");
}
