//! Relay lifecycle: `Stopped → Starting → Running → Stopping → Stopped`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::LifecycleError;
use crate::tls;
use crate::websocket::{distribution_channel, Broadcaster, ConnectionRegistry, DistributionCloser, WebSocketServer};
use crate::{configure_routes, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

enum Listener {
    Tls(rustls::ServerConfig),
    #[cfg(test)]
    Plain(std::net::TcpListener),
}

/// Everything that exists only while the relay is running.
struct Running {
    handle: ServerHandle,
    server_task: JoinHandle<std::io::Result<()>>,
    broadcaster: JoinHandle<u64>,
    closer: DistributionCloser,
    local_addrs: Vec<SocketAddr>,
}

pub struct RelayServer {
    settings: Arc<Settings>,
    registry: Arc<ConnectionRegistry>,
    state: RwLock<LifecycleState>,
    running: Mutex<Option<Running>>,
}

impl RelayServer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(ConnectionRegistry::new()),
            state: RwLock::new(LifecycleState::Stopped),
            running: Mutex::new(None),
        }
    }

    /// The configured listen address.
    pub fn address(&self) -> &str {
        &self.settings.server.address
    }

    /// Addresses actually bound, empty unless running.
    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| running.local_addrs.clone())
            .unwrap_or_default()
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Loads the certificate pair, binds the TLS listener and starts serving.
    /// Returns once the listener is bound; nothing keeps running on failure.
    pub async fn start(&self) -> Result<()> {
        self.transition(LifecycleState::Stopped, LifecycleState::Starting, "start").await?;

        let launched = match tls::load_server_config(&self.settings.tls) {
            Ok(config) => self.launch(Listener::Tls(config)).await,
            Err(e) => Err(e.into()),
        };
        self.finish_start(launched).await
    }

    #[cfg(test)]
    pub(crate) async fn start_plain(&self, listener: std::net::TcpListener) -> Result<()> {
        self.transition(LifecycleState::Stopped, LifecycleState::Starting, "start").await?;
        let launched = self.launch(Listener::Plain(listener)).await;
        self.finish_start(launched).await
    }

    async fn finish_start(&self, launched: Result<Running>) -> Result<()> {
        match launched {
            Ok(running) => {
                info!(address = %self.address(), bound = ?running.local_addrs, "Relay server started");
                *self.running.lock().await = Some(running);
                *self.state.write().await = LifecycleState::Running;
                Ok(())
            }
            Err(e) => {
                error!("Failed to start relay server: {}", e);
                *self.state.write().await = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    async fn launch(&self, listener: Listener) -> Result<Running> {
        let settings = self.settings.clone();
        let relay = &settings.relay;

        let (sender, receiver, closer) = distribution_channel(relay.channel_capacity);
        let ws_server = web::Data::new(WebSocketServer::new(self.registry.clone(), sender, relay));
        let registry = web::Data::from(self.registry.clone());
        let static_dir = settings.server.static_dir.clone();

        let http = HttpServer::new(move || {
            let static_dir = static_dir.clone();
            App::new()
                .app_data(ws_server.clone())
                .app_data(registry.clone())
                .configure(move |cfg| configure_routes(cfg, &static_dir))
        })
        .workers(settings.server.workers as usize)
        .shutdown_timeout(settings.server.shutdown_timeout_secs)
        .disable_signals();

        let address = settings.server.address.clone();
        let http = match listener {
            Listener::Tls(config) => http.bind_rustls_0_23(&address, config),
            #[cfg(test)]
            Listener::Plain(listener) => http.listen(listener),
        }
        .map_err(|source| LifecycleError::Bind { address, source })?;

        let local_addrs = http.addrs();
        let server = http.run();
        let handle = server.handle();

        let broadcaster = Broadcaster::new(self.registry.clone(), receiver, relay.write_timeout()).spawn();
        let server_task = actix_web::rt::spawn(server);

        Ok(Running {
            handle,
            server_task,
            broadcaster,
            closer,
            local_addrs,
        })
    }

    /// Closes the distribution channel, closes every connection, then stops
    /// the HTTP server gracefully. Steps already taken stay taken if a later
    /// one fails; the server always ends up `Stopped`.
    pub async fn stop(&self) -> Result<()> {
        self.transition(LifecycleState::Running, LifecycleState::Stopping, "stop").await?;
        info!("Relay server shutting down");

        let running = self.running.lock().await.take();
        let result = match running {
            Some(running) => self.shutdown(running).await,
            None => Ok(()),
        };

        *self.state.write().await = LifecycleState::Stopped;
        match &result {
            Ok(()) => info!("Relay server stopped"),
            Err(e) => error!("Relay server stopped with error: {}", e),
        }
        result
    }

    async fn shutdown(&self, running: Running) -> Result<()> {
        running.closer.close();
        self.registry.close_all_and_clear().await;

        running.handle.stop(true).await;
        let served = running.server_task.await;
        // Upgrades accepted before the listener stopped may have registered
        // after the first clear.
        self.registry.close_all_and_clear().await;

        match running.broadcaster.await {
            Ok(relayed) => info!(relayed, "Broadcaster drained"),
            Err(e) => warn!("Broadcaster task failed: {}", e),
        }

        match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LifecycleError::Shutdown(e.to_string()).into()),
            Err(e) => Err(LifecycleError::Shutdown(e.to_string()).into()),
        }
    }

    async fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        action: &'static str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(LifecycleError::InvalidState { action, state: *state }.into());
        }
        *state = to;
        Ok(())
    }
}
