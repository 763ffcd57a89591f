use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionCommand, SharedState};
use crate::dashboard::{Stats, STATUS_SEND_FAILED};
use crate::error::Error;
use crate::handler::DashboardHandler;
use crate::machine::ConnectionPhase;
use crate::metrics::Metrics;
use crate::protocol::OutboundMessage;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default channel buffer size
const DEFAULT_CHANNEL_SIZE: usize = 100;

/// Client for the weather streaming endpoint.
///
/// Owns one background connection task that opens the WebSocket, keeps it
/// alive, reconnects with exponential backoff and feeds decoded frames to
/// the [`DashboardHandler`]. The handle gates outbound frames on the
/// connection phase and exposes the dashboard's view of the stream.
///
/// # Thread Safety
///
/// `WeatherClient` is `Send + Sync`; every method can be called from any
/// task. Shared state sits behind `parking_lot::RwLock` and is never held
/// across an await.
pub struct WeatherClient<H: DashboardHandler> {
    handler: Arc<H>,
    config: ClientConfig,
    metrics: Arc<Metrics>,
    shared: Arc<RwLock<SharedState>>,
    command_tx: RwLock<Option<mpsc::Sender<ConnectionCommand>>>,
    task: RwLock<Option<JoinHandle<()>>>,
    /// Serializes start/stop. A tokio Mutex so it can be held across awaits.
    lifecycle_lock: Mutex<()>,
}

impl<H: DashboardHandler> WeatherClient<H> {
    /// Create a client. Nothing connects until [`start`](Self::start).
    pub fn new(config: ClientConfig, handler: H) -> Self {
        let shared = SharedState::new(&config);
        Self {
            handler: Arc::new(handler),
            config,
            metrics: Arc::new(Metrics::new()),
            shared: Arc::new(RwLock::new(shared)),
            command_tx: RwLock::new(None),
            task: RwLock::new(None),
            lifecycle_lock: Mutex::new(()),
        }
    }

    /// Get the metrics for this client
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Get a reference to the handler
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Check if the connection task is alive
    pub fn is_running(&self) -> bool {
        self.task
            .read()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the connection task.
    ///
    /// Dashboard state (city list, subscriptions, counters) starts empty on
    /// every start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the task is already alive.
    pub async fn start(&self) -> Result<(), Error> {
        let _lifecycle_guard = self.lifecycle_lock.lock().await;

        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        info!("Starting weather client for {}", self.config.url);

        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
        *self.shared.write() = SharedState::new(&self.config);

        let connection = Connection::new(
            self.handler.clone(),
            self.config.clone(),
            self.metrics.clone(),
            self.shared.clone(),
            rx,
        );
        let shared = self.shared.clone();
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(async move {
            run_connection_with_recovery(connection, shared, metrics).await;
        });

        *self.command_tx.write() = Some(tx);
        *self.task.write() = Some(handle);
        Ok(())
    }

    /// Close the connection and wait for the task to finish.
    ///
    /// Cancels any pending backoff timer. The client can be started again
    /// afterwards.
    pub async fn stop(&self) -> Result<(), Error> {
        let _lifecycle_guard = self.lifecycle_lock.lock().await;

        let command_tx = self.command_tx.write().take();
        let handle = self.task.write().take();
        let Some(handle) = handle else {
            return Err(Error::NotRunning);
        };

        info!("Stopping weather client");
        if let Some(tx) = command_tx {
            if let Err(e) = tx.send(ConnectionCommand::Close).await {
                debug!("Connection task already gone: {}", e);
            }
        }

        if let Err(e) = handle.await {
            warn!("Connection task did not finish cleanly: {}", e);
        }
        self.shared.write().machine.stop();
        Ok(())
    }

    /// Transmit a frame if (and only if) the connection is open.
    ///
    /// Returns `false` when the frame was dropped. Nothing is queued for
    /// later delivery; the handler is told the send failed.
    pub async fn send(&self, message: OutboundMessage) -> bool {
        match self.try_send(message) {
            Ok(()) => true,
            Err(Error::SendWhileDisconnected) => {
                self.handler
                    .on_connection_status(false, STATUS_SEND_FAILED)
                    .await;
                false
            }
            Err(e) => {
                warn!("Failed to send message: {}", e);
                false
            }
        }
    }

    /// Like [`send`](Self::send) but reports why a frame was dropped
    /// instead of notifying the handler.
    pub fn try_send(&self, message: OutboundMessage) -> Result<(), Error> {
        let command_tx = self.command_tx.read().clone();
        let tx = match command_tx {
            Some(tx) if self.is_connected() => tx,
            _ => {
                warn!("Cannot send {:?} - not connected", message);
                self.metrics.record_dropped_send();
                return Err(Error::SendWhileDisconnected);
            }
        };

        let frame = message.to_message()?;
        tx.try_send(ConnectionCommand::Send(frame)).map_err(|e| {
            self.metrics.record_dropped_send();
            Error::ChannelSend(e.to_string())
        })?;
        debug!("Queued {:?} for the connection task", message);
        Ok(())
    }

    /// Ask the server to start streaming a city
    pub async fn subscribe(&self, city: &str) -> bool {
        info!("Subscribing to {}", city);
        self.send(OutboundMessage::subscribe(city)).await
    }

    /// Ask the server to stop streaming a city
    pub async fn unsubscribe(&self, city: &str) -> bool {
        info!("Unsubscribing from {}", city);
        self.send(OutboundMessage::unsubscribe(city)).await
    }

    /// Subscribe or unsubscribe depending on the confirmed set.
    ///
    /// Only server confirmations change the set, so toggling twice before a
    /// confirmation arrives sends the same request twice.
    pub async fn toggle_subscription(&self, city: &str) -> bool {
        if self.is_subscribed(city) {
            self.unsubscribe(city).await
        } else {
            self.subscribe(city).await
        }
    }

    /// Reconnect now with a fresh attempt counter.
    ///
    /// Returns `Ok(false)` if the client is already connecting or
    /// connected.
    pub async fn reconnect(&self) -> Result<bool, Error> {
        self.trigger(ConnectionCommand::Reconnect).await
    }

    /// The dashboard became visible again; reconnect if not connected.
    ///
    /// Keeps the attempt counter unless reconnection had already given up.
    pub async fn visibility_regained(&self) -> Result<bool, Error> {
        self.trigger(ConnectionCommand::VisibilityRegained).await
    }

    async fn trigger(&self, command: ConnectionCommand) -> Result<bool, Error> {
        let command_tx = self.command_tx.read().clone();
        let tx = command_tx.ok_or(Error::NotRunning)?;

        let phase = self.phase();
        if matches!(phase, ConnectionPhase::Connecting | ConnectionPhase::Connected) {
            debug!("Ignoring {:?} while {}", command, phase);
            return Ok(false);
        }

        tx.send(command)
            .await
            .map_err(|e| Error::ChannelSend(e.to_string()))?;
        Ok(true)
    }

    // ========== State accessors ==========

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.read().machine.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read().machine.is_connected()
    }

    /// Consecutive failed attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.read().machine.reconnect_attempts()
    }

    /// Cities from the latest welcome, in server order
    pub fn available_cities(&self) -> Vec<String> {
        self.shared.read().dashboard.available_cities().to_vec()
    }

    /// Confirmed subscriptions, in server order
    pub fn subscribed_cities(&self) -> Vec<String> {
        self.shared.read().dashboard.subscribed_cities()
    }

    pub fn is_subscribed(&self, city: &str) -> bool {
        self.shared.read().dashboard.is_subscribed(city)
    }

    pub fn stats(&self) -> Stats {
        self.shared.read().dashboard.stats()
    }
}

/// Run connection with panic recovery
async fn run_connection_with_recovery<H: DashboardHandler>(
    connection: Connection<H>,
    shared: Arc<RwLock<SharedState>>,
    metrics: Arc<Metrics>,
) {
    match AssertUnwindSafe(connection.run()).catch_unwind().await {
        Ok(Ok(())) => {
            debug!("Connection task completed normally");
        }
        Ok(Err(e)) => {
            warn!("Connection task ended with error: {}", e);
        }
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!("Connection task PANICKED: {}", panic_msg);
            shared.write().machine.stop();
            metrics.record_error();
        }
    }
}

impl<H: DashboardHandler> Drop for WeatherClient<H> {
    fn drop(&mut self) {
        // Abort the task so it does not outlive the handle
        if let Some(handle) = self.task.write().take() {
            handle.abort();
        }
    }
}
