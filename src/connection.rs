use crate::config::ClientConfig;
use crate::dashboard::{DashboardEvent, DashboardState, STATUS_CONNECTED, STATUS_STOPPED};
use crate::error::Error;
use crate::handler::{deliver, DashboardHandler};
use crate::keepalive::KeepaliveMonitor;
use crate::machine::{FailureOutcome, ReconnectMachine};
use crate::metrics::Metrics;
use crate::protocol::{InboundMessage, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::client::IntoClientRequest, tungstenite::Message,
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Commands that can be sent to the connection task
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Transmit a frame (dropped if the transport is not open)
    Send(Message),
    /// Manual reconnect
    Reconnect,
    /// The dashboard became visible again
    VisibilityRegained,
    /// Gracefully close the connection and end the task
    Close,
}

/// State shared between the connection task and the client handle.
///
/// Only the connection task mutates it; the handle reads it for `send`
/// gating and accessors. Never held across an await.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) machine: ReconnectMachine,
    pub(crate) dashboard: DashboardState,
}

impl SharedState {
    pub(crate) fn new(config: &ClientConfig) -> Self {
        Self {
            machine: ReconnectMachine::new(config.max_reconnect_attempts, config.backoff.clone()),
            dashboard: DashboardState::new(),
        }
    }
}

/// What woke the task while no transport was open
enum Wake {
    Connect,
    Stop,
}

/// Owns the WebSocket and drives the reconnect state machine
pub(crate) struct Connection<H: DashboardHandler> {
    handler: Arc<H>,
    config: ClientConfig,
    metrics: Arc<Metrics>,
    shared: Arc<RwLock<SharedState>>,
    command_rx: mpsc::Receiver<ConnectionCommand>,
}

impl<H: DashboardHandler> Connection<H> {
    pub(crate) fn new(
        handler: Arc<H>,
        config: ClientConfig,
        metrics: Arc<Metrics>,
        shared: Arc<RwLock<SharedState>>,
        command_rx: mpsc::Receiver<ConnectionCommand>,
    ) -> Self {
        Self {
            handler,
            config,
            metrics,
            shared,
            command_rx,
        }
    }

    /// Run the connection loop (reconnects on failure) until closed
    pub(crate) async fn run(mut self) -> Result<(), Error> {
        if !self.shared.write().machine.begin_connect() {
            warn!("Connection task started while not disconnected");
        }

        loop {
            let err = match self.connect_and_run().await {
                Ok(()) => {
                    self.finish().await;
                    return Ok(());
                }
                Err(e) => e,
            };
            self.metrics.record_error();

            let outcome = self.shared.write().machine.on_failure();
            let wake = match outcome {
                FailureOutcome::Retry { attempt, delay } => {
                    self.metrics.record_reconnect_attempt();
                    warn!(
                        "Connection lost: {} (reconnecting in {:?}, attempt {}/{})",
                        err, delay, attempt, self.config.max_reconnect_attempts
                    );
                    self.notify(DashboardEvent::status(
                        false,
                        format!("Disconnected - Attempting to reconnect in {:?}...", delay),
                    ))
                    .await;
                    self.wait_for_backoff(delay).await
                }
                FailureOutcome::Exhausted { attempts } => {
                    self.metrics.record_reconnect_exhausted();
                    error!(
                        "{} (max {}), last error: {}",
                        Error::ReconnectExhausted { attempts },
                        self.config.max_reconnect_attempts,
                        err
                    );
                    self.notify(DashboardEvent::status(
                        false,
                        format!(
                            "Connection failed after {} attempts - reconnect manually",
                            attempts
                        ),
                    ))
                    .await;
                    self.wait_for_reset().await
                }
                FailureOutcome::Ignored => {
                    debug!("Failure reported with no live transport: {}", err);
                    self.wait_for_reset().await
                }
            };

            if let Wake::Stop = wake {
                self.finish().await;
                return Ok(());
            }
        }
    }

    async fn finish(&self) {
        self.shared.write().machine.stop();
        info!("Connection closed");
        self.notify(DashboardEvent::status(false, STATUS_STOPPED)).await;
    }

    async fn notify(&self, event: DashboardEvent) {
        deliver(self.handler.as_ref(), &event).await;
    }

    /// Sleep out the backoff delay, still answering commands.
    ///
    /// A manual reconnect or visibility trigger cuts the wait short. The
    /// sleep is local, so abandoning it cancels the timer.
    async fn wait_for_backoff(&mut self, delay: Duration) -> Wake {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => {
                    self.shared.write().machine.begin_connect();
                    debug!("Backoff of {:?} elapsed, reconnecting", delay);
                    return Wake::Connect;
                }
                cmd = self.command_rx.recv() => {
                    if let Some(wake) = self.handle_idle_command(cmd) {
                        return wake;
                    }
                }
            }
        }
    }

    /// Stay down until a manual reset (or stop)
    async fn wait_for_reset(&mut self) -> Wake {
        loop {
            let cmd = self.command_rx.recv().await;
            if let Some(wake) = self.handle_idle_command(cmd) {
                return wake;
            }
        }
    }

    fn handle_idle_command(&mut self, cmd: Option<ConnectionCommand>) -> Option<Wake> {
        match cmd {
            Some(ConnectionCommand::Send(_)) => {
                warn!("Dropping outbound frame - not connected");
                self.metrics.record_dropped_send();
                None
            }
            Some(ConnectionCommand::Reconnect) => {
                if self.shared.write().machine.manual_reset() {
                    info!("Manual reconnect requested");
                    Some(Wake::Connect)
                } else {
                    None
                }
            }
            Some(ConnectionCommand::VisibilityRegained) => {
                if self.shared.write().machine.visibility_regained() {
                    info!("Dashboard visible again - reconnecting");
                    Some(Wake::Connect)
                } else {
                    None
                }
            }
            Some(ConnectionCommand::Close) | None => Some(Wake::Stop),
        }
    }

    /// Connect and run until disconnection.
    ///
    /// Returns `Ok(())` when asked to stop, `Err` for any transport failure.
    async fn connect_and_run(&mut self) -> Result<(), Error> {
        let url = self.config.url.clone();
        let connect_timeout = self.config.connect_timeout;
        debug!("Connecting to {}", url);

        let connect = timeout(connect_timeout, connect_with_options(&url));
        tokio::pin!(connect);

        let ws_stream = loop {
            tokio::select! {
                result = &mut connect => {
                    match result {
                        Ok(Ok(stream)) => break stream,
                        Ok(Err(e)) => return Err(e),
                        Err(_) => {
                            return Err(Error::TransportOpenFailure(format!(
                                "Connection timeout after {:?}",
                                connect_timeout
                            )))
                        }
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Send(_)) => {
                            warn!("Dropping outbound frame - still connecting");
                            self.metrics.record_dropped_send();
                        }
                        Some(ConnectionCommand::Reconnect) | Some(ConnectionCommand::VisibilityRegained) => {
                            debug!("Already connecting, ignoring reconnect trigger");
                        }
                        Some(ConnectionCommand::Close) | None => {
                            info!("Close requested while connecting");
                            return Ok(());
                        }
                    }
                }
            }
        };

        if !self.shared.write().machine.on_open() {
            warn!("Transport opened outside the connecting phase");
        }
        self.metrics.record_connection();
        info!("Connected to {}", url);
        self.notify(DashboardEvent::status(true, STATUS_CONNECTED)).await;

        let (mut write, mut read) = ws_stream.split();
        let mut keepalive = KeepaliveMonitor::new(self.config.keepalive.clone());

        loop {
            let next_check = keepalive.time_until_next_check();

            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.metrics.record_frame_received();
                            self.handle_frame(&text, &mut keepalive).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            trace!("Received transport ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| format!("{} {}", f.code, f.reason))
                                .unwrap_or_else(|| "no close frame".to_string());
                            info!("Server closed connection: {}", reason);
                            return Err(Error::TransportClosed(reason));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!("Ignoring binary frame ({} bytes)", data.len());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket error: {}", e);
                            return Err(Error::TransportError(e));
                        }
                        None => {
                            return Err(Error::TransportClosed("stream ended".to_string()));
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Send(msg)) => {
                            if let Err(e) = write.send(msg).await {
                                warn!("Failed to send message: {}", e);
                                return Err(Error::TransportError(e));
                            }
                            self.metrics.record_frame_sent();
                        }
                        Some(ConnectionCommand::Reconnect) | Some(ConnectionCommand::VisibilityRegained) => {
                            debug!("Already connected, ignoring reconnect trigger");
                        }
                        Some(ConnectionCommand::Close) | None => {
                            info!("Received close command");
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }

                _ = tokio::time::sleep(next_check) => {
                    if keepalive.is_pong_overdue() {
                        warn!("No pong received in time, reconnecting");
                        return Err(Error::TransportClosed("pong timeout".to_string()));
                    }

                    if keepalive.should_send_ping() {
                        write.send(OutboundMessage::Ping.to_message()?).await?;
                        keepalive.record_ping_sent();
                        self.metrics.record_ping();
                        self.metrics.record_frame_sent();
                        trace!("Keepalive ping sent");
                    }
                }
            }
        }
    }

    /// Decode one text frame and hand the resulting events to the handler.
    ///
    /// Malformed frames are logged and dropped without touching any state.
    async fn handle_frame(&self, text: &str, keepalive: &mut KeepaliveMonitor) {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping frame: {} ({} bytes)", e, text.len());
                self.metrics.record_malformed_frame();
                return;
            }
        };
        trace!("Received {} frame", message.kind());

        match &message {
            InboundMessage::Pong => {
                keepalive.record_pong_received();
                self.metrics.record_pong();
            }
            InboundMessage::Unknown { .. } => self.metrics.record_unknown_frame(),
            _ => {}
        }

        let events = self.shared.write().dashboard.apply(message);
        for event in &events {
            deliver(self.handler.as_ref(), event).await;
        }
    }
}

/// Type alias for WebSocket stream
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open the TCP connection, then run TLS (for wss://) and the WebSocket
/// handshake over it.
async fn connect_with_options(url: &str) -> Result<WsStream, Error> {
    let parsed_url = Url::parse(url)
        .map_err(|e| Error::TransportOpenFailure(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| Error::TransportOpenFailure("No host in URL".to_string()))?;

    let is_tls = parsed_url.scheme() == "wss";
    let port = parsed_url.port().unwrap_or(if is_tls { 443 } else { 80 });

    let request = url
        .into_client_request()
        .map_err(|e| Error::TransportOpenFailure(format!("Invalid WebSocket request: {}", e)))?;

    let tcp_stream = connect_direct(host, port).await?;
    set_tcp_options(&tcp_stream);

    let connector = if is_tls {
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| Error::TransportOpenFailure(format!("TLS error: {}", e)))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let (ws_stream, _response) = client_async_tls_with_config(request, tcp_stream, None, connector)
        .await
        .map_err(|e| Error::TransportOpenFailure(format!("WebSocket handshake failed: {}", e)))?;

    Ok(ws_stream)
}

async fn connect_direct(host: &str, port: u16) -> Result<tokio::net::TcpStream, Error> {
    let dest_str = format!("{}:{}", host, port);
    let dest_addr: SocketAddr = tokio::net::lookup_host(&dest_str)
        .await
        .map_err(|e| Error::TransportOpenFailure(format!("DNS lookup failed: {}", e)))?
        .next()
        .ok_or_else(|| {
            Error::TransportOpenFailure(format!("No addresses found for {}", host))
        })?;

    let socket = if dest_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::TransportOpenFailure(format!("Failed to create socket: {}", e)))?;

    socket.connect(dest_addr).await.map_err(|e| {
        Error::TransportOpenFailure(format!("TCP connect to {} failed: {}", dest_addr, e))
    })
}

/// Disable Nagle and let the OS probe idle connections
fn set_tcp_options(stream: &tokio::net::TcpStream) {
    let sock2 = socket2::SockRef::from(stream);

    let _ = sock2.set_nodelay(true);

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    let _ = sock2.set_tcp_keepalive(&keepalive);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::RecordingHandler;

    fn test_connection(
        config: ClientConfig,
    ) -> (
        Connection<RecordingHandler>,
        Arc<RecordingHandler>,
        mpsc::Sender<ConnectionCommand>,
    ) {
        let handler = Arc::new(RecordingHandler::default());
        let shared = Arc::new(RwLock::new(SharedState::new(&config)));
        let (tx, rx) = mpsc::channel(8);
        let connection = Connection::new(handler.clone(), config, Arc::new(Metrics::new()), shared, rx);
        (connection, handler, tx)
    }

    #[tokio::test]
    async fn test_malformed_frame_changes_nothing() {
        let (connection, handler, _tx) = test_connection(ClientConfig::default());
        let mut keepalive = KeepaliveMonitor::new(connection.config.keepalive.clone());

        connection
            .handle_frame(
                r#"{"type":"subscriptionConfirmed","city":"Paris","subscribed":true}"#,
                &mut keepalive,
            )
            .await;
        connection.handle_frame("{not json", &mut keepalive).await;

        let shared = connection.shared.read();
        assert_eq!(shared.dashboard.subscribed_cities(), vec!["Paris"]);
        assert_eq!(shared.machine.reconnect_attempts(), 0);
        assert_eq!(connection.metrics.malformed_frames(), 1);
        assert_eq!(handler.events().len(), 1);
    }

    #[tokio::test]
    async fn test_pong_frame_clears_keepalive_wait() {
        let (connection, _handler, _tx) = test_connection(ClientConfig::default());
        let mut keepalive = KeepaliveMonitor::new(connection.config.keepalive.clone());
        keepalive.record_ping_sent();

        connection.handle_frame(r#"{"type":"pong"}"#, &mut keepalive).await;

        assert!(!keepalive.is_waiting_for_pong());
        assert_eq!(connection.metrics.pongs_received(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_cut_short_by_manual_reconnect() {
        let (mut connection, _handler, tx) = test_connection(ClientConfig::default());
        {
            let mut shared = connection.shared.write();
            shared.machine.begin_connect();
            shared.machine.on_failure();
        }

        tx.send(ConnectionCommand::Send(Message::Text("{}".into())))
            .await
            .unwrap();
        tx.send(ConnectionCommand::Reconnect).await.unwrap();

        let wake = connection.wait_for_backoff(Duration::from_secs(3600)).await;
        assert!(matches!(wake, Wake::Connect));
        assert_eq!(connection.metrics.dropped_sends(), 1);
        assert_eq!(connection.shared.read().machine.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_elapses_into_connecting() {
        let (mut connection, _handler, _tx) = test_connection(ClientConfig::default());
        {
            let mut shared = connection.shared.write();
            shared.machine.begin_connect();
            shared.machine.on_failure();
        }

        let wake = connection.wait_for_backoff(Duration::from_secs(2)).await;
        assert!(matches!(wake, Wake::Connect));
        let shared = connection.shared.read();
        assert_eq!(shared.machine.phase(), crate::machine::ConnectionPhase::Connecting);
        assert_eq!(shared.machine.reconnect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_waits_for_reset_and_stops_on_close() {
        let (mut connection, _handler, tx) = test_connection(ClientConfig::default());
        tx.send(ConnectionCommand::Close).await.unwrap();

        let wake = connection.wait_for_reset().await;
        assert!(matches!(wake, Wake::Stop));
    }
}
