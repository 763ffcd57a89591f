//! Client-side view of the weather stream.
//!
//! [`DashboardState`] applies decoded frames and produces the
//! [`DashboardEvent`]s that the presentation layer renders. It performs no
//! I/O, so the connection task can call it under a short lock and deliver
//! the events afterwards.

use crate::protocol::{Heartbeat, InboundMessage, WeatherUpdate};
use crate::subscriptions::SubscriptionSet;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Status shown once the transport opens
pub const STATUS_CONNECTED: &str = "Connected to weather server";
/// Status shown after the server's welcome
pub const STATUS_READY: &str = "Connected - Ready to subscribe to cities";
/// Status shown when `send` is called without a connection
pub const STATUS_SEND_FAILED: &str = "Cannot send message - Connection lost";
/// Status shown after the client is stopped
pub const STATUS_STOPPED: &str = "Disconnected";

/// Figures for the statistics panel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Clients connected to the server, from the last heartbeat
    pub total_clients: u64,
    /// Cities the server polls, from the last heartbeat
    pub cities_monitored: u64,
    /// Weather updates received since start
    pub message_count: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Something the presentation layer should render
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    /// City list arrived; (re)build the selector
    Ready(Vec<String>),
    /// Create or refresh a city's card
    WeatherUpdate(WeatherUpdate),
    /// Toggle button and card visuals for a city
    SubscriptionChanged { city: String, subscribed: bool },
    /// Refresh the statistics panel
    Stats(Stats),
    /// Connection indicator
    ConnectionStatus { connected: bool, message: String },
}

impl DashboardEvent {
    pub fn status(connected: bool, message: impl Into<String>) -> Self {
        DashboardEvent::ConnectionStatus {
            connected,
            message: message.into(),
        }
    }
}

/// Available cities, confirmed subscriptions and counters
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    available_cities: Vec<String>,
    subscriptions: SubscriptionSet,
    message_count: u64,
    total_clients: u64,
    cities_monitored: u64,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded frame and return what should be rendered.
    pub fn apply(&mut self, message: InboundMessage) -> Vec<DashboardEvent> {
        match message {
            InboundMessage::Welcome(welcome) => {
                self.available_cities = welcome.city_names();
                info!(
                    "Welcome received, {} cities available",
                    self.available_cities.len()
                );
                vec![
                    DashboardEvent::Ready(self.available_cities.clone()),
                    DashboardEvent::status(true, STATUS_READY),
                ]
            }
            InboundMessage::WeatherUpdate(update) => {
                self.message_count += 1;
                debug!(
                    "Weather update for {}: {:.1}°C {}",
                    update.city, update.temperature, update.description
                );
                vec![DashboardEvent::WeatherUpdate(update)]
            }
            InboundMessage::SubscriptionConfirmed(confirmed) => {
                self.subscriptions
                    .apply(&confirmed.city, confirmed.subscribed);
                info!(
                    "Subscription {} for: {}",
                    if confirmed.subscribed { "confirmed" } else { "removed" },
                    confirmed.city
                );
                vec![DashboardEvent::SubscriptionChanged {
                    city: confirmed.city,
                    subscribed: confirmed.subscribed,
                }]
            }
            InboundMessage::Heartbeat(heartbeat) => {
                self.record_heartbeat(&heartbeat);
                vec![DashboardEvent::Stats(self.stats())]
            }
            InboundMessage::Pong => {
                debug!("Pong received");
                Vec::new()
            }
            InboundMessage::Unknown { kind, raw } => {
                debug!("Unknown message type {:?}: {}", kind, raw);
                Vec::new()
            }
        }
    }

    fn record_heartbeat(&mut self, heartbeat: &Heartbeat) {
        // A heartbeat without a timestamp still proves the server is alive
        self.last_heartbeat = Some(heartbeat.timestamp.unwrap_or_else(Utc::now));
        self.total_clients = heartbeat.total_clients;
        self.cities_monitored = heartbeat.cities_monitored;
        debug!(
            "Heartbeat: {} clients, {} cities",
            heartbeat.total_clients, heartbeat.cities_monitored
        );
    }

    pub fn available_cities(&self) -> &[String] {
        &self.available_cities
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Subscribed cities in server order
    pub fn subscribed_cities(&self) -> Vec<String> {
        self.subscriptions.ordered(&self.available_cities)
    }

    pub fn is_subscribed(&self, city: &str) -> bool {
        self.subscriptions.contains(city)
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total_clients: self.total_clients,
            cities_monitored: self.cities_monitored,
            message_count: self.message_count,
            last_heartbeat: self.last_heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn apply_text(state: &mut DashboardState, text: &str) -> Vec<DashboardEvent> {
        state.apply(InboundMessage::decode(text).expect("valid frame"))
    }

    #[test]
    fn test_welcome_sets_available_cities() {
        let mut state = DashboardState::new();
        let events = apply_text(
            &mut state,
            r#"{"type":"welcome","availableCities":{"Paris":{},"Tokyo":{}}}"#,
        );

        assert_eq!(state.available_cities(), ["Paris", "Tokyo"]);
        assert_eq!(
            events,
            vec![
                DashboardEvent::Ready(vec!["Paris".to_string(), "Tokyo".to_string()]),
                DashboardEvent::status(true, STATUS_READY),
            ]
        );
    }

    #[test]
    fn test_second_welcome_replaces_list() {
        let mut state = DashboardState::new();
        apply_text(&mut state, r#"{"type":"welcome","availableCities":{"Paris":{},"Tokyo":{}}}"#);
        apply_text(&mut state, r#"{"type":"welcome","availableCities":{"Dubai":"Dubai"}}"#);
        assert_eq!(state.available_cities(), ["Dubai"]);
    }

    #[test]
    fn test_subscription_confirmed_adds_and_removes() {
        let mut state = DashboardState::new();

        let events = apply_text(
            &mut state,
            r#"{"type":"subscriptionConfirmed","city":"Paris","subscribed":true}"#,
        );
        assert!(state.is_subscribed("Paris"));
        assert_eq!(state.subscribed_cities(), vec!["Paris"]);
        assert_eq!(
            events,
            vec![DashboardEvent::SubscriptionChanged {
                city: "Paris".to_string(),
                subscribed: true
            }]
        );

        apply_text(
            &mut state,
            r#"{"type":"subscriptionConfirmed","city":"Paris","subscribed":false}"#,
        );
        assert!(!state.is_subscribed("Paris"));
        assert!(state.subscriptions().is_empty());
    }

    #[test]
    fn test_weather_updates_count_messages() {
        let mut state = DashboardState::new();
        let frame = r#"{"type":"weatherUpdate","city":"Tokyo","temperature":18.2,
            "description":"clear","humidity":40,"windSpeed":3.1,"timestamp":1714566600000}"#;

        let events = apply_text(&mut state, frame);
        apply_text(&mut state, frame);

        assert_eq!(state.message_count(), 2);
        assert!(matches!(&events[..], [DashboardEvent::WeatherUpdate(u)] if u.city == "Tokyo"));
        // Weather updates do not touch subscriptions
        assert!(!state.is_subscribed("Tokyo"));
    }

    #[test]
    fn test_heartbeat_updates_stats() {
        let mut state = DashboardState::new();
        apply_text(
            &mut state,
            r#"{"type":"weatherUpdate","city":"Paris","temperature":1,"description":"snow",
                "humidity":90,"windSpeed":20}"#,
        );
        let events = apply_text(
            &mut state,
            r#"{"type":"heartbeat","timestamp":"2024-05-01T12:30:00Z","total_clients":4,"cities_monitored":6}"#,
        );

        let expected = Stats {
            total_clients: 4,
            cities_monitored: 6,
            message_count: 1,
            last_heartbeat: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
        };
        assert_eq!(state.stats(), expected);
        assert_eq!(events, vec![DashboardEvent::Stats(expected)]);
    }

    #[test]
    fn test_pong_and_unknown_change_nothing() {
        let mut state = DashboardState::new();
        apply_text(&mut state, r#"{"type":"subscriptionConfirmed","city":"Paris","subscribed":true}"#);

        assert!(apply_text(&mut state, r#"{"type":"pong"}"#).is_empty());
        assert!(apply_text(&mut state, r#"{"type":"forecast","days":5}"#).is_empty());

        assert_eq!(state.subscribed_cities(), vec!["Paris"]);
        assert_eq!(state.stats(), Stats::default());
    }
}
