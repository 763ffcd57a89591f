use crate::dashboard::{DashboardEvent, Stats};
use crate::protocol::WeatherUpdate;
use std::future::Future;

/// Trait that users implement to render the weather stream.
///
/// The client handles the connection lifecycle, reconnection, keepalive and
/// frame decoding; the handler only receives decoded events. All methods
/// are called from the connection task, one at a time, in arrival order.
///
/// # Example
///
/// ```ignore
/// use weather_stream_client::{DashboardHandler, WeatherUpdate};
///
/// struct Printer;
///
/// impl DashboardHandler for Printer {
///     async fn on_weather_update(&self, update: &WeatherUpdate) {
///         println!("{}: {:.0}°C", update.city, update.temperature);
///     }
/// }
/// ```
pub trait DashboardHandler: Send + Sync + 'static {
    /// The server sent its city list; rebuild the city selector.
    fn on_ready(&self, _cities: &[String]) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// New conditions for a city; create or refresh its card.
    fn on_weather_update(&self, update: &WeatherUpdate) -> impl Future<Output = ()> + Send;

    /// The server confirmed a subscription change.
    ///
    /// Any removal animation for an unsubscribed city's card belongs here.
    fn on_subscription_change(
        &self,
        _city: &str,
        _subscribed: bool,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Server statistics from a heartbeat.
    fn on_stats(&self, _stats: &Stats) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Connection indicator changed.
    fn on_connection_status(
        &self,
        _connected: bool,
        _message: &str,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Route an event to the matching handler method
pub(crate) async fn deliver<H: DashboardHandler>(handler: &H, event: &DashboardEvent) {
    match event {
        DashboardEvent::Ready(cities) => handler.on_ready(cities).await,
        DashboardEvent::WeatherUpdate(update) => handler.on_weather_update(update).await,
        DashboardEvent::SubscriptionChanged { city, subscribed } => {
            handler.on_subscription_change(city, *subscribed).await
        }
        DashboardEvent::Stats(stats) => handler.on_stats(stats).await,
        DashboardEvent::ConnectionStatus { connected, message } => {
            handler.on_connection_status(*connected, message).await
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Handler that records every event it receives
    #[derive(Debug, Default)]
    pub(crate) struct RecordingHandler {
        events: Mutex<Vec<DashboardEvent>>,
    }

    impl RecordingHandler {
        pub(crate) fn events(&self) -> Vec<DashboardEvent> {
            self.events.lock().clone()
        }

        pub(crate) fn statuses(&self) -> Vec<(bool, String)> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    DashboardEvent::ConnectionStatus { connected, message } => {
                        Some((*connected, message.clone()))
                    }
                    _ => None,
                })
                .collect()
        }

        fn push(&self, event: DashboardEvent) {
            self.events.lock().push(event);
        }
    }

    impl DashboardHandler for RecordingHandler {
        async fn on_ready(&self, cities: &[String]) {
            self.push(DashboardEvent::Ready(cities.to_vec()));
        }

        async fn on_weather_update(&self, update: &WeatherUpdate) {
            self.push(DashboardEvent::WeatherUpdate(update.clone()));
        }

        async fn on_subscription_change(&self, city: &str, subscribed: bool) {
            self.push(DashboardEvent::SubscriptionChanged {
                city: city.to_string(),
                subscribed,
            });
        }

        async fn on_stats(&self, stats: &Stats) {
            self.push(DashboardEvent::Stats(stats.clone()));
        }

        async fn on_connection_status(&self, connected: bool, message: &str) {
            self.push(DashboardEvent::status(connected, message));
        }
    }

    #[tokio::test]
    async fn test_deliver_routes_events() {
        let handler = RecordingHandler::default();
        let events = vec![
            DashboardEvent::Ready(vec!["Paris".to_string()]),
            DashboardEvent::SubscriptionChanged {
                city: "Paris".to_string(),
                subscribed: true,
            },
            DashboardEvent::Stats(Stats::default()),
            DashboardEvent::status(false, "Connection error"),
        ];

        for event in &events {
            deliver(&handler, event).await;
        }

        assert_eq!(handler.events(), events);
        assert_eq!(handler.statuses(), vec![(false, "Connection error".to_string())]);
    }
}
