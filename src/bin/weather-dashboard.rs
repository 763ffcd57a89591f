use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};
use weather_stream_client::{
    ClientConfig, DashboardHandler, KeepaliveConfig, Stats, WeatherClient, WeatherUpdate,
};

#[derive(Parser)]
#[command(name = "weather-dashboard")]
#[command(about = "Terminal dashboard for a live weather stream")]
struct Args {
    /// Server host, optionally with a port
    #[arg(long, default_value = "localhost:8080")]
    host: String,

    /// Connect with wss:// instead of ws://
    #[arg(long)]
    secure: bool,

    /// Full WebSocket URL (overrides --host and --secure)
    #[arg(long)]
    url: Option<String>,

    /// Failed attempts before automatic reconnection gives up
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = 30)]
    ping_interval_secs: u64,

    /// Reconnect if a ping goes unanswered this long (off by default)
    #[arg(long)]
    pong_timeout_secs: Option<u64>,

    /// City to subscribe to whenever the server is ready (repeatable)
    #[arg(short, long = "city")]
    cities: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

const HELP: &str = "commands: sub <city> | unsub <city> | toggle <city> | reconnect | visible | status | quit";

/// Renders dashboard events as lines on stdout
struct ConsoleRenderer {
    ready: Arc<Notify>,
}

impl DashboardHandler for ConsoleRenderer {
    async fn on_ready(&self, cities: &[String]) {
        println!("Available cities: {}", cities.join(", "));
        self.ready.notify_one();
    }

    async fn on_weather_update(&self, update: &WeatherUpdate) {
        let updated = update
            .timestamp
            .map(|t| format!("  (updated {})", t.with_timezone(&Local).format("%H:%M:%S")))
            .unwrap_or_default();
        println!(
            "{} {:<14} {:>6.1}°C  {:<20} humidity {:>3.0}%  wind {:>4.1} m/s{}",
            weather_icon(&update.description),
            update.city,
            update.temperature,
            capitalize(&update.description),
            update.humidity,
            update.wind_speed,
            updated
        );
    }

    async fn on_subscription_change(&self, city: &str, subscribed: bool) {
        if subscribed {
            println!("+ Subscribed to {}", city);
        } else {
            println!("- Unsubscribed from {}", city);
        }
    }

    async fn on_stats(&self, stats: &Stats) {
        println!(
            "Server: {} clients, {} cities monitored | {} updates received",
            stats.total_clients, stats.cities_monitored, stats.message_count
        );
    }

    async fn on_connection_status(&self, connected: bool, message: &str) {
        let marker = if connected { "online" } else { "offline" };
        println!("[{}] {}", marker, message);
    }
}

fn weather_icon(description: &str) -> &'static str {
    let desc = description.to_lowercase();
    if desc.contains("clear") {
        "☀️"
    } else if desc.contains("cloud") {
        "☁️"
    } else if desc.contains("rain") {
        "🌧"
    } else if desc.contains("storm") {
        "⛈"
    } else if desc.contains("snow") {
        "❄️"
    } else if desc.contains("fog") || desc.contains("mist") {
        "🌫"
    } else if desc.contains("wind") {
        "💨"
    } else {
        "🌤"
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_status(client: &WeatherClient<ConsoleRenderer>) {
    let stats = client.stats();
    let metrics = client.metrics().snapshot();
    println!(
        "phase: {} | attempts: {}/{} | subscribed: [{}]",
        client.phase(),
        client.reconnect_attempts(),
        client.config().max_reconnect_attempts,
        client.subscribed_cities().join(", ")
    );
    println!(
        "updates: {} | last heartbeat: {} | frames in/out: {}/{} | dropped sends: {}",
        stats.message_count,
        stats
            .last_heartbeat
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string()),
        metrics.frames_received_total,
        metrics.frames_sent_total,
        metrics.dropped_sends_total
    );
}

/// Handle one stdin line. Returns `false` to quit.
async fn handle_command(client: &WeatherClient<ConsoleRenderer>, line: &str) -> bool {
    let line = line.trim();
    let (command, city) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match (command, city) {
        ("", _) => {}
        ("quit" | "exit", _) => return false,
        ("sub" | "unsub" | "toggle", "") => println!("usage: {} <city>", command),
        ("sub", city) => {
            client.subscribe(city).await;
        }
        ("unsub", city) => {
            client.unsubscribe(city).await;
        }
        ("toggle", city) => {
            client.toggle_subscription(city).await;
        }
        ("reconnect", _) => match client.reconnect().await {
            Ok(true) => println!("Reconnecting..."),
            Ok(false) => println!("Already connected"),
            Err(e) => warn!("Reconnect failed: {}", e),
        },
        ("visible", _) => {
            if let Err(e) = client.visibility_regained().await {
                warn!("Visibility trigger failed: {}", e);
            }
        }
        ("status", _) => print_status(client),
        _ => println!("{}", HELP),
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "weather_stream_client=debug,weather_dashboard=debug"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut builder = ClientConfig::builder()
        .max_reconnect_attempts(args.max_reconnect_attempts)
        .keepalive(KeepaliveConfig {
            ping_interval: Duration::from_secs(args.ping_interval_secs),
            pong_timeout: args.pong_timeout_secs.map(Duration::from_secs),
        });
    builder = match &args.url {
        Some(url) => builder.url(url),
        None => builder.host(&args.host, args.secure),
    };
    let config = builder.build()?;

    info!("Weather dashboard connecting to {}", config.url);
    println!("{}", HELP);

    let ready = Arc::new(Notify::new());
    let client = WeatherClient::new(
        config,
        ConsoleRenderer {
            ready: ready.clone(),
        },
    );
    client.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_command(&client, &line).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = ready.notified() => {
                // A fresh server session has no subscriptions of ours
                for city in &args.cities {
                    client.subscribe(city).await;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_icon() {
        assert_eq!(weather_icon("Clear sky"), "☀️");
        assert_eq!(weather_icon("broken clouds"), "☁️");
        assert_eq!(weather_icon("light rain"), "🌧");
        assert_eq!(weather_icon("Thunderstorm"), "⛈");
        assert_eq!(weather_icon("mist"), "🌫");
        assert_eq!(weather_icon("haze"), "🌤");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("overcast clouds"), "Overcast clouds");
        assert_eq!(capitalize(""), "");
    }
}
