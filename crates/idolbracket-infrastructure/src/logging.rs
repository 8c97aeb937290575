//! Tracing subscriber setup and the game event layer.

use idolbracket_core::error::{BracketError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Target prefix shared by every crate of the engine.
pub const GAME_TARGET_PREFIX: &str = "idolbracket";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `filter` is used, falling back to `info`.
pub fn init_tracing(filter: Option<&str>, format: LogFormat) -> Result<()> {
    init_tracing_with(filter, format, None)
}

/// Like [`init_tracing`], additionally forwarding game events through `events`.
pub fn init_tracing_with(filter: Option<&str>, format: LogFormat, events: Option<GameEventLayer>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter.unwrap_or("info"))
            .map_err(|e| BracketError::config(format!("invalid log filter: {e}")))?,
    };

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(events)
        .try_init()
        .map_err(|e| BracketError::config(format!("tracing already initialized: {e}")))
}

/// An engine log event, as handed to a host console.
#[derive(Debug, Clone, Serialize)]
pub struct GameEvent {
    pub target: String,
    pub level: String,
    pub message: String,
    /// Structured fields such as `channel_id` or `remaining`.
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

/// Forwards events emitted by the engine's crates to a channel.
pub struct GameEventLayer {
    sender: mpsc::UnboundedSender<GameEvent>,
}

impl GameEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<GameEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl<S> Layer<S> for GameEventLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(GAME_TARGET_PREFIX) {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let message = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        // A dropped receiver just means nobody is listening.
        let _ = self.sender.send(GameEvent {
            target: metadata.target().to_string(),
            level: metadata.level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl Visit for FieldVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::from(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[test]
    fn test_layer_forwards_only_game_events() {
        let (layer, mut receiver) = GameEventLayer::channel();
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(
                target: "idolbracket_application::session",
                channel_id = "C1",
                remaining = 16u64,
                random = true,
                "Round decided"
            );
            tracing::warn!(target: "hyper::proto", "unrelated");
        });

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.level, "INFO");
        assert_eq!(event.message, "Round decided");
        assert_eq!(event.fields["channel_id"], Value::from("C1"));
        assert_eq!(event.fields["remaining"], Value::from(16u64));
        assert_eq!(event.fields["random"], Value::from(true));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_bad_filter_is_config_error() {
        // RUST_LOG takes precedence over the argument.
        if std::env::var("RUST_LOG").is_err() {
            let err = init_tracing(Some("idolbracket=loud"), LogFormat::Text).unwrap_err();
            assert!(matches!(err, BracketError::Config(_)));
        }
    }
}
