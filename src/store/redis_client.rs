//! Redis-backed store and topic subscription

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{MetadataStore, NotificationStream};
use crate::error::StoreError;

/// Upper bound for the resubscribe delay
pub const MAX_RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(30);

/// Record reader over a shared multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Open a multiplexed connection for record reads
    pub async fn connect(client: &redis::Client) -> Result<Self, StoreError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

impl MetadataStore for RedisStore {
    async fn fetch_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, Vec<u8>> = conn.hgetall(key).await?;
        Ok(decode_fields(raw))
    }
}

/// Field values are text; bytes that are not UTF-8 become U+FFFD so the
/// resolver reports the field as malformed rather than the store as broken.
fn decode_fields(raw: HashMap<String, Vec<u8>>) -> HashMap<String, String> {
    raw.into_iter()
        .map(|(field, value)| {
            let value = match String::from_utf8(value) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            };
            (field, value)
        })
        .collect()
}

/// Subscribe to `channel` and yield each message payload as a string
///
/// Payloads that are not valid UTF-8 are logged and skipped. The stream ends
/// when the pub/sub connection is lost.
pub async fn subscribe(
    client: &redis::Client,
    channel: &str,
) -> Result<NotificationStream, StoreError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;

    tracing::info!(channel = %channel, "Subscribed to notification topic");

    let stream = pubsub.into_on_message().filter_map(|msg| async move {
        match msg.get_payload::<String>() {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(
                    channel = %msg.get_channel_name(),
                    error = %e,
                    "Skipping undecodable notification"
                );
                None
            }
        }
    });

    Ok(Box::pin(stream))
}

struct Resubscribe {
    client: redis::Client,
    channel: String,
    current: Option<NotificationStream>,
    initial_backoff: Duration,
    backoff: Duration,
    attempt: u32,
}

/// Keep `initial` going for the life of the process
///
/// When the subscription ends, the channel is subscribed again after
/// `backoff`. The delay doubles after each failed attempt, up to
/// [`MAX_RESUBSCRIBE_BACKOFF`], and resets once a subscription succeeds.
/// The returned stream never ends on its own.
pub fn resubscribing(
    client: redis::Client,
    channel: impl Into<String>,
    initial: NotificationStream,
    backoff: Duration,
) -> NotificationStream {
    let state = Resubscribe {
        client,
        channel: channel.into(),
        current: Some(initial),
        initial_backoff: backoff,
        backoff,
        attempt: 0,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(current) = state.current.as_mut() {
                if let Some(payload) = current.next().await {
                    return Some((payload, state));
                }
                tracing::warn!(channel = %state.channel, "Notification subscription lost");
                state.current = None;
            }

            tokio::time::sleep(state.backoff).await;
            state.attempt += 1;
            tracing::info!(
                channel = %state.channel,
                attempt = state.attempt,
                "Resubscribing to notification topic"
            );

            match subscribe(&state.client, &state.channel).await {
                Ok(stream) => {
                    state.current = Some(stream);
                    state.backoff = state.initial_backoff;
                    state.attempt = 0;
                }
                Err(e) => {
                    state.backoff = next_backoff(state.backoff);
                    tracing::warn!(
                        channel = %state.channel,
                        attempt = state.attempt,
                        retry_in_ms = state.backoff.as_millis() as u64,
                        error = %e,
                        "Resubscribe failed"
                    );
                }
            }
        }
    }))
}

fn next_backoff(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_RESUBSCRIBE_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use crate::record::NotificationKey;
    use crate::resolver::parse_record;

    #[test]
    fn test_non_utf8_value_is_malformed_field() {
        let mut raw: HashMap<String, Vec<u8>> = [
            ("timestamp", "1700000000000"),
            ("center_x", "10.0"),
            ("center_y", "20.0"),
            ("width", "400.0"),
            ("height", "300.0"),
        ]
        .into_iter()
        .map(|(f, v)| (f.to_string(), v.as_bytes().to_vec()))
        .collect();
        raw.insert("confidence".to_string(), vec![0x39, 0xff, 0x35]);

        let fields = decode_fields(raw);
        let key = NotificationKey::from("image_metadata:1700000000000");

        assert!(matches!(
            parse_record(&key, &fields),
            Err(ResolutionError::MalformedField { field: "confidence", value: Some(_), .. })
        ));
    }

    #[test]
    fn test_utf8_values_pass_through() {
        let raw: HashMap<String, Vec<u8>> =
            [("width".to_string(), b"400.0".to_vec())].into_iter().collect();
        assert_eq!(decode_fields(raw)["width"], "400.0");
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(20)), MAX_RESUBSCRIBE_BACKOFF);
        assert_eq!(next_backoff(MAX_RESUBSCRIBE_BACKOFF), MAX_RESUBSCRIBE_BACKOFF);
    }
}
