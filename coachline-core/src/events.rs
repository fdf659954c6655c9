use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;

/// Outbound sink for domain events, published after the owning transaction commits.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Publishes a serializable event, logging instead of failing the caller.
pub async fn publish_event<T: Serialize>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    event: &T,
) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to serialize event for {}: {}", topic, e);
            return;
        }
    };

    if let Err(e) = publisher.publish(topic, key, &payload).await {
        tracing::warn!("Failed to publish {} for {}: {}", topic, key, e);
    }
}

/// Used when no broker is configured.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        _payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!("Dropping event {} for {} (no broker configured)", topic, key);
        Ok(())
    }
}

/// Keeps every published event in memory, in order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }

    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, _, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), key.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Ping {
        id: u32,
    }

    #[tokio::test]
    async fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publish_event(&publisher, "a.first", "k", &Ping { id: 1 }).await;
        publish_event(&publisher, "b.second", "k", &Ping { id: 2 }).await;

        assert_eq!(publisher.topics(), vec!["a.first", "b.second"]);
        assert_eq!(publisher.payloads("b.second"), vec!["{\"id\":2}"]);
    }
}
