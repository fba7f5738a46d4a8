//! GoGo Board over MQTT.

use crate::payload::TopicFilter;
use crate::{ConnectorError, Reading};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::time::Duration;
use tokio::sync::mpsc;

/// Broker connection and subscription settings.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    /// Subscription, normally `plog/gogodata/#`.
    pub topic: String,
    pub keep_alive: Duration,
    /// Pause after a connection error before polling again.
    pub reconnect_delay: Duration,
    pub filter: TopicFilter,
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }
        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

/// Subscribe and forward every accepted message as a reading.
///
/// Reconnects forever; returns only when the reading receiver goes away.
pub async fn run(settings: MqttSettings, readings: mpsc::Sender<Reading>) -> Result<(), ConnectorError> {
    let (client, mut eventloop) = AsyncClient::new(settings.options(), 64);
    tracing::info!("Connecting to MQTT broker {}:{}", settings.host, settings.port);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to broker, subscribing to {}", settings.topic);
                client.subscribe(settings.topic.clone(), QoS::AtMostOnce).await?;
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                tracing::info!("Subscribed to {}, waiting for data", settings.topic);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!("Message on {}", publish.topic);
                let Some(reading) = settings.filter.reading(&publish.topic, &publish.payload) else {
                    continue;
                };
                if readings.send(reading).await.is_err() {
                    tracing::debug!("Reading receiver closed, stopping MQTT source");
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("MQTT connection error: {}", e);
                tokio::time::sleep(settings.reconnect_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_settings() {
        let settings = MqttSettings {
            host: "broker.example".into(),
            port: 8883,
            client_id: "gogodata-test".into(),
            username: Some("admin".into()),
            password: Some("secret".into()),
            tls: false,
            topic: "plog/gogodata/#".into(),
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(1),
            filter: TopicFilter::default(),
        };
        let options = settings.options();
        assert_eq!(options.broker_address(), ("broker.example".to_string(), 8883));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }
}
