//! Wiring: transport, connection, source and sink.

use crate::config::Config;
use anyhow::Context;
use gogodata_client::{Connection, FnTransport, HostCall, WsTransport};
use gogodata_connector_board::{debounce, mqtt, serial, CodapSink};
use gogodata_core::{ConnectionState, FrameConfig};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Where sensor data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Serial { device: PathBuf },
    Mqtt,
}

/// How the connection reaches CODAP.
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    /// Log requests and pretend they succeeded.
    Standalone,
    /// A WebSocket relay inside the CODAP iframe. Reconnected when it drops.
    Relay { url: String, timeout: Duration },
}

pub async fn run(config: Config, source: Source, standalone: bool) -> anyhow::Result<()> {
    let link = if standalone {
        tracing::info!("Standalone mode: requests are logged, not sent");
        Link::Standalone
    } else {
        Link::Relay {
            url: config.codap.url.clone(),
            timeout: config.codap.timeout(),
        }
    };

    let conn = match &link {
        Link::Standalone => Arc::new(Connection::new(Arc::new(standalone_transport()))),
        Link::Relay { url, timeout } => {
            let (transport, calls) = WsTransport::connect(url, *timeout)
                .await
                .with_context(|| format!("connecting to CODAP relay at {}", url))?;
            let conn = Arc::new(Connection::new(Arc::new(transport)));
            spawn_serve(conn.clone(), calls);
            conn
        }
    };

    let (ready_tx, ready_rx) = watch::channel(false);
    let (rows_tx, rows_rx) = mpsc::channel(256);
    let sink = CodapSink::new(conn.clone(), config.data_context.layout(), config.aliases());
    let sink_task = tokio::spawn(sink.run(rows_rx, ready_rx));
    let supervisor = tokio::spawn(supervise(
        conn.clone(),
        link,
        config.codap.frame(),
        config.codap.retry(),
        ready_tx,
    ));

    let source_result = tokio::select! {
        result = read_source(&config, source, rows_tx) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    // The source (and with it every row sender) is gone; let the sink drain.
    sink_task.await.context("sink task panicked")?;
    supervisor.abort();
    tracing::info!("Final stats: {:?}", conn.stats());
    conn.close();
    source_result
}

async fn read_source(config: &Config, source: Source, rows: mpsc::Sender<gogodata_connector_board::Row>) -> anyhow::Result<()> {
    match source {
        Source::Serial { device } => {
            let reader = serial::open_device(&device)?;
            let sent = serial::read_lines(reader, rows).await?;
            tracing::info!("Serial input ended after {} rows", sent);
        }
        Source::Mqtt => {
            let (readings_tx, readings_rx) = mpsc::channel(256);
            let debouncer = tokio::spawn(debounce::run(config.mqtt.debounce(), readings_rx, rows));
            let result = mqtt::run(config.mqtt.settings(), readings_tx).await;
            // readings_tx is gone now, so the debouncer flushes and exits.
            debouncer.await.context("debounce task panicked")?;
            result?;
        }
    }
    Ok(())
}

fn spawn_serve(conn: Arc<Connection>, calls: mpsc::Receiver<HostCall>) {
    tokio::spawn(async move { conn.serve(calls).await });
}

/// Keep trying to initialize the connection and report readiness.
///
/// When the relay went away (`inactive`) a new socket is opened first.
/// While connected, readiness is re-announced every `retry` so rows queued
/// after a timeout get another chance.
async fn supervise(
    conn: Arc<Connection>,
    link: Link,
    frame: FrameConfig,
    retry: Duration,
    ready: watch::Sender<bool>,
) {
    let mut interval = tokio::time::interval(retry);
    loop {
        interval.tick().await;
        match conn.state() {
            ConnectionState::Closed => break,
            ConnectionState::Active if *ready.borrow() => {
                ready.send_replace(true);
                continue;
            }
            ConnectionState::Inactive => {
                ready.send_replace(false);
                if let Link::Relay { url, timeout } = &link {
                    match WsTransport::connect(url, *timeout).await {
                        Ok((transport, calls)) => {
                            if !conn.replace_transport(Arc::new(transport)) {
                                break;
                            }
                            spawn_serve(conn.clone(), calls);
                        }
                        Err(e) => {
                            tracing::warn!("CODAP relay unavailable ({}), retrying in {:?}", e, retry);
                            continue;
                        }
                    }
                }
            }
            _ => {}
        }

        match conn.init(frame.clone()).await {
            Ok(saved) => {
                if let Some(saved) = saved {
                    tracing::debug!("Recovered interactive state {}", saved);
                }
                ready.send_replace(true);
            }
            Err(e) => {
                tracing::warn!("CODAP not available ({}), retrying in {:?}", e, retry);
                ready.send_replace(false);
            }
        }
    }
}

/// A host stand-in that accepts everything.
pub fn standalone_transport() -> FnTransport<impl Fn(Value) -> Option<Value> + Send + Sync> {
    FnTransport::new(|message: Value| {
        tracing::info!("standalone: {}", message);
        let reply = match message {
            Value::Array(requests) => Value::Array(requests.iter().map(|_| json!({ "success": true })).collect()),
            _ => json!({ "success": true }),
        };
        Some(reply)
    })
}
