//! Delivery of rows to a CODAP data context.

use crate::{BoardAliases, ConnectorError, ContextLayout, Row};
use gogodata_client::{api, ClientError, Connection};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Sends rows as items, creating the data context on first use.
///
/// Rows that arrive while the host is not ready are queued and sent in
/// order on the next ready signal.
pub struct CodapSink {
    conn: Arc<Connection>,
    layout: ContextLayout,
    aliases: BoardAliases,
    ready: bool,
    context_created: bool,
    queue: VecDeque<Row>,
    sent: u64,
}

impl CodapSink {
    pub fn new(conn: Arc<Connection>, layout: ContextLayout, aliases: BoardAliases) -> Self {
        Self {
            conn,
            layout,
            aliases,
            ready: false,
            context_created: false,
            queue: VecDeque::new(),
            sent: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Rows delivered so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Mark the host ready and drain the queue.
    pub async fn set_ready(&mut self) -> Result<(), ConnectorError> {
        self.ready = true;
        if !self.queue.is_empty() {
            tracing::info!("Sending {} queued rows to CODAP", self.queue.len());
        }
        while let Some(row) = self.queue.pop_front() {
            self.deliver(row).await?;
        }
        Ok(())
    }

    pub fn set_not_ready(&mut self) {
        self.ready = false;
    }

    /// Send a row now, or queue it if the host is not ready.
    pub async fn push(&mut self, row: Row) -> Result<(), ConnectorError> {
        if !self.ready {
            tracing::debug!("CODAP not ready, queueing row ({} queued)", self.queue.len() + 1);
            self.queue.push_back(row);
            return Ok(());
        }
        self.deliver(row).await
    }

    async fn deliver(&mut self, row: Row) -> Result<(), ConnectorError> {
        match self.try_deliver(&row).await {
            Ok(()) => Ok(()),
            Err(e @ (ClientError::Timeout(_) | ClientError::Closed(_))) => {
                // Keep the row for the next ready signal.
                self.queue.push_front(row);
                self.ready = false;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn try_deliver(&mut self, row: &Row) -> Result<(), ClientError> {
        if !self.context_created {
            let spec = self.layout.spec_for(row);
            let created = api::create_data_context_with(&self.conn, &spec).await?;
            if created.success {
                tracing::info!("Created data context {}", spec.name);
            } else {
                // Usually "already exists"; carry on either way.
                tracing::info!(
                    "Data context {} not created ({}), assuming it exists",
                    spec.name,
                    created.error_message().unwrap_or("no reason given")
                );
            }
            self.context_created = true;
        }

        let reply = api::create_items(&self.conn, &self.layout.name, &[row]).await?;
        if !reply.success {
            tracing::warn!(
                "CODAP rejected row: {}",
                reply.error_message().unwrap_or("unknown failure")
            );
            return Ok(());
        }

        self.sent += 1;
        self.conn
            .update_interactive_state(&json!({ "rowsSent": self.sent }));
        match &row.board {
            Some(board) => tracing::debug!("Sent row from {}", self.aliases.display_name(board)),
            None => tracing::debug!("Sent row"),
        }
        Ok(())
    }

    /// Feed rows into CODAP until the row channel closes.
    ///
    /// Every `true` on `ready` (repeats included) drains the queue.
    pub async fn run(mut self, mut rows: mpsc::Receiver<Row>, mut ready: watch::Receiver<bool>) {
        let mut signals_open = true;
        loop {
            tokio::select! {
                biased;
                changed = ready.changed(), if signals_open => {
                    if changed.is_err() {
                        signals_open = false;
                        continue;
                    }
                    if *ready.borrow_and_update() {
                        if let Err(e) = self.set_ready().await {
                            tracing::warn!("Could not drain row queue: {}", e);
                        }
                    } else {
                        self.set_not_ready();
                    }
                }
                row = rows.recv() => {
                    let Some(row) = row else { break };
                    if let Err(e) = self.push(row).await {
                        tracing::warn!("Could not send row to CODAP: {}", e);
                    }
                }
            }
        }

        if *ready.borrow() && !self.queue.is_empty() {
            if let Err(e) = self.set_ready().await {
                tracing::warn!("Could not drain row queue: {}", e);
            }
        }
        if !self.queue.is_empty() {
            tracing::warn!("Dropping {} rows never sent to CODAP", self.queue.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gogodata_client::FnTransport;
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use serde_json::Value;

    fn layout() -> ContextLayout {
        ContextLayout {
            name: "GoGoBoard".into(),
            title: None,
            collection: "Sensor data".into(),
            labels: None,
            attrs: None,
        }
    }

    fn row(light: f64) -> Row {
        Row::now(
            Some("GoGo-1".into()),
            IndexMap::from([("light".to_string(), light)]),
        )
    }

    /// A host that refuses to create data contexts and accepts items.
    fn host() -> (Arc<Connection>, Arc<Mutex<Vec<Value>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let conn = Connection::new(Arc::new(FnTransport::new(move |message: Value| {
            seen.lock().push(message.clone());
            if message["resource"] == "dataContext" {
                Some(json!({ "success": false, "values": { "error": "already exists" } }))
            } else {
                Some(json!({ "success": true }))
            }
        })));
        (Arc::new(conn), log)
    }

    #[tokio::test]
    async fn duplicate_context_still_sends_items() {
        let (conn, log) = host();
        let mut sink = CodapSink::new(conn.clone(), layout(), BoardAliases::default());
        sink.set_ready().await.unwrap();
        sink.push(row(846.0)).await.unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0]["action"], "create");
        assert_eq!(log[0]["resource"], "dataContext");
        assert_eq!(log[0]["values"]["collections"][0]["name"], "Sensor data");
        assert_eq!(log[1]["resource"], "dataContext[GoGoBoard].item");
        assert_eq!(log[1]["values"][0]["light"], 846.0);
        assert_eq!(sink.sent(), 1);
        assert_eq!(conn.interactive_state(), json!({ "rowsSent": 1 }));
    }

    #[tokio::test]
    async fn queued_rows_drain_in_order() {
        let (conn, log) = host();
        let mut sink = CodapSink::new(conn, layout(), BoardAliases::default());
        sink.push(row(1.0)).await.unwrap();
        sink.push(row(2.0)).await.unwrap();
        assert_eq!(sink.queued(), 2);
        assert!(log.lock().is_empty());

        sink.set_ready().await.unwrap();
        assert_eq!(sink.queued(), 0);
        let lights: Vec<Value> = log
            .lock()
            .iter()
            .filter(|m| m["resource"] == "dataContext[GoGoBoard].item")
            .map(|m| m["values"][0]["light"].clone())
            .collect();
        assert_eq!(lights, vec![json!(1.0), json!(2.0)]);
    }

    #[tokio::test]
    async fn timeout_requeues_row() {
        let conn = Arc::new(Connection::new(Arc::new(FnTransport::new(|_| None))));
        let mut sink = CodapSink::new(conn, layout(), BoardAliases::default());
        sink.set_ready().await.unwrap();

        let err = sink.push(row(3.0)).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Client(ClientError::Timeout(_))));
        assert_eq!(sink.queued(), 1);
        assert!(!sink.is_ready());
    }

    #[tokio::test]
    async fn run_waits_for_ready_signal() {
        let (conn, log) = host();
        let sink = CodapSink::new(conn, layout(), BoardAliases::default());
        let (rows_tx, rows_rx) = mpsc::channel(4);
        let (ready_tx, ready_rx) = watch::channel(false);
        let task = tokio::spawn(sink.run(rows_rx, ready_rx));

        rows_tx.send(row(5.0)).await.unwrap();
        tokio::task::yield_now().await;
        ready_tx.send(true).unwrap();
        // A second row after ready goes straight through.
        rows_tx.send(row(6.0)).await.unwrap();
        drop(rows_tx);
        task.await.unwrap();

        let items = log
            .lock()
            .iter()
            .filter(|m| m["resource"] == "dataContext[GoGoBoard].item")
            .count();
        assert_eq!(items, 2);
    }
}
