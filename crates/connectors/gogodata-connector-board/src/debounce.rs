//! Per-board debounce of sensor readings.
//!
//! Boards publish one MQTT message per sensor. Readings for the same board
//! are collected until no new reading has arrived for the window, then
//! emitted as one row. Each reading restarts its board's window and a
//! repeated sensor keeps only its latest value.

use crate::{Reading, Row};
use indexmap::IndexMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default quiet period before a board's readings are flushed.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60);

#[derive(Debug)]
struct Pending {
    values: IndexMap<String, f64>,
    deadline: Instant,
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: IndexMap<String, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: IndexMap::new(),
        }
    }

    pub fn push(&mut self, reading: Reading, now: Instant) {
        let deadline = now + self.window;
        let pending = self
            .pending
            .entry(reading.board)
            .or_insert_with(|| Pending {
                values: IndexMap::new(),
                deadline,
            });
        pending.values.insert(reading.sensor, reading.value);
        pending.deadline = deadline;
    }

    /// The earliest moment a board becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every board whose window has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(String, IndexMap<String, f64>)> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(board, _)| board.clone())
            .collect();
        due.into_iter()
            .filter_map(|board| {
                let pending = self.pending.shift_remove(&board)?;
                Some((board, pending.values))
            })
            .collect()
    }

    /// Remove and return everything, due or not.
    pub fn take_all(&mut self) -> Vec<(String, IndexMap<String, f64>)> {
        self.pending
            .drain(..)
            .map(|(board, pending)| (board, pending.values))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Turn a stream of readings into debounced rows.
///
/// Returns when the reading channel closes (after flushing what is left)
/// or when the row receiver goes away.
pub async fn run(window: Duration, mut readings: mpsc::Receiver<Reading>, rows: mpsc::Sender<Row>) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            reading = readings.recv() => match reading {
                Some(reading) => debouncer.push(reading, Instant::now()),
                None => break,
            },
            () = wait_until(deadline) => {
                for (board, values) in debouncer.take_due(Instant::now()) {
                    if rows.send(Row::now(Some(board), values)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    for (board, values) in debouncer.take_all() {
        if rows.send(Row::now(Some(board), values)).await.is_err() {
            return;
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
