//! The plugin's connection to the CODAP host.

use crate::dispatch::{ActionSpec, DispatchOutcome, Dispatcher, ResourceSpec, Subscription};
use crate::state::InteractiveState;
use crate::transport::{HostCall, Transport};
use crate::{ClientError, HandlerError};
use chrono::{DateTime, Utc};
use gogodata_core::{ConnectionState, FrameConfig, HostRequest, Request, ResourceSelector, Response};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cumulative traffic counters.
///
/// "di" counts requests the plugin sent; "codap" counts requests the host
/// sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub count_di_req: u64,
    pub count_di_rpl_success: u64,
    pub count_di_rpl_fail: u64,
    pub count_di_rpl_timeout: u64,
    pub count_codap_req: u64,
    pub count_codap_unhandled_req: u64,
    pub count_codap_rpl_success: u64,
    pub count_codap_rpl_fail: u64,
    pub count_codap_handler_error: u64,
    pub time_di_first_req: Option<DateTime<Utc>>,
    pub time_di_last_req: Option<DateTime<Utc>>,
    pub time_codap_first_req: Option<DateTime<Utc>>,
    pub time_codap_last_req: Option<DateTime<Utc>>,
}

impl Stats {
    fn record_di_request(&mut self) {
        let now = Utc::now();
        self.count_di_req += 1;
        self.time_di_last_req = Some(now);
        self.time_di_first_req.get_or_insert(now);
    }

    fn record_di_reply(&mut self, success: bool) {
        if success {
            self.count_di_rpl_success += 1;
        } else {
            self.count_di_rpl_fail += 1;
        }
    }

    fn record_codap_request(&mut self) {
        let now = Utc::now();
        self.count_codap_req += 1;
        self.time_codap_last_req = Some(now);
        self.time_codap_first_req.get_or_insert(now);
    }

    fn record_dispatch(&mut self, outcome: &DispatchOutcome) {
        self.count_codap_rpl_success += outcome.successes;
        self.count_codap_rpl_fail += outcome.failures;
        self.count_codap_unhandled_req += outcome.unhandled;
        self.count_codap_handler_error += outcome.errors.len() as u64;
    }
}

/// A Data-Interactive connection.
///
/// One per plugin instance. Share it with `Arc` and pass it to the
/// helpers in [`crate::api`].
pub struct Connection {
    transport: Mutex<Option<Arc<dyn Transport>>>,
    state: Mutex<ConnectionState>,
    stats: Mutex<Stats>,
    config: Mutex<Option<FrameConfig>>,
    interactive_state: InteractiveState,
    dispatcher: Dispatcher,
    state_handler_registered: AtomicBool,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            state: Mutex::new(ConnectionState::Preinit),
            stats: Mutex::new(Stats::default()),
            config: Mutex::new(None),
            interactive_state: InteractiveState::new(),
            dispatcher: Dispatcher::new(),
            state_handler_registered: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().clone()
    }

    pub fn config(&self) -> Option<FrameConfig> {
        self.config.lock().clone()
    }

    /// The current interactive state as a JSON object.
    pub fn interactive_state(&self) -> Value {
        self.interactive_state.snapshot()
    }

    /// A shared handle to the interactive state.
    pub fn interactive_state_store(&self) -> InteractiveState {
        self.interactive_state.clone()
    }

    /// Shallow-merge `patch` into the interactive state.
    pub fn update_interactive_state(&self, patch: &Value) {
        self.interactive_state.merge(patch);
    }

    /// Register a handler for host-initiated requests.
    pub fn on<F>(&self, action: ActionSpec, resource: impl Into<ResourceSpec>, handler: F)
    where
        F: Fn(&HostRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(Subscription::new(action, resource, handler));
    }

    pub fn subscribe(&self, subscription: Subscription) {
        self.dispatcher.subscribe(subscription);
    }

    /// Announce the plugin to the host and recover its saved state.
    ///
    /// Sends `update interactiveFrame` followed by `get interactiveFrame` as
    /// one ordered batch and returns `values.savedState` from the second
    /// reply.
    pub async fn init(&self, config: FrameConfig) -> Result<Option<Value>, ClientError> {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Preinit {
                *state = ConnectionState::Init;
            }
        }
        *self.config.lock() = Some(config.clone());

        if !config.custom_interactive_state_handler
            && !self.state_handler_registered.swap(true, Ordering::SeqCst)
        {
            let store = self.interactive_state.clone();
            self.on(ActionSpec::Get, "interactiveState", move |_| {
                Ok(Response::ok_with(store.snapshot()))
            });
        }

        let frame = ResourceSelector::leaf("interactiveFrame")?;
        let update = Request::update(frame.clone(), serde_json::to_value(&config)?);
        let get = Request::get(frame);

        let replies = match self.send_batch(&[update, get]).await {
            Ok(replies) => replies,
            Err(ClientError::Timeout(_)) => return Err(ClientError::InitTimeout),
            Err(e) => return Err(e),
        };

        let frame_reply = match replies.get(1) {
            Some(reply) if reply.success => reply,
            Some(reply) => {
                let message = reply.error_message().unwrap_or("unknown failure");
                return Err(ClientError::Rejected(message.to_string()));
            }
            None => return Err(ClientError::Rejected("unknown failure".to_string())),
        };

        let saved = frame_reply
            .value("savedState")
            .filter(|v| !v.is_null())
            .cloned();
        if let Some(saved) = &saved {
            self.interactive_state.merge(saved);
        }
        tracing::info!(
            "Connected to CODAP as {} (saved state: {})",
            config.name,
            saved.is_some()
        );
        Ok(saved)
    }

    /// Send one request and wait for the reply.
    ///
    /// A `success: false` reply is returned as-is; only a missing reply is an
    /// error.
    pub async fn send_request(&self, request: &Request) -> Result<Response, ClientError> {
        let message = serde_json::to_value(request)?;
        let reply = self.call(message).await?;
        let response: Response = serde_json::from_value(reply)?;
        self.stats.lock().record_di_reply(response.success);
        Ok(response)
    }

    /// Send requests as one ordered batch.
    pub async fn send_batch(&self, requests: &[Request]) -> Result<Vec<Response>, ClientError> {
        let message = serde_json::to_value(requests)?;
        let reply = self.call(message).await?;
        let responses: Vec<Response> = serde_json::from_value(reply)?;
        let mut stats = self.stats.lock();
        for response in &responses {
            stats.record_di_reply(response.success);
        }
        Ok(responses)
    }

    async fn call(&self, message: Value) -> Result<Value, ClientError> {
        let transport = {
            let state = *self.state.lock();
            let transport = self.transport.lock().clone();
            match (state, transport) {
                (ConnectionState::Closed, _) | (_, None) => {
                    tracing::warn!("sendRequest on closed CODAP connection: {}", message);
                    return Err(ClientError::Closed(message.to_string()));
                }
                (ConnectionState::Preinit, Some(transport)) => {
                    tracing::debug!("sendRequest before init: {}", message);
                    transport
                }
                (_, Some(transport)) => transport,
            }
        };

        self.stats.lock().record_di_request();

        match transport.call(message.clone()).await {
            Some(reply) => {
                self.mark_active();
                Ok(reply)
            }
            None => {
                self.stats.lock().count_di_rpl_timeout += 1;
                tracing::warn!("CODAP request timed out: {}", message);
                Err(ClientError::Timeout(message.to_string()))
            }
        }
    }

    /// Answer one host-initiated message.
    pub fn handle_host_message(&self, message: &Value) -> Value {
        self.mark_active();
        self.stats.lock().record_codap_request();

        let request: HostRequest = match serde_json::from_value(message.clone()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Unhandled request from CODAP ({}): {}", e, message);
                self.stats.lock().count_codap_unhandled_req += 1;
                return reply_value(&Response::ok());
            }
        };

        let outcome = self.dispatcher.dispatch(&request);
        self.stats.lock().record_dispatch(&outcome);
        reply_value(&outcome.reply)
    }

    /// Answer host calls until the transport stops delivering them.
    pub async fn serve(&self, mut calls: mpsc::Receiver<HostCall>) {
        while let Some(call) = calls.recv().await {
            let reply = self.handle_host_message(&call.message);
            call.respond(reply);
        }
        self.mark_inactive();
    }

    /// Record that the host went away. The transport is kept.
    pub fn mark_inactive(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Closed {
            tracing::info!("CODAP connection inactive");
            *state = ConnectionState::Inactive;
        }
    }

    /// Swap in a fresh transport, typically after the host went away.
    ///
    /// The old transport is closed. Returns `false` once the connection is
    /// closed.
    pub fn replace_transport(&self, transport: Arc<dyn Transport>) -> bool {
        let state = self.state.lock();
        if *state == ConnectionState::Closed {
            return false;
        }
        if let Some(old) = self.transport.lock().replace(transport) {
            old.close();
        }
        tracing::info!("CODAP transport replaced ({})", *state);
        true
    }

    /// Drop the transport. Every later send fails.
    pub fn close(&self) {
        if let Some(transport) = self.transport.lock().take() {
            transport.close();
        }
        *self.state.lock() = ConnectionState::Closed;
        tracing::info!("CODAP connection closed");
    }

    fn mark_active(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Closed {
            *state = ConnectionState::Active;
        }
    }
}

fn reply_value(response: &Response) -> Value {
    serde_json::to_value(response).unwrap_or_else(|_| serde_json::json!({ "success": false }))
}
