//! Routing of host-initiated requests to subscribers.

use crate::HandlerError;
use gogodata_core::{Action, HostRequest, ResourceSelector, Response};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A subscriber callback. Its response becomes the reply to the host.
pub type Handler = Arc<dyn Fn(&HostRequest) -> Result<Response, HandlerError> + Send + Sync>;

/// Which host action a subscription receives. Matching is exact; there is
/// no wildcard action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSpec {
    Get,
    Update,
    Notify,
}

impl ActionSpec {
    fn matches(self, action: Action) -> bool {
        match self {
            ActionSpec::Get => action == Action::Get,
            ActionSpec::Update => action == Action::Update,
            ActionSpec::Notify => action == Action::Notify,
        }
    }
}

/// Which resources a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    /// `*`
    Any,
    /// Exact string equality with the incoming resource.
    Exact(String),
}

impl ResourceSpec {
    fn matches(&self, resource: &str) -> bool {
        match self {
            ResourceSpec::Any => true,
            ResourceSpec::Exact(spec) => spec == resource,
        }
    }
}

impl From<&str> for ResourceSpec {
    fn from(s: &str) -> Self {
        if s == "*" {
            ResourceSpec::Any
        } else {
            ResourceSpec::Exact(s.to_string())
        }
    }
}

impl From<String> for ResourceSpec {
    fn from(s: String) -> Self {
        s.as_str().into()
    }
}

impl From<ResourceSelector> for ResourceSpec {
    fn from(selector: ResourceSelector) -> Self {
        ResourceSpec::Exact(selector.to_string())
    }
}

#[derive(Clone)]
pub struct Subscription {
    pub action: ActionSpec,
    pub resource: ResourceSpec,
    /// For notifications, only values whose `operation` equals this.
    pub operation: Option<String>,
    pub handler: Handler,
}

impl Subscription {
    pub fn new<F>(action: ActionSpec, resource: impl Into<ResourceSpec>, handler: F) -> Self
    where
        F: Fn(&HostRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        Self {
            action,
            resource: resource.into(),
            operation: None,
            handler: Arc::new(handler),
        }
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    fn matches_operation(&self, value: &Value) -> bool {
        match &self.operation {
            None => true,
            Some(op) => value.get("operation").and_then(Value::as_str) == Some(op.as_str()),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("action", &self.action)
            .field("resource", &self.resource)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// Result of dispatching one host request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// What to send back to the host.
    pub reply: Response,
    /// Handlers that returned a successful response.
    pub successes: u64,
    /// Handlers that returned `success: false`. Errors are not counted here.
    pub failures: u64,
    /// Requests (or notification values) no subscriber matched.
    pub unhandled: u64,
    /// Errors returned by handlers, in invocation order.
    pub errors: Vec<HandlerError>,
}

impl DispatchOutcome {
    fn new() -> Self {
        Self {
            reply: Response::ok(),
            successes: 0,
            failures: 0,
            unhandled: 0,
            errors: Vec::new(),
        }
    }

    pub fn handled(&self) -> bool {
        self.unhandled == 0
    }
}

/// Append-only subscriber registry.
#[derive(Default)]
pub struct Dispatcher {
    subscribers: RwLock<Vec<Subscription>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscription: Subscription) {
        tracing::debug!(
            "Subscribing {:?} {:?} operation={:?}",
            subscription.action,
            subscription.resource,
            subscription.operation
        );
        self.subscribers.write().push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route a host request.
    ///
    /// `get` and `update` go to the first matching subscriber only. A
    /// handler error still counts as handled and leaves the default
    /// `{success: true}` reply in place.
    ///
    /// `notify` goes to every matching subscriber for every value; the
    /// reply's `success` is the AND over all invoked handlers.
    pub fn dispatch(&self, request: &HostRequest) -> DispatchOutcome {
        // Handlers run without the lock held so they may subscribe.
        let subscribers = self.subscribers.read().clone();
        let mut outcome = DispatchOutcome::new();

        match request.action {
            Action::Get | Action::Update => {
                let subscriber = subscribers.iter().find(|s| {
                    s.action.matches(request.action) && s.resource.matches(&request.resource)
                });
                match subscriber {
                    Some(subscriber) => match (subscriber.handler)(request) {
                        Ok(response) => {
                            if response.success {
                                outcome.successes += 1;
                            } else {
                                outcome.failures += 1;
                            }
                            outcome.reply = response;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Handler for {} {} failed: {}",
                                request.action,
                                request.resource,
                                e
                            );
                            outcome.errors.push(e);
                        }
                    },
                    None => {
                        tracing::debug!("Unhandled {} {}", request.action, request.resource);
                        outcome.unhandled += 1;
                    }
                }
            }
            Action::Notify => {
                let mut success = true;
                for value in notification_values(request.values.as_ref()) {
                    let mut handled = false;
                    for subscriber in subscribers.iter().filter(|s| {
                        s.action.matches(Action::Notify)
                            && s.resource.matches(&request.resource)
                            && s.matches_operation(&value)
                    }) {
                        let single = HostRequest {
                            action: request.action,
                            resource: request.resource.clone(),
                            values: Some(value.clone()),
                        };
                        handled = true;
                        match (subscriber.handler)(&single) {
                            Ok(response) if response.success => outcome.successes += 1,
                            Ok(_) => {
                                outcome.failures += 1;
                                success = false;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "Notification handler for {} failed: {}",
                                    request.resource,
                                    e
                                );
                                outcome.errors.push(e);
                                success = false;
                            }
                        }
                    }
                    if !handled {
                        outcome.unhandled += 1;
                    }
                }
                outcome.reply = Response {
                    success,
                    values: None,
                };
            }
            Action::Create | Action::Delete => {
                tracing::debug!("Ignoring host {} {}", request.action, request.resource);
                outcome.unhandled += 1;
            }
        }

        outcome
    }
}

/// Notification values are always handled as a list.
fn notification_values(values: Option<&Value>) -> Vec<Value> {
    match values {
        Some(Value::Array(values)) => values.clone(),
        Some(value) => vec![value.clone()],
        None => vec![Value::Null],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn host(action: Action, resource: &str, values: Option<Value>) -> HostRequest {
        HostRequest {
            action,
            resource: resource.to_string(),
            values,
        }
    }

    #[test]
    fn get_goes_to_first_match_only() {
        let dispatcher = Dispatcher::new();
        let second = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(Subscription::new(ActionSpec::Get, "interactiveState", |_| {
            Ok(Response::ok_with(json!({ "from": "first" })))
        }));
        let counter = second.clone();
        dispatcher.subscribe(Subscription::new(ActionSpec::Get, "*", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Response::ok())
        }));

        let outcome = dispatcher.dispatch(&host(Action::Get, "interactiveState", None));
        assert_eq!(outcome.reply, Response::ok_with(json!({ "from": "first" })));
        assert_eq!(outcome.successes, 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unmatched_get_replies_success() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Subscription::new(ActionSpec::Update, "*", |_| Ok(Response::failed())));

        let outcome = dispatcher.dispatch(&host(Action::Get, "interactiveState", None));
        assert_eq!(outcome.reply, Response::ok());
        assert_eq!(outcome.unhandled, 1);
        assert!(!outcome.handled());
    }

    #[test]
    fn handler_error_keeps_default_reply() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Subscription::new(ActionSpec::Update, "interactiveFrame", |_| {
            Err(HandlerError::new("boom"))
        }));

        let outcome = dispatcher.dispatch(&host(Action::Update, "interactiveFrame", None));
        assert_eq!(outcome.reply, Response::ok());
        assert!(outcome.handled());
        assert_eq!(outcome.errors, vec![HandlerError::new("boom")]);
        assert_eq!(outcome.successes, 0);
        assert_eq!(outcome.failures, 0);
    }

    #[test]
    fn notify_success_is_and_of_handlers() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Subscription::new(ActionSpec::Notify, "documentChangeNotice", |_| {
            Ok(Response::ok())
        }));
        dispatcher.subscribe(Subscription::new(ActionSpec::Notify, "*", |_| Ok(Response::failed())));

        let outcome = dispatcher.dispatch(&host(
            Action::Notify,
            "documentChangeNotice",
            Some(json!({ "operation": "dataContextCountChanged" })),
        ));
        assert!(!outcome.reply.success);
        assert_eq!(outcome.successes, 1);
        assert_eq!(outcome.failures, 1);
    }

    #[test]
    fn notify_filters_by_operation_per_value() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        dispatcher.subscribe(
            Subscription::new(ActionSpec::Notify, "dataContextChangeNotice[Sensors]", move |req| {
                log.lock().push(req.values.clone());
                Ok(Response::ok())
            })
            .operation("createCases"),
        );

        let outcome = dispatcher.dispatch(&host(
            Action::Notify,
            "dataContextChangeNotice[Sensors]",
            Some(json!([
                { "operation": "createCases", "n": 1 },
                { "operation": "selectCases" },
                { "operation": "createCases", "n": 2 },
            ])),
        ));

        assert!(outcome.reply.success);
        assert_eq!(outcome.successes, 2);
        assert_eq!(outcome.unhandled, 1);
        assert_eq!(
            *seen.lock(),
            vec![
                Some(json!({ "operation": "createCases", "n": 1 })),
                Some(json!({ "operation": "createCases", "n": 2 })),
            ]
        );
    }

    #[test]
    fn notify_handler_error_fails_notification() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Subscription::new(ActionSpec::Notify, "*", |_| {
            Err(HandlerError::new("bad"))
        }));

        let outcome = dispatcher.dispatch(&host(Action::Notify, "component", Some(json!({}))));
        assert!(!outcome.reply.success);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn action_must_match_exactly() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Subscription::new(ActionSpec::Notify, "*", |_| {
            Ok(Response::ok_with(json!("notify")))
        }));
        dispatcher.subscribe(Subscription::new(ActionSpec::Get, "interactiveState", |_| {
            Ok(Response::ok_with(json!({ "k": 1 })))
        }));

        let outcome = dispatcher.dispatch(&host(Action::Get, "interactiveState", None));
        assert_eq!(outcome.reply.values, Some(json!({ "k": 1 })));

        let outcome = dispatcher.dispatch(&host(Action::Update, "interactiveState", None));
        assert_eq!(outcome.unhandled, 1);
        assert_eq!(outcome.reply, Response::ok());
    }
}
