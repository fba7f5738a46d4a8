//! Client side of the CODAP Data-Interactive protocol.
//!
//! A [`Connection`] speaks to the host through a [`Transport`]. Requests go
//! out with [`Connection::send_request`]; host-initiated requests are routed
//! to subscribers registered with [`Connection::on`]. The [`api`] module
//! builds the common document operations on top.

pub mod api;
mod connection;
mod dispatch;
mod error;
mod state;
mod transport;
mod ws;

pub use connection::{Connection, Stats};
pub use dispatch::{ActionSpec, DispatchOutcome, Dispatcher, Handler, ResourceSpec, Subscription};
pub use error::{ClientError, HandlerError};
pub use state::InteractiveState;
pub use transport::{FnTransport, HostCall, Transport};
pub use ws::{WsTransport, DEFAULT_TIMEOUT};
