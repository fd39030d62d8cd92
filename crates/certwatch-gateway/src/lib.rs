//! Identity change-event bus.
//!
//! The auth service owns an [`dispatcher::EventBus`] and publishes every
//! identity create/update on it. Subscribers either live in-process
//! ([`subscriber::run_local`]) or connect to the `/events` WebSocket stream
//! ([`connection::stream_events`] on the server side,
//! [`subscriber::run_remote`] on the client side). Delivery is best-effort:
//! nothing is persisted and nothing is replayed on reconnect.

pub mod connection;
pub mod dispatcher;
pub mod subscriber;
