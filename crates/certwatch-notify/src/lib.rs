//! Deferred certificate-expiry notifications.
//!
//! Requests and the daily [`scheduler`] only enqueue [`queue::Job`]s; a pool
//! of workers resolves each certificate and its owner through the
//! [`directory`], then delivers by email ([`mailer`]) or SMS ([`sms`]).

pub mod directory;
pub mod dispatch;
pub mod mailer;
pub mod message;
pub mod outcome;
pub mod queue;
pub mod routes;
pub mod scheduler;
pub mod sms;
