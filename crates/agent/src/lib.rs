//! Poller, processor, reminders and notifier pipelines sharing one
//! PostgreSQL-backed data model (`recruiting_common`). Each pipeline is a
//! [`service::Service`] the four `bin/*.rs` entrypoints wrap in a
//! [`service::Supervisor`].

pub mod cli;
pub mod notifier;
pub mod poller;
pub mod processor;
pub mod reminders;
pub mod service;
pub mod token_refresh;
