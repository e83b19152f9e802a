//! Alert Engine + Alert Dispatcher.

pub mod dispatcher;
pub mod engine;

pub use dispatcher::{AlertDispatcher, SinkShape, WebhookSink};
pub use engine::AlertEngine;
