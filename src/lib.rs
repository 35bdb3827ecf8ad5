//! flowfn embeds a visual flow runtime inside a serverless function host.
//!
//! The crate is the event-dispatch layer between the platform's trigger
//! entry points and a flow-graph engine behind the [`host::RuntimeHost`]
//! trait. Inbound trigger events (HTTP exchanges, pub/sub messages,
//! storage notifications) are normalized into one [`message::Envelope`],
//! held at the [`gate::ColdStartGate`] until the engine has loaded its
//! graphs, resolved through a [`flow::FlowReference`] to a concrete entry
//! node, and delivered exactly once.
//!
//! A process creates one [`host::FlowHost`] at startup and hands each
//! platform invocation to [`host::FlowHost::trigger_flow`].

pub mod config;
pub mod dispatch;
pub mod flow;
pub mod gate;
pub mod host;
pub mod logger;
pub mod message;
pub mod trigger;

pub use config::{HostSettings, RunMode, SettingsOverrides};
pub use dispatch::Dispatcher;
pub use flow::{FlowGraphSet, FlowNode, FlowReference};
pub use gate::ColdStartGate;
pub use host::{DeliveryError, DeliveryResult, FlowHost, RuntimeHost};
pub use message::{CompletionCallback, Envelope, HttpRequest, HttpResponse};
pub use trigger::TriggerArg;
