use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::{HostSettings, RunMode, SettingsOverrides};
use crate::dispatch::Dispatcher;
use crate::flow::{FlowGraphSet, FlowReference};
use crate::gate::ColdStartGate;
use crate::message::Envelope;
use crate::trigger::TriggerArg;

/// Error raised while the flow graph processes a delivered envelope. The
/// dispatch layer never catches, wraps, or retries these; they pass through
/// to the trigger caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, JsonSchema)]
pub enum DeliveryError {
    #[error("no live node registered for id `{0}`")]
    NodeGone(String),
    #[error("flow processing failed: {0}")]
    Downstream(String),
}

/// Whatever the runtime host's per-node delivery primitive returns. May
/// complete immediately or only when the flow finishes processing the
/// message; that choice belongs to the host.
pub type DeliveryResult = Result<Value, DeliveryError>;

/// The flow-graph engine, seen from the dispatch layer.
///
/// `deliver` looks up the live node behind `node_id` and hands it the
/// envelope; a missing live node surfaces as [`DeliveryError::NodeGone`].
#[async_trait]
pub trait RuntimeHost: Send + Sync {
    /// Register a callback invoked exactly once when the host has finished
    /// loading its graphs.
    fn on_graphs_loaded(&self, callback: Box<dyn FnOnce() + Send>);

    /// Start the host with an immutable configuration snapshot. A failure
    /// here is fatal for the process: the cold-start gate will never fire.
    async fn start(&self, settings: &HostSettings) -> anyhow::Result<()>;

    /// The set of graphs loaded at startup.
    async fn loaded_graphs(&self) -> FlowGraphSet;

    /// Deliver an envelope to the node with `node_id`.
    async fn deliver(&self, node_id: &str, envelope: Envelope) -> DeliveryResult;
}

/// Process-wide context: exactly one per process, constructed at startup,
/// passed by reference to whoever needs to trigger flows. No ambient
/// globals.
pub struct FlowHost {
    settings: HostSettings,
    runtime: Arc<dyn RuntimeHost>,
    dispatcher: Dispatcher,
}

impl FlowHost {
    /// Compose settings, wire the graphs-loaded signal to the cold-start
    /// gate, and start the runtime host. Startup failure propagates
    /// unrecoverably.
    pub async fn start(
        runtime: Arc<dyn RuntimeHost>,
        overrides: SettingsOverrides,
    ) -> anyhow::Result<Self> {
        let settings = HostSettings::compose(RunMode::from_env(), overrides);
        let gate = ColdStartGate::new();

        let ready = gate.clone();
        runtime.on_graphs_loaded(Box::new(move || {
            info!("flow graphs loaded; releasing deferred dispatches");
            ready.fire();
        }));
        runtime.start(&settings).await?;

        let dispatcher = Dispatcher::new(runtime.clone(), gate);
        Ok(Self {
            settings,
            runtime,
            dispatcher,
        })
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &Arc<dyn RuntimeHost> {
        &self.runtime
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Trigger entry point for the embedding function: classify the raw
    /// platform arguments and dispatch into the referenced flow.
    pub async fn trigger_flow(
        &self,
        reference: FlowReference,
        args: Vec<TriggerArg>,
    ) -> Option<DeliveryResult> {
        self.dispatcher.trigger_flow(reference, args).await
    }

    pub async fn dispatch(
        &self,
        envelope: Envelope,
        reference: &FlowReference,
    ) -> Option<DeliveryResult> {
        self.dispatcher.dispatch(envelope, reference).await
    }
}
