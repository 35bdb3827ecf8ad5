use std::sync::Arc;

use tracing::debug;

use crate::flow::FlowReference;
use crate::gate::ColdStartGate;
use crate::host::{DeliveryResult, RuntimeHost};
use crate::message::Envelope;
use crate::trigger::{self, TriggerArg};

/// Orchestrates one dispatch: cold-start gate, then resolution, then
/// delivery. At-most-once, no retries; the dispatch path reads the graph
/// set but mutates nothing.
pub struct Dispatcher {
    runtime: Arc<dyn RuntimeHost>,
    gate: ColdStartGate,
}

impl Dispatcher {
    pub fn new(runtime: Arc<dyn RuntimeHost>, gate: ColdStartGate) -> Self {
        Self { runtime, gate }
    }

    pub fn gate(&self) -> &ColdStartGate {
        &self.gate
    }

    /// Deliver an envelope to the node the reference resolves to.
    ///
    /// Returns `None` without delivering when nothing matches: an absent
    /// target flow means "nothing to do", not a failure, so partially
    /// configured deployments stay quiet. A `Some` carries the host's
    /// delivery result verbatim, downstream errors included.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        reference: &FlowReference,
    ) -> Option<DeliveryResult> {
        self.gate.await_ready().await;
        let graphs = self.runtime.loaded_graphs().await;

        let Some(node) = graphs.resolve(reference) else {
            debug!(?reference, "no node matched the flow reference; dropping envelope");
            return None;
        };
        let node_id = node.id.clone();

        debug!(node = %node_id, http = envelope.is_http(), "delivering envelope");
        Some(self.runtime.deliver(&node_id, envelope).await)
    }

    /// Generic trigger entry point: shape-detect the raw platform
    /// arguments, then dispatch. Unrecognized shapes return `None` before
    /// touching the gate.
    pub async fn trigger_flow(
        &self,
        reference: FlowReference,
        args: Vec<TriggerArg>,
    ) -> Option<DeliveryResult> {
        let envelope = trigger::normalize(args)?;
        self.dispatch(envelope, &reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowGraphSet, FlowNode};
    use crate::host::DeliveryError;
    use crate::message::{http_exchange, CompletionCallback};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Runtime host double that records deliveries and echoes payloads.
    struct RecordingHost {
        graphs: FlowGraphSet,
        deliveries: AtomicUsize,
        fail_with: Option<DeliveryError>,
    }

    impl RecordingHost {
        fn new(graphs: FlowGraphSet) -> Arc<Self> {
            Arc::new(Self {
                graphs,
                deliveries: AtomicUsize::new(0),
                fail_with: None,
            })
        }

        fn failing(graphs: FlowGraphSet, error: DeliveryError) -> Arc<Self> {
            Arc::new(Self {
                graphs,
                deliveries: AtomicUsize::new(0),
                fail_with: Some(error),
            })
        }

        fn delivery_count(&self) -> usize {
            self.deliveries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RuntimeHost for RecordingHost {
        fn on_graphs_loaded(&self, callback: Box<dyn FnOnce() + Send>) {
            callback();
        }

        async fn start(&self, _settings: &crate::config::HostSettings) -> anyhow::Result<()> {
            Ok(())
        }

        async fn loaded_graphs(&self) -> FlowGraphSet {
            self.graphs.clone()
        }

        async fn deliver(&self, node_id: &str, envelope: Envelope) -> DeliveryResult {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            match envelope {
                Envelope::Background { payload, .. } => Ok(payload),
                Envelope::Http { .. } => Ok(json!({"delivered_to": node_id})),
            }
        }
    }

    fn sample_graphs() -> FlowGraphSet {
        FlowGraphSet::from_nodes([
            FlowNode::container("tab1"),
            FlowNode::in_graph("n1", "gcp-cloud-functions-http-in", "tab1"),
        ])
    }

    fn fired_gate() -> ColdStartGate {
        let gate = ColdStartGate::new();
        gate.fire();
        gate
    }

    #[tokio::test]
    async fn test_dispatch_delivers_to_resolved_node() {
        let host = RecordingHost::new(sample_graphs());
        let dispatcher = Dispatcher::new(host.clone(), fired_gate());

        let (req, res) = http_exchange("GET", "/", Value::Null);
        let result = dispatcher
            .dispatch(
                Envelope::Http {
                    request: req,
                    response: res,
                },
                &FlowReference::Default,
            )
            .await;

        assert_eq!(result, Some(Ok(json!({"delivered_to": "n1"}))));
        assert_eq!(host.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_reference_performs_no_delivery() {
        let host = RecordingHost::new(sample_graphs());
        let dispatcher = Dispatcher::new(host.clone(), fired_gate());

        let (req, res) = http_exchange("GET", "/", Value::Null);
        let result = dispatcher
            .dispatch(
                Envelope::Http {
                    request: req,
                    response: res,
                },
                &FlowReference::named("missing-id"),
            )
            .await;

        assert_eq!(result, None);
        assert_eq!(host.delivery_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_the_gate() {
        let host = RecordingHost::new(sample_graphs());
        let gate = ColdStartGate::new();
        let dispatcher = Arc::new(Dispatcher::new(host.clone(), gate.clone()));

        let inflight = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let (req, res) = http_exchange("GET", "/", Value::Null);
                dispatcher
                    .dispatch(
                        Envelope::Http {
                            request: req,
                            response: res,
                        },
                        &FlowReference::Default,
                    )
                    .await
            })
        };

        // nothing may be delivered while the gate is pending
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(host.delivery_count(), 0);

        gate.fire();
        let result = timeout(Duration::from_secs(1), inflight)
            .await
            .expect("dispatch resolves once the gate fires")
            .unwrap();
        assert!(matches!(result, Some(Ok(_))));
        assert_eq!(host.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_downstream_failure_passes_through() {
        let host = RecordingHost::failing(
            sample_graphs(),
            DeliveryError::Downstream("node blew up".to_string()),
        );
        let dispatcher = Dispatcher::new(host.clone(), fired_gate());

        let result = dispatcher
            .trigger_flow(
                FlowReference::Default,
                vec![
                    TriggerArg::Value(json!({"a": 1})),
                    TriggerArg::Value(json!({})),
                    TriggerArg::Callback(CompletionCallback::noop()),
                ],
            )
            .await;

        assert_eq!(
            result,
            Some(Err(DeliveryError::Downstream("node blew up".to_string())))
        );
    }

    #[tokio::test]
    async fn test_trigger_flow_rejects_unknown_shapes_before_the_gate() {
        let host = RecordingHost::new(sample_graphs());
        // deliberately unfired: an unrecognized shape must not suspend
        let dispatcher = Dispatcher::new(host.clone(), ColdStartGate::new());

        let result = timeout(
            Duration::from_secs(1),
            dispatcher.trigger_flow(FlowReference::Default, vec![TriggerArg::Value(json!(1))]),
        )
        .await
        .expect("no-op shape must not wait on the gate");

        assert_eq!(result, None);
        assert_eq!(host.delivery_count(), 0);
    }

    #[tokio::test]
    async fn test_trigger_flow_background_delivers_payload() {
        let host = RecordingHost::new(sample_graphs());
        let dispatcher = Dispatcher::new(host.clone(), fired_gate());

        let result = dispatcher
            .trigger_flow(
                FlowReference::entry_type("gcp-cloud-functions-http-in"),
                vec![
                    TriggerArg::Value(json!({"file": "gs://bucket/object"})),
                    TriggerArg::Value(json!({"event_id": "e1"})),
                    TriggerArg::Callback(CompletionCallback::noop()),
                ],
            )
            .await;

        assert_eq!(result, Some(Ok(json!({"file": "gs://bucket/object"}))));
        assert_eq!(host.delivery_count(), 1);
    }
}
