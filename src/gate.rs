use std::sync::Arc;

use tokio::sync::watch;

/// One-shot startup synchronization: every dispatch waits here until the
/// runtime host has signalled that its graphs finished loading.
///
/// Firing is monotonic. Once fired, all registered and future waiters
/// resolve; the gate never un-fires and keeps no memory of who observed it.
/// There is no timeout: if the runtime never loads, waiters stay suspended
/// and the failure surfaces through the host's own startup path.
#[derive(Debug, Clone)]
pub struct ColdStartGate {
    fire: Arc<watch::Sender<bool>>,
    fired: watch::Receiver<bool>,
}

impl ColdStartGate {
    pub fn new() -> Self {
        let (fire, fired) = watch::channel(false);
        Self {
            fire: Arc::new(fire),
            fired,
        }
    }

    /// Release all waiters. Idempotent.
    pub fn fire(&self) {
        self.fire.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.fired.borrow()
    }

    /// Suspend until the gate has fired. Returns immediately if it already
    /// has. Any number of tasks may wait concurrently; all are released
    /// together in no particular order.
    pub async fn await_ready(&self) {
        let mut fired = self.fired.clone();
        // The sender lives inside the gate, so the channel cannot close
        // before every clone of the gate is gone.
        let _ = fired.wait_for(|fired| *fired).await;
    }
}

impl Default for ColdStartGate {
    fn default() -> Self {
        Self::new()
    }
}
