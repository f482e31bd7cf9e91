// Pick clock: one scheduled timeout task per in-progress draft.
//
// Each armed clock is bound to (draft_id, expected_pick). On expiry the
// task re-checks its binding against the registry before running the
// expiry action, so a timer superseded by a committed pick cannot
// double-fire; the conditioned commit in the database remains the final
// arbiter of any race that slips past the registry check.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
struct ArmedClock {
    expected_pick: u32,
    handle: JoinHandle<()>,
}

/// Registry of armed pick clocks, keyed by draft id. At most one clock per
/// draft; arming replaces and aborts any previous timer.
#[derive(Debug, Default)]
pub struct PickClocks {
    inner: Arc<Mutex<HashMap<String, ArmedClock>>>,
}

impl PickClocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or replace) the clock for a draft. After `after` elapses the
    /// spawned task verifies it is still the live clock for
    /// `expected_pick`, unregisters itself, and runs `on_expire`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, draft_id: &str, expected_pick: u32, after: Duration, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut map = self.inner.lock().expect("clock registry poisoned");
        if let Some(prev) = map.remove(draft_id) {
            prev.handle.abort();
        }
        let registry = Arc::clone(&self.inner);
        let id = draft_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            {
                let mut map = registry.lock().expect("clock registry poisoned");
                let still_bound =
                    matches!(map.get(&id), Some(clock) if clock.expected_pick == expected_pick);
                if !still_bound {
                    // Superseded while sleeping; a newer clock owns the draft.
                    return;
                }
                map.remove(&id);
            }
            on_expire.await;
        });
        // Inserting under the same lock guarantees the task (which locks
        // after its sleep) observes its own registration.
        map.insert(
            draft_id.to_string(),
            ArmedClock {
                expected_pick,
                handle,
            },
        );
    }

    /// Cancel the armed clock for a draft, if any.
    pub fn disarm(&self, draft_id: &str) {
        let mut map = self.inner.lock().expect("clock registry poisoned");
        if let Some(clock) = map.remove(draft_id) {
            clock.handle.abort();
        }
    }

    /// The pick the live clock is armed for. None once fired or disarmed.
    pub fn armed_pick(&self, draft_id: &str) -> Option<u32> {
        self.inner
            .lock()
            .expect("clock registry poisoned")
            .get(draft_id)
            .map(|clock| clock.expected_pick)
    }
}
