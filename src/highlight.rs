//! Transient highlight sets for tasks touched by a server adaptation.
//!
//! Each adaptation batch replaces the previous highlight sets and owns a
//! single clear timer. Re-arming aborts the previous timer, and the timer
//! only clears the batch generation it was armed for, so an older timer can
//! never erase a newer batch. Reads also honour the batch deadline, so the
//! sets expire correctly even when no Tokio runtime is driving the timer.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::task::TaskId;

/// Default time a highlight stays visible.
pub const DEFAULT_HIGHLIGHT_WINDOW: Duration = Duration::from_secs(5);

/// Deadline offset used when the window does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Default)]
struct HighlightState {
    generation: u64,
    created: BTreeSet<TaskId>,
    updated: BTreeSet<TaskId>,
    deadline: Option<Instant>,
}

impl HighlightState {
    fn clear(&mut self) {
        self.created.clear();
        self.updated.clear();
        self.deadline = None;
    }

    fn expire_if_due(&mut self) {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.clear();
            }
        }
    }
}

fn lock(state: &Mutex<HighlightState>) -> MutexGuard<'_, HighlightState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct HighlightRegistry {
    window: Duration,
    state: Arc<Mutex<HighlightState>>,
    timer: Option<JoinHandle<()>>,
}

impl Default for HighlightRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_WINDOW)
    }
}

impl HighlightRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(HighlightState::default())),
            timer: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace the highlight sets and re-arm the clear timer.
    ///
    /// Returns the generation of the new batch.
    pub fn arm(
        &mut self,
        created: impl IntoIterator<Item = TaskId>,
        updated: impl IntoIterator<Item = TaskId>,
    ) -> u64 {
        self.abort_timer();

        let now = Instant::now();
        let deadline = now
            .checked_add(self.window)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.created = created.into_iter().collect();
            state.updated = updated.into_iter().collect();
            state.deadline = Some(deadline);
            state.generation
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let state = Arc::clone(&self.state);
                self.timer = Some(handle.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    let mut state = lock(&state);
                    if state.generation == generation {
                        state.clear();
                        tracing::debug!(generation, "highlight batch cleared");
                    }
                }));
            }
            Err(_) => {
                tracing::debug!(generation, "no runtime; highlight expires on read");
            }
        }

        generation
    }

    pub fn recently_created_ids(&self) -> BTreeSet<TaskId> {
        let mut state = lock(&self.state);
        state.expire_if_due();
        state.created.clone()
    }

    pub fn recently_updated_ids(&self) -> BTreeSet<TaskId> {
        let mut state = lock(&self.state);
        state.expire_if_due();
        state.updated.clone()
    }

    pub fn is_highlighted(&self, id: &TaskId) -> bool {
        let mut state = lock(&self.state);
        state.expire_if_due();
        state.created.contains(id) || state.updated.contains(id)
    }

    /// Generation of the most recently armed batch.
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Whether a clear timer is still scheduled.
    pub fn has_pending_timer(&self) -> bool {
        self.timer
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Abort the pending timer and drop the current highlight sets.
    pub fn cancel(&mut self) {
        self.abort_timer();
        lock(&self.state).clear();
    }

    fn abort_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

impl Drop for HighlightRegistry {
    fn drop(&mut self) {
        self.abort_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<TaskId> {
        values.iter().map(|value| TaskId::from(*value)).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<TaskId> {
        ids(values).into_iter().collect()
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_clears_after_window() {
        let mut registry = HighlightRegistry::default();
        registry.arm(ids(&["a"]), ids(&["b"]));
        assert_eq!(registry.recently_created_ids(), set(&["a"]));
        assert!(registry.is_highlighted(&TaskId::from("b")));
        assert!(registry.has_pending_timer());

        tokio::time::advance(Duration::from_millis(4_900)).await;
        assert_eq!(registry.recently_updated_ids(), set(&["b"]));

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert!(registry.recently_created_ids().is_empty());
        assert!(registry.recently_updated_ids().is_empty());
        assert!(!registry.has_pending_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_keeps_newer_batch_visible() {
        let mut registry = HighlightRegistry::default();
        registry.arm(ids(&["a"]), ids(&["first"]));

        tokio::time::advance(Duration::from_secs(3)).await;
        registry.arm(Vec::new(), ids(&["second"]));
        assert!(!registry.is_highlighted(&TaskId::from("a")));

        // Past the first batch's window, inside the second's.
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(registry.recently_updated_ids(), set(&["second"]));

        tokio::time::advance(Duration::from_millis(2_100)).await;
        settle().await;
        assert!(registry.recently_updated_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_timer() {
        let mut registry = HighlightRegistry::default();
        registry.arm(ids(&["a"]), Vec::new());
        registry.cancel();
        settle().await;
        assert!(!registry.has_pending_timer());
        assert!(registry.recently_created_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn generation_increments_per_batch() {
        let mut registry = HighlightRegistry::default();
        assert_eq!(registry.arm(Vec::new(), Vec::new()), 1);
        assert_eq!(registry.arm(Vec::new(), Vec::new()), 2);
        assert_eq!(registry.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_window_keeps_batch_visible() {
        let mut registry = HighlightRegistry::new(Duration::MAX);
        registry.arm(ids(&["a"]), ids(&["b"]));
        assert!(registry.has_pending_timer());

        tokio::time::advance(Duration::from_secs(86_400)).await;
        settle().await;
        assert_eq!(registry.recently_created_ids(), set(&["a"]));
        assert_eq!(registry.recently_updated_ids(), set(&["b"]));

        registry.cancel();
        assert!(registry.recently_created_ids().is_empty());
    }

    #[test]
    fn expires_on_read_without_runtime() {
        let mut registry = HighlightRegistry::new(Duration::from_millis(20));
        registry.arm(ids(&["a"]), Vec::new());
        assert!(!registry.has_pending_timer());
        assert_eq!(registry.recently_created_ids(), set(&["a"]));

        std::thread::sleep(Duration::from_millis(40));
        assert!(registry.recently_created_ids().is_empty());
    }
}
