//! Debounced task slots: one outstanding deferred callback per class of
//! work. Scheduling into a slot cancels any not-yet-run predecessor, so
//! rapid re-triggers (resize storms, repeated re-init requests) coalesce to
//! the latest request instead of queuing.

use std::sync::Mutex;
use tokio::task::JoinHandle;

/// A single slot of deferred work with cancel-and-reschedule semantics.
#[derive(Default)]
pub struct TaskSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a callback, replacing (cancelling) any previously scheduled
    /// one that has not run yet. The callback runs on the next scheduler
    /// turn, never inline.
    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_future(async move { f() });
    }

    /// Future-valued variant of [`TaskSlot::schedule`].
    pub fn schedule_future<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            // defer one turn so a follow-up schedule() can still cancel us
            tokio::task::yield_now().await;
            fut.await;
        });
        let previous = self.handle.lock().unwrap().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancel the scheduled callback, if any has not run yet.
    pub fn cancel(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// The fixed slot set a widget runtime owns, one per deferred-work class.
#[derive(Default)]
pub struct TaskSlots {
    pub init: TaskSlot,
    pub resize: TaskSlot,
    pub edit_mode: TaskSlot,
    pub mobile_mode: TaskSlot,
    pub reinit: TaskSlot,
}

impl TaskSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every outstanding slot (widget teardown).
    pub fn cancel_all(&self) {
        self.init.cancel();
        self.resize.cancel();
        self.edit_mode.cancel();
        self.mobile_mode.cancel();
        self.reinit.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn reschedule_replaces_pending_callback() {
        let slot = TaskSlot::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=5 {
            let runs = runs.clone();
            let last = last.clone();
            slot.schedule(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(i, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn cancel_prevents_execution() {
        let slot = TaskSlot::new();
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = runs.clone();
            slot.schedule(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        slot.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!slot.is_scheduled());
    }

    #[tokio::test]
    async fn slots_are_independent() {
        let slots = TaskSlots::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r1 = runs.clone();
        slots.init.schedule(move || {
            r1.fetch_add(1, Ordering::SeqCst);
        });
        let r2 = runs.clone();
        slots.resize.schedule(move || {
            r2.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_all_covers_every_slot() {
        let slots = TaskSlots::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for slot in [
            &slots.init,
            &slots.resize,
            &slots.edit_mode,
            &slots.mobile_mode,
            &slots.reinit,
        ] {
            let runs = runs.clone();
            slot.schedule(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        slots.cancel_all();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
