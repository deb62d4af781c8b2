use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

pub(super) const ACTION_RESULT_POLL_INTERVAL: Duration = Duration::from_millis(24);

#[derive(Debug, PartialEq, Eq)]
pub(super) enum WorkerPoll<T> {
    Pending,
    Ready(T),
    /// The worker went away without sending anything.
    Lost,
}

pub(super) fn poll_worker_result<T>(rx: &mpsc::Receiver<T>) -> WorkerPoll<T> {
    match rx.try_recv() {
        Ok(result) => WorkerPoll::Ready(result),
        Err(mpsc::TryRecvError::Empty) => WorkerPoll::Pending,
        Err(mpsc::TryRecvError::Disconnected) => WorkerPoll::Lost,
    }
}

/// Runs `work` on a background thread and hands its result to `on_result`
/// on the GTK main loop.
///
/// `on_lost` runs instead when the thread cannot be spawned or exits without
/// a result, so callers always leave their busy state.
pub(super) fn spawn_worker_action<T, W, H, L>(
    label: &'static str,
    work: W,
    mut on_result: H,
    on_lost: L,
) where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
    H: FnMut(T) + 'static,
    L: FnOnce() + 'static,
{
    let (tx, rx) = mpsc::channel::<T>();
    let spawned = std::thread::Builder::new()
        .name(format!("nano-imager-{label}"))
        .spawn(move || {
            let result = work();
            let _ = tx.send(result);
        });
    if let Err(err) = spawned {
        tracing::error!(label, ?err, "failed to spawn worker thread");
        gtk4::glib::idle_add_local_once(on_lost);
        return;
    }

    let mut on_lost = Some(on_lost);
    gtk4::glib::timeout_add_local(ACTION_RESULT_POLL_INTERVAL, move || {
        match poll_worker_result(&rx) {
            WorkerPoll::Pending => gtk4::glib::ControlFlow::Continue,
            WorkerPoll::Ready(result) => {
                on_result(result);
                gtk4::glib::ControlFlow::Break
            }
            WorkerPoll::Lost => {
                tracing::warn!(label, "worker exited without a result");
                if let Some(on_lost) = on_lost.take() {
                    on_lost();
                }
                gtk4::glib::ControlFlow::Break
            }
        }
    });
}

/// Admits one job at a time; clones share the same slot.
#[derive(Debug, Clone, Default)]
pub(super) struct WorkerGate {
    busy: Rc<Cell<bool>>,
}

impl WorkerGate {
    pub(super) fn try_begin(&self) -> bool {
        !self.busy.replace(true)
    }

    pub(super) fn finish(&self) {
        self.busy.set(false);
    }

    pub(super) fn is_busy(&self) -> bool {
        self.busy.get()
    }
}
