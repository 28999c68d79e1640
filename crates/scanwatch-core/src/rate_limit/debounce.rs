use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Emits the latest value once `delay` has passed without a newer one.
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the debounce task. Must be called inside a tokio runtime.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_debounce(delay, input_rx, output_tx, cancel.clone()));

        (
            Self {
                input: input_tx,
                cancel,
            },
            output_rx,
        )
    }
}

impl<T> Debouncer<T> {
    /// Offer a new value; restarts the quiet period.
    pub fn push(&self, value: T) {
        // Closed means the task already ended; nothing left to debounce.
        let _ = self.input.send(value);
    }

    /// Stop the task and drop any pending value.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_debounce<T>(
    delay: Duration,
    mut input: mpsc::UnboundedReceiver<T>,
    output: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
) {
    let mut pending: Option<T> = None;
    let timer = tokio::time::sleep(delay);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            value = input.recv() => match value {
                Some(value) => {
                    pending = Some(value);
                    timer.as_mut().reset(Instant::now() + delay);
                }
                None => break,
            },
            _ = &mut timer, if pending.is_some() => {
                if let Some(value) = pending.take()
                    && output.send(value).is_err()
                {
                    break;
                }
            }
        }
    }

    if pending.is_some() {
        tracing::trace!(event = "core.rate_limit.debounce_discarded");
    }
}
