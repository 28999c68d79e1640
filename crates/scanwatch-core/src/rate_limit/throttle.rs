use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Emits at most once per `delay` window.
///
/// The first value outside a window goes out immediately. Values arriving
/// inside a window collapse into one trailing emission at the window's end,
/// carrying the latest of them; that emission opens the next window.
pub struct Throttler<T> {
    input: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Throttler<T> {
    /// Spawn the throttle task. Must be called inside a tokio runtime.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_throttle(delay, input_rx, output_tx, cancel.clone()));

        (
            Self {
                input: input_tx,
                cancel,
            },
            output_rx,
        )
    }
}

impl<T> Throttler<T> {
    pub fn push(&self, value: T) {
        let _ = self.input.send(value);
    }

    /// Stop the task and drop any pending trailing value.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for Throttler<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_throttle<T>(
    delay: Duration,
    mut input: mpsc::UnboundedReceiver<T>,
    output: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
) {
    let mut last_emit: Option<Instant> = None;
    let mut pending: Option<T> = None;
    let timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            value = input.recv() => {
                let Some(value) = value else { break };

                if pending.is_some() {
                    // Trailing emission already scheduled; only the value moves.
                    pending = Some(value);
                    continue;
                }

                let now = Instant::now();
                match last_emit {
                    Some(last) if now < last + delay => {
                        pending = Some(value);
                        timer.as_mut().reset(last + delay);
                    }
                    _ => {
                        if output.send(value).is_err() {
                            break;
                        }
                        last_emit = Some(now);
                    }
                }
            }
            _ = &mut timer, if pending.is_some() => {
                if let Some(value) = pending.take() {
                    if output.send(value).is_err() {
                        break;
                    }
                    last_emit = Some(Instant::now());
                }
            }
        }
    }
}
