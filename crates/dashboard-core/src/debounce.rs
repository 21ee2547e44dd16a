use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Quiet period after the last keystroke before a search term settles.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Settling/Settled state machine over a single input string.
///
/// Every keystroke restarts the window, so only the latest keystroke's
/// deadline can fire. A settle emits the current value exactly once.
#[derive(Debug, Clone)]
pub struct DebounceState {
    window: Duration,
    value: String,
    deadline: Option<Instant>,
}

impl DebounceState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            value: String::new(),
            deadline: None,
        }
    }

    pub fn keystroke(&mut self, value: impl Into<String>, now: Instant) {
        self.value = value.into();
        self.deadline = Some(now + self.window);
    }

    /// Emits the value if the window has elapsed since the last keystroke.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(self.value.clone())
            }
            _ => None,
        }
    }

    pub fn is_settling(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Write side of a [`SearchDebouncer`].
#[derive(Debug, Clone)]
pub struct SearchInput {
    keys: mpsc::UnboundedSender<String>,
}

impl SearchInput {
    /// Records the full input value after a keystroke. Returns false once the
    /// debouncer has shut down.
    pub fn keystroke(&self, value: impl Into<String>) -> bool {
        self.keys.send(value.into()).is_ok()
    }
}

/// Runs a [`DebounceState`] on a background task with one resettable timer.
pub struct SearchDebouncer {
    input: SearchInput,
    settled: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl SearchDebouncer {
    pub fn spawn(window: Duration) -> Self {
        let (keys_tx, keys_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_debounce(window, keys_rx, settled_tx));
        Self {
            input: SearchInput { keys: keys_tx },
            settled: settled_rx,
            task,
        }
    }

    pub fn input(&self) -> SearchInput {
        self.input.clone()
    }

    /// Waits for the next settled value. `None` after shutdown.
    pub async fn next_settled(&mut self) -> Option<String> {
        self.settled.recv().await
    }

    pub fn into_parts(self) -> (SearchInput, mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
        (self.input, self.settled, self.task)
    }
}

async fn run_debounce(
    window: Duration,
    mut keys: mpsc::UnboundedReceiver<String>,
    settled: mpsc::UnboundedSender<String>,
) {
    let mut state = DebounceState::new(window);
    loop {
        let deadline = state.deadline();
        tokio::select! {
            key = keys.recv() => match key {
                Some(value) => state.keystroke(value, Instant::now()),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(value) = state.poll(Instant::now()) {
                    trace!(target: "dashboard.debounce", term = %value, "search term settled");
                    if settled.send(value).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn only_the_latest_keystroke_can_settle() {
        let t0 = Instant::now();
        let mut state = DebounceState::new(ms(500));
        let mut emitted = Vec::new();
        for (at, value) in [(0, "s"), (100, "sh"), (200, "sho"), (600, "shoe")] {
            if let Some(v) = state.poll(t0 + ms(at)) {
                emitted.push(v);
            }
            state.keystroke(value, t0 + ms(at));
        }
        assert!(state.poll(t0 + ms(1099)).is_none());
        assert_eq!(state.poll(t0 + ms(1100)).as_deref(), Some("shoe"));
        assert!(state.poll(t0 + ms(5000)).is_none());
        assert!(emitted.is_empty());
        assert!(!state.is_settling());
    }

    #[tokio::test(start_paused = true)]
    async fn settles_once_after_quiet_window() {
        let start = Instant::now();
        let mut debouncer = SearchDebouncer::spawn(DEFAULT_SEARCH_DEBOUNCE);
        let input = debouncer.input();

        input.keystroke("s");
        tokio::time::sleep(ms(100)).await;
        input.keystroke("sh");
        tokio::time::sleep(ms(100)).await;
        input.keystroke("sho");
        tokio::time::sleep(ms(400)).await;
        input.keystroke("shoe");

        let settled = debouncer.next_settled().await.expect("settled term");
        assert_eq!(settled, "shoe");
        assert_eq!(start.elapsed(), ms(1100));

        let again = tokio::time::timeout(Duration::from_secs(5), debouncer.next_settled()).await;
        assert!(again.is_err(), "no second settle without new input");
    }

    #[tokio::test(start_paused = true)]
    async fn shuts_down_when_input_is_dropped() {
        let debouncer = SearchDebouncer::spawn(DEFAULT_SEARCH_DEBOUNCE);
        let (input, mut settled, task) = debouncer.into_parts();
        drop(input);
        task.await.expect("debounce task");
        assert!(settled.recv().await.is_none());
    }
}
