use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::PlayerConfig;
use crate::decision::types::DecisionEngine;
use crate::errors::{ReplayError, ReplayResult};
use crate::executor::input::InputDriver;
use crate::locator::Locator;
use crate::perception::traits::{OcrAdapter, ScreenCapture};
use crate::playback::control::RunControl;
use crate::playback::dispatch::StepDispatcher;
use crate::playback::event_bus::{EventBus, PlayerEvent};
use crate::playback::state::{PlaybackState, PlaybackStatus};
use crate::playback::types::{Recording, Step, StepResult};

pub type StepCallback = Arc<dyn Fn(&Step, &StepResult) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(PlaybackStatus) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_step: Option<StepCallback>,
    on_status_change: Option<StatusCallback>,
}

/// State reachable from both the controller and the worker task.
struct Shared {
    state: watch::Sender<PlaybackState>,
    control: RunControl,
    events: EventBus,
    callbacks: Mutex<Callbacks>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Move to `next` if the current status satisfies `allowed` and the edge
    /// exists. `effect` runs under the same update so flag changes and the
    /// visible status never disagree.
    fn transition(
        &self,
        allowed: impl FnOnce(PlaybackStatus) -> bool,
        next: PlaybackStatus,
        error: Option<String>,
        effect: impl FnOnce(),
    ) -> bool {
        let mut previous = None;
        self.state.send_if_modified(|s| {
            if !allowed(s.status) || !s.status.can_transition_to(next) {
                return false;
            }
            effect();
            previous = Some(s.status);
            s.status = next;
            if error.is_some() {
                s.error = error;
            }
            s.touch_elapsed();
            true
        });
        match previous {
            Some(previous) => {
                self.notify_status(previous, next);
                true
            }
            None => false,
        }
    }

    fn notify_status(&self, previous: PlaybackStatus, status: PlaybackStatus) {
        tracing::info!(%previous, %status, "playback status changed");
        let callback = lock(&self.callbacks).on_status_change.clone();
        if let Some(cb) = callback {
            cb(status);
        }
        self.events.publish(PlayerEvent::StatusChanged { previous, status });
    }

    fn record(&self, step: &Step, result: StepResult) {
        let index = result.step_index;
        let advance = !result.is_failed();
        self.state.send_modify(|s| {
            s.logs.push(result.clone());
            if advance {
                s.current_step_index = index + 1;
            }
            s.touch_elapsed();
        });
        let callback = lock(&self.callbacks).on_step.clone();
        if let Some(cb) = callback {
            cb(step, &result);
        }
        self.events.publish(PlayerEvent::StepCompleted(result));
    }
}

/// Drives a loaded step sequence on a background tokio task.
///
/// Exactly one worker exists per player; `pause`/`resume`/`stop` only flip
/// flags and the visible status, which the worker honours between steps.
pub struct Player {
    config: PlayerConfig,
    locator: Locator,
    driver: Arc<dyn InputDriver>,
    decision: Option<Arc<dyn DecisionEngine>>,
    steps: Arc<Vec<Step>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(config: PlayerConfig, driver: Arc<dyn InputDriver>) -> Self {
        let (state, _rx) = watch::channel(PlaybackState::default());
        Self {
            locator: Locator::new(config.clone()),
            config,
            driver,
            decision: None,
            steps: Arc::new(Vec::new()),
            shared: Arc::new(Shared {
                state,
                control: RunControl::new(),
                events: EventBus::new(),
                callbacks: Mutex::new(Callbacks::default()),
            }),
            worker: None,
        }
    }

    /// Replace the locator wholesale; its config then governs locating and
    /// retries.
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn ScreenCapture>) -> Self {
        self.locator = self.locator.clone().with_capture(capture);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrAdapter>) -> Self {
        self.locator = self.locator.clone().with_ocr(ocr);
        self
    }

    pub fn with_window(mut self, window_id: u32) -> Self {
        self.locator = self.locator.clone().with_window(window_id);
        self
    }

    pub fn with_decision_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.decision = Some(engine);
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Load a recording, discarding any previous run.
    pub fn load(&mut self, recording: Recording) -> ReplayResult<()> {
        if self.shared.state.borrow().status.is_active() {
            return Err(ReplayError::AlreadyPlaying);
        }
        tracing::info!(recording = %recording.id, steps = recording.steps.len(), "steps loaded");
        let total = recording.steps.len();
        self.steps = Arc::new(recording.steps);
        self.shared
            .state
            .send_modify(|s| s.reset(Some(recording.id), total));
        Ok(())
    }

    /// Load a bare step list under a generated recording id.
    pub fn load_steps(&mut self, steps: Vec<Step>) -> ReplayResult<()> {
        self.load(Recording::from_steps(steps))
    }

    /// Start a run at `start_index`. A previous worker is awaited first so
    /// two never coexist.
    pub async fn play(&mut self, start_index: usize) -> ReplayResult<()> {
        if self.shared.state.borrow().status.is_active() {
            return Err(ReplayError::AlreadyPlaying);
        }
        let total = self.steps.len();
        if start_index > total {
            return Err(ReplayError::InvalidStartIndex {
                index: start_index,
                total,
            });
        }

        if let Some(previous) = self.worker.take() {
            if let Err(e) = previous.await {
                tracing::warn!(error = %e, "previous playback worker ended abnormally");
            }
        }

        self.shared.control.reset();
        let mut previous = PlaybackStatus::Idle;
        self.shared.state.send_modify(|s| {
            previous = s.status;
            s.total_steps = total;
            s.begin_run(start_index);
        });
        self.shared.notify_status(previous, PlaybackStatus::Playing);
        tracing::info!(start_index, total, "playback started");

        let dispatcher = StepDispatcher::new(
            self.locator.clone(),
            Arc::clone(&self.driver),
            self.decision.clone(),
        );
        self.worker = Some(tokio::spawn(run_worker(
            Arc::clone(&self.shared),
            dispatcher,
            Arc::clone(&self.steps),
            start_index,
            self.config.step_delay(),
        )));
        Ok(())
    }

    pub fn pause(&self) {
        let control = &self.shared.control;
        self.shared.transition(
            |s| s == PlaybackStatus::Playing,
            PlaybackStatus::Paused,
            None,
            || control.request_pause(),
        );
    }

    pub fn resume(&self) {
        let control = &self.shared.control;
        self.shared.transition(
            |s| s == PlaybackStatus::Paused,
            PlaybackStatus::Playing,
            None,
            || control.clear_pause(),
        );
    }

    /// Idempotent. Takes effect on the visible status immediately; the worker
    /// exits at its next check point.
    pub fn stop(&self) {
        self.shared.control.request_stop();
        self.shared.transition(
            PlaybackStatus::is_active,
            PlaybackStatus::Stopped,
            None,
            || {},
        );
    }

    pub fn status(&self) -> PlaybackState {
        let mut snapshot = self.shared.state.borrow().clone();
        if snapshot.status.is_active() {
            snapshot.touch_elapsed();
        }
        snapshot
    }

    pub fn logs(&self) -> Vec<StepResult> {
        self.shared.state.borrow().logs.clone()
    }

    pub fn on_step<F>(&self, callback: F)
    where
        F: Fn(&Step, &StepResult) + Send + Sync + 'static,
    {
        lock(&self.shared.callbacks).on_step = Some(Arc::new(callback));
    }

    pub fn on_status_change<F>(&self, callback: F)
    where
        F: Fn(PlaybackStatus) + Send + Sync + 'static,
    {
        lock(&self.shared.callbacks).on_status_change = Some(Arc::new(callback));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state.subscribe()
    }

    /// Resolve once the current run has left playing/paused.
    pub async fn wait(&self) -> PlaybackState {
        let mut rx = self.shared.state.subscribe();
        let done = rx
            .wait_for(|s| !s.status.is_active())
            .await
            .map(|s| PlaybackState::clone(&s));
        match done {
            Ok(state) => state,
            Err(_) => self.status(),
        }
    }

    /// Await the worker task itself, so a stopped run has flushed the
    /// result of its in-flight step.
    pub async fn join(&mut self) -> PlaybackState {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "playback worker ended abnormally");
            }
        }
        self.status()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shared.control.request_stop();
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    dispatcher: StepDispatcher,
    steps: Arc<Vec<Step>>,
    start_index: usize,
    step_delay: Duration,
) {
    let total = steps.len();
    for index in start_index..total {
        if !shared.control.wait_while_paused().await {
            tracing::info!(index, "worker exiting on stop");
            return;
        }

        let step = &steps[index];
        shared.state.send_modify(|s| s.current_step_index = index);
        tracing::info!(
            index,
            step = %step.id,
            kind = step.action.kind(),
            mode = ?step.mode,
            "executing step"
        );

        let result = dispatcher.run_step(step, index, &shared.control).await;
        tracing::info!(
            index,
            step = %step.id,
            status = ?result.status,
            retries = result.retries,
            duration_ms = result.duration_ms,
            message = %result.message,
            "step finished"
        );

        let failure = result.is_failed().then(|| match &result.error {
            Some(e) => format!("Step {} failed: {} ({e})", step.id, result.message),
            None => format!("Step {} failed: {}", step.id, result.message),
        });
        shared.record(step, result);

        if let Some(error) = failure {
            shared.transition(PlaybackStatus::is_active, PlaybackStatus::Error, Some(error), || {});
            return;
        }

        if index + 1 < total && !shared.control.sleep(step_delay).await {
            return;
        }
    }

    if !shared.control.is_stopped() {
        shared.transition(PlaybackStatus::is_active, PlaybackStatus::Completed, None, || {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::input::MouseButton;
    use crate::perception::types::Position;
    use crate::playback::types::{StepAction, StepMode, StepStatus, WaitSpec};
    use crate::test_support::{step, DriverCall, FakeCapture, RecordingDriver, ScriptedOcr};

    fn click_at(id: &str, x: i32, y: i32) -> Step {
        let mut s = step(id, StepAction::Click { button: MouseButton::Left });
        s.position = Some(Position::new(x, y));
        s
    }

    fn key(id: &str, key: &str) -> Step {
        step(id, StepAction::Key { key: key.into() })
    }

    fn sleep_step(id: &str, ms: u64) -> Step {
        step(id, StepAction::Wait { wait: WaitSpec::Time { duration: ms } })
    }

    fn player(driver: Arc<RecordingDriver>) -> Player {
        Player::new(PlayerConfig::immediate(), driver)
    }

    #[tokio::test]
    async fn driver_error_retried_until_success_then_completes() {
        let driver = Arc::new(RecordingDriver::new().failing_clicks(2));
        let mut player = player(driver.clone());
        player
            .load_steps(vec![key("a", "tab"), click_at("b", 10, 10), key("c", "enter")])
            .unwrap();

        player.play(0).await.unwrap();
        let state = player.wait().await;

        assert_eq!(state.status, PlaybackStatus::Completed);
        assert_eq!(state.logs.len(), 3);
        assert_eq!(state.logs[1].status, StepStatus::Success);
        assert_eq!(state.logs[1].retries, 2);
        assert_eq!(driver.click_attempts(), 3);
    }

    #[tokio::test]
    async fn unresolved_smart_click_halts_without_retry() {
        let driver = Arc::new(RecordingDriver::new());
        let mut player = player(driver.clone())
            .with_capture(Arc::new(FakeCapture::new()))
            .with_ocr(Arc::new(ScriptedOcr::always(None)));

        let mut smart = step("b", StepAction::Click { button: MouseButton::Left });
        smart.mode = StepMode::Smart;
        smart.text = Some("Next".into());
        player
            .load_steps(vec![key("a", "tab"), smart, key("c", "enter")])
            .unwrap();

        player.play(0).await.unwrap();
        let state = player.wait().await;

        assert_eq!(state.status, PlaybackStatus::Error);
        assert_eq!(state.logs.len(), 2);
        assert_eq!(state.logs[1].status, StepStatus::Failed);
        assert_eq!(state.logs[1].retries, 0);
        assert!(state.error.as_deref().unwrap_or_default().contains("Text not found"));
        assert_eq!(driver.calls(), vec![DriverCall::Key("tab".into())]);
    }

    #[tokio::test]
    async fn pause_blocks_before_next_step_and_stop_while_paused() {
        let driver = Arc::new(RecordingDriver::new());
        let mut player = player(driver.clone());
        player
            .load_steps(vec![
                key("s0", "a"),
                key("s1", "b"),
                sleep_step("s2", 500),
                key("s3", "c"),
                key("s4", "d"),
            ])
            .unwrap();

        player.play(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(player.status().current_step_index, 2);

        player.pause();
        assert_eq!(player.status().status, PlaybackStatus::Paused);

        tokio::time::sleep(Duration::from_millis(700)).await;
        let state = player.status();
        assert_eq!(state.status, PlaybackStatus::Paused);
        assert_eq!(state.logs.len(), 3);

        player.stop();
        assert_eq!(player.status().status, PlaybackStatus::Stopped);

        let state = player.join().await;
        assert_eq!(state.status, PlaybackStatus::Stopped);
        assert_eq!(state.logs.len(), 3);
        assert!(!driver.calls().contains(&DriverCall::Key("c".into())));
    }

    #[tokio::test]
    async fn resume_continues_the_run() {
        let driver = Arc::new(RecordingDriver::new());
        let mut player = player(driver.clone());
        player
            .load_steps(vec![sleep_step("s0", 200), key("s1", "x")])
            .unwrap();

        player.play(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        player.pause();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(player.logs().len(), 1);

        player.resume();
        let state = player.wait().await;
        assert_eq!(state.status, PlaybackStatus::Completed);
        assert_eq!(state.logs.len(), 2);
    }

    #[tokio::test]
    async fn play_while_playing_is_rejected() {
        let mut player = player(Arc::new(RecordingDriver::new()));
        player.load_steps(vec![sleep_step("s0", 300)]).unwrap();
        player.play(0).await.unwrap();

        assert!(matches!(player.play(0).await, Err(ReplayError::AlreadyPlaying)));
        assert!(matches!(
            player.load_steps(Vec::new()),
            Err(ReplayError::AlreadyPlaying)
        ));
        player.stop();
    }

    #[tokio::test]
    async fn start_index_bounds() {
        let mut player = player(Arc::new(RecordingDriver::new()));
        player.load_steps(vec![key("a", "x"), key("b", "y")]).unwrap();

        assert!(matches!(
            player.play(3).await,
            Err(ReplayError::InvalidStartIndex { index: 3, total: 2 })
        ));

        player.play(2).await.unwrap();
        let state = player.wait().await;
        assert_eq!(state.status, PlaybackStatus::Completed);
        assert!(state.logs.is_empty());
    }

    #[tokio::test]
    async fn replay_from_index_keeps_earlier_log_entries() {
        let driver = Arc::new(RecordingDriver::new());
        let mut player = player(driver.clone());
        player
            .load_steps(vec![key("a", "1"), key("b", "2"), key("c", "3")])
            .unwrap();

        player.play(0).await.unwrap();
        player.join().await;
        assert_eq!(player.logs().len(), 3);

        player.play(1).await.unwrap();
        let state = player.join().await;
        let ids: Vec<_> = state.logs.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        player.play(0).await.unwrap();
        assert!(player.status().logs.len() <= 3);
        player.join().await;
        assert_eq!(player.logs().len(), 3);
    }

    #[tokio::test]
    async fn skipped_and_timeout_do_not_halt() {
        let mut player = player(Arc::new(RecordingDriver::new()))
            .with_capture(Arc::new(FakeCapture::new()))
            .with_ocr(Arc::new(ScriptedOcr::always(None)));
        let wait = step(
            "w",
            StepAction::Wait {
                wait: WaitSpec::Condition {
                    condition: crate::playback::types::WaitCondition {
                        kind: crate::playback::types::ConditionKind::TextAppear,
                        value: "Ready".into(),
                        threshold: None,
                        region: None,
                    },
                    timeout: 0,
                },
            },
        );
        player
            .load_steps(vec![step("u", StepAction::Unknown), wait, key("k", "enter")])
            .unwrap();

        player.play(0).await.unwrap();
        let state = player.wait().await;
        let statuses: Vec<_> = state.logs.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [StepStatus::Skipped, StepStatus::Timeout, StepStatus::Success]
        );
        assert_eq!(state.status, PlaybackStatus::Completed);
    }

    #[tokio::test]
    async fn callbacks_and_events_fire_in_order() {
        let mut player = player(Arc::new(RecordingDriver::new()));
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let stepped = Arc::new(Mutex::new(Vec::new()));
        {
            let statuses = Arc::clone(&statuses);
            player.on_status_change(move |s| statuses.lock().unwrap().push(s));
            let stepped = Arc::clone(&stepped);
            player.on_step(move |step, _| stepped.lock().unwrap().push(step.id.clone()));
        }
        let mut events = player.subscribe();

        player
            .load_steps(vec![key("a", "1"), key("b", "2")])
            .unwrap();
        player.play(0).await.unwrap();
        player.join().await;

        assert_eq!(
            *statuses.lock().unwrap(),
            vec![PlaybackStatus::Playing, PlaybackStatus::Completed]
        );
        assert_eq!(*stepped.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                PlayerEvent::StatusChanged { status, .. } => status.to_string(),
                PlayerEvent::StepCompleted(r) => r.step_id,
            });
        }
        assert_eq!(kinds, ["playing", "a", "b", "completed"]);
    }

    #[tokio::test]
    async fn step_index_never_decreases() {
        let mut player = player(Arc::new(RecordingDriver::new()));
        player
            .load_steps((0..6).map(|i| key(&format!("s{i}"), "x")).collect())
            .unwrap();
        let mut rx = player.watch_state();
        player.play(0).await.unwrap();

        let observer = tokio::spawn(async move {
            let mut seen = vec![rx.borrow_and_update().current_step_index];
            while rx.changed().await.is_ok() {
                let s = rx.borrow_and_update().clone();
                seen.push(s.current_step_index);
                if !s.status.is_active() {
                    break;
                }
            }
            seen
        });
        player.wait().await;
        let seen = observer.await.unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_when_idle() {
        let mut player = player(Arc::new(RecordingDriver::new()));
        player.stop();
        player.stop();
        assert_eq!(player.status().status, PlaybackStatus::Idle);

        player.load_steps(vec![sleep_step("s", 5_000)]).unwrap();
        player.play(0).await.unwrap();
        player.stop();
        player.stop();
        assert_eq!(player.status().status, PlaybackStatus::Stopped);
    }
}
