//! The service control state machine.
//!
//! A single task owns the service state. It races the active dispatch timer
//! against incoming control requests and handles exactly one of them per
//! iteration, so no locking is needed around the state.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use super::dispatcher::PeriodicDispatcher;
use super::reporter::StatusReporter;
use super::state::{ControlRequest, DispatchInterval, ServiceState, ServiceStatus};
use super::work::Work;
use crate::eventlog::EventLog;

/// Pause between the two echoes sent for an Interrogate request.
pub const INTERROGATE_ECHO_DELAY: Duration = Duration::from_millis(100);

/// Why the main loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Stop,
    Shutdown,
    /// Every request sender was dropped.
    Disconnected,
}

enum Event {
    Tick,
    Control(Option<ControlRequest>),
}

/// Control state machine driving a work callback.
pub struct ControlLoop<R, W> {
    reporter: R,
    work: W,
    events: EventLog,
    state: ServiceState,
    dispatcher: PeriodicDispatcher,
    ticks: u64,
}

impl<R: StatusReporter, W: Work> ControlLoop<R, W> {
    /// Create the loop in StartPending. Must be called inside a tokio runtime.
    pub fn new(reporter: R, work: W, events: EventLog) -> Self {
        Self {
            reporter,
            work,
            events,
            state: ServiceState::StartPending,
            dispatcher: PeriodicDispatcher::new(),
            ticks: 0,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Cadence currently driving the work callback.
    pub fn dispatch_interval(&self) -> Option<DispatchInterval> {
        self.dispatcher.active()
    }

    /// Number of ticks dispatched to the work callback so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until Stop or Shutdown is received.
    ///
    /// Reports StartPending then Running on entry. The caller reports the
    /// final StopPending/Stopped statuses, see [`ControlLoop::finish`].
    pub async fn run(&mut self, requests: &mut UnboundedReceiver<ControlRequest>) -> ExitReason {
        self.enter(ServiceState::StartPending);
        self.enter(ServiceState::Running);
        tracing::info!("Control loop running");

        loop {
            let event = tokio::select! {
                _ = self.dispatcher.tick() => Event::Tick,
                request = requests.recv() => Event::Control(request),
            };

            match event {
                Event::Tick => {
                    self.ticks += 1;
                    self.work.on_tick();
                }
                Event::Control(Some(request)) => {
                    if let Some(reason) = self.handle(request).await {
                        return reason;
                    }
                }
                Event::Control(None) => {
                    tracing::warn!("Control request channel closed, stopping");
                    return ExitReason::Disconnected;
                }
            }
        }
    }

    /// Report StopPending, write the stopped event, then report Stopped.
    ///
    /// The SCM may end the process as soon as it sees Stopped, so nothing
    /// after the last report is guaranteed to run.
    pub fn finish(&mut self) {
        self.enter(ServiceState::StopPending);
        self.events
            .info(format!("{} service stopped.", self.events.source()));
        self.enter(ServiceState::Stopped);
    }

    async fn handle(&mut self, request: ControlRequest) -> Option<ExitReason> {
        match request {
            ControlRequest::Interrogate(current) => {
                self.send(current);
                tokio::time::sleep(INTERROGATE_ECHO_DELAY).await;
                self.send(current);
                None
            }
            ControlRequest::Stop | ControlRequest::Shutdown => {
                self.events.info("Shutdown HTTP Server");
                Some(if request == ControlRequest::Stop {
                    ExitReason::Stop
                } else {
                    ExitReason::Shutdown
                })
            }
            ControlRequest::Pause => {
                self.enter(ServiceState::Paused);
                None
            }
            ControlRequest::Continue => {
                self.enter(ServiceState::Running);
                None
            }
            ControlRequest::Unknown(code) => {
                self.events
                    .error(format!("Unexpected control request #{}", code));
                None
            }
        }
    }

    /// Move to `state`, report it and retune the dispatcher.
    fn enter(&mut self, state: ServiceState) {
        self.state = state;
        self.send(ServiceStatus::new(state));

        // Re-arm only on a cadence switch.
        let interval = state.dispatch_interval();
        if interval == self.dispatcher.active() {
            return;
        }
        match interval {
            Some(interval) => self.dispatcher.activate(interval),
            None => self.dispatcher.suspend(),
        }
    }

    fn send(&mut self, status: ServiceStatus) {
        if let Err(e) = self.reporter.report(status) {
            tracing::warn!("Failed to report {} status: {}", status.state, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::state::AcceptedControls;
    use crate::test_support::CapturedLogs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Records every status with the (virtual) time it was reported.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(Instant, ServiceStatus)>>>);

    impl Recorder {
        fn states(&self) -> Vec<ServiceState> {
            self.0.lock().unwrap().iter().map(|(_, s)| s.state).collect()
        }

        fn statuses(&self) -> Vec<(Instant, ServiceStatus)> {
            self.0.lock().unwrap().clone()
        }
    }

    impl StatusReporter for Recorder {
        fn report(&mut self, status: ServiceStatus) -> crate::Result<()> {
            self.0.lock().unwrap().push((Instant::now(), status));
            Ok(())
        }
    }

    fn counting_work() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        (count, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Rejects every status, counting the attempts.
    #[derive(Clone, Default)]
    struct FailingReporter(Arc<AtomicUsize>);

    impl StatusReporter for FailingReporter {
        fn report(&mut self, _status: ServiceStatus) -> crate::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(crate::WebSvcError::Service("status handle closed".into()))
        }
    }

    /// Snapshots the captured log whenever Stopped is reported.
    struct StoppedSnapshot {
        logs: CapturedLogs,
        at_stopped: Arc<Mutex<Option<String>>>,
    }

    impl StatusReporter for StoppedSnapshot {
        fn report(&mut self, status: ServiceStatus) -> crate::Result<()> {
            if status.state == ServiceState::Stopped {
                *self.at_stopped.lock().unwrap() = Some(self.logs.text());
            }
            Ok(())
        }
    }

    fn events() -> EventLog {
        EventLog::tracing_only("WebSvcTest")
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_reports_start_pending_then_running() {
        let recorder = Recorder::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ControlRequest::Stop).unwrap();

        let mut control = ControlLoop::new(recorder.clone(), || {}, events());
        let reason = control.run(&mut rx).await;

        assert_eq!(reason, ExitReason::Stop);
        assert_eq!(
            recorder.states(),
            vec![ServiceState::StartPending, ServiceState::Running]
        );

        let statuses = recorder.statuses();
        assert_eq!(statuses[0].1.accepts, AcceptedControls::NONE);
        assert_eq!(statuses[1].1.accepts, AcceptedControls::ALL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_continue_switch_cadence() {
        let recorder = Recorder::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_count, work) = counting_work();
        let mut control = ControlLoop::new(recorder.clone(), work, events());

        tx.send(ControlRequest::Pause).unwrap();
        tx.send(ControlRequest::Continue).unwrap();
        tx.send(ControlRequest::Pause).unwrap();
        tx.send(ControlRequest::Stop).unwrap();
        control.run(&mut rx).await;

        assert_eq!(
            recorder.states(),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::Paused,
                ServiceState::Running,
                ServiceState::Paused,
            ]
        );
        // Last transition before Stop was Pause.
        assert_eq!(control.state(), ServiceState::Paused);
        assert_eq!(control.dispatch_interval(), Some(DispatchInterval::Slow));
        for (_, status) in recorder.statuses().iter().skip(1) {
            assert_eq!(status.accepts, AcceptedControls::ALL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_follows_pause_continue_sequence() {
        let sequences: [&[ControlRequest]; 4] = [
            &[],
            &[ControlRequest::Pause],
            &[ControlRequest::Pause, ControlRequest::Pause, ControlRequest::Continue],
            &[
                ControlRequest::Continue,
                ControlRequest::Pause,
                ControlRequest::Unknown(200),
                ControlRequest::Interrogate(ServiceStatus::new(ServiceState::Running)),
            ],
        ];

        for sequence in sequences {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut control = ControlLoop::new(Recorder::default(), || {}, events());

            let mut expected = ServiceState::Running;
            for request in sequence {
                match request {
                    ControlRequest::Pause => expected = ServiceState::Paused,
                    ControlRequest::Continue => expected = ServiceState::Running,
                    _ => {}
                }
                tx.send(*request).unwrap();
            }
            tx.send(ControlRequest::Stop).unwrap();
            control.run(&mut rx).await;

            assert_eq!(control.state(), expected, "{:?}", sequence);
            assert_eq!(
                control.dispatch_interval(),
                expected.dispatch_interval(),
                "{:?}",
                sequence
            );
            assert!(!control.state().accepted_controls().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrogate_echoes_twice_without_state_change() {
        let recorder = Recorder::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(recorder.clone(), || {}, events());

        let echoed = ServiceStatus::new(ServiceState::Paused);
        tx.send(ControlRequest::Interrogate(echoed)).unwrap();
        tx.send(ControlRequest::Stop).unwrap();
        control.run(&mut rx).await;

        let statuses = recorder.statuses();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[2].1, echoed);
        assert_eq!(statuses[3].1, echoed);
        assert!(statuses[3].0 - statuses[2].0 >= INTERROGATE_ECHO_DELAY);
        assert_eq!(control.state(), ServiceState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_control_is_not_acknowledged() {
        let recorder = Recorder::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(recorder.clone(), || {}, events());

        tx.send(ControlRequest::Unknown(128)).unwrap();
        tx.send(ControlRequest::Stop).unwrap();
        control.run(&mut rx).await;

        assert_eq!(
            recorder.states(),
            vec![ServiceState::StartPending, ServiceState::Running]
        );
        assert_eq!(control.state(), ServiceState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_terminates_and_leaves_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(Recorder::default(), || {}, events());

        tx.send(ControlRequest::Shutdown).unwrap();
        tx.send(ControlRequest::Pause).unwrap();
        let reason = control.run(&mut rx).await;

        assert_eq!(reason, ExitReason::Shutdown);
        assert_eq!(control.state(), ServiceState::Running);
        assert_eq!(rx.try_recv().unwrap(), ControlRequest::Pause);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_stops_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ControlRequest>();
        drop(tx);

        let mut control = ControlLoop::new(Recorder::default(), || {}, events());
        assert_eq!(control.run(&mut rx).await, ExitReason::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_ticks_while_running() {
        let (count, work) = counting_work();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut control = ControlLoop::new(Recorder::default(), work, events());
            control.run(&mut rx).await;
            control.ticks()
        });

        tokio::time::sleep(Duration::from_millis(1_250)).await;
        tx.send(ControlRequest::Stop).unwrap();
        let ticks = task.await.unwrap();

        assert_eq!(ticks, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_while_paused() {
        let (count, work) = counting_work();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ControlRequest::Pause).unwrap();

        let task = tokio::spawn(async move {
            let mut control = ControlLoop::new(Recorder::default(), work, events());
            control.run(&mut rx).await;
        });

        tokio::time::sleep(Duration::from_millis(4_250)).await;
        tx.send(ControlRequest::Stop).unwrap();
        task.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_dispatch_after_stop() {
        let (count, work) = counting_work();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(Recorder::default(), work, events());

        tx.send(ControlRequest::Stop).unwrap();
        control.run(&mut rx).await;
        control.finish();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(control.state(), ServiceState::Stopped);
        assert_eq!(control.dispatch_interval(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_reports_stop_pending_then_stopped() {
        let recorder = Recorder::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(recorder.clone(), || {}, events());

        tx.send(ControlRequest::Stop).unwrap();
        control.run(&mut rx).await;
        control.finish();

        assert_eq!(
            recorder.states(),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
        assert!(recorder.statuses()[2].1.accepts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_continue_keeps_fast_ticks() {
        let (count, work) = counting_work();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut control = ControlLoop::new(Recorder::default(), work, events());
            control.run(&mut rx).await;
            control.ticks()
        });

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(400)).await;
            tx.send(ControlRequest::Continue).unwrap();
        }
        tx.send(ControlRequest::Stop).unwrap();
        let ticks = task.await.unwrap();

        // 4s of Running at 500ms, whatever the Continue traffic.
        assert!(ticks >= 7, "only {} ticks", ticks);
        assert_eq!(count.load(Ordering::SeqCst) as u64, ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_pause_keeps_slow_ticks() {
        let (count, work) = counting_work();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ControlRequest::Pause).unwrap();

        let task = tokio::spawn(async move {
            let mut control = ControlLoop::new(Recorder::default(), work, events());
            control.run(&mut rx).await;
        });

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            tx.send(ControlRequest::Pause).unwrap();
        }
        tx.send(ControlRequest::Stop).unwrap();
        task.await.unwrap();

        // 9s of Paused at 2s.
        assert!(count.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_failures_are_not_retried() {
        let reporter = FailingReporter::default();
        let calls = Arc::clone(&reporter.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(reporter, || {}, events());

        tx.send(ControlRequest::Pause).unwrap();
        tx.send(ControlRequest::Stop).unwrap();
        let reason = control.run(&mut rx).await;

        assert_eq!(reason, ExitReason::Stop);
        assert_eq!(control.state(), ServiceState::Paused);
        // StartPending, Running, Paused: one attempt each.
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        control.finish();
        assert_eq!(control.state(), ServiceState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_event_written_before_stopped_report() {
        let (logs, _default) = CapturedLogs::install();
        let at_stopped = Arc::new(Mutex::new(None));
        let reporter = StoppedSnapshot {
            logs: logs.clone(),
            at_stopped: Arc::clone(&at_stopped),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = ControlLoop::new(reporter, || {}, events());

        tx.send(ControlRequest::Stop).unwrap();
        control.run(&mut rx).await;
        control.finish();

        let snapshot = at_stopped.lock().unwrap().clone().unwrap();
        assert!(snapshot.contains("WebSvcTest service stopped."), "{}", snapshot);
    }
}
