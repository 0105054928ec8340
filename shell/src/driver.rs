//! Event loop driving a client session.
//!
//! Runtime and input polls share one calloop timer that is re-armed for
//! whichever poll is due next, so a changed input rate takes effect on the
//! following tick. Exit, mode switch and status logging are separate timers;
//! SIGINT/SIGTERM stop the loop.

use std::rc::Rc;
use std::time::{Duration, Instant};

use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientEvent};
use crate::clock::Clock;

/// Which polls ran on a schedule step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Polled {
    pub runtime: bool,
    pub input: bool,
}

/// Next-due instants for the runtime and input polls.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    next_runtime: Instant,
    next_input: Instant,
}

impl PollSchedule {
    /// Both polls are due immediately.
    pub fn new(now: Instant) -> Self {
        Self {
            next_runtime: now,
            next_input: now,
        }
    }

    /// Run every poll that is due at `now` and schedule its next run from
    /// the client's current settings.
    pub fn run_due(&mut self, client: &mut Client, now: Instant) -> Polled {
        let mut polled = Polled::default();
        if now >= self.next_runtime {
            client.poll_runtime();
            self.next_runtime = now + Duration::from_millis(client.config().runtime_poll_ms);
            polled.runtime = true;
        }
        if now >= self.next_input {
            client.poll_input();
            self.next_input = now + Duration::from_millis(client.config().input_poll_rate_ms);
            polled.input = true;
        }
        polled
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_runtime.min(self.next_input)
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub exit_after: Option<Duration>,
    /// Switch backends once after this long.
    pub switch_after: Option<Duration>,
    pub status_interval: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            exit_after: None,
            switch_after: None,
            status_interval: Duration::from_secs(60),
        }
    }
}

/// A client plus the loop state around it.
pub struct Session {
    client: Client,
    clock: Rc<dyn Clock>,
    schedule: PollSchedule,
    running: bool,
    input_ticks: u64,
    events_seen: u64,
}

impl Session {
    pub fn new(client: Client, clock: Rc<dyn Clock>) -> Self {
        let schedule = PollSchedule::new(clock.now());
        Self {
            client,
            clock,
            schedule,
            running: true,
            input_ticks: 0,
            events_seen: 0,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn input_ticks(&self) -> u64 {
        self.input_ticks
    }

    /// Run due polls and consume the resulting client events.
    pub fn pump(&mut self) -> Polled {
        let polled = self.schedule.run_due(&mut self.client, self.clock.now());
        if polled.input {
            self.input_ticks += 1;
        }
        self.handle_events();
        polled
    }

    pub fn next_deadline(&self) -> Instant {
        self.schedule.next_deadline()
    }

    fn handle_events(&mut self) {
        for event in self.client.drain_events() {
            self.events_seen += 1;
            match event {
                ClientEvent::RequestQuit { reason } => {
                    info!("stopping session: {}", reason);
                    self.running = false;
                }
                other => debug!("client event {:?}", other),
            }
        }
    }

    fn log_status(&self) {
        let client = &self.client;
        info!(
            "status: {} backend, {} window(s), {} controller(s), {} input tick(s), {} event(s) {}",
            client.kind(),
            client.windows().len(),
            client.controller_handles().count(),
            self.input_ticks,
            self.events_seen,
            client.config().status_sexp()
        );
    }
}

/// Run `session` on a calloop event loop until it stops.
pub fn run(session: Session, options: &DriverOptions) -> anyhow::Result<Session> {
    let mut event_loop: EventLoop<'_, Session> = EventLoop::try_new()
        .map_err(|e| anyhow::anyhow!("failed to create event loop: {}", e))?;
    let handle = event_loop.handle();

    handle
        .insert_source(Timer::immediate(), |_, _, session: &mut Session| {
            session.pump();
            TimeoutAction::ToInstant(session.next_deadline())
        })
        .map_err(|e| anyhow::anyhow!("failed to register poll timer: {}", e.error))?;

    let signals = Signals::new(&[Signal::SIGTERM, Signal::SIGINT])
        .map_err(|e| anyhow::anyhow!("failed to create signal source: {}", e))?;
    handle
        .insert_source(signals, |event, _, session: &mut Session| {
            info!("received signal {:?}, shutting down", event.signal());
            session.stop();
        })
        .map_err(|e| anyhow::anyhow!("failed to register signal handler: {}", e.error))?;

    if let Some(after) = options.exit_after {
        info!("will exit after {:?}", after);
        handle
            .insert_source(Timer::from_duration(after), |_, _, session: &mut Session| {
                info!("exit timer fired");
                session.stop();
                TimeoutAction::Drop
            })
            .map_err(|e| anyhow::anyhow!("failed to register exit timer: {}", e.error))?;
    }

    if let Some(after) = options.switch_after {
        handle
            .insert_source(Timer::from_duration(after), |_, _, session: &mut Session| {
                if let Err(e) = session.client_mut().switch_mode() {
                    warn!("mode switch failed: {:#}", e);
                }
                TimeoutAction::Drop
            })
            .map_err(|e| anyhow::anyhow!("failed to register switch timer: {}", e.error))?;
    }

    let status_interval = options.status_interval;
    handle
        .insert_source(
            Timer::from_duration(status_interval),
            move |_, _, session: &mut Session| {
                session.log_status();
                TimeoutAction::ToDuration(status_interval)
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to register status timer: {}", e.error))?;

    let mut session = session;
    info!("entering event loop");
    while session.is_running() {
        event_loop.dispatch(Some(Duration::from_millis(100)), &mut session)?;
    }
    session.log_status();
    info!("event loop finished");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::clock::TestClock;
    use crate::config::ShellConfig;
    use crate::math::Mat4;
    use crate::tracking::{ActionEvent, RuntimeEvent, ScriptedTracking};

    fn session(clock: Rc<TestClock>) -> (Session, ScriptedTracking) {
        let tracking = ScriptedTracking::new();
        let client = Client::new(ShellConfig::default(), Box::new(tracking.clone()), BackendKind::Overlay);
        (Session::new(client, clock), tracking)
    }

    #[test]
    fn test_schedule_follows_poll_rates() {
        let clock = Rc::new(TestClock::new());
        let (mut s, _tracking) = session(clock.clone());

        assert_eq!(s.pump(), Polled { runtime: true, input: true });
        clock.advance_ms(10);
        assert_eq!(s.pump(), Polled::default());
        clock.advance_ms(10);
        assert_eq!(s.pump(), Polled { runtime: true, input: true });
        assert_eq!(s.input_ticks(), 2);
    }

    #[test]
    fn test_changed_input_rate_applies_next_tick() {
        let clock = Rc::new(TestClock::new());
        let (mut s, _tracking) = session(clock.clone());
        s.pump();
        s.client_mut().update_setting("input-poll-rate-ms", "5").unwrap();

        // the pending 20 ms deadline still stands
        clock.advance_ms(5);
        assert!(!s.pump().input);
        clock.advance_ms(15);
        assert!(s.pump().input);
        clock.advance_ms(5);
        assert_eq!(s.pump(), Polled { runtime: false, input: true });
        assert_eq!(s.next_deadline(), clock.now() + Duration::from_millis(5));
    }

    #[test]
    fn test_quit_request_stops_session() {
        let clock = Rc::new(TestClock::new());
        let (mut s, tracking) = session(clock);
        tracking.push_runtime(RuntimeEvent::Quit {
            reason: "test".to_string(),
        });
        s.pump();
        assert!(!s.is_running());
        assert_eq!(tracking.quit_acks(), 1);
    }

    #[test]
    fn test_run_until_exit_timer() {
        let tracking = ScriptedTracking::new();
        for _ in 0..3 {
            tracking.push_tick(vec![ActionEvent::pointer(1, Mat4::IDENTITY)]);
        }
        let client = Client::new(ShellConfig::default(), Box::new(tracking.clone()), BackendKind::Scene);
        let session = Session::new(client, Rc::new(crate::clock::SystemClock));
        let options = DriverOptions {
            exit_after: Some(Duration::from_millis(80)),
            ..DriverOptions::default()
        };
        let session = run(session, &options).unwrap();
        assert!(!session.is_running());
        assert!(session.input_ticks() >= 1);
        assert!(session.client().controller(1).is_some());
    }
}
