use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

use stomplite_core::Negotiated;

/// Lifecycle: `AwaitingConnect -> Connected -> Closed`. Nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConnect,
    Connected,
    Closed,
}

/// Mutable state of one connection, owned by its engine.
#[derive(Debug)]
pub struct ConnectionSession {
    state: SessionState,
    last_client_activity: Instant,
    last_server_activity: Instant,
    version: Option<String>,
    auth_token: Option<String>,
    periods: Negotiated,
    pub(super) server_heartbeat: Option<Interval>,
    pub(super) client_heartbeat: Option<Interval>,
}

impl Default for ConnectionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSession {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: SessionState::AwaitingConnect,
            last_client_activity: now,
            last_server_activity: now,
            version: None,
            auth_token: None,
            periods: Negotiated::default(),
            server_heartbeat: None,
            client_heartbeat: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Negotiated protocol version, once connected.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// `session` header returned by authentication, if any.
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn periods(&self) -> Negotiated {
        self.periods
    }

    pub fn touch_client(&mut self) {
        self.last_client_activity = Instant::now();
    }

    pub fn touch_server(&mut self) {
        self.last_server_activity = Instant::now();
    }

    pub fn client_idle(&self) -> Duration {
        self.last_client_activity.elapsed()
    }

    pub fn server_idle(&self) -> Duration {
        self.last_server_activity.elapsed()
    }

    /// CONNECTED was written: record activity, arm monitors, go `Connected`.
    pub(super) fn on_connected(
        &mut self,
        version: String,
        auth_token: Option<String>,
        periods: Negotiated,
    ) {
        self.touch_client();
        self.version = Some(version);
        self.auth_token = auth_token;
        self.periods = periods;
        self.server_heartbeat = arm(periods.server_to_client_ms);
        self.client_heartbeat = arm(periods.client_to_server_ms);
        self.state = SessionState::Connected;
    }

    pub(super) fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Safe to call when never armed.
    pub(super) fn cancel_heartbeats(&mut self) {
        self.server_heartbeat = None;
        self.client_heartbeat = None;
    }
}

/// Recurring timer for a non-zero period; the first tick is one period out.
fn arm(period_ms: u64) -> Option<Interval> {
    if period_ms == 0 {
        return None;
    }
    let period = Duration::from_millis(period_ms);
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

/// Completes on the next tick, or never when the timer is not armed.
pub(super) async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
