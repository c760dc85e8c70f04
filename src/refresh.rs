use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use snafu::Snafu;

use crate::client::{consume_cookie, fail, set_state, ClientInner};
use crate::credentials::Credentials;
use crate::state::State;
use crate::timer::ScheduledTask;
use crate::token_response::{self, Extraction, TokenExchangeError, TokenSource};
use crate::transport::{TokenRequest, TransportResult};

/// Permanent refresh failures surfaced through `State::Failed`. Transient
/// failures never surface; they stay inside the retry loop.
#[derive(Debug, Snafu)]
pub enum RefreshError {
    #[snafu(display("RefreshError: Server rejected the refresh token: {error}"))]
    Rejected {
        error: String,
        error_description: Option<String>,
    },

    #[snafu(display("RefreshError: Refresh response was not a valid token response"))]
    InvalidResponse { source: TokenExchangeError },

    #[snafu(display("RefreshError: Credentials expired and there is no way to refresh them"))]
    Expired,
}

/// Where the refresh machinery currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshPhase {
    /// Nothing scheduled (the credentials never expire, or no session).
    Idle,

    /// Timer armed for an eager (or immediate) refresh.
    Scheduled,

    /// Timer armed to declare non-refreshable credentials failed at expiry.
    ExpiryCheck,

    /// Refresh request outstanding.
    InFlight,

    /// Waiting out the back-off after a transient failure.
    WaitingAfterError,
}

/// Timer handle, back-off memory and phase of the refresh loop.
pub(crate) struct RefreshTracker {
    pub(crate) phase: RefreshPhase,
    pub(crate) last_timeout: Duration,
    timer: Option<Box<dyn ScheduledTask>>,
}

impl RefreshTracker {
    pub(crate) fn new() -> Self {
        Self {
            phase: RefreshPhase::Idle,
            last_timeout: Duration::ZERO,
            timer: None,
        }
    }

    /// Cancel any armed timer and forget the back-off memory.
    pub(crate) fn reset(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.phase = RefreshPhase::Idle;
        self.last_timeout = Duration::ZERO;
    }

    fn arm(&mut self, phase: RefreshPhase, timer: Box<dyn ScheduledTask>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.cancel();
        }
        self.phase = phase;
    }
}

/// Persist credentials and (re)arm the refresh machinery. The single entry
/// point into `Authorized`, shared by the flow, storage reuse and refresh
/// success.
pub(crate) fn enter_authorized(inner: &Rc<RefCell<ClientInner>>, credentials: Credentials) {
    let (storage, client_id) = {
        let mut guard = inner.borrow_mut();
        guard.flow = None;
        guard.refresh.reset();
        let client_id = guard
            .config
            .as_ref()
            .expect("authorized implies a config")
            .client_id
            .clone();
        (Rc::clone(&guard.storage), client_id)
    };

    // A failed write is logged and the flow carries on without a stored copy.
    match serde_json::to_vec(&credentials) {
        Ok(blob) => {
            if let Err(err) = storage.put(&client_id, &blob) {
                tracing::warn!(%err, "Could not persist credentials");
            }
        }
        Err(err) => {
            tracing::warn!(%err, "Could not serialize credentials for storage");
        }
    }

    classify(inner, credentials);
}

/// Decide, from the expiration picture, whether the session is fine as-is,
/// needs a refresh now or later, or is already beyond saving.
fn classify(inner: &Rc<RefCell<ClientInner>>, credentials: Credentials) {
    let (now, refreshable, eager_interval) = {
        let guard = inner.borrow();
        let has_endpoint = guard
            .config
            .as_ref()
            .is_some_and(|config| config.token_endpoint.is_some());
        (
            guard.time_source.now(),
            credentials.can_be_refreshed(has_endpoint),
            guard.options.eager_refresh_interval,
        )
    };

    match credentials.earliest_expiration_date() {
        None => {
            set_state(
                inner,
                State::Authorized {
                    credentials,
                    refreshing: false,
                },
            );
        }
        Some(expires_at) if expires_at <= now => {
            if refreshable {
                arm_timer(inner, Duration::ZERO, RefreshPhase::Scheduled);
                set_state(
                    inner,
                    State::Authorized {
                        credentials,
                        refreshing: true,
                    },
                );
            } else {
                fail(inner, RefreshError::Expired.into());
            }
        }
        Some(expires_at) => {
            if refreshable {
                let delay = {
                    inner
                        .borrow()
                        .time_source
                        .interval_until(expires_at - eager_interval)
                };
                arm_timer(inner, delay, RefreshPhase::Scheduled);
            } else {
                let delay = { inner.borrow().time_source.interval_until(expires_at) };
                arm_timer(inner, delay, RefreshPhase::ExpiryCheck);
            }
            set_state(
                inner,
                State::Authorized {
                    credentials,
                    refreshing: false,
                },
            );
        }
    }
}

fn arm_timer(inner: &Rc<RefCell<ClientInner>>, delay: Duration, phase: RefreshPhase) {
    let timers = Rc::clone(&inner.borrow().timers);
    let weak = Rc::downgrade(inner);
    let task = timers.schedule(
        delay,
        Box::new(move || {
            let Some(inner) = weak.upgrade() else { return };
            on_timer_fired(&inner);
        }),
    );
    inner.borrow_mut().refresh.arm(phase, task);
}

fn on_timer_fired(inner: &Rc<RefCell<ClientInner>>) {
    let phase = inner.borrow().refresh.phase;
    match phase {
        RefreshPhase::Scheduled | RefreshPhase::WaitingAfterError => begin_refresh(inner),
        RefreshPhase::ExpiryCheck => {
            fail(inner, RefreshError::Expired.into());
        }
        RefreshPhase::Idle | RefreshPhase::InFlight => {
            tracing::trace!(?phase, "Ignoring stale timer");
        }
    }
}

fn begin_refresh(inner: &Rc<RefCell<ClientInner>>) {
    let (request, cookie, transport, was_refreshing, credentials) = {
        let mut guard = inner.borrow_mut();
        let State::Authorized {
            credentials,
            refreshing,
        } = guard.state.clone()
        else {
            tracing::trace!("Refresh timer fired outside of authorized; ignoring");
            return;
        };
        let config = guard.config.as_ref().expect("authorized implies a config");
        let Some(token_endpoint) = config.token_endpoint.clone() else {
            tracing::trace!("No token endpoint; cannot refresh");
            return;
        };
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            tracing::trace!("No refresh token; cannot refresh");
            return;
        };
        let request = TokenRequest::refresh(config, &token_endpoint, &refresh_token);
        guard.request_cookie += 1;
        guard.refresh.phase = RefreshPhase::InFlight;
        (
            request,
            guard.request_cookie,
            Rc::clone(&guard.transport),
            refreshing,
            credentials,
        )
    };

    if !was_refreshing {
        set_state(
            inner,
            State::Authorized {
                credentials,
                refreshing: true,
            },
        );
    }

    let weak = Rc::downgrade(inner);
    transport.perform_token_request(
        request,
        Box::new(move |result| {
            let Some(inner) = weak.upgrade() else { return };
            if !consume_cookie(&inner, cookie) {
                return;
            }
            handle_refresh_response(&inner, result);
        }),
    );
}

fn handle_refresh_response(inner: &Rc<RefCell<ClientInner>>, result: TransportResult) {
    let body = match result {
        Err(err) => {
            tracing::debug!(%err, "Transient refresh failure; retrying with back-off");
            schedule_retry(inner);
            return;
        }
        Ok(body) => body,
    };

    if let Some(error) = body.get("error") {
        // The server rejected the grant itself; the stored copy is useless.
        let (storage, client_id) = {
            let guard = inner.borrow();
            let config = guard.config.as_ref().expect("authorized implies a config");
            (Rc::clone(&guard.storage), config.client_id.clone())
        };
        if let Err(err) = storage.delete(&client_id) {
            tracing::warn!(%err, "Could not delete stored credentials");
        }
        let (error, error_description) =
            token_response::rejected_error(error, body.get("error_description"));
        fail(
            inner,
            RefreshError::Rejected {
                error,
                error_description,
            }
            .into(),
        );
        return;
    }

    let extracted = {
        let guard = inner.borrow();
        let State::Authorized { credentials, .. } = &guard.state else {
            tracing::trace!("Refresh completed outside of authorized; dropping the result");
            return;
        };
        token_response::extract_credentials(Extraction {
            source: TokenSource::TokenEndpoint(&body),
            requested_scope: &credentials.scope,
            response_types: &credentials.response_type,
            expected_nonce: None,
            now: guard.time_source.now(),
        })
        .map(|new_credentials| (new_credentials, credentials.refresh_token.clone()))
    };

    match extracted {
        Ok((mut new_credentials, previous_refresh_token)) => {
            if new_credentials.refresh_token.is_none() {
                new_credentials.refresh_token = previous_refresh_token;
            }
            enter_authorized(inner, new_credentials);
        }
        Err(err) => {
            // Storage is only cleared on a server-declared error; a malformed
            // success body leaves the stored copy in place.
            fail(inner, RefreshError::InvalidResponse { source: err }.into());
        }
    }
}

fn schedule_retry(inner: &Rc<RefCell<ClientInner>>) {
    let delay = {
        let mut guard = inner.borrow_mut();
        let next = guard
            .options
            .refresh_backoff
            .next_timeout(guard.refresh.last_timeout);
        guard.refresh.last_timeout = next;
        next
    };
    tracing::debug!(?delay, "Scheduling refresh retry");
    arm_timer(inner, delay, RefreshPhase::WaitingAfterError);
}

/// Waiting loops reschedule immediately and restart their back-off from the
/// minimum; an in-flight refresh only restarts the back-off.
pub(crate) fn nudge(inner: &Rc<RefCell<ClientInner>>) {
    let phase = inner.borrow().refresh.phase;
    match phase {
        RefreshPhase::WaitingAfterError => {
            inner.borrow_mut().refresh.last_timeout = Duration::ZERO;
            schedule_retry(inner);
        }
        RefreshPhase::InFlight => {
            inner.borrow_mut().refresh.last_timeout = Duration::ZERO;
        }
        RefreshPhase::Idle | RefreshPhase::Scheduled | RefreshPhase::ExpiryCheck => {
            tracing::trace!(?phase, "Nudge has no effect in this refresh phase");
        }
    }
}
