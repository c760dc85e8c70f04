use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::thread::{self, ThreadId};

use snafu::Snafu;
use url::Url;

use crate::backoff::Backoff;
use crate::config::{Config, ConfigError, Mode};
use crate::credentials::{Credentials, Validity};
use crate::error::FlowError;
use crate::flow_token::FlowToken;
use crate::refresh::{self, RefreshTracker};
use crate::response_type::ResponseType;
use crate::state::State;
use crate::storage::CredentialStorage;
use crate::subscription::{Observers, Subscription};
use crate::time_source::TimeSource;
use crate::timer::TimerScheduler;
use crate::token_response::{self, Extraction, TokenExchangeError, TokenSource};
use crate::transport::{TokenRequest, TokenTransport, TransportResult};
use crate::url_ext;
use crate::AuthorizationCode;

/// Errors raised while validating an authorization redirect, or reported by
/// the browser agent itself.
#[derive(Debug, Snafu)]
pub enum AuthorizationError {
    #[snafu(display("AuthorizationError: The redirect 'state' does not match this flow"))]
    StateMismatch,

    #[snafu(display("AuthorizationError: Server declared an error: {error}"))]
    ServerError {
        error: String,
        error_description: Option<String>,
    },

    #[snafu(display("AuthorizationError: The redirect carries no authorization code"))]
    MissingCode,

    #[snafu(display("AuthorizationError: Browser agent failure: {message}"))]
    Agent { message: String },
}

/// Tuning knobs for the refresh machinery.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long before the actual expiry an eager refresh fires.
    /// Defaults to 120 seconds.
    pub eager_refresh_interval: std::time::Duration,

    /// Retry policy for transient refresh failures.
    pub refresh_backoff: Backoff,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            eager_refresh_interval: std::time::Duration::from_secs(120),
            refresh_backoff: Backoff::default(),
        }
    }
}

/// Everything bound to one in-progress authorization attempt. Dropped as
/// soon as the flow reaches a terminal state.
pub(crate) struct FlowState {
    pub(crate) scope: BTreeSet<String>,
    pub(crate) response_types: BTreeSet<ResponseType>,
    pub(crate) state_token: FlowToken,
    pub(crate) nonce_token: FlowToken,
}

pub(crate) struct ClientInner {
    pub(crate) storage: Rc<dyn CredentialStorage>,
    pub(crate) transport: Rc<dyn TokenTransport>,
    pub(crate) time_source: Rc<dyn TimeSource>,
    pub(crate) timers: Rc<dyn TimerScheduler>,
    pub(crate) options: ClientOptions,
    pub(crate) state: State,

    /// Config of the active session. Outlives the flow itself because the
    /// refresh scheduler still needs the token endpoint and client secret.
    pub(crate) config: Option<Config>,
    pub(crate) flow: Option<FlowState>,
    pub(crate) refresh: RefreshTracker,

    /// Monotonic tag for outgoing token requests. Completions carrying a
    /// value other than the current one are dropped.
    pub(crate) request_cookie: u64,
    pub(crate) observers: Observers,
    home_thread: ThreadId,
}

/// The authorization-flow state machine.
///
/// Drives `Idle → Authorizing → FetchingToken → Authorized / Failed /
/// Cancelled`, reusing cached credentials where possible and keeping an
/// authorized session fresh through eager refreshes.
///
/// All methods must be called on the thread the client was created on; the
/// transport and timer ports must deliver their callbacks there as well.
pub struct Client {
    inner: Rc<RefCell<ClientInner>>,
}

impl Client {
    pub fn new(
        storage: Rc<dyn CredentialStorage>,
        transport: Rc<dyn TokenTransport>,
        time_source: Rc<dyn TimeSource>,
        timers: Rc<dyn TimerScheduler>,
    ) -> Self {
        Self::with_options(storage, transport, time_source, timers, ClientOptions::default())
    }

    pub fn with_options(
        storage: Rc<dyn CredentialStorage>,
        transport: Rc<dyn TokenTransport>,
        time_source: Rc<dyn TimeSource>,
        timers: Rc<dyn TimerScheduler>,
        options: ClientOptions,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ClientInner {
                storage,
                transport,
                time_source,
                timers,
                options,
                state: State::Idle,
                config: None,
                flow: None,
                refresh: RefreshTracker::new(),
                request_cookie: 0,
                observers: Observers::new(),
                home_thread: thread::current().id(),
            })),
        }
    }

    /// The current state. Reading fires no notification.
    pub fn state(&self) -> State {
        self.assert_scheduling_context();
        self.inner.borrow().state.clone()
    }

    /// Observe every state assignment. Delivery is synchronous on the
    /// designated context; dropping the returned handle unsubscribes.
    pub fn subscribe(&self, observer: impl Fn(&State) + 'static) -> Subscription {
        self.assert_scheduling_context();
        self.inner.borrow().observers.subscribe(observer)
    }

    /// Begin an authorization flow.
    ///
    /// Valid from `Idle`, `Failed` and `Cancelled`; anywhere else the call is
    /// ignored with a warning. Cached credentials matching the requested
    /// response types are reused without opening a browser; otherwise an
    /// interactive flow enters `Authorizing` with the prepared authorization
    /// URL, and a silent one gives up as `Cancelled`.
    pub fn start(
        &self,
        config: Config,
        mode: Mode,
        response_types: BTreeSet<ResponseType>,
        scope: BTreeSet<String>,
    ) {
        self.assert_scheduling_context();

        if response_types.is_empty() {
            tracing::error!("start requires a non-empty response type set");
            return;
        }
        {
            let inner = self.inner.borrow();
            match inner.state {
                State::Idle | State::Failed(_) | State::Cancelled => {}
                ref other => {
                    tracing::warn!(
                        state = other.name(),
                        "start is only valid from idle, failed or cancelled"
                    );
                    return;
                }
            }
        }

        cleanup(&self.inner);

        let flow = FlowState {
            scope,
            response_types,
            state_token: FlowToken::generate(),
            nonce_token: FlowToken::generate(),
        };

        let (storage, time_source) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.storage), Rc::clone(&inner.time_source))
        };

        if let Some(blob) = storage.get(&config.client_id) {
            match serde_json::from_slice::<Credentials>(&blob) {
                Err(err) => {
                    tracing::warn!(
                        %err,
                        "Stored credentials could not be decoded. Treating them as absent."
                    );
                }
                Ok(credentials) if credentials.response_type != flow.response_types => {
                    tracing::debug!(
                        "Stored credentials were issued for a different response type set. Ignoring them."
                    );
                }
                Ok(credentials) => {
                    if !flow.scope.is_subset(&credentials.scope) {
                        tracing::warn!(
                            requested = ?flow.scope,
                            stored = ?credentials.scope,
                            "Stored credentials do not cover the requested scope. Some providers \
                             return non-superset scopes; reusing them anyway."
                        );
                    }
                    let refreshable =
                        credentials.can_be_refreshed(config.token_endpoint.is_some());
                    let reusable = match credentials.validity(time_source.now()) {
                        Validity::ValidForever | Validity::Valid => true,
                        Validity::Expired => refreshable,
                    };
                    if reusable {
                        {
                            let mut inner = self.inner.borrow_mut();
                            inner.config = Some(config);
                            inner.flow = Some(flow);
                        }
                        refresh::enter_authorized(&self.inner, credentials);
                        return;
                    }
                    tracing::debug!(
                        "Stored credentials are expired and cannot be refreshed. Ignoring them."
                    );
                }
            }
        }

        if mode == Mode::Silent {
            tracing::debug!("No reusable credentials for a silent start.");
            set_state(&self.inner, State::Cancelled);
            return;
        }

        if flow.response_types.contains(&ResponseType::Code) && config.token_endpoint.is_none() {
            fail(&self.inner, ConfigError::MissingTokenEndpoint.into());
            return;
        }

        let url = match authorization_url(&config, &flow) {
            Ok(url) => url,
            Err(err) => {
                fail(&self.inner, err.into());
                return;
            }
        };

        let redirect_url = config.redirect_url.clone();
        {
            let mut inner = self.inner.borrow_mut();
            inner.config = Some(config);
            inner.flow = Some(flow);
        }
        set_state(&self.inner, State::Authorizing { url, redirect_url });
    }

    /// Deliver the redirect the browser agent intercepted. Ignored unless a
    /// flow is currently authorizing.
    ///
    /// The `state` parameter is checked before anything else — a forged
    /// redirect must not be trusted even to report errors — and a
    /// server-declared error wins over any success parameters next to it.
    pub fn handle_authorization_redirect(&self, url: &Url) {
        self.assert_scheduling_context();

        let (code_only, state_token, has_code) = {
            let inner = self.inner.borrow();
            if !inner.state.is_authorizing() {
                tracing::debug!(
                    state = inner.state.name(),
                    "Ignoring redirect outside of an authorizing flow"
                );
                return;
            }
            let flow = inner.flow.as_ref().expect("authorizing implies an active flow");
            (
                flow.response_types.len() == 1
                    && flow.response_types.contains(&ResponseType::Code),
                flow.state_token.clone(),
                flow.response_types.contains(&ResponseType::Code),
            )
        };

        let params = if code_only {
            url_ext::query_map(url)
        } else {
            url_ext::fragment_map(url)
        };

        if params.get("state").map(String::as_str) != Some(state_token.as_str()) {
            fail(&self.inner, AuthorizationError::StateMismatch.into());
            return;
        }

        if let Some(error) = params.get("error") {
            fail(
                &self.inner,
                AuthorizationError::ServerError {
                    error: error.clone(),
                    error_description: params.get("error_description").cloned(),
                }
                .into(),
            );
            return;
        }

        if has_code {
            let code = match params.get("code").filter(|code| !code.is_empty()) {
                Some(code) => code.clone(),
                None => {
                    fail(&self.inner, AuthorizationError::MissingCode.into());
                    return;
                }
            };
            set_state(&self.inner, State::FetchingToken);
            self.exchange_code(code);
            return;
        }

        // Implicit flows carry the credentials directly on the fragment.
        let extracted = {
            let inner = self.inner.borrow();
            let flow = inner.flow.as_ref().expect("authorizing implies an active flow");
            token_response::extract_credentials(Extraction {
                source: TokenSource::AuthorizationRedirect(&params),
                requested_scope: &flow.scope,
                response_types: &flow.response_types,
                expected_nonce: Some(flow.nonce_token.as_str()),
                now: inner.time_source.now(),
            })
        };
        match extracted {
            Ok(credentials) => refresh::enter_authorized(&self.inner, credentials),
            Err(err) => fail(&self.inner, err.into()),
        }
    }

    /// Report that the browser agent could not complete the authorization.
    /// Ignored unless a flow is currently authorizing.
    pub fn handle_authorization_failure(&self, error: AuthorizationError) {
        self.assert_scheduling_context();

        if !self.inner.borrow().state.is_authorizing() {
            tracing::debug!("Ignoring authorization failure outside of an authorizing flow");
            return;
        }
        fail(&self.inner, error.into());
    }

    /// Abort the current flow. A no-op while `Authorized`; use `end` to log
    /// out.
    pub fn cancel(&self) {
        self.assert_scheduling_context();

        if self.inner.borrow().state.is_authorized() {
            tracing::debug!("cancel is a no-op while authorized; use end to log out");
            return;
        }
        cleanup(&self.inner);
        set_state(&self.inner, State::Cancelled);
    }

    /// Log out: delete the cached credentials of the current client and
    /// enter `Cancelled`. Outside of `Authorized` this behaves as `cancel`.
    pub fn end(&self) {
        self.assert_scheduling_context();

        if !self.inner.borrow().state.is_authorized() {
            self.cancel();
            return;
        }

        let (storage, client_id) = {
            let inner = self.inner.borrow();
            let config = inner.config.as_ref().expect("authorized implies a config");
            (Rc::clone(&inner.storage), config.client_id.clone())
        };
        if let Err(err) = storage.delete(&client_id) {
            tracing::warn!(%err, "Could not delete stored credentials");
        }

        cleanup(&self.inner);
        set_state(&self.inner, State::Cancelled);
    }

    /// Ask an errored refresh loop to try again right away instead of
    /// waiting out its back-off. Only meaningful while
    /// `Authorized { refreshing: true }`.
    pub fn nudge_to_refresh(&self) {
        self.assert_scheduling_context();
        refresh::nudge(&self.inner);
    }

    /// Issue the token-endpoint exchange for a received authorization code.
    fn exchange_code(&self, code: AuthorizationCode) {
        let (request, cookie, transport) = {
            let mut inner = self.inner.borrow_mut();
            let config = inner.config.as_ref().expect("fetching token implies a config");
            let token_endpoint = config
                .token_endpoint
                .clone()
                .expect("code flows are rejected without a token endpoint");
            let request = TokenRequest::authorization_code(config, &token_endpoint, &code);
            inner.request_cookie += 1;
            (request, inner.request_cookie, Rc::clone(&inner.transport))
        };

        let weak = Rc::downgrade(&self.inner);
        transport.perform_token_request(
            request,
            Box::new(move |result| {
                let Some(inner) = weak.upgrade() else { return };
                if !consume_cookie(&inner, cookie) {
                    return;
                }
                handle_exchange_response(&inner, result);
            }),
        );
    }

    fn assert_scheduling_context(&self) {
        assert_eq!(
            thread::current().id(),
            self.inner.borrow().home_thread,
            "Client methods must run on the thread the client was created on",
        );
    }
}

/// Build the URL the browser agent should visit, preserving whatever query
/// items the authorization endpoint already carries. The client secret is
/// never part of it.
fn authorization_url(config: &Config, flow: &FlowState) -> Result<Url, ConfigError> {
    if config.authorization_endpoint.cannot_be_a_base() {
        return Err(ConfigError::UnsupportedAuthorizationEndpoint);
    }

    let mut url = config.authorization_endpoint.clone();
    let mut params: Vec<(&str, String)> = vec![
        ("response_type", ResponseType::join(&flow.response_types)),
        ("client_id", config.client_id.clone()),
        ("redirect_uri", config.redirect_url.to_string()),
    ];
    if !flow.scope.is_empty() {
        let scope = flow
            .scope
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        params.push(("scope", scope));
    }
    params.push(("state", flow.state_token.as_str().to_owned()));
    if flow.response_types.contains(&ResponseType::IdToken) {
        params.push(("nonce", flow.nonce_token.as_str().to_owned()));
    }
    if let Some(display) = config.display {
        params.push(("display", display.as_str().to_owned()));
    }
    if let Some(prompt) = &config.prompt {
        if !prompt.is_empty() {
            let prompt = prompt
                .iter()
                .map(|prompt| prompt.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            params.push(("prompt", prompt));
        }
    }

    url_ext::append_query_pairs(&mut url, params.iter().map(|(key, value)| (*key, value.as_str())));
    Ok(url)
}

fn handle_exchange_response(inner: &Rc<RefCell<ClientInner>>, result: TransportResult) {
    let body = match result {
        Ok(body) => body,
        Err(err) => {
            fail(inner, TokenExchangeError::Transport { source: err }.into());
            return;
        }
    };

    // A server-declared error overrides any success fields in the same body.
    if let Some(error) = body.get("error") {
        let (error, error_description) =
            token_response::rejected_error(error, body.get("error_description"));
        fail(
            inner,
            TokenExchangeError::Rejected {
                error,
                error_description,
            }
            .into(),
        );
        return;
    }

    let extracted = {
        let guard = inner.borrow();
        let flow = guard.flow.as_ref().expect("token exchange implies an active flow");
        token_response::extract_credentials(Extraction {
            source: TokenSource::TokenEndpoint(&body),
            requested_scope: &flow.scope,
            response_types: &flow.response_types,
            expected_nonce: None,
            now: guard.time_source.now(),
        })
    };
    match extracted {
        Ok(credentials) => refresh::enter_authorized(inner, credentials),
        Err(err) => fail(inner, err.into()),
    }
}

/// Restart discipline shared by `start`, `cancel` and `end`: supersede any
/// outstanding request, disarm timers and drop the flow bookkeeping.
pub(crate) fn cleanup(inner: &Rc<RefCell<ClientInner>>) {
    let mut guard = inner.borrow_mut();
    guard.request_cookie += 1;
    guard.refresh.reset();
    guard.flow = None;
    guard.config = None;
}

/// Validate a completion's cookie and consume it, so that any duplicate or
/// late delivery of the same request is dropped as well.
pub(crate) fn consume_cookie(inner: &Rc<RefCell<ClientInner>>, cookie: u64) -> bool {
    let mut guard = inner.borrow_mut();
    if guard.request_cookie != cookie {
        tracing::trace!("Dropping completion for a superseded token request");
        return false;
    }
    guard.request_cookie += 1;
    true
}

/// Assign a new state and notify synchronously. Observers run after the
/// borrow is released and may therefore call back into the client.
pub(crate) fn set_state(inner: &Rc<RefCell<ClientInner>>, state: State) {
    let (observers, current) = {
        let mut guard = inner.borrow_mut();
        tracing::debug!(from = guard.state.name(), to = state.name(), "State transition");
        guard.state = state;
        (guard.observers.snapshot(), guard.state.clone())
    };
    for observer in observers {
        observer(&current);
    }
}

/// Terminal failure: supersede outstanding work and surface the error.
pub(crate) fn fail(inner: &Rc<RefCell<ClientInner>>, error: FlowError) {
    tracing::debug!(%error, "Flow failed");
    {
        let mut guard = inner.borrow_mut();
        guard.request_cookie += 1;
        guard.refresh.reset();
        guard.flow = None;
    }
    set_state(inner, State::Failed(Rc::new(error)));
}
