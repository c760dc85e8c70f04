#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Duration;

use oauth_flow_core::{
    Client, Config, CredentialStorage, JsonObject, Mode, ResponseType, ScheduledTask, State,
    StorageError, TimeSource, TimerScheduler, TokenRequest, TokenTransport, TransportResult, Url,
};
use time::macros::datetime;
use time::OffsetDateTime;

/// The instant every mock clock starts at.
pub const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

#[derive(Default)]
pub struct MockStorage {
    entries: RefCell<HashMap<String, Vec<u8>>>,
    pub fail_writes: Cell<bool>,
}

impl MockStorage {
    pub fn preload(&self, client_id: &str, blob: Vec<u8>) {
        self.entries.borrow_mut().insert(client_id.to_owned(), blob);
    }

    pub fn blob(&self, client_id: &str) -> Option<Vec<u8>> {
        self.entries.borrow().get(client_id).cloned()
    }
}

impl CredentialStorage for MockStorage {
    fn get(&self, client_id: &str) -> Option<Vec<u8>> {
        self.entries.borrow().get(client_id).cloned()
    }

    fn put(&self, client_id: &str, blob: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError {
                message: "write refused".to_owned(),
            });
        }
        self.entries
            .borrow_mut()
            .insert(client_id.to_owned(), blob.to_vec());
        Ok(())
    }

    fn delete(&self, client_id: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(client_id);
        Ok(())
    }
}

pub struct PendingRequest {
    pub request: TokenRequest,
    completion: Box<dyn FnOnce(TransportResult)>,
}

impl PendingRequest {
    pub fn complete(self, result: TransportResult) {
        (self.completion)(result);
    }

    pub fn body_params(&self) -> HashMap<String, String> {
        self.request.body_params().into_iter().collect()
    }
}

#[derive(Default)]
pub struct MockTransport {
    requests: RefCell<Vec<PendingRequest>>,
}

impl MockTransport {
    pub fn pending(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn take_next(&self) -> PendingRequest {
        assert!(
            !self.requests.borrow().is_empty(),
            "no pending token request"
        );
        self.requests.borrow_mut().remove(0)
    }

    pub fn complete_next(&self, result: TransportResult) {
        self.take_next().complete(result);
    }
}

impl TokenTransport for MockTransport {
    fn perform_token_request(
        &self,
        request: TokenRequest,
        completion: Box<dyn FnOnce(TransportResult)>,
    ) {
        self.requests
            .borrow_mut()
            .push(PendingRequest { request, completion });
    }
}

pub struct MockTime {
    now: Cell<OffsetDateTime>,
}

impl Default for MockTime {
    fn default() -> Self {
        Self { now: Cell::new(NOW) }
    }
}

impl MockTime {
    pub fn advance(&self, by: time::Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl TimeSource for MockTime {
    fn now(&self) -> OffsetDateTime {
        self.now.get()
    }
}

pub struct TimerEntry {
    pub delay: Duration,
    callback: RefCell<Option<Box<dyn FnOnce()>>>,
    cancelled: Cell<bool>,
}

#[derive(Default)]
pub struct MockTimers {
    entries: RefCell<Vec<Rc<TimerEntry>>>,
}

struct MockTimerHandle {
    entry: Rc<TimerEntry>,
}

impl ScheduledTask for MockTimerHandle {
    fn cancel(&self) {
        self.entry.cancelled.set(true);
    }
}

impl TimerScheduler for MockTimers {
    fn schedule(&self, after: Duration, task: Box<dyn FnOnce()>) -> Box<dyn ScheduledTask> {
        let entry = Rc::new(TimerEntry {
            delay: after,
            callback: RefCell::new(Some(task)),
            cancelled: Cell::new(false),
        });
        self.entries.borrow_mut().push(Rc::clone(&entry));
        Box::new(MockTimerHandle { entry })
    }
}

impl MockTimers {
    /// Delays of timers that are armed: scheduled, not cancelled, not fired.
    pub fn armed_delays(&self) -> Vec<Duration> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| !entry.cancelled.get() && entry.callback.borrow().is_some())
            .map(|entry| entry.delay)
            .collect()
    }

    /// Run the earliest armed timer, returning the delay it was armed with.
    pub fn fire_next(&self) -> Duration {
        let entry = {
            let entries = self.entries.borrow();
            entries
                .iter()
                .find(|entry| !entry.cancelled.get() && entry.callback.borrow().is_some())
                .map(Rc::clone)
                .expect("no armed timer to fire")
        };
        let callback = entry.callback.borrow_mut().take().unwrap();
        callback();
        entry.delay
    }
}

pub struct Harness {
    pub storage: Rc<MockStorage>,
    pub transport: Rc<MockTransport>,
    pub time: Rc<MockTime>,
    pub timers: Rc<MockTimers>,
    pub client: Client,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_shared_storage(Rc::new(MockStorage::default()))
    }

    pub fn with_shared_storage(storage: Rc<MockStorage>) -> Self {
        let transport = Rc::new(MockTransport::default());
        let time = Rc::new(MockTime::default());
        let timers = Rc::new(MockTimers::default());
        let client = Client::new(
            Rc::clone(&storage) as Rc<dyn CredentialStorage>,
            Rc::clone(&transport) as Rc<dyn TokenTransport>,
            Rc::clone(&time) as Rc<dyn TimeSource>,
            Rc::clone(&timers) as Rc<dyn TimerScheduler>,
        );
        Self {
            storage,
            transport,
            time,
            timers,
            client,
        }
    }

    /// The query parameters of the authorization URL the client wants the
    /// browser agent to visit. Panics outside of `Authorizing`.
    pub fn authorizing_params(&self) -> HashMap<String, String> {
        let State::Authorizing { url, .. } = self.client.state() else {
            panic!("expected the client to be authorizing");
        };
        oauth_flow_core::url_ext::query_map(&url)
    }
}

pub fn base_config() -> Config {
    Config {
        authorization_endpoint: Url::parse(
            "http://example.com/auth?paramToPreserve=true&anotherOneEmpty=",
        )
        .unwrap(),
        token_endpoint: Some(Url::parse("http://example.com/token").unwrap()),
        client_id: "273197".to_owned(),
        client_secret: None,
        redirect_url: Url::parse("https://example.com/redirect").unwrap(),
        display: None,
        prompt: None,
    }
}

pub fn response_types(types: &[ResponseType]) -> BTreeSet<ResponseType> {
    types.iter().copied().collect()
}

pub fn scope(labels: &[&str]) -> BTreeSet<String> {
    labels.iter().map(|label| (*label).to_owned()).collect()
}

pub fn json_body(value: serde_json::Value) -> JsonObject {
    value.as_object().expect("a JSON object").clone()
}

/// Encode a JWT-shaped token from a payload; the signature section is
/// garbage, which is fine since nothing verifies it.
pub fn encode_id_token(payload: &serde_json::Value) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    format!(
        "{}.{}.unverified-signature",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&serde_json::json!({ "alg": "RS256" })).unwrap()),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap()),
    )
}

/// Drive a fresh start through the happy authorization-code path up to
/// `Authorized`, completing the exchange with `token_body`.
pub fn drive_code_flow_to_authorized(harness: &Harness, token_body: serde_json::Value) {
    harness.client.start(
        base_config(),
        Mode::Interactive,
        response_types(&[ResponseType::Code]),
        scope(&[]),
    );
    let state = harness.authorizing_params()["state"].clone();
    let redirect = Url::parse(&format!(
        "https://example.com/redirect?state={state}&code=code:12345"
    ))
    .unwrap();
    harness.client.handle_authorization_redirect(&redirect);
    harness.transport.complete_next(Ok(json_body(token_body)));
}

pub fn state_label(state: &State) -> &'static str {
    match state {
        State::Idle => "idle",
        State::Authorizing { .. } => "authorizing",
        State::FetchingToken => "fetchingToken",
        State::Failed(_) => "failed",
        State::Cancelled => "cancelled",
        State::Authorized { .. } => "authorized",
    }
}
