use std::rc::Rc;

use url::Url;

use crate::credentials::Credentials;
use crate::error::FlowError;

/// The externally observable position of the authorization flow.
///
/// A freshly created client is `Idle`. `start` moves the machine forward,
/// `cancel` and `end` are the terminal moves, and only `Idle`, `Failed` and
/// `Cancelled` permit a restart via `start`.
#[derive(Debug, Clone)]
pub enum State {
    /// No flow has been started yet.
    Idle,

    /// The browser agent should visit `url` and hand back any navigation to
    /// `redirect_url` via `handle_authorization_redirect`.
    Authorizing { url: Url, redirect_url: Url },

    /// The received authorization code is being exchanged at the token
    /// endpoint.
    FetchingToken,

    /// Terminal failure. The error carries its cause chain; restart with
    /// `start`.
    Failed(Rc<FlowError>),

    /// The flow was cancelled, either explicitly or because a silent start
    /// found nothing to reuse. Never reported as an error.
    Cancelled,

    /// Credentials are available. `refreshing` is `true` while a token
    /// refresh is in flight or waiting between retry attempts.
    Authorized {
        credentials: Credentials,
        refreshing: bool,
    },
}

impl State {
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    pub fn is_authorizing(&self) -> bool {
        matches!(self, State::Authorizing { .. })
    }

    pub fn is_fetching_token(&self) -> bool {
        matches!(self, State::FetchingToken)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, State::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, State::Cancelled)
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, State::Authorized { .. })
    }

    /// The credentials when authorized, `None` otherwise.
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            State::Authorized { credentials, .. } => Some(credentials),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Authorizing { .. } => "authorizing",
            State::FetchingToken => "fetchingToken",
            State::Failed(_) => "failed",
            State::Cancelled => "cancelled",
            State::Authorized { .. } => "authorized",
        }
    }
}
