use snafu::Snafu;

use crate::client::AuthorizationError;
use crate::config::ConfigError;
use crate::refresh::RefreshError;
use crate::token_response::TokenExchangeError;

/// Top-level error surfaced through `State::Failed`.
///
/// Carries a cause chain for diagnostics. Callers are expected to branch on
/// `State::is_failed`, not on the concrete variant; `Cancelled` is a state of
/// its own and never reported here.
#[derive(Debug, Snafu)]
pub enum FlowError {
    #[snafu(display("FlowError: Invalid configuration"))]
    Config { source: ConfigError },

    #[snafu(display("FlowError: Authorization failed"))]
    Authorization { source: AuthorizationError },

    #[snafu(display("FlowError: Token endpoint exchange failed"))]
    TokenExchange { source: TokenExchangeError },

    #[snafu(display("FlowError: Token refresh failed"))]
    Refresh { source: RefreshError },
}

impl From<ConfigError> for FlowError {
    fn from(source: ConfigError) -> Self {
        FlowError::Config { source }
    }
}

impl From<AuthorizationError> for FlowError {
    fn from(source: AuthorizationError) -> Self {
        FlowError::Authorization { source }
    }
}

impl From<TokenExchangeError> for FlowError {
    fn from(source: TokenExchangeError) -> Self {
        FlowError::TokenExchange { source }
    }
}

impl From<RefreshError> for FlowError {
    fn from(source: RefreshError) -> Self {
        FlowError::Refresh { source }
    }
}
