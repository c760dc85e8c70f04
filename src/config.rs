use std::collections::BTreeSet;

use snafu::Snafu;
use url::Url;

/// Resolved endpoints and client registration data for one authorization
/// flow. Typically the output of an OpenID discovery step, which lives
/// outside of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server URL a user agent visits to authenticate and consent.
    pub authorization_endpoint: Url,

    /// Server URL contacted directly to exchange a code or a refresh token
    /// for an access token. Mandatory whenever the `code` response type is
    /// requested.
    pub token_endpoint: Option<Url>,

    /// The client identifier registered with the authorization server. Also
    /// the key under which credentials are cached.
    pub client_id: String,

    /// Secret for clients that have one. Only ever sent in the token-request
    /// `Authorization` header, never on the authorization URL.
    pub client_secret: Option<String>,

    /// Absolute URL the authorization server redirects back to. The browser
    /// agent intercepts navigations to it.
    pub redirect_url: Url,

    /// Optional OpenID `display` hint for the authorization request.
    pub display: Option<Display>,

    /// Optional OpenID `prompt` values for the authorization request.
    pub prompt: Option<BTreeSet<Prompt>>,
}

/// How the authorization server should present its login UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Page,
    Popup,
    Touch,
}

impl Display {
    pub fn as_str(self) -> &'static str {
        match self {
            Display::Page => "page",
            Display::Popup => "popup",
            Display::Touch => "touch",
        }
    }
}

/// Re-authentication and consent behavior requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prompt {
    None,
    Login,
    Consent,
    SelectAccount,
}

impl Prompt {
    pub fn as_str(self) -> &'static str {
        match self {
            Prompt::None => "none",
            Prompt::Login => "login",
            Prompt::Consent => "consent",
            Prompt::SelectAccount => "select_account",
        }
    }
}

/// Whether a flow may interact with the user.
///
/// A `Silent` start only ever reuses cached credentials; when there is
/// nothing to reuse it ends in `Cancelled` instead of opening a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Silent,
    Interactive,
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("ConfigError: The `code` response type requires a token endpoint"))]
    MissingTokenEndpoint,

    #[snafu(display(
        "ConfigError: The authorization endpoint cannot carry query parameters (cannot-be-a-base URL)"
    ))]
    UnsupportedAuthorizationEndpoint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn display_wire_names() {
        assert_that(Display::Page.as_str()).is_equal_to("page");
        assert_that(Display::Popup.as_str()).is_equal_to("popup");
        assert_that(Display::Touch.as_str()).is_equal_to("touch");
    }

    #[test]
    fn prompt_wire_names() {
        assert_that(Prompt::None.as_str()).is_equal_to("none");
        assert_that(Prompt::Login.as_str()).is_equal_to("login");
        assert_that(Prompt::Consent.as_str()).is_equal_to("consent");
        assert_that(Prompt::SelectAccount.as_str()).is_equal_to("select_account");
    }
}
