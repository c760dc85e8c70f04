use snafu::Snafu;
use url::form_urlencoded;
use url::Url;

use crate::config::Config;
use crate::JsonObject;

/// Result of one token-endpoint round trip: the JSON-decoded body, or a
/// transport-level error.
pub type TransportResult = Result<JsonObject, TransportError>;

/// One token-endpoint HTTP exchange.
///
/// Implementations must deliver `completion` exactly once, on the thread the
/// client was created on. Bodies of both 200 and 400 responses must be
/// JSON-decoded (OAuth error responses arrive with status 400); any other
/// status must be reported as `TransportError::Status`.
pub trait TokenTransport {
    fn perform_token_request(
        &self,
        request: TokenRequest,
        completion: Box<dyn FnOnce(TransportResult)>,
    );
}

#[derive(Debug, Snafu)]
pub enum TransportError {
    #[snafu(display("TransportError: Could not send request: {message}"))]
    Send { message: String },

    #[snafu(display("TransportError: Could not decode payload as a JSON object: {message}"))]
    Decode { message: String },

    #[snafu(display("TransportError: Unexpected status code {code}"))]
    Status { code: u16 },
}

/// A fully prepared POST to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub url: Url,

    /// Header name/value pairs: the form-encoded content type, plus HTTP
    /// basic authentication whenever a client secret is configured.
    pub headers: Vec<(&'static str, String)>,

    /// `application/x-www-form-urlencoded` bytes.
    pub body: Vec<u8>,
}

impl TokenRequest {
    /// All token-endpoint requests are POSTs.
    pub const METHOD: &'static str = "POST";

    /// The authorization-code exchange issued right after a code redirect.
    pub(crate) fn authorization_code(config: &Config, token_endpoint: &Url, code: &str) -> Self {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", config.redirect_url.as_str())
            .finish();
        Self::post(config, token_endpoint, body)
    }

    /// The refresh-token exchange. The grant is bound through the refresh
    /// token itself, so neither scope nor client_id travel in the body.
    pub(crate) fn refresh(config: &Config, token_endpoint: &Url, refresh_token: &str) -> Self {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .finish();
        Self::post(config, token_endpoint, body)
    }

    fn post(config: &Config, token_endpoint: &Url, body: String) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let mut headers = vec![(
            "Content-Type",
            "application/x-www-form-urlencoded".to_owned(),
        )];
        if let Some(client_secret) = &config.client_secret {
            let credentials = STANDARD.encode(format!("{}:{client_secret}", config.client_id));
            headers.push(("Authorization", format!("Basic {credentials}")));
        }

        Self {
            url: token_endpoint.clone(),
            headers,
            body: body.into_bytes(),
        }
    }

    /// The form-decoded body, for assertions and logging.
    pub fn body_params(&self) -> Vec<(String, String)> {
        form_urlencoded::parse(&self.body)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }
}
