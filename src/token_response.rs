use std::collections::{BTreeSet, HashMap};

use snafu::{ensure, OptionExt, ResultExt, Snafu};
use time::{Duration, OffsetDateTime};

use crate::credentials::Credentials;
use crate::id_token::{IdToken, IdTokenError};
use crate::response_type::ResponseType;
use crate::transport::TransportError;
use crate::JsonObject;

#[derive(Debug, Snafu)]
pub enum TokenExchangeError {
    #[snafu(display("TokenExchangeError: Transport failure"))]
    Transport { source: TransportError },

    #[snafu(display("TokenExchangeError: Server declared an error: {error}"))]
    Rejected {
        error: String,
        error_description: Option<String>,
    },

    #[snafu(display("TokenExchangeError: Missing required field '{field}'"))]
    MissingField { field: &'static str },

    #[snafu(display("TokenExchangeError: Field '{field}' is invalid"))]
    InvalidField { field: &'static str },

    #[snafu(display("TokenExchangeError: Unsupported token type '{token_type}'"))]
    UnsupportedTokenType { token_type: String },

    #[snafu(display("TokenExchangeError: 'expires_in' must be a positive number of seconds"))]
    InvalidExpiresIn,

    #[snafu(display("TokenExchangeError: Could not parse ID token"))]
    IdToken { source: IdTokenError },

    #[snafu(display("TokenExchangeError: ID token nonce does not match this flow"))]
    NonceMismatch,
}

/// Where a set of token fields came from. The source decides which fields
/// are required and which are ignored.
#[derive(Debug)]
pub(crate) enum TokenSource<'s> {
    /// Parameters delivered on the redirect URL (implicit flows).
    AuthorizationRedirect(&'s HashMap<String, String>),

    /// JSON body from the token endpoint (code exchange and refresh).
    TokenEndpoint(&'s JsonObject),
}

impl TokenSource<'_> {
    fn is_token_endpoint(&self) -> bool {
        matches!(self, TokenSource::TokenEndpoint(_))
    }

    /// A field as a string, if present. Present-but-not-a-string counts as
    /// invalid rather than absent.
    fn str_field(&self, field: &'static str) -> Result<Option<&str>, TokenExchangeError> {
        match self {
            TokenSource::AuthorizationRedirect(params) => {
                Ok(params.get(field).map(String::as_str))
            }
            TokenSource::TokenEndpoint(body) => match body.get(field) {
                None => Ok(None),
                Some(serde_json::Value::String(value)) => Ok(Some(value.as_str())),
                Some(_) => InvalidFieldSnafu { field }.fail(),
            },
        }
    }

    /// A field holding whole seconds: an integer, or a string that parses as
    /// one.
    fn seconds_field(&self, field: &'static str) -> Result<Option<i64>, TokenExchangeError> {
        let seconds = match self {
            TokenSource::AuthorizationRedirect(params) => match params.get(field) {
                None => return Ok(None),
                Some(raw) => raw.parse::<i64>().ok().context(InvalidExpiresInSnafu)?,
            },
            TokenSource::TokenEndpoint(body) => match body.get(field) {
                None => return Ok(None),
                Some(serde_json::Value::Number(number)) => {
                    number.as_i64().context(InvalidExpiresInSnafu)?
                }
                Some(serde_json::Value::String(raw)) => {
                    raw.parse::<i64>().ok().context(InvalidExpiresInSnafu)?
                }
                Some(_) => return InvalidExpiresInSnafu.fail(),
            },
        };
        Ok(Some(seconds))
    }
}

pub(crate) struct Extraction<'e> {
    pub(crate) source: TokenSource<'e>,

    /// The scope the flow asked for; inherited when the response omits one.
    pub(crate) requested_scope: &'e BTreeSet<String>,

    pub(crate) response_types: &'e BTreeSet<ResponseType>,

    /// The nonce a redirect-delivered ID token must echo. `None` for
    /// token-endpoint responses, which are not cross-checked.
    pub(crate) expected_nonce: Option<&'e str>,

    pub(crate) now: OffsetDateTime,
}

/// Turn a validated token response into credentials.
///
/// The access-token block is mandatory for token-endpoint responses and for
/// redirects of flows that requested `token`; the ID-token block for
/// redirects of flows that requested `id_token` and for token-endpoint
/// responses of flows whose scope contains `openid`. A refresh token is only
/// ever taken from the token endpoint.
pub(crate) fn extract_credentials(
    extraction: Extraction<'_>,
) -> Result<Credentials, TokenExchangeError> {
    let Extraction {
        source,
        requested_scope,
        response_types,
        expected_nonce,
        now,
    } = extraction;

    let scope = match source.str_field("scope")? {
        Some(raw) => {
            ensure!(!raw.is_empty(), InvalidFieldSnafu { field: "scope" });
            raw.split_whitespace().map(str::to_owned).collect()
        }
        None => requested_scope.clone(),
    };

    let wants_access_token =
        source.is_token_endpoint() || response_types.contains(&ResponseType::Token);
    let (access_token, access_token_expires_at) = if wants_access_token {
        let access_token = source
            .str_field("access_token")?
            .filter(|token| !token.is_empty())
            .context(MissingFieldSnafu {
                field: "access_token",
            })?
            .to_owned();

        let token_type = source.str_field("token_type")?.context(MissingFieldSnafu {
            field: "token_type",
        })?;
        ensure!(
            token_type.eq_ignore_ascii_case("bearer"),
            UnsupportedTokenTypeSnafu { token_type }
        );

        let expires_at = match source.seconds_field("expires_in")? {
            Some(seconds) => {
                ensure!(seconds > 0, InvalidExpiresInSnafu);
                Some(now + Duration::seconds(seconds))
            }
            None => None,
        };

        (Some(access_token), expires_at)
    } else {
        (None, None)
    };

    let refresh_token = if source.is_token_endpoint() {
        let token = source.str_field("refresh_token")?;
        if let Some(token) = token {
            ensure!(
                !token.is_empty(),
                InvalidFieldSnafu {
                    field: "refresh_token"
                }
            );
        }
        token.map(str::to_owned)
    } else {
        None
    };

    let wants_id_token = match &source {
        TokenSource::AuthorizationRedirect(_) => response_types.contains(&ResponseType::IdToken),
        TokenSource::TokenEndpoint(_) => requested_scope.contains("openid"),
    };
    let id_token = if wants_id_token {
        let raw = source
            .str_field("id_token")?
            .filter(|token| !token.is_empty())
            .context(MissingFieldSnafu { field: "id_token" })?;
        let token = IdToken::parse(raw).context(IdTokenSnafu)?;
        if let Some(expected) = expected_nonce {
            // A redirect-delivered token must echo this flow's nonce.
            ensure!(token.nonce() == Some(expected), NonceMismatchSnafu);
        }
        Some(token)
    } else {
        None
    };

    Ok(Credentials {
        scope,
        response_type: response_types.clone(),
        access_token,
        access_token_expires_at,
        refresh_token,
        id_token,
    })
}

/// The error for a response body carrying an OAuth `error` field. Success
/// fields in the same body are ignored.
pub(crate) fn rejected_error(
    error: &serde_json::Value,
    error_description: Option<&serde_json::Value>,
) -> (String, Option<String>) {
    (
        display_json(error),
        error_description.map(display_json),
    )
}

fn display_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
