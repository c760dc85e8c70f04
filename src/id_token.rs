use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use time::OffsetDateTime;

use crate::JsonObject;

/// A decoded OpenID Connect ID token.
///
/// The JWT-shaped string is split and decoded on construction and the
/// required claims are extracted eagerly; everything else stays in the
/// `payload` map and is read on demand. The signature is NOT verified —
/// resource servers own that concern.
#[derive(Debug, Clone)]
pub struct IdToken {
    raw: String,
    header: JsonObject,
    payload: JsonObject,
    issuer: String,
    subject: String,
    audience: Vec<String>,
    expires_at: OffsetDateTime,
    issued_at: OffsetDateTime,
}

/// The claims every ID token must carry.
#[derive(Debug, Clone, Deserialize)]
struct RequiredClaims {
    iss: String,
    sub: String,
    aud: RawAudiences,
    exp: i64,
    iat: i64,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawAudiences {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Snafu)]
pub enum IdTokenError {
    #[snafu(display("IdTokenError: Expected at least a header and a payload section"))]
    MissingSections,

    #[snafu(display("IdTokenError: Section {section} is not valid base64"))]
    SectionNotBase64 {
        section: usize,
        source: base64::DecodeError,
    },

    #[snafu(display("IdTokenError: Section {section} is not valid JSON"))]
    SectionNotJson {
        section: usize,
        source: serde_json::Error,
    },

    #[snafu(display("IdTokenError: Section {section} is not a JSON object"))]
    SectionNotAnObject { section: usize },

    #[snafu(display("IdTokenError: Missing or malformed required claim"))]
    InvalidClaims { source: serde_json::Error },

    #[snafu(display("IdTokenError: Claim '{claim}' must be a non-empty string"))]
    EmptyClaim { claim: &'static str },

    #[snafu(display("IdTokenError: Claim '{claim}' is not a valid instant"))]
    InvalidInstant { claim: &'static str },
}

impl IdToken {
    /// Decode a JWT-shaped string without verifying its signature.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdTokenError> {
        let raw = raw.into();

        let mut sections = raw.split('.');
        let header = decode_section(sections.next(), 0)?;
        let payload = decode_section(sections.next(), 1)?;

        let claims: RequiredClaims =
            serde_json::from_value(serde_json::Value::Object(payload.clone()))
                .context(InvalidClaimsSnafu)?;
        ensure!(!claims.iss.is_empty(), EmptyClaimSnafu { claim: "iss" });
        ensure!(!claims.sub.is_empty(), EmptyClaimSnafu { claim: "sub" });

        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .ok()
            .context(InvalidInstantSnafu { claim: "exp" })?;
        let issued_at = OffsetDateTime::from_unix_timestamp(claims.iat)
            .ok()
            .context(InvalidInstantSnafu { claim: "iat" })?;

        Ok(Self {
            raw,
            header,
            payload,
            issuer: claims.iss,
            subject: claims.sub,
            audience: match claims.aud {
                RawAudiences::Single(audience) => vec![audience],
                RawAudiences::Multiple(audiences) => audiences,
            },
            expires_at,
            issued_at,
        })
    }

    /// The raw JWT string this token was parsed from.
    pub fn value(&self) -> &str {
        &self.raw
    }

    pub fn header(&self) -> &JsonObject {
        &self.header
    }

    pub fn payload(&self) -> &JsonObject {
        &self.payload
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The `sub` claim.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The `aud` claim; a single string is normalized to a one-element list.
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// The `exp` claim.
    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// The `iat` claim.
    pub fn issued_at(&self) -> OffsetDateTime {
        self.issued_at
    }

    pub fn nonce(&self) -> Option<&str> {
        self.payload_str("nonce")
    }

    pub fn name(&self) -> Option<&str> {
        self.payload_str("name")
    }

    pub fn email(&self) -> Option<&str> {
        self.payload_str("email")
    }

    pub fn picture(&self) -> Option<&str> {
        self.payload_str("picture")
    }

    pub fn given_name(&self) -> Option<&str> {
        self.payload_str("given_name")
    }

    pub fn family_name(&self) -> Option<&str> {
        self.payload_str("family_name")
    }

    /// A payload claim as a string; `None` on absence or type mismatch.
    fn payload_str(&self, claim: &str) -> Option<&str> {
        self.payload.get(claim).and_then(|value| value.as_str())
    }
}

/// Two tokens are equal iff their raw string values are.
impl PartialEq for IdToken {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for IdToken {}

impl Serialize for IdToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for IdToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        IdToken::parse(raw).map_err(D::Error::custom)
    }
}

fn decode_section(section: Option<&str>, index: usize) -> Result<JsonObject, IdTokenError> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let section = section.context(MissingSectionsSnafu)?;

    // JWT sections use the url-safe base64 alphabet without padding.
    // Normalize to the standard alphabet and re-pad before decoding.
    let mut standard: String = section
        .chars()
        .map(|char| match char {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    let bytes = STANDARD
        .decode(standard.as_bytes())
        .context(SectionNotBase64Snafu { section: index })?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).context(SectionNotJsonSnafu { section: index })?;
    match value {
        serde_json::Value::Object(object) => Ok(object),
        _ => SectionNotAnObjectSnafu { section: index }.fail(),
    }
}
