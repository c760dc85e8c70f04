use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::id_token::IdToken;
use crate::response_type::ResponseType;
use crate::{AccessToken, RefreshToken};

/// Snapshot of everything obtained from one completed authorization.
///
/// Values are immutable once issued; a refresh produces a whole new record.
/// The serialized form is the JSON blob handed to the credential storage,
/// keyed by client identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// The granted scope. Falls back to the requested scope when the server
    /// response omitted one.
    pub scope: BTreeSet<String>,

    /// The response types the flow was started with. Stored credentials are
    /// only reused for a start requesting the exact same set.
    pub response_type: BTreeSet<ResponseType>,

    pub access_token: Option<AccessToken>,

    /// Absolute expiry instant of `access_token`, derived from `expires_in`.
    #[serde(rename = "expiresAt", with = "time::serde::timestamp::option")]
    pub access_token_expires_at: Option<OffsetDateTime>,

    pub refresh_token: Option<RefreshToken>,

    pub id_token: Option<IdToken>,
}

/// Coarse lifetime classification used for storage reuse and refresh
/// scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// No part of the credentials carries an expiry.
    ValidForever,
    Valid,
    Expired,
}

impl Credentials {
    /// The first instant at which any part of these credentials expires: the
    /// minimum of the access-token expiry and the ID-token `exp` claim.
    pub fn earliest_expiration_date(&self) -> Option<OffsetDateTime> {
        let id_token_expires_at = self.id_token.as_ref().map(|token| token.expires_at());
        match (self.access_token_expires_at, id_token_expires_at) {
            (Some(access), Some(id)) => Some(access.min(id)),
            (Some(access), None) => Some(access),
            (None, Some(id)) => Some(id),
            (None, None) => None,
        }
    }

    pub fn validity(&self, now: OffsetDateTime) -> Validity {
        match self.earliest_expiration_date() {
            None => Validity::ValidForever,
            Some(expires_at) if expires_at > now => Validity::Valid,
            Some(_) => Validity::Expired,
        }
    }

    /// Whether a refresh path exists: a refresh token to present, and a token
    /// endpoint to present it to.
    pub(crate) fn can_be_refreshed(&self, has_token_endpoint: bool) -> bool {
        self.refresh_token.is_some() && has_token_endpoint
    }
}
