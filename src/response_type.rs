use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The OAuth 2.0 flow selector sent as `response_type`.
///
/// `Code` selects the authorization-code flow (the tokens arrive through a
/// back-channel token-endpoint exchange). `Token` and `IdToken` select the
/// implicit flows, where the credentials come back in the redirect fragment.
///
/// The variant order matches the sorted serialized names, so a
/// `BTreeSet<ResponseType>` iterates in the order the values are joined into
/// the `response_type` request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResponseType {
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "id_token")]
    IdToken,
    #[serde(rename = "token")]
    Token,
}

impl ResponseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::IdToken => "id_token",
            ResponseType::Token => "token",
        }
    }

    /// Space-joined sorted serialized names, e.g. `"code id_token"`.
    pub(crate) fn join(set: &BTreeSet<ResponseType>) -> String {
        set.iter()
            .map(|response_type| response_type.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
