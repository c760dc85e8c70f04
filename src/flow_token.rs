/// Cryptographically secure random token bound to a single flow.
///
/// Used for both the `state` parameter (CSRF defense) and the `nonce`
/// parameter (ID-token replay defense); each flow draws the two
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FlowToken {
    value: String,
}

impl FlowToken {
    /// Generate a new token from 21 bytes of cryptographically secure random
    /// data, base64 url encoded as a 28 character string (168 bits of
    /// entropy).
    pub(crate) fn generate() -> Self {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use rand::Rng;

        let mut rng = rand::rng();
        let bytes: [u8; 21] = rng.random();
        let value = URL_SAFE_NO_PAD.encode(bytes);

        Self { value }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.value
    }
}
