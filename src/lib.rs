mod backoff;
mod client;
mod config;
mod credentials;
mod error;
mod flow_token;
mod id_token;
mod refresh;
mod response_type;
mod state;
mod storage;
mod subscription;
mod time_source;
mod timer;
mod token_response;
mod transport;
pub mod url_ext;

// Library exports (additional to pub modules).
pub use backoff::Backoff;
pub use client::{AuthorizationError, Client, ClientOptions};
pub use config::{Config, ConfigError, Display, Mode, Prompt};
pub use credentials::{Credentials, Validity};
pub use error::FlowError;
pub use id_token::{IdToken, IdTokenError};
pub use refresh::RefreshError;
pub use response_type::ResponseType;
pub use state::State;
pub use storage::{CredentialStorage, MemoryStorage, StorageError};
pub use subscription::Subscription;
pub use time_source::{SystemTimeSource, TimeSource};
pub use timer::{ScheduledTask, TimerScheduler};
pub use token_response::TokenExchangeError;
pub use transport::{TokenRequest, TokenTransport, TransportError, TransportResult};
pub use url::Url;

/// A JSON object, as decoded from a token-endpoint response body.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

type AccessToken = String;
type RefreshToken = String;
type AuthorizationCode = String;
