use std::cell::RefCell;
use std::collections::HashMap;

use snafu::Snafu;

/// Failure reported by a credential storage backend. Never fatal to the
/// flow; the client logs it and carries on.
#[derive(Debug, Snafu)]
#[snafu(display("StorageError: {message}"))]
pub struct StorageError {
    pub message: String,
}

/// Keyed blob storage for serialized credentials.
///
/// Keys are client identifiers, values are opaque bytes. A backend may be
/// shared with other processes (an OS keychain, a browser's local storage);
/// the client makes no atomicity assumption across calls and treats an
/// undecodable blob as absent.
pub trait CredentialStorage {
    fn get(&self, client_id: &str) -> Option<Vec<u8>>;

    fn put(&self, client_id: &str, blob: &[u8]) -> Result<(), StorageError>;

    fn delete(&self, client_id: &str) -> Result<(), StorageError>;
}

/// In-process storage. Useful for tests and for short-lived tools that do
/// not want credentials to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStorage for MemoryStorage {
    fn get(&self, client_id: &str) -> Option<Vec<u8>> {
        self.entries.borrow().get(client_id).cloned()
    }

    fn put(&self, client_id: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(client_id.to_owned(), blob.to_vec());
        Ok(())
    }

    fn delete(&self, client_id: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(client_id);
        Ok(())
    }
}
