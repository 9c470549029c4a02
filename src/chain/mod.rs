//! Boundary to an external settlement network.
//!
//! The ledger never talks to a chain. Callers that want to mirror ledger
//! activity on one prepare and sign a payload themselves and hand it to a
//! [`ChainClient`]. Signing, keys, and fees all live on the caller's side of
//! this trait.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Transaction receipt identifier returned by the network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub String);

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prepared transaction body and the signature over it, both opaque here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedPayload {
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("network error: {0}")]
    Network(String),
    #[error("payload rejected: {0}")]
    Validation(String),
}

pub trait ChainClient {
    fn submit(&self, destination: &str, payload: &SignedPayload) -> Result<ReceiptId, ChainError>;
}

/// In-process client that accepts well-formed payloads and remembers them.
#[derive(Debug, Default)]
pub struct RecordingChainClient {
    submitted: Mutex<Vec<(String, SignedPayload)>>,
    offline: bool,
}

impl RecordingChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every submission fails with [`ChainError::Network`].
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<(String, SignedPayload)> {
        self.submitted.lock().clone()
    }
}

impl ChainClient for RecordingChainClient {
    fn submit(&self, destination: &str, payload: &SignedPayload) -> Result<ReceiptId, ChainError> {
        if self.offline {
            return Err(ChainError::Network("client is offline".into()));
        }
        if destination.trim().is_empty() {
            return Err(ChainError::Validation("missing destination".into()));
        }
        if payload.body.is_empty() {
            return Err(ChainError::Validation("empty payload body".into()));
        }
        if payload.signature.is_empty() {
            return Err(ChainError::Validation("unsigned payload".into()));
        }

        let mut hasher = Sha256::new();
        hasher.update(destination.as_bytes());
        hasher.update((payload.body.len() as u64).to_le_bytes());
        hasher.update(&payload.body);
        hasher.update(&payload.signature);
        let receipt = ReceiptId(hex::encode(hasher.finalize()));

        let mut submitted = self.submitted.lock();
        submitted.push((destination.to_string(), payload.clone()));
        debug!(count = submitted.len(), "payload recorded");
        info!(%destination, %receipt, "payload submitted");
        Ok(receipt)
    }
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
