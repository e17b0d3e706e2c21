//! Key record envelope persisted by the file-backed store.

use serde::{Deserialize, Serialize};

use crate::error::{SealKitError, SealResult};

const RECORD_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct KeyRecordEnvelope {
    pub(crate) version: u32,
    pub(crate) tag: String,
    pub(crate) public_key: Vec<u8>,
    pub(crate) sealed_private_key: Vec<u8>,
    pub(crate) created_at: u64,
}

impl KeyRecordEnvelope {
    pub(crate) const fn new(
        tag: String,
        public_key: Vec<u8>,
        sealed_private_key: Vec<u8>,
        now: u64,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            tag,
            public_key,
            sealed_private_key,
            created_at: now,
        }
    }

    pub(crate) fn serialize(&self) -> SealResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| SealKitError::KeyGenerationFailed(err.to_string()))?;
        Ok(bytes)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> SealResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| SealKitError::KeyStore(format!("corrupted key record: {err}")))?;
        if envelope.version != RECORD_VERSION {
            return Err(SealKitError::KeyStore(format!(
                "unsupported key record version: {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}
