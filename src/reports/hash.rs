use sha2::{Digest, Sha256};

/// Content digest of a serialized payload: lowercase hex SHA-256 of the exact bytes.
pub fn payload_hash(payload_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_json.as_bytes());
    format!("{:x}", hasher.finalize())
}
