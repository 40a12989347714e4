// src/api/signature.rs
//
// Integrity checksums for the Wompi gateway. Both directions are plain
// SHA-256 over a concatenation, hex-encoded lowercase:
//   outbound:  reference + amount_in_cents + currency + integrity_secret
//   inbound:   signature.properties values (declared order) + timestamp + events_secret

use sha2::{Digest, Sha256};

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outbound transaction-creation signature. 64 lowercase hex chars.
pub fn integrity_signature(
    reference: &str,
    amount_in_cents: i64,
    currency: &str,
    integrity_secret: &str,
) -> String {
    sha256_hex(&format!("{reference}{amount_in_cents}{currency}{integrity_secret}"))
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChecksumOutcome {
    Valid,
    Invalid { reason: String },
    /// No events secret configured; the check is skipped. Only acceptable in
    /// sandbox/test setups and always warn-logged by the caller.
    NotConfigured,
}

/// Resolves a declared property path like "transaction.id" inside the
/// webhook's `data` object. Values are rendered the way Wompi concatenates
/// them: strings verbatim, numbers/bools via their JSON text.
fn resolve_property(data: &serde_json::Value, path: &str) -> Option<String> {
    let mut cursor = data;
    for part in path.split('.') {
        cursor = cursor.get(part)?;
    }
    match cursor {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Validates the `signature.checksum` of a full webhook payload.
///
/// The payload declares which properties were signed (`signature.properties`)
/// and the expected checksum is SHA-256 over their concatenated values, the
/// top-level `timestamp`, and the merchant's events secret.
pub fn verify_webhook_checksum(
    payload: &serde_json::Value,
    events_secret: Option<&str>,
) -> ChecksumOutcome {
    let Some(secret) = events_secret else {
        return ChecksumOutcome::NotConfigured;
    };

    let Some(signature) = payload.get("signature") else {
        return ChecksumOutcome::Invalid {
            reason: "missing signature block".to_string(),
        };
    };

    let received = signature
        .get("checksum")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if received.is_empty() {
        return ChecksumOutcome::Invalid {
            reason: "missing signature.checksum".to_string(),
        };
    }

    let properties: Vec<String> = signature
        .get("properties")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let data = payload.get("data").cloned().unwrap_or(serde_json::Value::Null);
    let mut concat = String::new();
    for prop in &properties {
        match resolve_property(&data, prop) {
            Some(value) => concat.push_str(&value),
            None => {
                return ChecksumOutcome::Invalid {
                    reason: format!("unresolvable signed property: {prop}"),
                }
            }
        }
    }

    // timestamp arrives as an integer in practice but a string is tolerated
    match payload.get("timestamp") {
        Some(serde_json::Value::Number(n)) => concat.push_str(&n.to_string()),
        Some(serde_json::Value::String(s)) => concat.push_str(s),
        _ => {}
    }
    concat.push_str(secret);

    let expected = sha256_hex(&concat);
    if expected.eq_ignore_ascii_case(received) {
        ChecksumOutcome::Valid
    } else {
        ChecksumOutcome::Invalid {
            reason: "checksum mismatch".to_string(),
        }
    }
}
