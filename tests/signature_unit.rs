use serde_json::json;

use wompi_checkout::api::signature::{
    integrity_signature, verify_webhook_checksum, ChecksumOutcome,
};

#[test]
fn outbound_signature_matches_known_vector() {
    // SHA256("GW-1700000000-AB12CD" + "5950000" + "COP" + "test_integrity_secret")
    let sig = integrity_signature("GW-1700000000-AB12CD", 5_950_000, "COP", "test_integrity_secret");
    assert_eq!(
        sig,
        "2626dae76b623a8a374381994f4a210cefa5079ff08b5554e6e4d0c4d1e0e07e"
    );
}

#[test]
fn outbound_signature_is_lowercase_hex_64_chars() {
    let sig = integrity_signature("order-1", 100, "COP", "s3cr3t");
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(
        sig,
        "68a2ad7f750c17ab40de93e343e2af8ea4f78b865352a0117b1909d2d2cd2154"
    );
}

fn signed_payload(checksum: &str) -> serde_json::Value {
    // concat: "1234-1610641025-49201" + "APPROVED" + "1610641025" + secret
    json!({
        "event": "transaction.updated",
        "timestamp": 1610641025,
        "data": {
            "transaction": {
                "id": "1234-1610641025-49201",
                "status": "APPROVED"
            }
        },
        "signature": {
            "checksum": checksum,
            "properties": ["transaction.id", "transaction.status"]
        }
    })
}

const VALID_CHECKSUM: &str = "3ca51dd9a2303bf37ff43788fe85dc025cf46b71af27c127750879931f0030ef";

#[test]
fn webhook_checksum_accepts_correct_value() {
    let payload = signed_payload(VALID_CHECKSUM);
    assert_eq!(
        verify_webhook_checksum(&payload, Some("test_events_secret")),
        ChecksumOutcome::Valid
    );
}

#[test]
fn webhook_checksum_accepts_uppercase_hex() {
    let payload = signed_payload(&VALID_CHECKSUM.to_uppercase());
    assert_eq!(
        verify_webhook_checksum(&payload, Some("test_events_secret")),
        ChecksumOutcome::Valid
    );
}

#[test]
fn webhook_checksum_rejects_flipped_bit() {
    // first hex digit 3 -> 2
    let forged = format!("2{}", &VALID_CHECKSUM[1..]);
    let payload = signed_payload(&forged);
    assert!(matches!(
        verify_webhook_checksum(&payload, Some("test_events_secret")),
        ChecksumOutcome::Invalid { .. }
    ));
}

#[test]
fn webhook_checksum_rejects_mutated_property() {
    let mut payload = signed_payload(VALID_CHECKSUM);
    payload["data"]["transaction"]["status"] = json!("DECLINED");
    assert!(matches!(
        verify_webhook_checksum(&payload, Some("test_events_secret")),
        ChecksumOutcome::Invalid { .. }
    ));
}

#[test]
fn webhook_checksum_rejects_missing_signature_block() {
    let payload = json!({
        "event": "transaction.updated",
        "timestamp": 1610641025,
        "data": {"transaction": {"id": "x", "status": "APPROVED"}}
    });
    assert!(matches!(
        verify_webhook_checksum(&payload, Some("test_events_secret")),
        ChecksumOutcome::Invalid { .. }
    ));
}

#[test]
fn webhook_checksum_skipped_without_secret() {
    let payload = signed_payload("does-not-matter");
    assert_eq!(
        verify_webhook_checksum(&payload, None),
        ChecksumOutcome::NotConfigured
    );
}

#[test]
fn webhook_checksum_handles_numeric_properties() {
    // concat: "tx-1" + "APPROVED" + "5950000" + "1700000000" + "evsecret"
    let payload = json!({
        "event": "transaction.updated",
        "timestamp": 1700000000,
        "data": {
            "transaction": {
                "id": "tx-1",
                "status": "APPROVED",
                "amount_in_cents": 5950000
            }
        },
        "signature": {
            "checksum": "a3733dcb32131f660df555f269ef01b598e5985b413483496102609ee59df386",
            "properties": [
                "transaction.id",
                "transaction.status",
                "transaction.amount_in_cents"
            ]
        }
    });
    assert_eq!(
        verify_webhook_checksum(&payload, Some("evsecret")),
        ChecksumOutcome::Valid
    );
}
