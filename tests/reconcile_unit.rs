use serde_json::json;

use wompi_checkout::api::wompi_client::{
    PaymentMethodPayload, SANDBOX_CARD_APPROVED, SANDBOX_CARD_DECLINED, SANDBOX_NEQUI_APPROVED,
    SANDBOX_NEQUI_DECLINED, SANDBOX_PSE_BANK_APPROVED, SANDBOX_PSE_BANK_DECLINED,
};
use wompi_checkout::models::{
    generate_order_number, payment_reference, OrderStatus, PaymentMethod, PaymentStatus,
};
use wompi_checkout::reconcile::{order_status_for, should_apply};

use PaymentStatus::*;

#[test]
fn non_terminal_accepts_any_change() {
    for current in [Pending, Processing] {
        for incoming in [Approved, Declined, Error, Voided] {
            assert!(should_apply(current, incoming), "{current:?} -> {incoming:?}");
        }
    }
    assert!(should_apply(Pending, Processing));
    assert!(should_apply(Processing, Pending));
}

#[test]
fn identical_status_is_a_noop() {
    for s in [Pending, Processing, Approved, Declined, Error, Voided] {
        assert!(!should_apply(s, s));
    }
}

#[test]
fn approved_only_yields_to_voided() {
    assert!(should_apply(Approved, Voided));
    for incoming in [Pending, Processing, Declined, Error] {
        assert!(!should_apply(Approved, incoming), "APPROVED -> {incoming:?}");
    }
}

#[test]
fn other_terminal_states_are_frozen() {
    for current in [Declined, Error, Voided] {
        for incoming in [Pending, Processing, Approved, Declined, Error, Voided] {
            if current != incoming {
                assert!(!should_apply(current, incoming), "{current:?} -> {incoming:?}");
            }
        }
    }
}

#[test]
fn gateway_status_maps_to_order_status() {
    assert_eq!(order_status_for(Approved), Some(OrderStatus::Paid));
    assert_eq!(order_status_for(Pending), Some(OrderStatus::Processing));
    assert_eq!(order_status_for(Declined), Some(OrderStatus::Failed));
    assert_eq!(order_status_for(Error), Some(OrderStatus::Failed));
    assert_eq!(order_status_for(Voided), Some(OrderStatus::Refunded));
}

#[test]
fn first_attempt_reference_is_the_order_number() {
    assert_eq!(payment_reference("GW-1-ABCDEF", 1), "GW-1-ABCDEF");
}

#[test]
fn retry_references_never_collide() {
    let refs: Vec<String> = (1..=5)
        .map(|n| payment_reference("GW-1-ABCDEF", n))
        .collect();
    assert_eq!(refs[1], "GW-1-ABCDEF-R2");
    for (i, a) in refs.iter().enumerate() {
        for b in &refs[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn order_number_has_expected_shape() {
    let n = generate_order_number();
    let parts: Vec<&str> = n.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "GW");
    assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
    assert_eq!(parts[2].len(), 6);
    assert_ne!(n, generate_order_number());
}

#[test]
fn card_is_the_only_synchronous_method() {
    assert!(!PaymentMethod::Card.is_async());
    assert!(PaymentMethod::Pse.is_async());
    assert!(PaymentMethod::Nequi.is_async());
    assert!(PaymentMethod::BancolombiaTransfer.is_async());
}

#[test]
fn status_round_trips_through_text() {
    for s in [Pending, Processing, Approved, Declined, Error, Voided] {
        assert_eq!(PaymentStatus::parse(s.as_str()), Some(s));
    }
    assert_eq!(PaymentStatus::parse("NOPE"), None);
}

#[test]
fn method_round_trips_through_text() {
    for m in [
        PaymentMethod::Card,
        PaymentMethod::Pse,
        PaymentMethod::Nequi,
        PaymentMethod::BancolombiaTransfer,
    ] {
        assert_eq!(PaymentMethod::parse(m.as_str()), Some(m));
    }
    assert_eq!(PaymentMethod::parse("CASH"), None);
}

#[test]
fn sandbox_fixtures_are_well_formed() {
    for card in [SANDBOX_CARD_APPROVED, SANDBOX_CARD_DECLINED] {
        assert_eq!(card.len(), 16);
        assert!(card.chars().all(|c| c.is_ascii_digit()));
    }
    for phone in [SANDBOX_NEQUI_APPROVED, SANDBOX_NEQUI_DECLINED] {
        assert_eq!(phone.len(), 10);
        assert!(phone.chars().all(|c| c.is_ascii_digit()));
    }
    assert_ne!(SANDBOX_PSE_BANK_APPROVED, SANDBOX_PSE_BANK_DECLINED);
}

#[test]
fn card_payload_serializes_with_type_tag() {
    let payload = PaymentMethodPayload::card("tok_test_123".to_string(), 3);
    let v = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        v,
        json!({"type": "CARD", "token": "tok_test_123", "installments": 3})
    );
}

#[test]
fn pse_payload_truncates_description_to_30_chars() {
    let long = "x".repeat(50);
    let payload = PaymentMethodPayload::pse(
        0,
        "CC".to_string(),
        "123456789".to_string(),
        "1051".to_string(),
        &long,
    );
    let v = serde_json::to_value(&payload).unwrap();
    assert_eq!(v["type"], "PSE");
    assert_eq!(v["payment_description"].as_str().unwrap().len(), 30);
    assert_eq!(v["financial_institution_code"], "1051");
}

#[test]
fn bancolombia_payload_truncates_description_to_64_chars() {
    let long = "y".repeat(100);
    let payload = PaymentMethodPayload::bancolombia_transfer(&long);
    let v = serde_json::to_value(&payload).unwrap();
    assert_eq!(v["type"], "BANCOLOMBIA_TRANSFER");
    assert_eq!(v["payment_description"].as_str().unwrap().len(), 64);
}

#[test]
fn nequi_payload_shape() {
    let payload = PaymentMethodPayload::nequi(SANDBOX_NEQUI_APPROVED.to_string());
    let v = serde_json::to_value(&payload).unwrap();
    assert_eq!(v, json!({"type": "NEQUI", "phone_number": "3991111111"}));
}
