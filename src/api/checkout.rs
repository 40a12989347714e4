// src/api/checkout.rs
//
// Transaction orchestrator: turns a cart snapshot plus method-specific input
// into an order, a payment attempt, and a gateway transaction, then maps the
// immediate response onto local state. Gateway errors never escape these
// handlers; they become terminal payment/order states and a JSON outcome.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::wompi_client::{
    CreateTransactionRequest, CustomerData, PaymentMethodPayload, WompiError,
};
use crate::db::{self, NewOrder, NewOrderItem, NewPayment};
use crate::models::{
    generate_order_number, payment_reference, Order, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::notify::NotificationKind;
use crate::reconcile;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartItemInput {
    pub name: String,
    #[serde(default)]
    pub sku: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub product_id: Option<Uuid>,
}

/// Snapshot of the (external) cart at checkout time. Amounts are
/// zero-decimal COP; the gateway conversion to cents happens here, never in
/// the caller.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CartSnapshot {
    pub customer: CustomerInput,
    pub items: Vec<CartItemInput>,
    pub subtotal: i64,
    #[serde(default)]
    pub tax: i64,
    #[serde(default)]
    pub shipping: i64,
    pub total: i64,
    pub shipping_address: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "method")]
pub enum PaymentInput {
    #[serde(rename = "CARD")]
    Card {
        card_token: String,
        #[serde(default = "default_installments")]
        installments: u32,
    },
    #[serde(rename = "PSE")]
    Pse {
        financial_institution_code: String,
        #[serde(default)]
        user_type: u8,
        #[serde(default = "default_legal_id_type")]
        user_legal_id_type: String,
        user_legal_id: String,
    },
    #[serde(rename = "NEQUI")]
    Nequi { phone_number: String },
    #[serde(rename = "BANCOLOMBIA_TRANSFER")]
    BancolombiaTransfer {},
}

fn default_installments() -> u32 {
    1
}

fn default_legal_id_type() -> String {
    "CC".to_string()
}

impl PaymentInput {
    fn method(&self) -> PaymentMethod {
        match self {
            PaymentInput::Card { .. } => PaymentMethod::Card,
            PaymentInput::Pse { .. } => PaymentMethod::Pse,
            PaymentInput::Nequi { .. } => PaymentMethod::Nequi,
            PaymentInput::BancolombiaTransfer {} => PaymentMethod::BancolombiaTransfer,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub cart: CartSnapshot,
    pub payment: PaymentInput,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_id: Uuid,
    pub reference: String,
    pub transaction_id: Option<String>,
    pub payment_status: String,
    pub order_status: String,
    /// success | pending | failed
    pub outcome: String,
    /// Where the browser should go next (bank redirect for async methods).
    pub redirect_url: Option<String>,
    /// The caller owns the cart; it must only be cleared on confirmed
    /// success or confirmed async submission.
    pub clear_cart: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub gateway_blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn bad_request(msg: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({"error": msg}))
}

/// Creates the order and first payment attempt from a cart snapshot.
#[utoipa::path(
    post,
    path = "/api/checkout",
    tag = "checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment attempt resolved", body = CheckoutResponse),
        (status = 400, description = "Invalid cart or payment input"),
        (status = 500, description = "Server error")
    )
)]
#[post("/checkout")]
pub async fn checkout(
    state: web::Data<AppState>,
    payload: web::Json<CheckoutRequest>,
) -> impl Responder {
    let payload = payload.into_inner();
    let cart = &payload.cart;

    if cart.items.is_empty() {
        return bad_request("cart is empty");
    }
    if cart.items.iter().any(|i| i.quantity < 1 || i.unit_price < 0) {
        return bad_request("invalid cart item");
    }
    if cart.subtotal < 0 || cart.tax < 0 || cart.shipping < 0 {
        return bad_request("negative amount");
    }
    if cart.total != cart.subtotal + cart.tax + cart.shipping {
        return bad_request("total does not equal subtotal + tax + shipping");
    }
    if !cart.customer.email.contains('@') {
        return bad_request("invalid customer email");
    }

    let items: Vec<NewOrderItem> = cart
        .items
        .iter()
        .map(|i| NewOrderItem {
            product_id: i.product_id,
            product_name: i.name.clone(),
            product_sku: i.sku.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
        })
        .collect();

    let order = match db::create_order(
        &state.pool,
        NewOrder {
            order_number: generate_order_number(),
            user_id: payload.user_id,
            customer_name: cart.customer.name.clone(),
            customer_email: cart.customer.email.clone(),
            customer_phone: cart.customer.phone.clone(),
            subtotal: cart.subtotal,
            tax: cart.tax,
            shipping: cart.shipping,
            total: cart.total,
            shipping_address: cart.shipping_address.clone(),
        },
        &items,
    )
    .await
    {
        Ok(o) => o,
        Err(e) => {
            log::error!("create_order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    submit_payment(&state, order, payload.payment).await
}

/// Retries payment for an existing order with a fresh, suffixed reference.
#[post("/orders/{order_id}/pay")]
pub async fn retry_payment(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<PaymentInput>,
) -> impl Responder {
    let order_id = path.into_inner();
    let order = match db::get_order(&state.pool, order_id).await {
        Ok(Some(o)) => o,
        Ok(None) => return HttpResponse::NotFound().json(json!({"error": "order not found"})),
        Err(e) => {
            log::error!("get_order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match OrderStatus::parse(&order.status) {
        Some(OrderStatus::Pending) | Some(OrderStatus::Processing) | Some(OrderStatus::Failed) => {}
        _ => {
            return bad_request("order is not payable");
        }
    }

    submit_payment(&state, order, payload.into_inner()).await
}

/// The shared submission routine. The payment row is inserted (PENDING,
/// unique reference) before the gateway is touched, so a timeout still
/// leaves a resolvable record behind.
async fn submit_payment(
    state: &web::Data<AppState>,
    order: Order,
    input: PaymentInput,
) -> HttpResponse {
    let method = input.method();

    let attempt = match db::count_payments_for_order(&state.pool, order.id).await {
        Ok(n) => n + 1,
        Err(e) => {
            log::error!("count_payments_for_order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    let reference = payment_reference(&order.order_number, attempt);

    let (payment_payload, customer_data) = match build_method_payload(&order, &input) {
        Ok(pair) => pair,
        Err(msg) => return bad_request(&msg),
    };

    let method_data = match serde_json::to_value(&payment_payload) {
        Ok(v) => v,
        Err(e) => {
            log::error!("method payload serialization error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let payment = match db::insert_payment(
        &state.pool,
        NewPayment {
            order_id: order.id,
            reference: reference.clone(),
            method: method.as_str().to_string(),
            amount: order.total,
            currency: "COP".to_string(),
            method_data,
        },
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            log::error!("insert_payment error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    log::info!(
        "submitting payment method={} order={} reference={reference}",
        method.as_str(),
        order.order_number
    );

    let acceptance = match state.wompi.get_acceptance_token().await {
        Ok(a) => a,
        Err(e) => return gateway_failure(state, &order, payment.id, &reference, e).await,
    };

    let redirect_url = format!("{}/payments/callback", state.callback_base_url);
    let created = match state
        .wompi
        .create_transaction(CreateTransactionRequest {
            amount_in_cents: order.total * 100,
            currency: "COP".to_string(),
            customer_email: order.customer_email.clone(),
            payment_method: payment_payload,
            reference: reference.clone(),
            acceptance_token: acceptance.acceptance_token,
            signature: None,
            redirect_url: Some(redirect_url),
            customer_data,
            shipping_address: order.shipping_address.clone(),
        })
        .await
    {
        Ok(t) => t,
        Err(e) => return gateway_failure(state, &order, payment.id, &reference, e).await,
    };

    let gateway_status = PaymentStatus::parse(&created.status).unwrap_or(PaymentStatus::Pending);
    // The gateway's PENDING means "submitted, awaiting confirmation"; locally
    // that is PROCESSING. It also keeps the guarded transition meaningful
    // when the creation response and the first webhook race each other.
    let incoming = if gateway_status == PaymentStatus::Pending {
        PaymentStatus::Processing
    } else {
        gateway_status
    };

    if let Err(e) =
        db::record_gateway_response(&state.pool, payment.id, Some(&created.id), &created.raw).await
    {
        log::error!("record_gateway_response error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    // Same guarded routine the webhook uses: a webhook that resolved this
    // payment before the creation response landed is never regressed.
    let update = match reconcile::apply_transaction_update(
        &state.pool,
        &state.notifier,
        payment.id,
        incoming,
        &created.raw,
        None,
    )
    .await
    {
        Ok(u) => u,
        Err(e) => {
            log::error!("creation write-back error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let (outcome, clear_cart) = match update.payment_status {
        PaymentStatus::Approved => ("success", true),
        PaymentStatus::Pending | PaymentStatus::Processing => ("pending", true),
        _ => ("failed", false),
    };

    if clear_cart {
        state.notifier.notify(&order, NotificationKind::AdminNewOrder);
    }

    HttpResponse::Ok().json(CheckoutResponse {
        order_id: order.id,
        order_number: order.order_number.clone(),
        payment_id: payment.id,
        reference,
        transaction_id: Some(created.id),
        payment_status: update.payment_status.as_str().to_string(),
        order_status: update.order_status.as_str().to_string(),
        outcome: outcome.to_string(),
        redirect_url: created.async_payment_url,
        clear_cart,
        gateway_blocked: false,
        message: None,
    })
}

fn build_method_payload(
    order: &Order,
    input: &PaymentInput,
) -> Result<(PaymentMethodPayload, Option<CustomerData>), String> {
    match input {
        PaymentInput::Card {
            card_token,
            installments,
        } => {
            if card_token.is_empty() {
                return Err("card_token is required".to_string());
            }
            if !(1..=36).contains(installments) {
                return Err("installments must be between 1 and 36".to_string());
            }
            Ok((
                PaymentMethodPayload::card(card_token.clone(), *installments),
                None,
            ))
        }
        PaymentInput::Pse {
            financial_institution_code,
            user_type,
            user_legal_id_type,
            user_legal_id,
        } => {
            if financial_institution_code.is_empty() || user_legal_id.is_empty() {
                return Err("missing PSE fields".to_string());
            }
            let description = format!("Pago Orden {}", order.order_number);
            let phone = if order.customer_phone.is_empty() {
                "573001234567".to_string()
            } else if order.customer_phone.starts_with("57") {
                order.customer_phone.clone()
            } else {
                format!("57{}", order.customer_phone)
            };
            Ok((
                PaymentMethodPayload::pse(
                    *user_type,
                    user_legal_id_type.clone(),
                    user_legal_id.clone(),
                    financial_institution_code.clone(),
                    &description,
                ),
                Some(CustomerData {
                    phone_number: phone,
                    full_name: order.customer_name.clone(),
                }),
            ))
        }
        PaymentInput::Nequi { phone_number } => {
            if phone_number.len() != 10 || !phone_number.chars().all(|c| c.is_ascii_digit()) {
                return Err("nequi phone_number must be 10 digits".to_string());
            }
            Ok((PaymentMethodPayload::nequi(phone_number.clone()), None))
        }
        PaymentInput::BancolombiaTransfer {} => {
            let description = format!("Pago Orden {}", order.order_number);
            Ok((
                PaymentMethodPayload::bancolombia_transfer(&description),
                None,
            ))
        }
    }
}

/// Maps a gateway-client error onto local state. Timeouts leave the payment
/// PENDING so a webhook or reprocess can still resolve it; everything else
/// is terminal for this attempt. The cart is never cleared on failure.
async fn gateway_failure(
    state: &web::Data<AppState>,
    order: &Order,
    payment_id: Uuid,
    reference: &str,
    err: WompiError,
) -> HttpResponse {
    log::error!("gateway error for reference {reference}: {err}");

    let (payment_status, mut order_status, outcome, blocked, message) = match &err {
        WompiError::Unavailable(_) => (
            PaymentStatus::Pending,
            None,
            "pending",
            false,
            "El pago está en proceso de confirmación. Te notificaremos el resultado.",
        ),
        WompiError::Blocked { .. } => (
            PaymentStatus::Error,
            Some(OrderStatus::Failed),
            "failed",
            true,
            "No pudimos contactar la pasarela de pagos. Intenta de nuevo más tarde.",
        ),
        WompiError::Rejected { .. } | WompiError::InvalidResponse(_) => (
            PaymentStatus::Error,
            Some(OrderStatus::Failed),
            "failed",
            false,
            "El pago no pudo ser procesado. Intenta nuevamente.",
        ),
    };

    if payment_status == PaymentStatus::Error {
        match db::mark_payment_error(&state.pool, payment_id).await {
            Ok(true) => {}
            Ok(false) => {
                // A webhook resolved the payment while this call was failing;
                // leave the order to the reconciled result.
                order_status = None;
            }
            Err(e) => log::error!("mark_payment_error error: {e}"),
        }
    }
    if let Some(order_status) = order_status {
        if let Err(e) =
            db::update_order_status(&state.pool, order.id, order_status.as_str(), false).await
        {
            log::error!("update_order_status error: {e}");
        }
    }

    HttpResponse::Ok().json(CheckoutResponse {
        order_id: order.id,
        order_number: order.order_number.clone(),
        payment_id,
        reference: reference.to_string(),
        transaction_id: None,
        payment_status: payment_status.as_str().to_string(),
        order_status: order_status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| order.status.clone()),
        outcome: outcome.to_string(),
        redirect_url: None,
        clear_cart: false,
        gateway_blocked: blocked,
        message: Some(message.to_string()),
    })
}

/// Order status for the pending/success pages; includes the latest attempt.
#[get("/orders/{order_id}")]
pub async fn order_view(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let order_id = path.into_inner();
    let order = match db::get_order(&state.pool, order_id).await {
        Ok(Some(o)) => o,
        Ok(None) => return HttpResponse::NotFound().json(json!({"error": "order not found"})),
        Err(e) => {
            log::error!("get_order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    let items = match db::list_order_items(&state.pool, order_id).await {
        Ok(i) => i,
        Err(e) => {
            log::error!("list_order_items error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    let payment = match db::latest_payment_for_order(&state.pool, order_id).await {
        Ok(p) => p,
        Err(e) => {
            log::error!("latest_payment_for_order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(json!({
        "order": order,
        "items": items,
        "payment": payment,
    }))
}

/// Explicit cancellation; the only path into CANCELLED and only from
/// PENDING/PROCESSING.
#[post("/orders/{order_id}/cancel")]
pub async fn cancel_order(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let order_id = path.into_inner();
    match db::get_order(&state.pool, order_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return HttpResponse::NotFound().json(json!({"error": "order not found"})),
        Err(e) => {
            log::error!("get_order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    }

    // Conditional update: a payment confirmation racing this request must
    // win, so the guard lives in the statement, not in a prior read.
    match db::cancel_order_if_open(&state.pool, order_id).await {
        Ok(true) => HttpResponse::Ok().json(json!({"ok": true, "status": "CANCELLED"})),
        Ok(false) => bad_request("order can no longer be cancelled"),
        Err(e) => {
            log::error!("cancel update error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenizeCardRequest {
    pub number: String,
    pub cvc: String,
    pub exp_month: String,
    pub exp_year: String,
    pub card_holder: String,
}

/// Proxies card tokenization. Raw card fields transit this handler only; the
/// response carries the opaque token plus display metadata and nothing is
/// persisted.
#[utoipa::path(
    post,
    path = "/api/tokenize-card",
    tag = "checkout",
    request_body = TokenizeCardRequest,
    responses(
        (status = 200, description = "Card tokenized"),
        (status = 400, description = "Gateway rejected the card"),
        (status = 500, description = "Server error")
    )
)]
#[post("/tokenize-card")]
pub async fn tokenize_card(
    state: web::Data<AppState>,
    payload: web::Json<TokenizeCardRequest>,
) -> impl Responder {
    let p = payload.into_inner();
    if p.number.is_empty() || p.cvc.is_empty() || p.card_holder.is_empty() {
        return bad_request("missing card fields");
    }

    match state
        .wompi
        .tokenize_card(&p.number, &p.cvc, &p.exp_month, &p.exp_year, &p.card_holder)
        .await
    {
        Ok(token) => HttpResponse::Ok().json(json!({
            "token": token.token,
            "brand": token.brand,
            "last_four": token.last_four,
        })),
        Err(e @ WompiError::Rejected { .. }) => {
            log::warn!("card tokenization rejected: {e}");
            bad_request("card was rejected")
        }
        Err(e) => {
            log::error!("card tokenization error: {e}");
            HttpResponse::ServiceUnavailable().json(json!({"error": "gateway unavailable"}))
        }
    }
}

/// Fresh PSE bank list; never cached because availability changes.
#[get("/pse-banks")]
pub async fn pse_banks(state: web::Data<AppState>) -> impl Responder {
    match state.wompi.list_pse_institutions().await {
        Ok(banks) => HttpResponse::Ok().json(json!({"banks": banks})),
        Err(e) => {
            log::error!("list_pse_institutions error: {e}");
            HttpResponse::ServiceUnavailable().json(json!({"error": "gateway unavailable"}))
        }
    }
}
