// src/notify.rs
//
// Outbound seam to the mailer/notification collaborator. The core decides
// when an order event happened; delivery itself lives outside this service.

use crate::models::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Order received, payment still resolving (fired once, on the first
    /// PENDING -> PROCESSING transition).
    Confirmation,
    /// Payment approved, order is paid.
    PaymentApproved,
    /// Heads-up to the shop operators about a new order.
    AdminNewOrder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Confirmation => "confirmation",
            NotificationKind::PaymentApproved => "payment_approved",
            NotificationKind::AdminNewOrder => "admin_new_order",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, order: &Order, kind: NotificationKind);
}

/// Default notifier: logs the event. The production mailer implements
/// `Notifier` in its own crate and is injected at startup.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, order: &Order, kind: NotificationKind) {
        log::info!(
            "order notification kind={} order={} email={}",
            kind.as_str(),
            order.order_number,
            order.customer_email
        );
    }
}
