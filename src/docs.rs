use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::checkout::checkout,
        crate::api::checkout::tokenize_card,
        crate::api::webhooks::wompi_webhook
    ),
    components(
        schemas(
            crate::api::checkout::CheckoutRequest,
            crate::api::checkout::CheckoutResponse,
            crate::api::checkout::CartSnapshot,
            crate::api::checkout::CartItemInput,
            crate::api::checkout::CustomerInput,
            crate::api::checkout::PaymentInput,
            crate::api::checkout::TokenizeCardRequest,
            crate::api::webhooks::WompiEventBody
        )
    ),
    tags(
        (name = "checkout", description = "Checkout and payment submission"),
        (name = "webhooks", description = "Gateway event notifications")
    )
)]
pub struct ApiDoc;
