pub mod admin;
pub mod callback;
pub mod checkout;
pub mod signature;
pub mod webhooks;
pub mod wompi_client;
