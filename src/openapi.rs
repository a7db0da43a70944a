use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Checkout API",
        version = "1.0.0",
        description = "Multi-tenant checkout core: cart snapshots, checkout \
            session state machine, payment webhook reconciliation, and \
            exactly-once order materialization."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Carts", description = "Cart endpoints"),
        (name = "Checkout", description = "Checkout session endpoints"),
        (name = "Orders", description = "Order read endpoints"),
        (name = "Payments", description = "Payment provider webhooks")
    ),
    paths(
        crate::handlers::carts::get_current_cart,
        crate::handlers::carts::add_cart_item,
        crate::handlers::checkout::start_checkout,
        crate::handlers::checkout::get_checkout_session,
        crate::handlers::checkout::select_shipping,
        crate::handlers::checkout::select_payment,
        crate::handlers::checkout::complete_checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_items,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::carts::AddCartItemRequest,
        crate::handlers::carts::CartItemResponse,
        crate::handlers::carts::CartResponse,
        crate::handlers::checkout::AddressRequest,
        crate::handlers::checkout::StartCheckoutRequest,
        crate::handlers::checkout::SelectShippingRequest,
        crate::handlers::checkout::SelectPaymentRequest,
        crate::handlers::checkout::CheckoutSessionResponse,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::OrderItemResponse,
        crate::handlers::payment_webhooks::WebhookAck,
    ))
)]
pub struct ApiDoc;

/// Serialized OpenAPI document, served at `/openapi.json`.
pub fn openapi_json() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}
