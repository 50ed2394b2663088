//! Wallet server operations: payment-method lookup.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domains::operations::{
    HandlerError, HandlerResult, Operation, OperationHandler, Parameters, parse_params,
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPaymentMethodsParams {
    /// User ID for authentication
    pub user_id: String,
}

#[derive(Debug, Serialize)]
struct Card {
    card_id: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    last_four_digits: &'static str,
    expiry_month: u8,
    expiry_year: u16,
    cardholder_name: &'static str,
    is_default: bool,
}

/// List the cards stored in a user's wallet.
pub struct GetPaymentMethodsTool;

impl GetPaymentMethodsTool {
    pub const NAME: &'static str = "get_payment_methods";

    pub const DESCRIPTION: &'static str = "Get all payment methods associated with a user";

    pub fn operation() -> Operation {
        Operation::new::<GetPaymentMethodsParams>(Self::NAME, Self)
            .with_description(Self::DESCRIPTION)
            .idempotent()
    }

    pub fn execute(params: &GetPaymentMethodsParams) -> HandlerResult {
        if params.user_id.trim().is_empty() {
            return Err(HandlerError::invalid("User ID is required"));
        }

        let cards = vec![
            Card {
                card_id: "card_123",
                kind: "CREDIT",
                last_four_digits: "1234",
                expiry_month: 12,
                expiry_year: 2025,
                cardholder_name: "John Doe",
                is_default: true,
            },
            Card {
                card_id: "card_456",
                kind: "DEBIT",
                last_four_digits: "5678",
                expiry_month: 6,
                expiry_year: 2026,
                cardholder_name: "John Doe",
                is_default: false,
            },
        ];
        info!(user_id = %params.user_id, "Returning {} payment methods", cards.len());

        Ok(serde_json::json!({
            "total_count": cards.len(),
            "cards": serde_json::to_value(cards)?,
        }))
    }
}

#[async_trait::async_trait]
impl OperationHandler for GetPaymentMethodsTool {
    async fn call(&self, params: &Parameters) -> HandlerResult {
        Self::execute(&parse_params(params)?)
    }
}

/// All operations served by the wallet server.
pub fn operations() -> Vec<Operation> {
    vec![GetPaymentMethodsTool::operation()]
}
