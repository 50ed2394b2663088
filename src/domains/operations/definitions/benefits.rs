//! Benefits server operations: card benefits and reward calculation.
//!
//! Backed by fixed mock data until a card-network integration exists.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domains::operations::{
    HandlerError, HandlerResult, Operation, OperationHandler, Parameters, parse_params,
};

/// Purchase categories with distinct reward multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Travel,
    Dining,
    General,
}

impl Category {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Travel => 3.0,
            Self::Dining => 2.0,
            Self::General => 1.0,
        }
    }
}

// ============================================================================
// get_card_benefits
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCardBenefitsParams {
    /// Card identifier
    pub card_id: String,
}

#[derive(Debug, Serialize)]
struct Multiplier {
    category: Category,
    multiplier: f64,
    description: &'static str,
}

#[derive(Debug, Serialize)]
struct CardBenefit {
    benefit_id: &'static str,
    name: &'static str,
    description: &'static str,
    is_active: bool,
}

#[derive(Debug, Serialize)]
struct BenefitsResponse {
    card_id: String,
    card_name: &'static str,
    multipliers: Vec<Multiplier>,
    benefits: Vec<CardBenefit>,
    annual_fee: f64,
    currency: &'static str,
}

/// Look up the benefits and multipliers attached to a card.
pub struct GetCardBenefitsTool;

impl GetCardBenefitsTool {
    pub const NAME: &'static str = "get_card_benefits";

    pub const DESCRIPTION: &'static str = "Get benefits and multipliers for a specific card";

    pub fn operation() -> Operation {
        Operation::new::<GetCardBenefitsParams>(Self::NAME, Self)
            .with_description(Self::DESCRIPTION)
            .idempotent()
    }

    #[instrument(skip_all, fields(card_id = %params.card_id))]
    pub fn execute(params: &GetCardBenefitsParams) -> HandlerResult {
        if params.card_id.trim().is_empty() {
            return Err(HandlerError::invalid("Card ID is required"));
        }
        info!("Looking up card benefits");

        let response = BenefitsResponse {
            card_id: params.card_id.clone(),
            card_name: "Chase Sapphire Reserve",
            multipliers: vec![
                Multiplier {
                    category: Category::Travel,
                    multiplier: Category::Travel.multiplier(),
                    description: "3x points on all travel purchases",
                },
                Multiplier {
                    category: Category::Dining,
                    multiplier: Category::Dining.multiplier(),
                    description: "2x points on dining purchases",
                },
                Multiplier {
                    category: Category::General,
                    multiplier: Category::General.multiplier(),
                    description: "1x points on all other purchases",
                },
            ],
            benefits: vec![
                CardBenefit {
                    benefit_id: "benefit_1",
                    name: "Travel Insurance",
                    description: "Comprehensive travel insurance coverage",
                    is_active: true,
                },
                CardBenefit {
                    benefit_id: "benefit_2",
                    name: "Airport Lounge Access",
                    description: "Access to Priority Pass lounges worldwide",
                    is_active: true,
                },
            ],
            annual_fee: 550.0,
            currency: "USD",
        };

        Ok(serde_json::to_value(response)?)
    }
}

#[async_trait::async_trait]
impl OperationHandler for GetCardBenefitsTool {
    async fn call(&self, params: &Parameters) -> HandlerResult {
        Self::execute(&parse_params(params)?)
    }
}

// ============================================================================
// calculate_rewards
// ============================================================================

/// One purchase to earn rewards on.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct Purchase {
    /// Purchase category
    pub category: Category,

    /// Purchase amount
    #[schemars(range(min = 0))]
    pub amount: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CalculateRewardsParams {
    /// Card identifier
    pub card_id: String,

    /// List of purchases to calculate rewards for
    pub purchases: Vec<Purchase>,
}

#[derive(Debug, Serialize)]
struct PurchaseReward {
    category: Category,
    amount: f64,
    multiplier: f64,
    rewards: f64,
}

/// Compute reward points for a list of purchases on a card.
pub struct CalculateRewardsTool;

impl CalculateRewardsTool {
    pub const NAME: &'static str = "calculate_rewards";

    pub const DESCRIPTION: &'static str =
        "Calculate potential rewards for purchases based on card multipliers";

    pub fn operation() -> Operation {
        Operation::new::<CalculateRewardsParams>(Self::NAME, Self)
            .with_description(Self::DESCRIPTION)
            .idempotent()
    }

    #[instrument(skip_all, fields(card_id = %params.card_id, purchases = params.purchases.len()))]
    pub fn execute(params: &CalculateRewardsParams) -> HandlerResult {
        if params.card_id.trim().is_empty() {
            return Err(HandlerError::invalid("Card ID is required"));
        }
        if params.purchases.is_empty() {
            return Err(HandlerError::invalid("At least one purchase is required"));
        }

        let purchase_rewards: Vec<PurchaseReward> = params
            .purchases
            .iter()
            .map(|p| {
                let multiplier = p.category.multiplier();
                PurchaseReward {
                    category: p.category,
                    amount: p.amount,
                    multiplier,
                    rewards: p.amount * multiplier,
                }
            })
            .collect();
        let total_rewards: f64 = purchase_rewards.iter().map(|r| r.rewards).sum();

        info!(total_rewards, "Calculated rewards");

        Ok(serde_json::json!({
            "card_id": params.card_id,
            "total_rewards": total_rewards,
            "purchase_rewards": serde_json::to_value(purchase_rewards)?,
        }))
    }
}

#[async_trait::async_trait]
impl OperationHandler for CalculateRewardsTool {
    async fn call(&self, params: &Parameters) -> HandlerResult {
        Self::execute(&parse_params(params)?)
    }
}

/// All operations served by the benefits server.
pub fn operations() -> Vec<Operation> {
    vec![GetCardBenefitsTool::operation(), CalculateRewardsTool::operation()]
}
