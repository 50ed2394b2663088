//! Operation definitions, grouped by the tool server that hosts them.
//!
//! Each server id maps to a fixed list of operations. Adding a server means
//! adding a module here and an arm in [`operations_for`].

pub mod benefits;
pub mod travel;
pub mod wallet;

use super::{Operation, OperationError, OperationRegistry};

pub use benefits::{CalculateRewardsTool, GetCardBenefitsTool};
pub use travel::{GetFlightDetailsTool, SearchFlightsTool};
pub use wallet::GetPaymentMethodsTool;

pub const CHASE_TRAVEL: &str = "chase_travel";
pub const SAFEPAY_WALLET: &str = "safepay_wallet";
pub const BENEFITS: &str = "benefits";

/// Ids of all servers with a built-in catalog.
pub const SERVER_IDS: [&str; 3] = [CHASE_TRAVEL, SAFEPAY_WALLET, BENEFITS];

/// Operations hosted by `server_id`, or `None` for an unknown server.
pub fn operations_for(server_id: &str) -> Option<Vec<Operation>> {
    match server_id {
        CHASE_TRAVEL => Some(travel::operations()),
        SAFEPAY_WALLET => Some(wallet::operations()),
        BENEFITS => Some(benefits::operations()),
        _ => None,
    }
}

/// Build the registry for one server from a list of operations.
pub fn build_registry(operations: Vec<Operation>) -> Result<OperationRegistry, OperationError> {
    let mut registry = OperationRegistry::new();
    for operation in operations {
        registry.register(operation)?;
    }
    Ok(registry)
}
