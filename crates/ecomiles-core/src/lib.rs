//! EcoMiles loyalty ledger: tier-bonus accrual, guarded redemption, and derived views.

pub mod catalog;
pub mod ledger;

pub use catalog::{ActionRule, ActionTable, CatalogError, RewardCatalog, TierTable};
pub use ledger::{
    apply_bonus, tier_progress, EarnReceipt, EcoMilesLedger, RedeemError, RedemptionStatus,
};
