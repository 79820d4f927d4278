//! Static tables the ledger reads: base points per action, the tier ladder, and the
//! reward catalog.
//!
//! Tier and reward tables are validated when built. A `TierTable` that exists
//! always covers `[0, +inf)` with contiguous, non-overlapping ranges, so lookups
//! never fall off the end.

use std::collections::BTreeSet;
use std::fmt;

use contracts::{EarnAction, Reward, RewardCategory, Tier, TierId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    EmptyTierTable,
    FirstTierNotAtZero(u64),
    TierGap { after: TierId, expected_min: u64, found_min: u64 },
    InvertedTierRange(TierId),
    UnboundedTierBeforeLast(TierId),
    BoundedLastTier(TierId),
    DuplicateRewardId(String),
    ZeroCostReward(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTierTable => write!(f, "tier table is empty"),
            Self::FirstTierNotAtZero(min) => {
                write!(f, "first tier starts at {min}, expected 0")
            }
            Self::TierGap {
                after,
                expected_min,
                found_min,
            } => write!(
                f,
                "tier after {after:?} starts at {found_min}, expected {expected_min}"
            ),
            Self::InvertedTierRange(id) => write!(f, "tier {id:?} has max below min"),
            Self::UnboundedTierBeforeLast(id) => {
                write!(f, "tier {id:?} is unbounded but is not the last tier")
            }
            Self::BoundedLastTier(id) => write!(f, "last tier {id:?} must be unbounded"),
            Self::DuplicateRewardId(id) => write!(f, "reward id {id} appears more than once"),
            Self::ZeroCostReward(id) => write!(f, "reward {id} must cost at least 1 point"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Base point value and display label for an earn action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRule {
    pub base_points: u64,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionTable;

impl ActionTable {
    pub fn rule(&self, action: EarnAction) -> ActionRule {
        match action {
            EarnAction::FoodLog => ActionRule {
                base_points: 10,
                label: "Logged food waste",
            },
            EarnAction::PlasticLog => ActionRule {
                base_points: 10,
                label: "Logged plastic usage",
            },
            EarnAction::WaterLog => ActionRule {
                base_points: 10,
                label: "Logged water usage",
            },
            EarnAction::ElectricityLog => ActionRule {
                base_points: 10,
                label: "Logged electricity usage",
            },
            EarnAction::RecycleCheck => ActionRule {
                base_points: 5,
                label: "Checked item recyclability",
            },
            EarnAction::WishlistAdd => ActionRule {
                base_points: 5,
                label: "Added item to eco wishlist",
            },
        }
    }
}

/// Ordered tier ladder, lowest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, CatalogError> {
        let Some(first) = tiers.first() else {
            return Err(CatalogError::EmptyTierTable);
        };
        if first.min_points != 0 {
            return Err(CatalogError::FirstTierNotAtZero(first.min_points));
        }

        let last_index = tiers.len() - 1;
        for (index, tier) in tiers.iter().enumerate() {
            match tier.max_points {
                Some(max) if max < tier.min_points => {
                    return Err(CatalogError::InvertedTierRange(tier.id));
                }
                Some(max) => {
                    let Some(next) = tiers.get(index + 1) else {
                        return Err(CatalogError::BoundedLastTier(tier.id));
                    };
                    let expected_min = max.saturating_add(1);
                    if next.min_points != expected_min {
                        return Err(CatalogError::TierGap {
                            after: tier.id,
                            expected_min,
                            found_min: next.min_points,
                        });
                    }
                }
                None if index != last_index => {
                    return Err(CatalogError::UnboundedTierBeforeLast(tier.id));
                }
                None => {}
            }
        }

        Ok(Self { tiers })
    }

    pub fn default_tiers() -> Self {
        let perks = |items: &[&str]| -> Vec<String> {
            items.iter().map(|perk| perk.to_string()).collect()
        };
        let table = Self {
            tiers: vec![
                Tier {
                    id: TierId::Green,
                    name: "Green Sprout".to_string(),
                    icon: "🌱".to_string(),
                    min_points: 0,
                    max_points: Some(499),
                    bonus_percent: 0,
                    perks: perks(&["Earn EcoMiles on every log", "Access to rewards shop"]),
                },
                Tier {
                    id: TierId::Leaf,
                    name: "Leaf Guardian".to_string(),
                    icon: "🍃".to_string(),
                    min_points: 500,
                    max_points: Some(1999),
                    bonus_percent: 10,
                    perks: perks(&["10% bonus EcoMiles", "Exclusive leaf badge"]),
                },
                Tier {
                    id: TierId::Tree,
                    name: "Tree Protector".to_string(),
                    icon: "🌳".to_string(),
                    min_points: 2000,
                    max_points: Some(4999),
                    bonus_percent: 20,
                    perks: perks(&[
                        "20% bonus EcoMiles",
                        "Early access to new rewards",
                        "Monthly eco report",
                    ]),
                },
                Tier {
                    id: TierId::EarthGuardian,
                    name: "Earth Guardian".to_string(),
                    icon: "🌍".to_string(),
                    min_points: 5000,
                    max_points: None,
                    bonus_percent: 30,
                    perks: perks(&[
                        "30% bonus EcoMiles",
                        "VIP reward drops",
                        "Tree planted in your name yearly",
                    ]),
                },
            ],
        };
        debug_assert_eq!(Self::new(table.tiers.clone()).as_ref(), Ok(&table));
        table
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    fn position_for(&self, points: u64) -> usize {
        self.tiers
            .iter()
            .position(|tier| tier.contains(points))
            .unwrap_or(0)
    }

    /// First tier whose range contains `points`.
    pub fn tier_for(&self, points: u64) -> &Tier {
        &self.tiers[self.position_for(points)]
    }

    pub fn next_after(&self, points: u64) -> Option<&Tier> {
        self.tiers.get(self.position_for(points) + 1)
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::default_tiers()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardCatalog {
    rewards: Vec<Reward>,
}

impl RewardCatalog {
    pub fn new(rewards: Vec<Reward>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        for reward in &rewards {
            if reward.cost == 0 {
                return Err(CatalogError::ZeroCostReward(reward.id.clone()));
            }
            if !seen.insert(reward.id.as_str()) {
                return Err(CatalogError::DuplicateRewardId(reward.id.clone()));
            }
        }
        Ok(Self { rewards })
    }

    pub fn default_catalog() -> Self {
        let catalog = Self {
            rewards: vec![
                Reward::new(
                    "bamboo_toothbrush",
                    "Bamboo Toothbrush Set",
                    "Set of 4 biodegradable bamboo toothbrushes",
                    "🪥",
                    300,
                    RewardCategory::Physical,
                ),
                Reward::new(
                    "cotton_tote",
                    "Organic Cotton Tote",
                    "Sturdy reusable shopping bag",
                    "👜",
                    500,
                    RewardCategory::Physical,
                ),
                Reward::new(
                    "steel_bottle",
                    "Steel Water Bottle",
                    "Insulated stainless steel bottle",
                    "🍶",
                    800,
                    RewardCategory::Physical,
                ),
                Reward::new(
                    "eco_badge",
                    "Exclusive Eco Badge",
                    "Profile badge showing your commitment",
                    "🏅",
                    100,
                    RewardCategory::Digital,
                ),
                Reward::new(
                    "premium_tips",
                    "Premium Eco Tips Pack",
                    "Advanced guides for a low-waste home",
                    "📘",
                    200,
                    RewardCategory::Digital,
                ),
                Reward::new(
                    "tree_certificate",
                    "Plant a Tree Certificate",
                    "A tree planted on your behalf",
                    "🌲",
                    400,
                    RewardCategory::Digital,
                ),
                Reward::new(
                    "refill_voucher",
                    "Refill Store Voucher",
                    "10% off at partner refill stations",
                    "🧴",
                    250,
                    RewardCategory::Voucher,
                ),
                Reward::new(
                    "market_voucher",
                    "Farmers Market Voucher",
                    "Voucher for local organic produce",
                    "🥕",
                    600,
                    RewardCategory::Voucher,
                ),
            ],
        };
        debug_assert_eq!(Self::new(catalog.rewards.clone()).as_ref(), Ok(&catalog));
        catalog
    }

    pub fn rewards(&self) -> &[Reward] {
        &self.rewards
    }

    pub fn get(&self, reward_id: &str) -> Option<&Reward> {
        self.rewards.iter().find(|reward| reward.id == reward_id)
    }

    pub fn in_category(&self, category: RewardCategory) -> impl Iterator<Item = &Reward> {
        self.rewards
            .iter()
            .filter(move |reward| reward.category == category)
    }
}

impl Default for RewardCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}
