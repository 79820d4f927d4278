//! Reward catalog entries.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    Physical,
    Digital,
    Voucher,
}

impl RewardCategory {
    pub const ALL: [RewardCategory; 3] = [
        RewardCategory::Physical,
        RewardCategory::Digital,
        RewardCategory::Voucher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RewardCategory::Physical => "physical",
            RewardCategory::Digital => "digital",
            RewardCategory::Voucher => "voucher",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RewardCategory::Physical => "Physical Items",
            RewardCategory::Digital => "Digital Rewards",
            RewardCategory::Voucher => "Vouchers",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == raw.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub cost: u64,
    pub category: RewardCategory,
}

impl Reward {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
        cost: u64,
        category: RewardCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            cost,
            category,
        }
    }
}

impl fmt::Display for Reward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {} pts ({})",
            self.icon,
            self.name,
            self.id,
            self.cost,
            self.category.as_str()
        )
    }
}
