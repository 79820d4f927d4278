//! v1 cross-boundary contracts for the EcoMiles ledger, key-value persistence, and CLI.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod rewards;

pub use rewards::{Reward, RewardCategory};

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const DEFAULT_STORAGE_KEY: &str = "ecoMiles";
pub const DEFAULT_SQLITE_PATH: &str = "ecomiles.sqlite";

/// Point-earning actions a feature page can report to the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EarnAction {
    FoodLog,
    PlasticLog,
    WaterLog,
    ElectricityLog,
    RecycleCheck,
    WishlistAdd,
}

impl EarnAction {
    pub const ALL: [EarnAction; 6] = [
        EarnAction::FoodLog,
        EarnAction::PlasticLog,
        EarnAction::WaterLog,
        EarnAction::ElectricityLog,
        EarnAction::RecycleCheck,
        EarnAction::WishlistAdd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EarnAction::FoodLog => "food_log",
            EarnAction::PlasticLog => "plastic_log",
            EarnAction::WaterLog => "water_log",
            EarnAction::ElectricityLog => "electricity_log",
            EarnAction::RecycleCheck => "recycle_check",
            EarnAction::WishlistAdd => "wishlist_add",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == raw.trim())
    }
}

impl fmt::Display for EarnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a logged transaction: one of the earn actions, or a redemption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    FoodLog,
    PlasticLog,
    WaterLog,
    ElectricityLog,
    RecycleCheck,
    WishlistAdd,
    Redemption,
}

impl TransactionKind {
    pub fn is_redemption(self) -> bool {
        matches!(self, TransactionKind::Redemption)
    }
}

impl From<EarnAction> for TransactionKind {
    fn from(value: EarnAction) -> Self {
        match value {
            EarnAction::FoodLog => Self::FoodLog,
            EarnAction::PlasticLog => Self::PlasticLog,
            EarnAction::WaterLog => Self::WaterLog,
            EarnAction::ElectricityLog => Self::ElectricityLog,
            EarnAction::RecycleCheck => Self::RecycleCheck,
            EarnAction::WishlistAdd => Self::WishlistAdd,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub action: TransactionKind,
    pub points: i64,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<String>,
}

/// Everything the ledger owns. Persisted as a single value after every mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    pub total_points: u64,
    /// Newest first.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub redeemed_rewards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateViolation {
    TotalMismatch { total_points: u64, transaction_sum: i64 },
    DuplicateRedemption(String),
}

impl fmt::Display for StateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotalMismatch {
                total_points,
                transaction_sum,
            } => write!(
                f,
                "total_points={total_points} does not match transaction sum {transaction_sum}"
            ),
            Self::DuplicateRedemption(reward_id) => {
                write!(f, "reward {reward_id} recorded as redeemed more than once")
            }
        }
    }
}

impl std::error::Error for StateViolation {}

impl LedgerState {
    pub fn transaction_sum(&self) -> i64 {
        self.transactions.iter().map(|txn| txn.points).sum()
    }

    pub fn has_redeemed(&self, reward_id: &str) -> bool {
        self.redeemed_rewards.iter().any(|id| id == reward_id)
    }

    pub fn verify(&self) -> Result<(), StateViolation> {
        let transaction_sum = self.transaction_sum();
        if i64::try_from(self.total_points).ok() != Some(transaction_sum) {
            return Err(StateViolation::TotalMismatch {
                total_points: self.total_points,
                transaction_sum,
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for reward_id in &self.redeemed_rewards {
            if !seen.insert(reward_id.as_str()) {
                return Err(StateViolation::DuplicateRedemption(reward_id.clone()));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    Green,
    Leaf,
    Tree,
    EarthGuardian,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tier {
    pub id: TierId,
    pub name: String,
    pub icon: String,
    pub min_points: u64,
    /// `None` marks the open-ended top tier.
    pub max_points: Option<u64>,
    pub bonus_percent: u32,
    pub perks: Vec<String>,
}

impl Tier {
    pub fn contains(&self, points: u64) -> bool {
        points >= self.min_points && self.max_points.map_or(true, |max| points <= max)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_points {
            Some(max) => write!(
                f,
                "{} {} ({}-{} pts, +{}% bonus)",
                self.icon, self.name, self.min_points, max, self.bonus_percent
            ),
            None => write!(
                f,
                "{} {} ({}+ pts, +{}% bonus)",
                self.icon, self.name, self.min_points, self.bonus_percent
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    #[default]
    Default,
    Destructive,
}

/// A user-facing toast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            NotificationVariant::Default => write!(f, "[{}] {}", self.title, self.description),
            NotificationVariant::Destructive => {
                write!(f, "[!{}] {}", self.title, self.description)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    pub schema_version: String,
    /// Key-value slot holding the serialized ledger.
    pub storage_key: String,
    pub sqlite_path: PathBuf,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
}

fn default_notifications_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnsupportedSchemaVersion(String),
    EmptyStorageKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedSchemaVersion(found) => write!(
                f,
                "unsupported schema_version {found}, expected {SCHEMA_VERSION_V1}"
            ),
            Self::EmptyStorageKey => write!(f, "storage_key must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl LedgerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != SCHEMA_VERSION_V1 {
            return Err(ConfigError::UnsupportedSchemaVersion(
                self.schema_version.clone(),
            ));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::EmptyStorageKey);
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            notifications_enabled: true,
        }
    }
}
