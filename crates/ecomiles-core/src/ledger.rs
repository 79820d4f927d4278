use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use contracts::{EarnAction, LedgerState, Reward, Tier, Transaction, TransactionKind};

use crate::catalog::{ActionTable, TierTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemError {
    InsufficientBalance { reward_id: String, shortfall: u64 },
    AlreadyRedeemed { reward_id: String },
    UnknownReward { reward_id: String },
}

impl fmt::Display for RedeemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientBalance {
                reward_id,
                shortfall,
            } => write!(f, "need {shortfall} more points to redeem {reward_id}"),
            Self::AlreadyRedeemed { reward_id } => {
                write!(f, "reward {reward_id} has already been redeemed")
            }
            Self::UnknownReward { reward_id } => write!(f, "unknown reward {reward_id}"),
        }
    }
}

impl std::error::Error for RedeemError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnReceipt {
    /// Points granted after the tier bonus.
    pub points: u64,
    pub base_points: u64,
    pub bonus_percent: u32,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionStatus {
    pub redeemed: bool,
    pub affordable: bool,
    pub shortfall: u64,
}

/// `round(base * (1 + bonus_percent / 100))`, halves rounded up.
pub fn apply_bonus(base_points: u64, bonus_percent: u32) -> u64 {
    let scaled = u128::from(base_points) * (100 + u128::from(bonus_percent)) + 50;
    u64::try_from(scaled / 100).unwrap_or(u64::MAX)
}

/// Percentage of the way from `current.min_points` to `next.min_points`.
///
/// 100 when there is no next tier. Below the next threshold the value is capped at
/// 99 so a rounded 99.8% never reads as complete.
pub fn tier_progress(total_points: u64, current: &Tier, next: Option<&Tier>) -> u8 {
    let Some(next) = next else {
        return 100;
    };
    if total_points >= next.min_points {
        return 100;
    }

    let span = u128::from(next.min_points.saturating_sub(current.min_points));
    if span == 0 {
        return 100;
    }
    let into_tier = u128::from(total_points.saturating_sub(current.min_points));
    let rounded = (200 * into_tier + span) / (2 * span);
    u8::try_from(rounded.min(99)).unwrap_or(99)
}

/// Points accumulator over an append-only transaction log.
///
/// All mutation goes through [`EcoMilesLedger::earn_points`] and
/// [`EcoMilesLedger::redeem_reward`]; callers persist [`EcoMilesLedger::state`]
/// afterwards.
#[derive(Debug, Clone)]
pub struct EcoMilesLedger {
    state: LedgerState,
    tiers: TierTable,
    actions: ActionTable,
}

impl EcoMilesLedger {
    pub fn new(tiers: TierTable) -> Self {
        Self::from_state(LedgerState::default(), tiers)
    }

    pub fn from_state(state: LedgerState, tiers: TierTable) -> Self {
        Self {
            state,
            tiers,
            actions: ActionTable,
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    pub fn total_points(&self) -> u64 {
        self.state.total_points
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.state.transactions
    }

    pub fn redeemed_rewards(&self) -> &[String] {
        &self.state.redeemed_rewards
    }

    pub fn earn_points(&mut self, action: EarnAction, at: DateTime<Utc>) -> EarnReceipt {
        let rule = self.actions.rule(action);
        let bonus_percent = self.current_tier().bonus_percent;
        let points = apply_bonus(rule.base_points, bonus_percent);

        let transaction = Transaction {
            id: self.next_transaction_id(at),
            action: TransactionKind::from(action),
            points: i64::try_from(points).unwrap_or(i64::MAX),
            description: rule.label.to_string(),
            date: at,
            reward_id: None,
        };

        self.state.transactions.insert(0, transaction.clone());
        self.state.total_points = self.state.total_points.saturating_add(points);

        EarnReceipt {
            points,
            base_points: rule.base_points,
            bonus_percent,
            transaction,
        }
    }

    /// Balance is checked before duplicates; a failed call leaves state untouched.
    pub fn redeem_reward(
        &mut self,
        reward: &Reward,
        at: DateTime<Utc>,
    ) -> Result<Transaction, RedeemError> {
        let status = self.redemption_status(reward);
        if !status.affordable {
            return Err(RedeemError::InsufficientBalance {
                reward_id: reward.id.clone(),
                shortfall: status.shortfall,
            });
        }
        if status.redeemed {
            return Err(RedeemError::AlreadyRedeemed {
                reward_id: reward.id.clone(),
            });
        }

        let transaction = Transaction {
            id: self.next_transaction_id(at),
            action: TransactionKind::Redemption,
            points: -i64::try_from(reward.cost).unwrap_or(i64::MAX),
            description: format!("Redeemed: {}", reward.name),
            date: at,
            reward_id: Some(reward.id.clone()),
        };

        self.state.total_points -= reward.cost;
        self.state.transactions.insert(0, transaction.clone());
        self.state.redeemed_rewards.push(reward.id.clone());

        Ok(transaction)
    }

    pub fn redemption_status(&self, reward: &Reward) -> RedemptionStatus {
        let shortfall = reward.cost.saturating_sub(self.state.total_points);
        RedemptionStatus {
            redeemed: self.state.has_redeemed(&reward.id),
            affordable: shortfall == 0,
            shortfall,
        }
    }

    pub fn current_tier(&self) -> &Tier {
        self.tiers.tier_for(self.state.total_points)
    }

    pub fn next_tier(&self) -> Option<&Tier> {
        self.tiers.next_after(self.state.total_points)
    }

    pub fn tier_progress(&self) -> u8 {
        tier_progress(
            self.state.total_points,
            self.current_tier(),
            self.next_tier(),
        )
    }

    pub fn points_to_next_tier(&self) -> Option<u64> {
        self.next_tier()
            .map(|next| next.min_points.saturating_sub(self.state.total_points))
    }

    /// Sum of positive transactions dated on `now`'s calendar day, in `now`'s zone.
    pub fn today_earned<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> u64 {
        let zone = now.timezone();
        let today = now.date_naive();
        self.state
            .transactions
            .iter()
            .filter(|txn| txn.points > 0)
            .filter(|txn| txn.date.with_timezone(&zone).date_naive() == today)
            .map(|txn| txn.points.unsigned_abs())
            .sum()
    }

    pub fn reset(&mut self) {
        self.state = LedgerState::default();
    }

    fn next_transaction_id(&self, at: DateTime<Utc>) -> String {
        format!(
            "txn-{}-{}",
            at.timestamp_millis(),
            self.state.transactions.len() + 1
        )
    }
}

impl Default for EcoMilesLedger {
    fn default() -> Self {
        Self::new(TierTable::default_tiers())
    }
}
