//! In-process EcoMiles facade: owns the ledger, persists it to a key-value store after
//! every mutation, and reports outcomes through a notification channel.

mod notify;
mod persistence;

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use contracts::{
    EarnAction, LedgerConfig, LedgerState, Notification, Reward, RewardCategory, Tier, TierId,
    Transaction,
};
use ecomiles_core::{EcoMilesLedger, RedeemError, RedemptionStatus, RewardCatalog, TierTable};
use serde::Serialize;

pub use notify::{Notifier, RecordingNotifier};
pub use persistence::{KeyValueStore, MemoryStore, PersistenceError, SqliteKvStore};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total_points: u64,
    pub tier: TierId,
    pub tier_name: String,
    pub next_tier_name: Option<String>,
    pub tier_progress: u8,
    pub points_to_next_tier: Option<u64>,
    pub today_earned: u64,
    pub redeemed_count: usize,
    pub transaction_count: usize,
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "points={} tier={} progress={}% today=+{} redeemed={} transactions={}",
            self.total_points,
            self.tier_name,
            self.tier_progress,
            self.today_earned,
            self.redeemed_count,
            self.transaction_count
        )?;
        if let (Some(next), Some(away)) = (&self.next_tier_name, self.points_to_next_tier) {
            write!(f, " next={next} ({away} pts away)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardListing {
    pub reward: Reward,
    pub status: RedemptionStatus,
}

#[derive(Debug)]
pub struct EcoMilesApi<S, N> {
    ledger: EcoMilesLedger,
    rewards: RewardCatalog,
    store: S,
    notifier: N,
    config: LedgerConfig,
    last_persistence_error: Option<String>,
}

impl<S: KeyValueStore, N: Notifier> EcoMilesApi<S, N> {
    pub fn open(store: S, notifier: N, config: LedgerConfig) -> Result<Self, PersistenceError> {
        Self::with_catalogs(
            store,
            notifier,
            config,
            TierTable::default_tiers(),
            RewardCatalog::default_catalog(),
        )
    }

    /// Reads the ledger slot once. Unreadable contents fall back to an empty ledger.
    pub fn with_catalogs(
        store: S,
        notifier: N,
        config: LedgerConfig,
        tiers: TierTable,
        rewards: RewardCatalog,
    ) -> Result<Self, PersistenceError> {
        config.validate()?;
        let state = load_state(&store, &config.storage_key)?;
        tracing::debug!(
            storage_key = %config.storage_key,
            total_points = state.total_points,
            transactions = state.transactions.len(),
            "ledger loaded"
        );

        Ok(Self {
            ledger: EcoMilesLedger::from_state(state, tiers),
            rewards,
            store,
            notifier,
            config,
            last_persistence_error: None,
        })
    }

    pub fn earn_points(&mut self, action: EarnAction) -> u64 {
        self.earn_points_at(action, Utc::now())
    }

    pub fn earn_points_at(&mut self, action: EarnAction, at: DateTime<Utc>) -> u64 {
        let receipt = self.ledger.earn_points(action, at);
        tracing::debug!(
            action = %action,
            base_points = receipt.base_points,
            bonus_percent = receipt.bonus_percent,
            points = receipt.points,
            total_points = self.ledger.total_points(),
            "points earned"
        );
        self.persist_and_record();
        self.send(Notification::info(
            format!("+{} EcoMiles!", receipt.points),
            receipt.transaction.description,
        ));
        receipt.points
    }

    pub fn redeem_reward(&mut self, reward: &Reward) -> Result<Transaction, RedeemError> {
        self.redeem_reward_at(reward, Utc::now())
    }

    pub fn redeem_reward_at(
        &mut self,
        reward: &Reward,
        at: DateTime<Utc>,
    ) -> Result<Transaction, RedeemError> {
        match self.ledger.redeem_reward(reward, at) {
            Ok(transaction) => {
                tracing::info!(
                    reward_id = %reward.id,
                    cost = reward.cost,
                    total_points = self.ledger.total_points(),
                    "reward redeemed"
                );
                self.persist_and_record();
                self.send(Notification::info(
                    "Reward Redeemed!",
                    format!("You got: {}", reward.name),
                ));
                Ok(transaction)
            }
            Err(err) => {
                tracing::info!(reward_id = %reward.id, error = %err, "redemption rejected");
                self.send(rejection_notification(&err));
                Err(err)
            }
        }
    }

    pub fn redeem_reward_by_id(&mut self, reward_id: &str) -> Result<Transaction, RedeemError> {
        let Some(reward) = self.rewards.get(reward_id).cloned() else {
            let err = RedeemError::UnknownReward {
                reward_id: reward_id.to_string(),
            };
            self.send(rejection_notification(&err));
            return Err(err);
        };
        self.redeem_reward(&reward)
    }

    /// Writes the whole ledger state to its slot as one value.
    pub fn persist_checked(&mut self) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(self.ledger.state())?;
        self.store.set(&self.config.storage_key, &payload)?;
        self.last_persistence_error = None;
        Ok(())
    }

    /// Wipes every slot in the store, not only the ledger's, and resets the ledger.
    pub fn clear_all_data(&mut self) -> Result<(), PersistenceError> {
        self.store.clear()?;
        self.ledger.reset();
        self.last_persistence_error = None;
        tracing::info!("all stored data cleared");
        Ok(())
    }

    pub fn summary<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> LedgerSummary {
        let tier = self.ledger.current_tier();
        LedgerSummary {
            total_points: self.ledger.total_points(),
            tier: tier.id,
            tier_name: tier.name.clone(),
            next_tier_name: self.ledger.next_tier().map(|next| next.name.clone()),
            tier_progress: self.ledger.tier_progress(),
            points_to_next_tier: self.ledger.points_to_next_tier(),
            today_earned: self.ledger.today_earned(now),
            redeemed_count: self.ledger.redeemed_rewards().len(),
            transaction_count: self.ledger.transactions().len(),
        }
    }

    pub fn reward_listing(&self, category: Option<RewardCategory>) -> Vec<RewardListing> {
        self.rewards
            .rewards()
            .iter()
            .filter(|reward| category.map_or(true, |wanted| reward.category == wanted))
            .map(|reward| RewardListing {
                reward: reward.clone(),
                status: self.ledger.redemption_status(reward),
            })
            .collect()
    }

    pub fn rewards(&self) -> &RewardCatalog {
        &self.rewards
    }

    pub fn tiers(&self) -> &[Tier] {
        self.ledger.tiers().tiers()
    }

    pub fn ledger(&self) -> &EcoMilesLedger {
        &self.ledger
    }

    pub fn state(&self) -> &LedgerState {
        self.ledger.state()
    }

    pub fn total_points(&self) -> u64 {
        self.ledger.total_points()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.ledger.transactions()
    }

    pub fn redeemed_rewards(&self) -> &[String] {
        self.ledger.redeemed_rewards()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    fn persist_and_record(&mut self) {
        if let Err(err) = self.persist_checked() {
            tracing::warn!(
                storage_key = %self.config.storage_key,
                error = %err,
                "failed to persist ledger"
            );
            self.last_persistence_error = Some(err.to_string());
        }
    }

    fn send(&mut self, notification: Notification) {
        if self.config.notifications_enabled {
            self.notifier.notify(notification);
        }
    }
}

fn load_state<S: KeyValueStore>(store: &S, key: &str) -> Result<LedgerState, PersistenceError> {
    let Some(raw) = store.get(key)? else {
        return Ok(LedgerState::default());
    };

    let state = match serde_json::from_str::<LedgerState>(&raw) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(storage_key = %key, error = %err, "unreadable ledger, starting empty");
            return Ok(LedgerState::default());
        }
    };

    if let Err(violation) = state.verify() {
        tracing::warn!(
            storage_key = %key,
            error = %violation,
            "stored ledger breaks invariants, starting empty"
        );
        return Ok(LedgerState::default());
    }

    Ok(state)
}

fn rejection_notification(err: &RedeemError) -> Notification {
    match err {
        RedeemError::InsufficientBalance { shortfall, .. } => Notification::destructive(
            "Not enough EcoMiles",
            format!("You need {shortfall} more points."),
        ),
        RedeemError::AlreadyRedeemed { .. } => Notification::destructive(
            "Already redeemed",
            "You have already redeemed this reward.",
        ),
        RedeemError::UnknownReward { reward_id } => Notification::destructive(
            "Reward not found",
            format!("No reward with id {reward_id}."),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use chrono::Duration;
    use contracts::{ConfigError, NotificationVariant};

    use super::*;

    /// Memory store whose writes can be switched off from outside the facade.
    struct SwitchableStore {
        inner: MemoryStore,
        reject_writes: Rc<Cell<bool>>,
    }

    impl KeyValueStore for SwitchableStore {
        fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
            if self.reject_writes.get() {
                return Err(PersistenceError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
            self.inner.remove(key)
        }

        fn clear(&mut self) -> Result<(), PersistenceError> {
            self.inner.clear()
        }

        fn keys(&self) -> Result<Vec<String>, PersistenceError> {
            self.inner.keys()
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 22, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("ecomiles_api_{name}_{nanos}.sqlite"))
    }

    fn remove_db(path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn memory_api(store: &mut MemoryStore) -> EcoMilesApi<&mut MemoryStore, RecordingNotifier> {
        EcoMilesApi::open(store, RecordingNotifier::new(), LedgerConfig::default())
            .expect("memory store opens")
    }

    fn earn_until(api: &mut EcoMilesApi<&mut MemoryStore, RecordingNotifier>, points: u64) {
        while api.total_points() < points {
            api.earn_points_at(EarnAction::FoodLog, at(1) - Duration::days(3));
        }
    }

    #[test]
    fn earn_persists_state_and_notifies() {
        let mut store = MemoryStore::new();
        let mut api = memory_api(&mut store);

        assert_eq!(api.earn_points_at(EarnAction::RecycleCheck, at(9)), 5);

        let last = api.notifier().last().expect("notification sent");
        assert_eq!(last.title, "+5 EcoMiles!");
        assert_eq!(last.description, "Checked item recyclability");
        assert_eq!(last.variant, NotificationVariant::Default);

        let raw = api
            .store()
            .get("ecoMiles")
            .expect("get")
            .expect("ledger slot written");
        let stored: LedgerState = serde_json::from_str(&raw).expect("stored ledger parses");
        assert_eq!(&stored, api.state());
    }

    #[test]
    fn failed_redemptions_notify_without_writing() {
        let mut store = MemoryStore::new();
        let mut api = memory_api(&mut store);
        api.earn_points_at(EarnAction::WaterLog, at(9));
        let stored_before = api.store().get("ecoMiles").expect("get");

        let err = api.redeem_reward_by_id("steel_bottle").expect_err("too expensive");
        assert!(matches!(
            err,
            RedeemError::InsufficientBalance { shortfall: 790, .. }
        ));
        let last = api.notifier().last().expect("notification sent");
        assert_eq!(last.title, "Not enough EcoMiles");
        assert_eq!(last.description, "You need 790 more points.");
        assert_eq!(last.variant, NotificationVariant::Destructive);

        let err = api.redeem_reward_by_id("no_such_reward").expect_err("unknown");
        assert!(matches!(err, RedeemError::UnknownReward { .. }));

        assert_eq!(api.store().get("ecoMiles").expect("get"), stored_before);
        assert_eq!(api.transactions().len(), 1);
    }

    #[test]
    fn duplicate_redemption_is_reported() {
        let mut store = MemoryStore::new();
        let mut api = memory_api(&mut store);
        earn_until(&mut api, 250);

        let txn = api.redeem_reward_by_id("eco_badge").expect("first redemption");
        assert_eq!(txn.points, -100);
        assert_eq!(
            api.notifier().last().map(|n| n.description.as_str()),
            Some("You got: Exclusive Eco Badge")
        );

        let err = api.redeem_reward_by_id("eco_badge").expect_err("second redemption");
        assert!(matches!(err, RedeemError::AlreadyRedeemed { .. }));
        assert_eq!(
            api.notifier().last().map(|n| n.title.as_str()),
            Some("Already redeemed")
        );
        assert_eq!(api.redeemed_rewards(), ["eco_badge".to_string()]);
    }

    #[test]
    fn unreadable_slot_falls_back_to_empty_ledger() {
        let mut store = MemoryStore::new();
        store.set("ecoMiles", "{not json").expect("set");
        let api = memory_api(&mut store);
        assert_eq!(api.state(), &LedgerState::default());

        let mut store = MemoryStore::new();
        store
            .set("ecoMiles", r#"{"total_points":40,"transactions":[]}"#)
            .expect("set");
        let api = memory_api(&mut store);
        assert_eq!(api.total_points(), 0);
    }

    #[test]
    fn clear_all_data_wipes_every_slot() {
        let mut store = MemoryStore::new();
        store.set("wishlist", "[]").expect("set");
        let mut api = memory_api(&mut store);
        api.earn_points_at(EarnAction::FoodLog, at(9));

        api.clear_all_data().expect("clear");
        assert_eq!(api.state(), &LedgerState::default());
        drop(api);
        assert!(store.is_empty());
    }

    #[test]
    fn summary_and_listing_reflect_balance() {
        let mut store = MemoryStore::new();
        let mut api = memory_api(&mut store);
        earn_until(&mut api, 480);
        api.earn_points_at(EarnAction::PlasticLog, at(10));

        let summary = api.summary(&at(12));
        assert_eq!(summary.tier, TierId::Green);
        assert_eq!(summary.today_earned, 10);
        assert_eq!(summary.next_tier_name.as_deref(), Some("Leaf Guardian"));
        assert!(summary.to_string().contains("pts away"));

        let vouchers = api.reward_listing(Some(RewardCategory::Voucher));
        assert_eq!(vouchers.len(), 2);
        let refill = vouchers
            .iter()
            .find(|listing| listing.reward.id == "refill_voucher")
            .expect("refill voucher listed");
        assert!(refill.status.affordable);
        assert!(!refill.status.redeemed);
        assert_eq!(api.reward_listing(None).len(), api.rewards().rewards().len());
    }

    #[test]
    fn notifications_can_be_disabled() {
        let config = LedgerConfig {
            notifications_enabled: false,
            ..LedgerConfig::default()
        };
        let mut api = EcoMilesApi::open(MemoryStore::new(), RecordingNotifier::new(), config)
            .expect("opens");
        api.earn_points_at(EarnAction::FoodLog, at(9));
        assert!(api.notifier().notifications().is_empty());
    }

    #[test]
    fn sqlite_round_trip_restores_ledger() {
        let db_path = temp_db_path("round_trip");

        {
            let store = SqliteKvStore::open(&db_path).expect("open sqlite store");
            let mut api = EcoMilesApi::open(store, RecordingNotifier::new(), LedgerConfig::default())
                .expect("api opens");
            for hour in 0..60 {
                api.earn_points_at(EarnAction::ElectricityLog, at(0) + Duration::minutes(hour));
            }
            let tips = api
                .rewards()
                .get("premium_tips")
                .cloned()
                .expect("catalog entry");
            api.redeem_reward_at(&tips, at(2)).expect("redeem tips");
            assert!(api.last_persistence_error().is_none());
        }

        let store = SqliteKvStore::open(&db_path).expect("reopen sqlite store");
        let api = EcoMilesApi::open(store, RecordingNotifier::new(), LedgerConfig::default())
            .expect("api reopens");
        assert_eq!(api.redeemed_rewards(), ["premium_tips".to_string()]);
        assert_eq!(api.transactions().len(), 61);
        assert!(api.state().verify().is_ok());
        assert_eq!(api.transactions()[0].reward_id.as_deref(), Some("premium_tips"));

        drop(api);
        remove_db(&db_path);
    }

    #[test]
    fn write_failure_keeps_earned_points_and_records_error() {
        let reject_writes = Rc::new(Cell::new(true));
        let store = SwitchableStore {
            inner: MemoryStore::new(),
            reject_writes: Rc::clone(&reject_writes),
        };
        let mut api = EcoMilesApi::open(store, RecordingNotifier::new(), LedgerConfig::default())
            .expect("opens");

        assert_eq!(api.earn_points_at(EarnAction::FoodLog, at(9)), 10);
        assert_eq!(api.total_points(), 10);
        assert!(api
            .last_persistence_error()
            .map_or(false, |err| err.starts_with("sqlite error")));
        assert_eq!(api.notifier().notifications().len(), 1);
        assert_eq!(api.store().get("ecoMiles").expect("get"), None);

        reject_writes.set(false);
        api.persist_checked().expect("write succeeds");
        assert!(api.last_persistence_error().is_none());
        let raw = api
            .store()
            .get("ecoMiles")
            .expect("get")
            .expect("ledger slot written");
        let stored: LedgerState = serde_json::from_str(&raw).expect("stored ledger parses");
        assert_eq!(stored.total_points, 10);
    }

    #[test]
    fn open_rejects_unsupported_schema_version() {
        let config = LedgerConfig {
            schema_version: "2.0".to_string(),
            ..LedgerConfig::default()
        };
        let err = EcoMilesApi::open(MemoryStore::new(), RecordingNotifier::new(), config)
            .expect_err("schema rejected");
        assert!(matches!(
            err,
            PersistenceError::Config(ConfigError::UnsupportedSchemaVersion(_))
        ));
    }
}
