use std::env;
use std::path::PathBuf;

use chrono::Local;
use contracts::{EarnAction, LedgerConfig, RewardCategory};
use ecomiles_api::{EcoMilesApi, RecordingNotifier, SqliteKvStore};
use tracing_subscriber::filter::LevelFilter;

type CliApi = EcoMilesApi<SqliteKvStore, RecordingNotifier>;

#[derive(Debug, PartialEq, Eq)]
enum CliError {
    Usage(String),
    Failed(String),
    /// The ledger refused the request; nothing was written.
    Rejected(String),
}

impl CliError {
    fn message(&self) -> &str {
        match self {
            Self::Usage(message) | Self::Failed(message) | Self::Rejected(message) => message,
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            Self::Failed(_) => 1,
            Self::Usage(_) => 2,
            Self::Rejected(_) => 3,
        }
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        Self::Failed(value)
    }
}

fn print_usage() {
    println!("ecomiles <command>");
    println!("commands:");
    println!("  status");
    println!("  earn <action>");
    println!("    actions: food_log plastic_log water_log electricity_log recycle_check wishlist_add");
    println!("  redeem <reward_id>");
    println!("  rewards [physical|digital|voucher]");
    println!("  tiers");
    println!("  history [limit]");
    println!("  clear");
    println!("env:");
    println!("  ECOMILES_CONFIG       optional JSON ledger config");
    println!("  ECOMILES_SQLITE_PATH  store location, default ecomiles.sqlite");
    println!("  ECOMILES_LOG          log level on stderr, default warn");
    println!("exit status: 1 storage error, 2 usage error, 3 redemption rejected");
}

fn log_level(raw: Option<&str>) -> LevelFilter {
    raw.and_then(|value| value.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::WARN)
}

fn load_config() -> Result<LedgerConfig, String> {
    let mut config = match env::var("ECOMILES_CONFIG")
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("failed to read config {path}: {err}"))?;
            LedgerConfig::from_json_str(&raw)
                .map_err(|err| format!("invalid config {path}: {err}"))?
        }
        None => LedgerConfig::default(),
    };

    if let Some(path) = env::var("ECOMILES_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        config.sqlite_path = PathBuf::from(path);
    }

    Ok(config)
}

fn open_api() -> Result<CliApi, String> {
    let config = load_config()?;
    let store = SqliteKvStore::open(&config.sqlite_path).map_err(|err| {
        format!(
            "failed to open store {}: {err}",
            config.sqlite_path.display()
        )
    })?;
    EcoMilesApi::open(store, RecordingNotifier::new(), config)
        .map_err(|err| format!("failed to load ledger: {err}"))
}

fn parse_action(value: Option<&String>) -> Result<EarnAction, CliError> {
    let raw = value.ok_or_else(|| CliError::Usage("missing action".to_string()))?;
    EarnAction::parse(raw).ok_or_else(|| CliError::Usage(format!("invalid action: {raw}")))
}

fn parse_category(value: Option<&String>) -> Result<Option<RewardCategory>, CliError> {
    value
        .map(|raw| {
            RewardCategory::parse(raw)
                .ok_or_else(|| CliError::Usage(format!("invalid category: {raw}")))
        })
        .transpose()
}

fn parse_limit(value: Option<&String>) -> Result<usize, CliError> {
    value
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| CliError::Usage(format!("invalid limit: {raw}")))
        })
        .transpose()
        .map(|limit| limit.unwrap_or(20))
}

fn flush_notifications(api: &mut CliApi) {
    for notification in api.notifier_mut().drain() {
        println!("{notification}");
    }
}

fn report_persistence(api: &CliApi) -> Result<(), String> {
    match api.last_persistence_error() {
        Some(error) => Err(format!("persistence error: {error}")),
        None => Ok(()),
    }
}

fn print_rewards(api: &CliApi, only: Option<RewardCategory>) {
    let categories = RewardCategory::ALL
        .into_iter()
        .filter(|category| only.map_or(true, |wanted| wanted == *category));
    for category in categories {
        let listings = api.reward_listing(Some(category));
        if listings.is_empty() {
            continue;
        }
        println!("{}:", category.label());
        for listing in listings {
            let marker = if listing.status.redeemed {
                "redeemed".to_string()
            } else if listing.status.affordable {
                "available".to_string()
            } else {
                format!("need {} more", listing.status.shortfall)
            };
            println!("  {} - {}", listing.reward, marker);
        }
    }
}

fn run(args: &[String]) -> Result<(), CliError> {
    let command = args.get(1).map(String::as_str);
    match command {
        Some("status") => {
            let api = open_api()?;
            println!("{}", api.summary(&Local::now()));
        }
        Some("earn") => {
            let action = parse_action(args.get(2))?;
            let mut api = open_api()?;
            let points = api.earn_points(action);
            flush_notifications(&mut api);
            report_persistence(&api)?;
            println!("earned={} {}", points, api.summary(&Local::now()));
        }
        Some("redeem") => {
            let reward_id = args
                .get(2)
                .cloned()
                .ok_or_else(|| CliError::Usage("missing reward_id".to_string()))?;
            let mut api = open_api()?;
            let outcome = api.redeem_reward_by_id(&reward_id);
            flush_notifications(&mut api);
            report_persistence(&api)?;
            if let Err(err) = outcome {
                return Err(CliError::Rejected(format!("redemption failed: {err}")));
            }
            println!("{}", api.summary(&Local::now()));
        }
        Some("rewards") => {
            let category = parse_category(args.get(2))?;
            let api = open_api()?;
            println!("balance={}", api.total_points());
            print_rewards(&api, category);
        }
        Some("tiers") => {
            let api = open_api()?;
            let current = api.ledger().current_tier().id;
            for tier in api.tiers() {
                let marker = if tier.id == current { "*" } else { " " };
                println!("{marker} {tier}");
                for perk in &tier.perks {
                    println!("    - {perk}");
                }
            }
        }
        Some("history") => {
            let limit = parse_limit(args.get(2))?;
            let api = open_api()?;
            if api.transactions().is_empty() {
                println!("no transactions yet");
            }
            for txn in api.transactions().iter().take(limit) {
                println!(
                    "{} {:+} {} ({})",
                    txn.date.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    txn.points,
                    txn.description,
                    txn.id
                );
            }
        }
        Some("clear") => {
            let mut api = open_api()?;
            api.clear_all_data()
                .map_err(|err| format!("failed to clear data: {err}"))?;
            println!("cleared all data");
        }
        _ => print_usage(),
    }
    Ok(())
}

fn main() {
    let level = log_level(env::var("ECOMILES_LOG").ok().as_deref());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let args: Vec<String> = env::args().collect();
    if let Err(err) = run(&args) {
        eprintln!("error: {}", err.message());
        if matches!(err, CliError::Usage(_)) {
            print_usage();
        }
        std::process::exit(err.exit_code());
    }
}
