//! # Seed Data Generator
//!
//! Populates a ledger database with a demo store, a pass plan and a few
//! member passes, then redeems one use so every table has a row.
//!
//! ## Usage
//! ```bash
//! # Uses PASSBOOK_DATABASE_PATH (default: ./passbook.db)
//! cargo run -p passbook-db --bin seed
//!
//! # Specify database path
//! cargo run -p passbook-db --bin seed -- --db ./data/ledger.db
//!
//! # Number of member passes (default: 20)
//! cargo run -p passbook-db --bin seed -- --members 100
//! ```

use std::env;

use passbook_core::clock::{local_date, parse_timezone, utc_now};
use passbook_core::{
    CartLine, Money, OperatorContext, PassStatus, PaymentInput, RedeemRequest, StoreConfig,
    TaxRate,
};
use passbook_db::{Database, LedgerConfig, NewMemberPass, NewPassPlan};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const STORE_ID: i64 = 1;

/// Plans offered by the demo store: (name, uses, validity days, per order, per day, base cents)
const PLANS: &[(&str, i64, i64, Option<i64>, i64, i64)] = &[
    ("Tea lover 10", 10, 90, None, 0, 300),
    ("Family 30", 30, 180, Some(4), 6, 280),
    ("Daily cup", 31, 31, Some(1), 1, 250),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,passbook=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = LedgerConfig::load()?;
    let mut members: i64 = 20;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if let Some(path) = args.get(i + 1) {
                    config.database_path = path.clone();
                    i += 1;
                }
            }
            "--members" | "-m" => {
                if let Some(n) = args.get(i + 1) {
                    members = n.parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path");
                println!("  -m, --members <N>      Member passes to create (default: 20)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            other => warn!(arg = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(path = %config.database_path, "Opening ledger database");
    let db = Database::new(config.db_config()).await?;

    if db.stores().get_by_id(STORE_ID).await?.is_some() {
        warn!(store_id = STORE_ID, "Store already seeded; delete the database file to regenerate");
        return Ok(());
    }

    let store = StoreConfig {
        id: STORE_ID,
        name: "Demo Tea House".to_string(),
        invoice_prefix: "S1".to_string(),
        tax_id: "B00000000".to_string(),
        default_vat_rate: TaxRate::from_bps(1000),
        billing_system: "VERIFACTU".to_string(),
        timezone: config.default_timezone.clone(),
    };
    db.stores().insert(&store).await?;
    info!(store_id = store.id, name = %store.name, "Store created");

    let mut plan_ids = Vec::with_capacity(PLANS.len());
    for (name, uses, days, per_order, per_day, _) in PLANS {
        let id = db
            .passes()
            .create_plan(&NewPassPlan {
                name: name.to_string(),
                total_uses: *uses,
                validity_days: *days,
                max_uses_per_order: *per_order,
                max_uses_per_day: *per_day,
            })
            .await?;
        plan_ids.push(id);
    }
    info!(plans = plan_ids.len(), "Plans created");

    let now = utc_now();
    let mut first_pass = None;
    for member_id in 1..=members {
        let slot = (member_id as usize) % PLANS.len();
        let (_, uses, days, _, _, base) = PLANS[slot];
        let pass_id = db
            .passes()
            .create_pass(&NewMemberPass {
                member_id,
                plan_id: plan_ids[slot],
                remaining_uses: uses,
                unit_allocated_base: Money::from_cents(base),
                status: PassStatus::Active,
                expires_at: Some(now + chrono::Duration::days(days)),
            })
            .await?;
        first_pass.get_or_insert((member_id, pass_id));
    }
    info!(members, "Member passes created");

    let Some((member_id, pass_id)) = first_pass else {
        return Ok(());
    };

    let tz = parse_timezone(&config.default_timezone)?;
    let request = RedeemRequest {
        member_id,
        pass_id,
        uses_requested: 1,
        device_id: "SEED".to_string(),
        local_date: local_date(now, tz).format("%Y-%m-%d").to_string(),
        cart: vec![CartLine {
            product_id: 1,
            variant_id: None,
            display_name: "Classic milk tea".to_string(),
            name_zh: None,
            name_es: None,
            variant_name: None,
            variant_name_zh: None,
            variant_name_es: None,
            quantity: 1,
            unit_price_cents: 350,
            addons: serde_json::Value::Null,
        }],
        payments: vec![PaymentInput {
            method: "cash".to_string(),
            amount_cents: 50,
        }],
        idempotency_key: None,
    };
    let operator = OperatorContext {
        store_id: STORE_ID,
        user_id: 1,
        shift_id: 1,
    };

    let service = db.redemption_service().with_default_timezone(tz);
    match service.redeem(&operator, &request).await {
        Ok(invoice) => info!(
            series = %invoice.series,
            number = invoice.number,
            covered = %invoice.covered,
            final_total = %invoice.final_total,
            "Demo redemption issued"
        ),
        Err(e) => warn!(failure = ?e.to_failure(), "Demo redemption failed"),
    }

    db.close().await;
    Ok(())
}
