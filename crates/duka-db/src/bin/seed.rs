//! # Seed Data Generator
//!
//! Populates a development database with a catalog for one organization,
//! and optionally its M-Pesa sandbox credentials.
//!
//! ## Usage
//! ```bash
//! # 200 products for organization "demo-shop" (defaults)
//! cargo run -p duka-db --bin seed
//!
//! # Custom organization, size and database
//! cargo run -p duka-db --bin seed -- --org kiosk-42 --count 500 --db ./data/duka.db
//! ```
//!
//! Credentials are seeded when `SEED_MPESA_CONSUMER_KEY`,
//! `SEED_MPESA_CONSUMER_SECRET`, `SEED_MPESA_SHORT_CODE`,
//! `SEED_MPESA_PASS_KEY` and `SEED_MPESA_CALLBACK_URL` are set. Missing
//! ones are stored as NULL, which settlement reports as
//! `CONFIGURATION_MISSING`.

use chrono::Utc;
use duka_core::{Product, StoredGatewayCredentials};
use duka_db::repository::product::generate_product_id;
use duka_db::{Database, DbConfig};
use std::env;

/// Catalog categories with (name, buying cents, selling cents).
const CATEGORIES: &[(&str, &[(&str, i64, i64)])] = &[
    (
        "Grocery",
        &[
            ("Maize Flour 2kg", 17000, 21000),
            ("Wheat Flour 2kg", 18500, 22500),
            ("Sugar 1kg", 15000, 18000),
            ("Rice 1kg", 16000, 20000),
            ("Cooking Oil 1L", 28000, 34000),
            ("Salt 500g", 3000, 4500),
        ],
    ),
    (
        "Beverages",
        &[
            ("Soda 500ml", 5000, 7000),
            ("Mineral Water 1L", 4000, 6000),
            ("Tea Leaves 250g", 12000, 15000),
            ("Instant Coffee 100g", 35000, 42000),
        ],
    ),
    (
        "Household",
        &[
            ("Bar Soap", 9000, 12000),
            ("Washing Powder 1kg", 25000, 31000),
            ("Toilet Paper 4-Pack", 16000, 20000),
            ("Matchbox", 500, 1000),
        ],
    ),
    (
        "Airtime",
        &[("Scratch Card 100", 9500, 10000), ("Scratch Card 250", 23750, 25000)],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./duka_dev.db");
    let mut organization_id = String::from("demo-shop");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--org" | "-o" => {
                if i + 1 < args.len() {
                    organization_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Duka Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./duka_dev.db)");
                println!("  -o, --org <ID>     Organization id (default: demo-shop)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Duka Seed Data Generator");
    println!("==========================");
    println!("Database:     {}", db_path);
    println!("Organization: {}", organization_id);
    println!("Products:     {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count(&organization_id).await?;
    if existing > 0 {
        println!("⚠ Organization already has {} products", existing);
        println!("  Skipping catalog seed to avoid duplicates.");
    } else {
        let start = std::time::Instant::now();
        let generated = seed_catalog(&db, &organization_id, count).await;
        println!("✓ Generated {} products in {:?}", generated, start.elapsed());
    }

    let creds = StoredGatewayCredentials {
        organization_id: organization_id.clone(),
        consumer_key: env::var("SEED_MPESA_CONSUMER_KEY").ok(),
        consumer_secret: env::var("SEED_MPESA_CONSUMER_SECRET").ok(),
        short_code: env::var("SEED_MPESA_SHORT_CODE").ok(),
        pass_key: env::var("SEED_MPESA_PASS_KEY").ok(),
        callback_url: env::var("SEED_MPESA_CALLBACK_URL").ok(),
    };
    db.credentials().upsert(&creds).await?;

    match creds.complete() {
        Ok(_) => println!("✓ Gateway credentials complete"),
        Err(e) => println!("⚠ Gateway credentials incomplete: {}", e),
    }

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Inserts `count` products cycling through the catalog. Returns how many
/// were written.
async fn seed_catalog(db: &Database, organization_id: &str, count: usize) -> usize {
    let templates: Vec<(&str, &str, i64, i64)> = CATEGORIES
        .iter()
        .flat_map(|(category, items)| {
            items
                .iter()
                .map(move |(name, buying, selling)| (*category, *name, *buying, *selling))
        })
        .collect();

    let mut generated = 0;
    for seed in 0..count {
        let (category, name, buying, selling) = templates[seed % templates.len()];
        let batch = seed / templates.len();
        let now = Utc::now();

        let product = Product {
            id: generate_product_id(),
            organization_id: organization_id.to_string(),
            name: if batch == 0 {
                name.to_string()
            } else {
                format!("{} #{}", name, batch + 1)
            },
            category: category.to_string(),
            buying_price_cents: buying,
            selling_price_cents: selling,
            quantity: ((seed * 7) % 60) as i64,
            reorder_level: 5,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = db.products().insert(&product).await {
            eprintln!("Failed to insert {}: {}", product.name, e);
            continue;
        }
        generated += 1;
    }

    generated
}
