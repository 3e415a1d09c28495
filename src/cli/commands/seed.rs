//! Sample dataset generator
//!
//! Writes the five source CSV files with deterministic pseudo-random retail
//! data: a customer master, a fixed product catalog, a handful of stores,
//! and weekday sales split into a main period and an additional period.
//! `--dirty` injects malformed sales rows so the quality gate has something
//! to find.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::cli::error::CliError;
use crate::staging::{CUSTOMER_COLUMNS, PRODUCT_COLUMNS, SALES_COLUMNS, STORE_COLUMNS};

/// Seed command arguments
#[derive(Debug, Clone)]
pub struct SeedArgs {
    /// Output directory for the CSV files
    pub out: PathBuf,
    /// Number of customers to generate
    pub customers: usize,
    /// Number of calendar days of sales
    pub days: u32,
    /// RNG seed
    pub seed: u64,
    /// Number of malformed sales rows to inject
    pub dirty: usize,
}

/// Fixed product catalog: code, description, category, brand, cost, list
const CATALOG: &[(&str, &str, &str, &str, f64, f64)] = &[
    ("P001", "65-inch OLED TV", "Televisions", "Lumina", 1200.00, 1699.99),
    ("P002", "G-Series Smartphone", "Phones", "Vexel", 450.00, 799.99),
    ("P003", "UltraSlim Laptop 14", "Computers", "Nordwave", 800.00, 1199.99),
    ("P004", "Wireless Earbuds Pro", "Audio", "Soniq", 100.00, 149.99),
    ("P005", "27-inch 4K Monitor", "Computers", "Pixelon", 350.00, 529.99),
    ("P006", "Smartwatch V2", "Accessories", "Vexel", 200.00, 399.99),
    ("P007", "55-inch LED TV", "Televisions", "Lumina", 400.00, 500.00),
    ("P008", "Tablet Pro 11", "Phones", "Nordwave", 300.00, 450.00),
    ("P009", "Espresso Machine", "Appliances", "Cucina", 150.00, 250.00),
    ("P010", "Bluetooth Speaker", "Audio", "Soniq", 50.00, 89.99),
    ("P011", "400L Fridge", "Appliances", "Polarix", 700.00, 1050.00),
    ("P012", "Mirrorless Camera A7", "Cameras", "Optiq", 1500.00, 2200.00),
    ("P013", "Game Console X", "Gaming", "Playtron", 450.00, 599.99),
    ("P014", "Ergonomic Wireless Mouse", "Accessories", "Clickr", 25.00, 45.00),
    ("P015", "Robot Vacuum S9", "Appliances", "Nordwave", 380.00, 550.00),
    ("P016", "Wi-Fi 6 Router", "Computers", "Netlo", 60.00, 95.00),
    ("P017", "Noise-Cancelling Headphones", "Audio", "Soniq", 220.00, 329.00),
    ("P018", "75-inch QLED Smart TV", "Televisions", "Lumina", 950.00, 1400.00),
    ("P019", "Digital Air Fryer", "Appliances", "Cucina", 90.00, 150.00),
    ("P020", "20000mAh Power Bank", "Accessories", "Voltio", 30.00, 55.00),
];

const REGIONS: &[&str] = &["North", "South", "East", "West", "Central", "Coastal"];

const CITIES: &[&str] = &[
    "Riverton",
    "Oakfield",
    "Lakeside",
    "Hillcrest",
    "Milltown",
    "Fairview",
];

const STORE_TYPES: &[&str] = &["Online", "Downtown", "Outlet", "Mall"];

const COMPANY_STEMS: &[&str] = &[
    "Acme Corp",
    "Globex Trading",
    "Delta Holdings",
    "TechSolutions",
    "Southern Distribution",
    "Northgate Commerce",
];

const STORE_COUNT: usize = 8;

fn pick<'a>(rng: &mut SmallRng, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

/// Generate the sample dataset
pub fn handle_seed(args: &SeedArgs) -> Result<(), CliError> {
    std::fs::create_dir_all(&args.out)
        .map_err(|e| CliError::FileWriteError(args.out.clone(), e.to_string()))?;

    let mut rng = SmallRng::seed_from_u64(args.seed);

    let customers = generate_customers(&mut rng, args.customers);
    let products: Vec<Vec<String>> = CATALOG
        .iter()
        .map(|(code, desc, cat, brand, cost, list)| {
            vec![
                code.to_string(),
                desc.to_string(),
                cat.to_string(),
                brand.to_string(),
                format!("{:.2}", cost),
                format!("{:.2}", list),
            ]
        })
        .collect();
    let stores = generate_stores(&mut rng);

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid start date");
    let (mut sales_main, sales_add) =
        generate_sales(&mut rng, &customers, &stores, start, args.days);
    inject_dirty_rows(&mut rng, &mut sales_main, args.dirty);

    write_csv(&args.out.join("customers.csv"), CUSTOMER_COLUMNS, &customers)?;
    write_csv(&args.out.join("products.csv"), PRODUCT_COLUMNS, &products)?;
    write_csv(&args.out.join("stores.csv"), STORE_COLUMNS, &stores)?;
    write_csv(&args.out.join("sales.csv"), SALES_COLUMNS, &sales_main)?;
    write_csv(&args.out.join("sales_add.csv"), SALES_COLUMNS, &sales_add)?;

    println!(
        "Wrote {} customers, {} products, {} stores, {} + {} sales rows to {}",
        customers.len(),
        products.len(),
        stores.len(),
        sales_main.len(),
        sales_add.len(),
        args.out.display()
    );
    Ok(())
}

fn generate_customers(rng: &mut SmallRng, count: usize) -> Vec<Vec<String>> {
    (1..=count)
        .map(|i| {
            vec![
                format!("C{:03}", i),
                format!("{} {}", pick(rng, COMPANY_STEMS), i),
                format!("555{:07}", rng.random_range(0..10_000_000)),
                format!("contact_{}@example.com", i),
                format!("{} Main St", rng.random_range(100..1000)),
                pick(rng, CITIES).to_string(),
                pick(rng, REGIONS).to_string(),
                format!("{:04}", rng.random_range(1000..10000)),
            ]
        })
        .collect()
}

fn generate_stores(rng: &mut SmallRng) -> Vec<Vec<String>> {
    (1..=STORE_COUNT)
        .map(|i| {
            let store_type = pick(rng, STORE_TYPES);
            let code = format!("S{:02}", i);
            if store_type == "Online" {
                vec![
                    code.clone(),
                    format!("Web Store - {}", code),
                    "123 Internet Ave".to_string(),
                    "Virtual".to_string(),
                    "Virtual".to_string(),
                    "00000".to_string(),
                    store_type.to_string(),
                ]
            } else {
                vec![
                    code,
                    format!("{} Store {}", store_type, i),
                    format!("{} Market Rd", rng.random_range(100..1000)),
                    pick(rng, CITIES).to_string(),
                    pick(rng, REGIONS).to_string(),
                    format!("{:04}", rng.random_range(1000..10000)),
                    store_type.to_string(),
                ]
            }
        })
        .collect()
}

/// Weekday sales over `days` days, split 3:1 into main and additional files
fn generate_sales(
    rng: &mut SmallRng,
    customers: &[Vec<String>],
    stores: &[Vec<String>],
    start: NaiveDate,
    days: u32,
) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    let mut main = Vec::new();
    let mut add = Vec::new();
    let cutoff = start + Duration::days(days as i64 * 3 / 4);

    for offset in 0..days {
        let date = start + Duration::days(offset as i64);
        if date.weekday().num_days_from_monday() >= 5 {
            continue;
        }

        for _ in 0..rng.random_range(5..=15) {
            let timestamp = date
                .and_hms_opt(
                    rng.random_range(9..20),
                    rng.random_range(0..60),
                    rng.random_range(0..60),
                )
                .expect("valid time of day");

            let customer = &customers[rng.random_range(0..customers.len())];
            let store = &stores[rng.random_range(0..stores.len())];
            let (code, desc, _, _, _, list) = CATALOG[rng.random_range(0..CATALOG.len())];

            let quantity = rng.random_range(1..=5u32);
            let unit_price = list * rng.random_range(0.95..1.05);
            let amount = unit_price * quantity as f64;

            let row = sales_row(timestamp, code, desc, &quantity.to_string(), &format!("{:.2}", amount), customer, store);
            if date < cutoff {
                main.push(row);
            } else {
                add.push(row);
            }
        }
    }

    (main, add)
}

fn sales_row(
    timestamp: NaiveDateTime,
    product_code: &str,
    product_name: &str,
    quantity: &str,
    amount: &str,
    customer: &[String],
    store: &[String],
) -> Vec<String> {
    vec![
        timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        product_code.to_string(),
        product_name.to_string(),
        quantity.to_string(),
        amount.to_string(),
        customer[0].clone(),
        customer[1].clone(),
        store[0].clone(),
        store[1].clone(),
    ]
}

/// Overwrite fields of existing rows with values the typed load rejects
fn inject_dirty_rows(rng: &mut SmallRng, sales: &mut [Vec<String>], count: usize) {
    for i in 0..count.min(sales.len()) {
        let idx = rng.random_range(0..sales.len());
        let row = &mut sales[idx];
        match i % 3 {
            0 => row[3] = "many".to_string(),
            1 => row[4] = "100000000000000000.00".to_string(),
            _ => row[0] = "not-a-date".to_string(),
        }
    }
}

/// Write a CSV file, quoting fields that need it
fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> Result<(), CliError> {
    let mut output = String::new();
    output.push_str(&headers.join(","));
    output.push('\n');

    for row in rows {
        let fields: Vec<String> = row.iter().map(|f| quote_field(f)).collect();
        output.push_str(&fields.join(","));
        output.push('\n');
    }

    std::fs::write(path, output)
        .map_err(|e| CliError::FileWriteError(path.to_path_buf(), e.to_string()))
}

fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::CsvTable;

    fn seed_into(dir: &Path, dirty: usize) -> SeedArgs {
        SeedArgs {
            out: dir.to_path_buf(),
            customers: 10,
            days: 20,
            seed: 7,
            dirty,
        }
    }

    #[test]
    fn test_seed_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        handle_seed(&seed_into(dir.path(), 0)).unwrap();

        for file in [
            "customers.csv",
            "products.csv",
            "stores.csv",
            "sales.csv",
            "sales_add.csv",
        ] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }

        let customers = CsvTable::read(dir.path().join("customers.csv")).unwrap();
        assert_eq!(customers.rows.len(), 10);
        assert_eq!(customers.headers, CUSTOMER_COLUMNS);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        handle_seed(&seed_into(a.path(), 0)).unwrap();
        handle_seed(&seed_into(b.path(), 0)).unwrap();

        let sales_a = std::fs::read_to_string(a.path().join("sales.csv")).unwrap();
        let sales_b = std::fs::read_to_string(b.path().join("sales.csv")).unwrap();
        assert_eq!(sales_a, sales_b);
    }

    #[test]
    fn test_dirty_rows_injected() {
        let dir = tempfile::tempdir().unwrap();
        handle_seed(&seed_into(dir.path(), 6)).unwrap();

        let sales = CsvTable::read(dir.path().join("sales.csv")).unwrap();
        let dirty = sales
            .rows
            .iter()
            .filter(|r| {
                r[3].parse::<i64>().is_err()
                    || r[0] == "not-a-date"
                    || r[4] == "100000000000000000.00"
            })
            .count();
        assert!(dirty > 0);
    }
}
