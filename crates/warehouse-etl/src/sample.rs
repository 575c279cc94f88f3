//! Deterministic sample warehouse for demos and tests.
//!
//! Generates raw customers, the orders star schema and the two curated
//! reporting tables, with a handful of planted problems for the quality pass
//! to find: one huge quantity, one huge price, one unknown customer and one
//! unknown product.

use crate::config::WarehouseConfig;
use crate::error::{Result, ResultExt};
use crate::warehouse::{MemoryWarehouse, Warehouse, WriteMode, with_session};
use chrono::{Days, NaiveDate};
use polars::prelude::*;
use rand::prelude::*;
use serde::Serialize;
use std::fs;
use tracing::info;

const FIRST_NAMES: [&str; 10] = [
    "Alice", "Bob", "Charlie", "Diana", "Ethan", "Fiona", "George", "Hannah", "Ivan", "Julia",
];
const LAST_NAMES: [&str; 8] = [
    "Smith", "Jones", "Brown", "Taylor", "Wilson", "Clark", "Lewis", "Walker",
];
const PRODUCTS: [(&str, &str, f64); 8] = [
    ("Paperback Novel", "Books", 12.99),
    ("Cookbook", "Books", 24.50),
    ("Headphones", "Electronics", 89.00),
    ("USB Charger", "Electronics", 19.99),
    ("Board Game", "Games", 34.95),
    ("Puzzle", "Games", 15.00),
    ("Garden Hose", "Garden", 29.90),
    ("Seed Kit", "Garden", 9.49),
];

const FIRST_PRODUCT_ID: i64 = 101;
/// Customer id that no customer has.
pub const UNKNOWN_CUSTOMER_ID: i64 = 999;
/// Product id that no product has.
pub const UNKNOWN_PRODUCT_ID: i64 = 9999;

/// Settings for [`SampleData::generate`].
#[derive(Debug, Clone, Copy)]
pub struct SampleOptions {
    pub seed: u64,
    pub customers: usize,
    /// At least 8 so every planted problem has a row.
    pub orders: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            customers: 20,
            orders: 200,
        }
    }
}

/// Every table of the sample warehouse.
#[derive(Debug, Clone)]
pub struct SampleData {
    pub raw_customers: DataFrame,
    pub dim_customers: DataFrame,
    pub dim_products: DataFrame,
    pub fact_orders: DataFrame,
    pub top_customers: DataFrame,
    pub product_category_sales: DataFrame,
}

/// What [`seed_warehouse`] wrote.
#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub seed: u64,
    pub tables: Vec<(String, usize)>,
}

impl SampleData {
    pub fn generate(options: SampleOptions) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let customers = options.customers.max(1);
        let orders = options.orders.max(8);
        let epoch = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default();

        let customer_ids: Vec<i64> = (1..=customers as i64).collect();
        let first_names: Vec<&str> = customer_ids
            .iter()
            .map(|_| FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())])
            .collect();
        let last_names: Vec<&str> = customer_ids
            .iter()
            .map(|_| LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())])
            .collect();
        let emails: Vec<String> = customer_ids
            .iter()
            .zip(first_names.iter().zip(&last_names))
            .map(|(id, (first, last))| {
                format!(
                    "{}.{}{}@example.com",
                    first.to_lowercase(),
                    last.to_lowercase(),
                    id
                )
            })
            .collect();
        let signup_dates: Vec<String> = customer_ids
            .iter()
            .map(|_| date_after(epoch, rng.gen_range(0..180)))
            .collect();

        let raw_customers = df![
            "customer_id" => &customer_ids,
            "first_name" => &first_names,
            "last_name" => &last_names,
            "email" => &emails,
            "signup_date" => &signup_dates,
        ]?;
        let dim_customers = df![
            "customer_id" => &customer_ids,
            "customer_name" => first_names
                .iter()
                .zip(&last_names)
                .map(|(f, l)| format!("{} {}", f, l))
                .collect::<Vec<_>>(),
            "email" => &emails,
        ]?;

        let product_ids: Vec<i64> = (0..PRODUCTS.len() as i64)
            .map(|i| FIRST_PRODUCT_ID + i)
            .collect();
        let dim_products = df![
            "product_id" => &product_ids,
            "product_name" => PRODUCTS.iter().map(|p| p.0).collect::<Vec<_>>(),
            "category" => PRODUCTS.iter().map(|p| p.1).collect::<Vec<_>>(),
            "list_price" => PRODUCTS.iter().map(|p| p.2).collect::<Vec<_>>(),
        ]?;

        let mut order_customers = Vec::with_capacity(orders);
        let mut order_products = Vec::with_capacity(orders);
        let mut quantities = Vec::with_capacity(orders);
        let mut prices = Vec::with_capacity(orders);
        let mut order_dates = Vec::with_capacity(orders);
        for _ in 0..orders {
            let product = rng.gen_range(0..PRODUCTS.len());
            let unit_price = PRODUCTS[product].2 * rng.gen_range(0.9..1.1);
            order_customers.push(customer_ids[rng.gen_range(0..customer_ids.len())]);
            order_products.push(product_ids[product]);
            quantities.push(rng.gen_range(1..=5i64));
            prices.push((unit_price * 100.0).round() / 100.0);
            order_dates.push(date_after(epoch, rng.gen_range(180..365)));
        }

        // Planted problems, spread over the table
        let slot = orders / 8;
        quantities[slot] = 500;
        prices[3 * slot] *= 100.0;
        order_customers[5 * slot] = UNKNOWN_CUSTOMER_ID;
        order_products[7 * slot] = UNKNOWN_PRODUCT_ID;

        let fact_orders = df![
            "order_id" => (1..=orders as i64).collect::<Vec<_>>(),
            "customer_id" => order_customers,
            "product_id" => order_products,
            "order_date" => order_dates,
            "quantity" => quantities,
            "price" => prices,
        ]?;

        let (top_customers, product_category_sales) =
            curated_tables(&fact_orders, &dim_customers, &dim_products)?;

        Ok(Self {
            raw_customers,
            dim_customers,
            dim_products,
            fact_orders,
            top_customers,
            product_category_sales,
        })
    }

    /// `(schema, table, data)` for every table, raw schema first.
    pub fn tables(&self) -> Vec<(&'static str, &'static str, &DataFrame)> {
        vec![
            ("RAW", "raw_customers", &self.raw_customers),
            ("ANALYTICS", "dim_customers", &self.dim_customers),
            ("ANALYTICS", "dim_products", &self.dim_products),
            ("ANALYTICS", "fact_orders", &self.fact_orders),
            ("ANALYTICS", "top_customers", &self.top_customers),
            ("ANALYTICS", "product_category_sales", &self.product_category_sales),
        ]
    }
}

fn date_after(epoch: NaiveDate, days: u64) -> String {
    epoch
        .checked_add_days(Days::new(days))
        .unwrap_or(epoch)
        .format("%Y-%m-%d")
        .to_string()
}

/// Revenue per customer (top 10) and per category, over orders with a known
/// customer and product.
fn curated_tables(
    fact_orders: &DataFrame,
    dim_customers: &DataFrame,
    dim_products: &DataFrame,
) -> Result<(DataFrame, DataFrame)> {
    let staging = MemoryWarehouse::new()
        .with_table("fact_orders", fact_orders.clone())
        .with_table("dim_customers", dim_customers.clone())
        .with_table("dim_products", dim_products.clone());

    let top_customers = staging
        .query(
            "SELECT o.customer_id AS CUSTOMER_ID, SUM(o.quantity * o.price) AS TOTAL_REVENUE \
             FROM fact_orders o JOIN dim_customers c ON o.customer_id = c.customer_id \
             GROUP BY o.customer_id ORDER BY TOTAL_REVENUE DESC LIMIT 10",
        )
        .context("Building top_customers")?;
    let category_sales = staging
        .query(
            "SELECT p.category AS CATEGORY, SUM(o.quantity * o.price) AS CATEGORY_REVENUE \
             FROM fact_orders o JOIN dim_products p ON o.product_id = p.product_id \
             GROUP BY p.category ORDER BY CATEGORY",
        )
        .context("Building product_category_sales")?;

    Ok((top_customers, category_sales))
}

/// Write the sample tables into the warehouse at `config.root_dir`, creating
/// it if needed. Existing tables with the same names are replaced.
pub fn seed_warehouse(config: &WarehouseConfig, options: SampleOptions) -> Result<SeedSummary> {
    fs::create_dir_all(&config.root_dir)?;
    let data = SampleData::generate(options)?;

    let mut tables = Vec::new();
    for (schema, table, df) in data.tables() {
        with_session(&config.with_schema(schema), |wh| {
            wh.write(df, table, WriteMode::Overwrite)
        })?;
        tables.push((format!("{}.{}", schema, table), df.height()));
    }

    info!(
        "Seeded {} table(s) under {}",
        tables.len(),
        config.root_dir.display()
    );
    Ok(SeedSummary {
        seed: options.seed,
        tables,
    })
}
