//! SQL execution over in-memory tables with the Polars SQL engine.

use once_cell::sync::Lazy;
use polars::prelude::*;
use polars::sql::SQLContext;
use regex::Regex;

static TABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("Invalid regex: table reference")
});

/// Table names a query reads from, in order of first appearance.
///
/// Only names following `FROM` or `JOIN` count. Names that are not tables
/// (CTEs, `EXTRACT(YEAR FROM col)`) are returned too; backends ignore the ones
/// they do not hold.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for capture in TABLE_REFERENCE.captures_iter(sql) {
        let name = capture[1].to_string();
        if !tables.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
            tables.push(name);
        }
    }
    tables
}

/// Register `tables` under the names the query uses and run it.
pub(crate) fn execute(sql: &str, tables: Vec<(String, DataFrame)>) -> PolarsResult<DataFrame> {
    let mut ctx = SQLContext::new();
    for (name, df) in tables {
        ctx.register(&name, df.lazy());
    }
    ctx.execute(sql)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_tables_simple() {
        assert_eq!(
            referenced_tables("SELECT * FROM fact_orders"),
            vec!["fact_orders"]
        );
    }

    #[test]
    fn test_referenced_tables_join_and_subquery() {
        let sql = "SELECT o.* FROM FACT_ORDERS o JOIN dim_customers c ON o.customer_id = c.customer_id \
                   WHERE o.price > (SELECT AVG(price) FROM fact_orders)";
        assert_eq!(
            referenced_tables(sql),
            vec!["FACT_ORDERS", "dim_customers"]
        );
    }

    #[test]
    fn test_referenced_tables_ignores_parenthesised_from() {
        assert!(referenced_tables("SELECT * FROM (SELECT 1 AS x)").is_empty());
    }

    #[test]
    fn test_execute_projection_and_filter() {
        let orders = df![
            "order_id" => [1i64, 2, 3],
            "price" => [10.0, 20.0, 30.0],
        ]
        .unwrap();

        let result = execute(
            "SELECT order_id FROM orders WHERE price > 15",
            vec![("orders".to_string(), orders)],
        )
        .unwrap();

        assert_eq!(result.height(), 2);
        assert_eq!(result.width(), 1);
    }

    #[test]
    fn test_execute_unknown_table_fails() {
        assert!(execute("SELECT * FROM nowhere", Vec::new()).is_err());
    }
}
