//! Per-endpoint counts of successful predictions, persisted next to the audit log.

use crate::{error::StorageError, store::Store};
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use std::fmt::Write;

pub const PREDICTIONS_METRIC: &str = "housing_predictions_total";

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    #[default]
    Json,
    Prometheus,
}

/// Adds one to `endpoint`'s counter, creating it at 1.
pub async fn increment(conn: &mut SqliteConnection, endpoint: &str) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO endpoint_counters (endpoint, count) VALUES (?, 1) \
         ON CONFLICT(endpoint) DO UPDATE SET count = count + 1",
    )
    .bind(endpoint)
    .execute(conn)
    .await?;
    Ok(())
}

/// All counters, sorted by endpoint.
pub async fn snapshot(store: &Store) -> Result<BTreeMap<String, i64>, StorageError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT endpoint, count FROM endpoint_counters ORDER BY endpoint")
            .fetch_all(store.reader().await?)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Text exposition format with one labelled sample per endpoint.
pub fn to_prometheus(counts: &BTreeMap<String, i64>) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# HELP {} Successful predictions served, by endpoint",
        PREDICTIONS_METRIC
    );
    let _ = writeln!(output, "# TYPE {} counter", PREDICTIONS_METRIC);
    for (endpoint, count) in counts {
        let _ = writeln!(
            output,
            "{}{{endpoint=\"{}\"}} {}",
            PREDICTIONS_METRIC,
            escape_label(endpoint),
            count
        );
    }

    output
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bump(store: &Store, endpoint: &str, times: usize) {
        for _ in 0..times {
            let mut scope = store.begin().await.unwrap();
            increment(scope.conn(), endpoint).await.unwrap();
            scope.commit().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_fresh_store_is_empty() {
        let store = Store::in_memory().await.unwrap();
        assert!(snapshot(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_increment_counts_per_endpoint() {
        let store = Store::in_memory().await.unwrap();
        bump(&store, "/predict", 3).await;
        bump(&store, "/batch", 1).await;

        let counts = snapshot(&store).await.unwrap();
        assert_eq!(counts.get("/predict"), Some(&3));
        assert_eq!(counts.get("/batch"), Some(&1));
        assert_eq!(counts.keys().collect::<Vec<_>>(), vec!["/batch", "/predict"]);
    }

    #[tokio::test]
    async fn test_rolled_back_increment_is_not_counted() {
        let store = Store::in_memory().await.unwrap();
        bump(&store, "/predict", 1).await;

        let mut scope = store.begin().await.unwrap();
        increment(scope.conn(), "/predict").await.unwrap();
        drop(scope);

        assert_eq!(snapshot(&store).await.unwrap()["/predict"], 1);
    }

    #[test]
    fn test_prometheus_export() {
        let mut counts = BTreeMap::new();
        counts.insert("/predict".to_string(), 42);

        let text = to_prometheus(&counts);
        assert!(text.contains("# TYPE housing_predictions_total counter"));
        assert!(text.contains("housing_predictions_total{endpoint=\"/predict\"} 42\n"));
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape_label("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn test_format_parsing() {
        let json: MetricsFormat = serde_json::from_str("\"json\"").unwrap();
        let prom: MetricsFormat = serde_json::from_str("\"prometheus\"").unwrap();

        assert_eq!(json, MetricsFormat::Json);
        assert_eq!(prom, MetricsFormat::Prometheus);
        assert_eq!(MetricsFormat::default(), MetricsFormat::Json);
    }
}
