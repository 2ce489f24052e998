//! Append-only log of successful predictions.

use crate::{error::StorageError, store::Store};
use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqliteConnection};

/// One stored prediction, with its payloads as the JSON text that was written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub input: String,
    pub output: String,
}

impl PredictionRecord {
    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.input)
    }

    pub fn output_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.output)
    }
}

/// Appends one row and returns its id.
pub async fn record(
    conn: &mut SqliteConnection,
    input: &Value,
    output: &Value,
) -> Result<i64, StorageError> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    let result = sqlx::query("INSERT INTO prediction_log (timestamp, input, output) VALUES (?, ?, ?)")
        .bind(timestamp)
        .bind(serde_json::to_string(input)?)
        .bind(serde_json::to_string(output)?)
        .execute(conn)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn fetch_all(store: &Store) -> Result<Vec<PredictionRecord>, StorageError> {
    let records = sqlx::query_as::<_, PredictionRecord>(
        "SELECT id, timestamp, input, output FROM prediction_log ORDER BY id",
    )
    .fetch_all(store.reader().await?)
    .await?;
    Ok(records)
}

pub async fn count(store: &Store) -> Result<i64, StorageError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prediction_log")
        .fetch_one(store.reader().await?)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use common::{FeatureVector, PredictResponse};
    use serde_json::json;

    #[tokio::test]
    async fn test_record_round_trip() {
        let store = Store::in_memory().await.unwrap();
        let input = serde_json::to_value(FeatureVector::example()).unwrap();
        let output = json!({"predictions": [4.15]});

        let mut scope = store.begin().await.unwrap();
        let id = record(scope.conn(), &input, &output).await.unwrap();
        scope.commit().await.unwrap();

        let records = fetch_all(&store).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(
            records[0].input_as::<FeatureVector>().unwrap(),
            FeatureVector::example()
        );
        assert_eq!(
            records[0].output_as::<PredictResponse>().unwrap().predictions,
            vec![4.15]
        );

        let timestamp = DateTime::parse_from_rfc3339(&records[0].timestamp).unwrap();
        assert_eq!(timestamp.offset().local_minus_utc(), 0);
    }

    #[tokio::test]
    async fn test_uncommitted_records_are_discarded() {
        let store = Store::in_memory().await.unwrap();

        let mut scope = store.begin().await.unwrap();
        record(scope.conn(), &json!({}), &json!({})).await.unwrap();
        drop(scope);

        assert_eq!(count(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rows_are_appended_in_order() {
        let store = Store::in_memory().await.unwrap();

        for i in 0..3 {
            let mut scope = store.begin().await.unwrap();
            record(scope.conn(), &json!({"n": i}), &json!({"predictions": [i]}))
                .await
                .unwrap();
            scope.commit().await.unwrap();
        }

        let records = fetch_all(&store).await.unwrap();
        let inputs: Vec<Value> = records.iter().map(|r| r.input_as().unwrap()).collect();
        assert_eq!(inputs, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(count(&store).await.unwrap(), 3);
    }
}
