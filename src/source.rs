use crate::error::Result;
use crate::schema::{Document, SourceFeed};
use serde_json::Value;

/// Read-only access to the upstream system that owns customers, accounts
/// and their transactions. `Ok(None)` means the resource does not exist.
#[allow(async_fn_in_trait)]
pub trait TransactionSource {
    async fn customer(&self, customer_id: &str) -> Result<Option<Document>>;

    async fn customer_accounts(&self, customer_id: &str) -> Result<Option<Vec<Document>>>;

    /// Every account the source knows about.
    async fn accounts(&self) -> Result<Option<Vec<Document>>>;

    async fn account_feed(&self, account_id: &str, feed: SourceFeed) -> Result<Option<Vec<Document>>>;

    /// All three feeds of an account, each record tagged with its `type`.
    async fn tagged_transactions(&self, account_id: &str) -> Result<Vec<Document>> {
        let (deposits, purchases, withdrawals) = futures::try_join!(
            self.account_feed(account_id, SourceFeed::Deposit),
            self.account_feed(account_id, SourceFeed::Purchase),
            self.account_feed(account_id, SourceFeed::Withdrawal),
        )?;

        let tagged = [
            (SourceFeed::Deposit, deposits),
            (SourceFeed::Purchase, purchases),
            (SourceFeed::Withdrawal, withdrawals),
        ]
        .into_iter()
        .flat_map(|(feed, records)| {
            records.unwrap_or_default().into_iter().map(move |mut record| {
                record.insert("type".to_string(), Value::String(feed.type_tag().to_string()));
                record
            })
        })
        .collect();

        Ok(tagged)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::FakeSource;
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_feeds_are_tagged_and_merged() {
        let mut source = FakeSource::default();
        source.feeds.insert(
            ("acc-1".to_string(), SourceFeed::Deposit),
            vec![doc(json!({ "_id": "d1", "amount": 900.0 }))],
        );
        source.feeds.insert(
            ("acc-1".to_string(), SourceFeed::Withdrawal),
            vec![
                doc(json!({ "_id": "w1", "amount": 1200.0 })),
                doc(json!({ "_id": "w2", "amount": 485.75 })),
            ],
        );

        let tagged = source.tagged_transactions("acc-1").await.unwrap();
        let types: Vec<&str> = tagged.iter().map(|t| t["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["deposit", "withdrawal", "withdrawal"]);
    }

    #[tokio::test]
    async fn test_feed_failure_propagates() {
        let source = FakeSource {
            failing_accounts: vec!["acc-x".to_string()],
            ..FakeSource::default()
        };
        assert!(source.tagged_transactions("acc-x").await.is_err());
    }
}
