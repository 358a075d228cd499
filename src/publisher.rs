use crate::error::{ProfileError, Result};
use crate::schema::{FinancialProfile, PublishedProfile};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use log::info;
use serde_json::Value;

/// Owns the profiles collection: one document per customer, always
/// overwritten whole.
pub struct ProfilePublisher<'a, S: DocumentStore> {
    store: &'a S,
    collection: &'a str,
}

impl<'a, S: DocumentStore> ProfilePublisher<'a, S> {
    pub fn new(store: &'a S, collection: &'a str) -> Self {
        Self { store, collection }
    }

    pub fn publish(
        &self,
        customer_internal_id: &str,
        profile: &FinancialProfile,
        now: DateTime<Utc>,
    ) -> Result<PublishedProfile> {
        let published = PublishedProfile::new(profile, now);
        let document = match serde_json::to_value(&published)? {
            Value::Object(map) => map,
            other => {
                return Err(ProfileError::Store(format!(
                    "profile serialized to a non-object: {}",
                    other
                )))
            }
        };

        self.store
            .set(self.collection, customer_internal_id, document)?;
        info!(
            "Financial profile for {} saved to '{}'",
            customer_internal_id, self.collection
        );
        Ok(published)
    }

    pub fn fetch(&self, customer_internal_id: &str) -> Result<Option<PublishedProfile>> {
        self.store
            .get(self.collection, customer_internal_id)?
            .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(ProfileError::from))
            .transpose()
    }

    /// The stored affordability figure, with no customer or account checks.
    /// Request-time callers go through `ProfileEngine::approval_fcf`.
    pub fn final_adjusted_fcf_for(&self, customer_internal_id: &str) -> Result<Option<f64>> {
        Ok(self
            .fetch(customer_internal_id)?
            .map(|profile| profile.final_adjusted_fcf))
    }
}
