use crate::config::CollectionNames;
use crate::error::{ProfileError, Result};
use crate::schema::Document;
use crate::store::{DocumentStore, UniqueInsert};
use log::debug;
use serde_json::Value;

/// Copies raw source records into the store at most once per upstream id.
pub struct Ingestor<'a, S: DocumentStore> {
    store: &'a S,
    names: &'a CollectionNames,
}

impl<'a, S: DocumentStore> Ingestor<'a, S> {
    pub fn new(store: &'a S, names: &'a CollectionNames) -> Self {
        Self { store, names }
    }

    /// Returns the internal id for `record`, inserting it on first sight.
    ///
    /// The upstream id is moved from `source_id_field` to `external_id_field`
    /// and `extra_fields` are merged over the record. A record already stored
    /// under the same upstream id is returned as-is and never rewritten.
    pub fn sync(&self, collection: &str, record: &Document, extra_fields: &Document) -> Result<String> {
        let external_id = match record.get(&self.names.source_id_field) {
            Some(id) if is_present(id) => id.clone(),
            _ => {
                return Err(ProfileError::MissingKey {
                    collection: collection.to_string(),
                    field: self.names.source_id_field.clone(),
                })
            }
        };

        let mut document = record.clone();
        document.remove(&self.names.source_id_field);
        document.insert(self.names.external_id_field.clone(), external_id.clone());
        for (field, value) in extra_fields {
            document.insert(field.clone(), value.clone());
        }

        let outcome = self.store.insert_unique(
            collection,
            &self.names.external_id_field,
            &external_id,
            document,
        )?;

        match &outcome {
            UniqueInsert::Existing(key) => debug!(
                "Record {} already exists in '{}' as {}; skipping creation",
                external_id, collection, key
            ),
            UniqueInsert::Inserted(key) => debug!(
                "Created {} in '{}' for upstream record {}",
                key, collection, external_id
            ),
        }

        Ok(outcome.into_key())
    }

    /// Fields that tie a stored record to its owning customer.
    pub fn owner_fields(&self, customer_internal_id: &str) -> Document {
        let mut fields = Document::new();
        fields.insert(
            self.names.customer_ref_field.clone(),
            Value::String(customer_internal_id.to_string()),
        );
        fields
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
