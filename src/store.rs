use anyhow::Result;
use async_trait::async_trait;

/// Field holding the collector-issued identifier inside the persisted record.
pub const INSTALLATION_ID_FIELD: &str = "InstallationID";

/// The persisted installation record, as the raw key-value document the
/// backend returns. Kept untyped so a record with a missing or mistyped
/// id field is observable by the dispatcher.
pub type InstallationDoc = serde_json::Map<String, serde_json::Value>;

/// Adapter over the persistent collection holding the installation record.
///
/// Invariant: at most one record ever exists. The liveness loop is the sole
/// writer; the backend only guarantees atomicity of a single call.
#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Number of installation records currently persisted.
    async fn count(&self) -> Result<u64>;

    /// The installation record, if one exists.
    async fn find(&self) -> Result<Option<InstallationDoc>>;

    /// Persist a newly issued installation identifier.
    async fn insert(&self, id: &str) -> Result<()>;
}

/// Reads the installation id out of a record document.
pub fn installation_id(doc: &InstallationDoc) -> Option<&str> {
    doc.get(INSTALLATION_ID_FIELD).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn installation_id_requires_a_string_field() {
        let mut doc = InstallationDoc::new();
        assert_eq!(installation_id(&doc), None);

        doc.insert(INSTALLATION_ID_FIELD.to_string(), json!(42));
        assert_eq!(installation_id(&doc), None, "non-string ids are malformed");

        doc.insert(INSTALLATION_ID_FIELD.to_string(), Value::String("abc123".into()));
        assert_eq!(installation_id(&doc), Some("abc123"));
    }
}
