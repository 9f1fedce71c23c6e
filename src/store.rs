//! Model persistence
//!
//! The engine never touches storage itself. Callers persist whole models through
//! a [`ModelStore`], keyed by an opaque user id. Two backends ship with the
//! crate: an in-memory store and a single-document JSON file store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RhythmError;
use crate::types::{Model, UserRecord};

/// Persistence seam for users and their typing models
pub trait ModelStore {
    /// Return the user with this name, creating it if needed
    fn register_user(&mut self, username: &str) -> Result<UserRecord, RhythmError>;

    /// Look up a user by name
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, RhythmError>;

    /// Insert or replace the user's model as one record
    fn save_model(&mut self, user_id: Uuid, model: &Model) -> Result<(), RhythmError>;

    /// The user's model, or `None` if not enrolled
    fn load_model(&self, user_id: Uuid) -> Result<Option<Model>, RhythmError>;

    /// Replace only the center of an existing model
    fn update_center(&mut self, user_id: Uuid, center: &[f64]) -> Result<(), RhythmError> {
        let model = self
            .load_model(user_id)?
            .ok_or_else(|| RhythmError::ModelNotFound(user_id.to_string()))?;
        if center.len() != model.dimension {
            return Err(RhythmError::DimensionMismatch {
                expected: model.dimension,
                actual: center.len(),
            });
        }
        self.save_model(user_id, &model.with_center(center.to_vec()))
    }
}

/// Stored model with its last write time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    pub model: Model,
    pub updated_at: DateTime<Utc>,
}

/// Serializable contents shared by both backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    models: HashMap<Uuid, StoredModel>,
}

impl StoreDocument {
    fn register_user(&mut self, username: &str) -> (UserRecord, bool) {
        if let Some(existing) = self.users.iter().find(|u| u.username == username) {
            return (existing.clone(), false);
        }
        let record = UserRecord::new(username);
        self.users.push(record.clone());
        (record, true)
    }

    fn find_user(&self, username: &str) -> Option<UserRecord> {
        self.users.iter().find(|u| u.username == username).cloned()
    }

    fn save_model(&mut self, user_id: Uuid, model: &Model) -> Result<(), RhythmError> {
        if !model.is_consistent() {
            return Err(RhythmError::StorageError(format!(
                "refusing to store inconsistent model for {user_id}"
            )));
        }
        self.models.insert(
            user_id,
            StoredModel {
                model: model.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn load_model(&self, user_id: Uuid) -> Result<Option<Model>, RhythmError> {
        match self.models.get(&user_id) {
            Some(stored) if !stored.model.is_consistent() => Err(RhythmError::StorageError(
                format!("stored model for {user_id} is inconsistent"),
            )),
            Some(stored) => Ok(Some(stored.model.clone())),
            None => Ok(None),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

/// Volatile store, for tests and embedding hosts that persist elsewhere
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelStore {
    document: StoreDocument,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> &StoreDocument {
        &self.document
    }
}

impl ModelStore for InMemoryModelStore {
    fn register_user(&mut self, username: &str) -> Result<UserRecord, RhythmError> {
        Ok(self.document.register_user(username).0)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, RhythmError> {
        Ok(self.document.find_user(username))
    }

    fn save_model(&mut self, user_id: Uuid, model: &Model) -> Result<(), RhythmError> {
        self.document.save_model(user_id, model)
    }

    fn load_model(&self, user_id: Uuid) -> Result<Option<Model>, RhythmError> {
        self.document.load_model(user_id)
    }
}

/// Store backed by one JSON file, rewritten on every change
#[derive(Debug, Clone)]
pub struct JsonFileModelStore {
    path: PathBuf,
    document: StoreDocument,
}

impl JsonFileModelStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RhythmError> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StoreDocument::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            StoreDocument::default()
        };
        debug!(
            path = %path.display(),
            users = document.user_count(),
            models = document.model_count(),
            "opened model store"
        );
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &StoreDocument {
        &self.document
    }

    /// Write through a temp file and rename so readers never see a partial record
    fn flush(&self, document: &StoreDocument) -> Result<(), RhythmError> {
        let json = serde_json::to_string_pretty(document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ModelStore for JsonFileModelStore {
    fn register_user(&mut self, username: &str) -> Result<UserRecord, RhythmError> {
        let mut next = self.document.clone();
        let (record, created) = next.register_user(username);
        if created {
            // Memory only changes once the file write succeeded
            self.flush(&next)?;
            self.document = next;
            info!(user_id = %record.id, "registered new user");
        }
        Ok(record)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, RhythmError> {
        Ok(self.document.find_user(username))
    }

    fn save_model(&mut self, user_id: Uuid, model: &Model) -> Result<(), RhythmError> {
        let mut next = self.document.clone();
        next.save_model(user_id, model)?;
        self.flush(&next)?;
        self.document = next;
        Ok(())
    }

    fn load_model(&self, user_id: Uuid) -> Result<Option<Model>, RhythmError> {
        self.document.load_model(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model() -> Model {
        Model::new(vec![0.1, 0.2, 0.15], vec![0.01, 0.02, 0.015], 3.0)
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut store = InMemoryModelStore::new();
        let first = store.register_user("alice").unwrap();
        let second = store.register_user("alice").unwrap();
        let other = store.register_user("bob").unwrap();

        assert_eq!(first, second);
        assert_ne!(first.id, other.id);
        assert_eq!(store.document().user_count(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let mut store = InMemoryModelStore::new();
        let user = store.register_user("alice").unwrap();

        assert_eq!(store.load_model(user.id).unwrap(), None);
        store.save_model(user.id, &model()).unwrap();
        assert_eq!(store.load_model(user.id).unwrap(), Some(model()));
    }

    #[test]
    fn test_update_center_only() {
        let mut store = InMemoryModelStore::new();
        let user = store.register_user("alice").unwrap();
        store.save_model(user.id, &model()).unwrap();

        store.update_center(user.id, &[0.2, 0.2, 0.2]).unwrap();
        let updated = store.load_model(user.id).unwrap().unwrap();
        assert_eq!(updated.center, vec![0.2, 0.2, 0.2]);
        assert_eq!(updated.scale, model().scale);
        assert_eq!(updated.threshold, 3.0);

        assert!(matches!(
            store.update_center(user.id, &[0.2]),
            Err(RhythmError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            store.update_center(Uuid::new_v4(), &[0.2, 0.2, 0.2]),
            Err(RhythmError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_inconsistent_model_rejected() {
        let mut store = InMemoryModelStore::new();
        let user = store.register_user("alice").unwrap();
        let broken = Model {
            dimension: 5,
            ..model()
        };
        assert!(store.save_model(user.id, &broken).is_err());
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("models.json");
        let mut store = JsonFileModelStore::open(&path).unwrap();

        assert!(matches!(store.register_user("alice"), Err(RhythmError::Io(_))));
        assert_eq!(store.find_user("alice").unwrap(), None);
        assert_eq!(store.document().user_count(), 0);

        let id = Uuid::new_v4();
        assert!(store.save_model(id, &model()).is_err());
        assert_eq!(store.load_model(id).unwrap(), None);
    }

    #[test]
    fn test_stored_zero_scale_model_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"users":[],"models":{{"{id}":{{"model":{{"dimension":1,"center":[0.1],"scale":[0.0],"threshold":1.0}},"updated_at":"2024-01-01T00:00:00Z"}}}}}}"#
        );
        fs::write(&path, json).unwrap();

        let store = JsonFileModelStore::open(&path).unwrap();
        assert!(matches!(
            store.load_model(id),
            Err(RhythmError::StorageError(_))
        ));
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");

        let user_id = {
            let mut store = JsonFileModelStore::open(&path).unwrap();
            let user = store.register_user("alice").unwrap();
            store.save_model(user.id, &model()).unwrap();
            user.id
        };

        let reopened = JsonFileModelStore::open(&path).unwrap();
        let user = reopened.find_user("alice").unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(reopened.load_model(user_id).unwrap(), Some(model()));
        assert!(!dir.path().join("models.json.tmp").exists());
    }

    #[test]
    fn test_json_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileModelStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.document().user_count(), 0);
        assert_eq!(store.find_user("alice").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFileModelStore::open(&path),
            Err(RhythmError::JsonError(_))
        ));
    }
}
