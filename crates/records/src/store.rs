//! Persistance locale par clé `(collection, utilisateur)`
//!
//! Chaque collection d'un utilisateur est un fichier JSON contenant un
//! tableau. Le fichier est relu à chaque opération ; un fichier absent
//! est une liste vide.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Collection, Insertion, Record, RecordsError, RecordsResult};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Éléments de la collection, dans l'ordre stocké
    async fn load(&self, user_id: &str, collection: Collection) -> RecordsResult<Vec<Value>>;

    /// Ajoute un élément en respectant l'ordre d'insertion de la collection
    async fn save(&self, user_id: &str, collection: Collection, item: Value) -> RecordsResult<()>;
}

/// Charge une collection typée
pub async fn load_records<R: Record>(store: &dyn RecordStore, user_id: &str) -> RecordsResult<Vec<R>> {
    store
        .load(user_id, R::COLLECTION)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(RecordsError::from))
        .collect()
}

pub async fn save_record<R: Record>(store: &dyn RecordStore, user_id: &str, record: &R) -> RecordsResult<()> {
    let value = serde_json::to_value(record)?;
    store.save(user_id, R::COLLECTION, value).await
}

/// Un fichier `<collection>_<utilisateur>.json` par clé, sous `root`
pub struct JsonFileStore {
    root: PathBuf,
    /// Sérialise les lecture-modification-écriture de ce processus
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, user_id: &str, collection: Collection) -> RecordsResult<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RecordsError::InvalidKey(user_id.to_string()));
        }
        Ok(self.root.join(format!("{}_{}.json", collection.key(), user_id)))
    }

    async fn read(path: &Path) -> RecordsResult<Vec<Value>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, user_id: &str, collection: Collection) -> RecordsResult<Vec<Value>> {
        let path = self.path_for(user_id, collection)?;
        Self::read(&path).await
    }

    async fn save(&self, user_id: &str, collection: Collection, item: Value) -> RecordsResult<()> {
        let path = self.path_for(user_id, collection)?;
        let _guard = self.write_lock.lock().await;

        let mut items = Self::read(&path).await?;
        match collection.insertion() {
            Insertion::Prepend => items.insert(0, item),
            Insertion::Append => items.push(item),
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let content = serde_json::to_string_pretty(&items)?;

        // Écriture complète puis renommage : jamais de fichier à moitié écrit
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(collection = collection.key(), user_id, count = items.len(), "Collection enregistrée");
        Ok(())
    }
}
