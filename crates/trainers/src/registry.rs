//! Versioned on-disk model snapshots keyed by algorithm name.
//!
//! Publishing is atomic: the artifact is serialized to a sibling `.tmp`
//! file and renamed into place, so readers only ever open a fully-written
//! snapshot and concurrent scoring during a retrain stays safe. Only the
//! latest snapshot is kept per name.

use crate::error::RegistryError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info};

/// Snapshot store rooted at a directory, one `<name>.json` per algorithm.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// Atomically publish an artifact under `name`, replacing any previous
    /// snapshot.
    pub fn publish<T: Serialize>(&self, name: &str, artifact: &T) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.root)?;
        let tmp = self.root.join(format!("{name}.json.tmp"));
        fs::write(&tmp, serde_json::to_vec(artifact)?)?;
        fs::rename(&tmp, self.snapshot_path(name))?;
        info!(name, "published model snapshot");
        Ok(())
    }

    /// Load the latest snapshot published under `name`.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, RegistryError> {
        let path = self.snapshot_path(name);
        if !path.exists() {
            return Err(RegistryError::ModelNotFound {
                name: name.to_string(),
            });
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot_path(name).exists()
    }

    /// A caching read handle for the snapshot published under `name`.
    pub fn handle<T: DeserializeOwned>(&self, name: &str) -> SnapshotHandle<T> {
        SnapshotHandle {
            registry: self.clone(),
            name: name.to_string(),
            cached: Mutex::new(None),
        }
    }
}

/// Read handle over one named snapshot.
///
/// `latest()` returns the deserialized artifact from memory and only
/// touches disk to check the publication timestamp, reloading when a newer
/// snapshot has been renamed into place. Because publication is atomic, a
/// handle can never observe a half-written artifact.
pub struct SnapshotHandle<T> {
    registry: ModelRegistry,
    name: String,
    cached: Mutex<Option<(SystemTime, Arc<T>)>>,
}

impl<T: DeserializeOwned> SnapshotHandle<T> {
    /// The latest fully-published artifact, loading or reloading as needed.
    pub fn latest(&self) -> Result<Arc<T>, RegistryError> {
        let path = self.registry.snapshot_path(&self.name);
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                return Err(RegistryError::ModelNotFound {
                    name: self.name.clone(),
                })
            }
        };

        let mut cached = self.cached.lock().expect("snapshot handle lock poisoned");
        if let Some((stamp, artifact)) = cached.as_ref() {
            if *stamp == modified {
                return Ok(Arc::clone(artifact));
            }
        }

        debug!(name = %self.name, "loading model snapshot");
        let artifact: Arc<T> = Arc::new(self.registry.load(&self.name)?);
        *cached = Some((modified, Arc::clone(&artifact)));
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        value: u32,
        label: String,
    }

    #[test]
    fn test_publish_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());

        let artifact = Dummy {
            value: 7,
            label: "seven".into(),
        };
        registry.publish("collaborative", &artifact).unwrap();

        let loaded: Dummy = registry.load("collaborative").unwrap();
        assert_eq!(loaded, artifact);
        assert!(registry.contains("collaborative"));
    }

    #[test]
    fn test_missing_snapshot_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());

        let err = registry.load::<Dummy>("svd").unwrap_err();
        assert!(matches!(err, RegistryError::ModelNotFound { ref name } if name == "svd"));
        assert!(!registry.contains("svd"));
    }

    #[test]
    fn test_publish_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());

        registry
            .publish("content", &Dummy { value: 1, label: "a".into() })
            .unwrap();
        registry
            .publish("content", &Dummy { value: 2, label: "b".into() })
            .unwrap();

        let loaded: Dummy = registry.load("content").unwrap();
        assert_eq!(loaded.value, 2);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_handle_sees_republished_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let handle: SnapshotHandle<Dummy> = registry.handle("svd");

        assert!(matches!(
            handle.latest(),
            Err(RegistryError::ModelNotFound { .. })
        ));

        registry
            .publish("svd", &Dummy { value: 1, label: "first".into() })
            .unwrap();
        assert_eq!(handle.latest().unwrap().value, 1);

        // A cached handle picks up a newer publication.
        std::thread::sleep(std::time::Duration::from_millis(20));
        registry
            .publish("svd", &Dummy { value: 2, label: "second".into() })
            .unwrap();
        assert_eq!(handle.latest().unwrap().value, 2);
    }
}
