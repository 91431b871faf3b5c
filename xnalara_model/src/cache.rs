//! Sharing loaded models between items.
//!
//! The cache only holds weak references.
//! A model is unloaded once the last item using it is dropped.
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::{error::LoadModelError, model::ModelDescriptor, params::ParamsLibrary};

/// Loaded models by canonical file path.
///
/// Models loaded with a parent model have a separate entry for each parent,
/// since the parent changes the bones.
#[derive(Debug, Default)]
pub struct ModelCache {
    models: Mutex<AHashMap<CacheKey, Weak<ModelDescriptor>>>,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
struct CacheKey {
    path: PathBuf,
    parent_path: Option<PathBuf>,
}

impl CacheKey {
    fn new(path: &Path, parent_path: Option<&Path>) -> Self {
        Self {
            path: canonical_path(path),
            parent_path: parent_path.map(canonical_path),
        }
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached model for `path` if any item still uses it.
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<Arc<ModelDescriptor>> {
        let key = CacheKey::new(path.as_ref(), None);
        self.models.lock().get(&key).and_then(Weak::upgrade)
    }

    /// Load a model with [ModelDescriptor::from_file] if it is not already loaded.
    pub fn get_or_load<P: AsRef<Path>>(
        &self,
        path: P,
        library: &ParamsLibrary,
    ) -> Result<Arc<ModelDescriptor>, LoadModelError> {
        let path = path.as_ref();
        self.get_or_insert_with(path, || ModelDescriptor::from_file(path, library))
    }

    /// Load a model for attaching to the model at `parent_path` if it is not already loaded.
    ///
    /// The parent model is loaded or reused from the cache as well.
    /// See [ModelDescriptor::from_file_with_parent].
    pub fn get_or_load_with_parent<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        parent_path: Q,
        library: &ParamsLibrary,
    ) -> Result<Arc<ModelDescriptor>, LoadModelError> {
        let path = path.as_ref();
        let parent_path = parent_path.as_ref();
        let parent = self.get_or_load(parent_path, library)?;
        self.get_or_insert_keyed(CacheKey::new(path, Some(parent_path)), || {
            ModelDescriptor::from_file_with_parent(path, library, Some(&parent))
        })
    }

    /// Return the cached model for `path` or cache the result of `load`.
    ///
    /// The lock is not held while loading, so other threads can access the cache.
    /// Failed loads are never cached.
    pub fn get_or_insert_with<P, F>(
        &self,
        path: P,
        load: F,
    ) -> Result<Arc<ModelDescriptor>, LoadModelError>
    where
        P: AsRef<Path>,
        F: FnOnce() -> Result<ModelDescriptor, LoadModelError>,
    {
        self.get_or_insert_keyed(CacheKey::new(path.as_ref(), None), load)
    }

    fn get_or_insert_keyed<F>(
        &self,
        key: CacheKey,
        load: F,
    ) -> Result<Arc<ModelDescriptor>, LoadModelError>
    where
        F: FnOnce() -> Result<ModelDescriptor, LoadModelError>,
    {
        if let Some(model) = self.models.lock().get(&key).and_then(Weak::upgrade) {
            return Ok(model);
        }

        let model = Arc::new(load()?);

        let mut models = self.models.lock();
        // Another thread may have finished loading the same file first.
        if let Some(existing) = models.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        // Only models in use stay in the map.
        models.retain(|_, model| model.strong_count() > 0);
        models.insert(key, Arc::downgrade(&model));
        Ok(model)
    }

    /// Remove all entries. Models still used by items stay loaded.
    pub fn clear(&self) {
        self.models.lock().clear();
    }

    /// Remove entries for models that are no longer used and return how many were removed.
    ///
    /// Unused entries are also removed whenever a new model is cached.
    pub fn evict_unused(&self) -> usize {
        let mut models = self.models.lock();
        let count = models.len();
        models.retain(|_, model| model.strong_count() > 0);
        count - models.len()
    }

    /// The number of entries including unused models that have not been evicted.
    pub fn len(&self) -> usize {
        self.models.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn canonical_path(path: &Path) -> PathBuf {
    // Files that don't exist fail to load anyway.
    path.canonicalize().unwrap_or_else(|_| path.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    use indexmap::IndexMap;

    use crate::params::ModelParams;

    fn empty_model() -> ModelDescriptor {
        ModelDescriptor {
            bones: Vec::new(),
            root_bone_indices: Vec::new(),
            evaluation_order: Vec::new(),
            meshes: Vec::new(),
            camera_targets: IndexMap::new(),
            base_path: PathBuf::new(),
            header: None,
        }
    }

    #[test]
    fn shared_while_used() {
        let cache = ModelCache::new();
        let a = cache.get_or_insert_with("a.mesh", || Ok(empty_model())).unwrap();
        let b = cache
            .get_or_insert_with("a.mesh", || panic!("model should be cached"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.get("a.mesh").is_some());
    }

    #[test]
    fn unloaded_when_unused() {
        let cache = ModelCache::new();
        let model = cache.get_or_insert_with("a.mesh", || Ok(empty_model())).unwrap();
        drop(model);

        assert!(cache.get("a.mesh").is_none());
        assert_eq!(1, cache.len());
        assert_eq!(1, cache.evict_unused());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_keeps_used_models() {
        let cache = ModelCache::new();
        let a = cache.get_or_insert_with("a.mesh", || Ok(empty_model())).unwrap();
        cache.clear();
        assert!(cache.is_empty());

        // Clearing forces a reload.
        let b = cache.get_or_insert_with("a.mesh", || Ok(empty_model())).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }

    #[test]
    fn errors_not_cached() {
        let cache = ModelCache::new();
        let result = cache.get_or_insert_with("a.mesh", || {
            Err(LoadModelError::FileTypeNotSupported {
                extension: "mesh".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn unused_entries_removed_on_insert() {
        let cache = ModelCache::new();
        for name in ["a.mesh", "b.mesh", "c.mesh", "d.mesh"] {
            let model = cache.get_or_insert_with(name, || Ok(empty_model())).unwrap();
            assert_eq!(1, cache.len());
            drop(model);
        }

        let used = cache.get_or_insert_with("e.mesh", || Ok(empty_model())).unwrap();
        let other = cache.get_or_insert_with("f.mesh", || Ok(empty_model())).unwrap();
        assert_eq!(2, cache.len());
        assert!(Arc::ptr_eq(&used, &cache.get("e.mesh").unwrap()));
        drop(other);
    }

    #[test]
    fn separate_entries_per_parent() {
        let folder = std::env::temp_dir().join("xnalara_model_cache_parent");
        std::fs::create_dir_all(&folder).unwrap();
        let bones = |x: f32| format!("2\nroot\n-1\n0 0 0\nhand\n0\n{x} 0 0\n0\n");
        std::fs::write(folder.join("a.mesh.ascii"), bones(1.0)).unwrap();
        std::fs::write(folder.join("b.mesh.ascii"), bones(2.0)).unwrap();
        std::fs::write(folder.join("sword.mesh.ascii"), bones(0.5)).unwrap();

        let mut library = ParamsLibrary::new();
        for name in ["a", "b", "sword"] {
            library.insert(name, ModelParams::default());
        }

        let sword_path = folder.join("sword.mesh.ascii");
        let cache = ModelCache::new();
        let sword_a = cache
            .get_or_load_with_parent(&sword_path, folder.join("a.mesh.ascii"), &library)
            .unwrap();
        let sword_b = cache
            .get_or_load_with_parent(&sword_path, folder.join("b.mesh.ascii"), &library)
            .unwrap();
        let sword = cache.get_or_load(&sword_path, &library).unwrap();

        assert_eq!(1.0, sword_a.bones[1].position.x);
        assert_eq!(2.0, sword_b.bones[1].position.x);
        assert_eq!(0.5, sword.bones[1].position.x);

        // The parents are cached too.
        assert!(cache.get(folder.join("a.mesh.ascii")).is_some());
        assert!(Arc::ptr_eq(
            &sword_a,
            &cache
                .get_or_load_with_parent(&sword_path, folder.join("a.mesh.ascii"), &library)
                .unwrap()
        ));

        std::fs::remove_dir_all(&folder).unwrap();
    }

    #[test]
    fn get_or_load_missing_file() {
        let cache = ModelCache::new();
        let result = cache.get_or_load("does/not/exist.obj", &ParamsLibrary::new());
        assert!(matches!(result, Err(LoadModelError::File { .. })));
        assert!(cache.is_empty());
    }
}
