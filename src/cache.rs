use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::compile::CompiledTemplate;
use crate::error::CompileError;
use crate::style::sha256_hex;

/// Get/put store for compiled templates, injected into the [`crate::Compiler`].
pub trait CompileCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CompiledTemplate>;
    fn put(&self, key: &str, value: &CompiledTemplate);
}

/// Key over everything that changes the output: template text, component name,
/// declared props and the compiler `settings` fingerprint (runtime namespace, scope
/// attribute, registry).
pub fn cache_key(
    template: &str,
    component: Option<&str>,
    props: &[String],
    settings: &str,
) -> String {
    let mut material = String::with_capacity(template.len() + settings.len() + 64);
    material.push_str(settings);
    material.push('\0');
    material.push_str(template);
    material.push('\0');
    material.push_str(component.unwrap_or(""));
    for prop in props {
        material.push('\0');
        material.push_str(prop);
    }
    sha256_hex(&material)
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CompiledTemplate>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CompileCache for MemoryCache {
    fn get(&self, key: &str) -> Option<CompiledTemplate> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: &CompiledTemplate) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.clone());
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    template: CompiledTemplate,
}

/// JSON files under a directory, fronted by a [`MemoryCache`].
pub struct DiskCache {
    dir: PathBuf,
    memory: MemoryCache,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CompileError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CompileError::io(dir.clone(), e))?;
        Ok(Self {
            dir,
            memory: MemoryCache::new(),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("template_{}.json", key))
    }

    fn load(&self, key: &str) -> Option<CompiledTemplate> {
        let path = self.entry_path(key);
        let data = fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<CacheEntry>(&data) {
            Ok(entry) if entry.key == key => Some(entry.template),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "cache entry key mismatch, discarding");
                fs::remove_file(&path).ok();
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cache entry, discarding");
                fs::remove_file(&path).ok();
                None
            }
        }
    }
}

impl CompileCache for DiskCache {
    fn get(&self, key: &str) -> Option<CompiledTemplate> {
        if let Some(hit) = self.memory.get(key) {
            return Some(hit);
        }
        let loaded = self.load(key)?;
        self.memory.put(key, &loaded);
        Some(loaded)
    }

    fn put(&self, key: &str, value: &CompiledTemplate) {
        self.memory.put(key, value);
        let entry = CacheEntry {
            key: key.to_string(),
            template: value.clone(),
        };
        let path = self.entry_path(key);
        match serde_json::to_string(&entry) {
            Ok(data) => {
                if let Err(e) = fs::write(&path, data) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write cache entry");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize cache entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(render: &str) -> CompiledTemplate {
        CompiledTemplate {
            hash: "h".to_string(),
            render: render.to_string(),
            script: None,
            styles: vec![],
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "flow-cache-{}-{}",
            name,
            std::process::id()
        ));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn test_key_depends_on_props() {
        let a = cache_key("<p/>", Some("Card"), &[], "");
        let b = cache_key("<p/>", Some("Card"), &["title".to_string()], "");
        let c = cache_key("<p/>", None, &[], "");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, cache_key("<p/>", Some("Card"), &[], ""));
    }

    #[test]
    fn test_key_depends_on_settings() {
        let v = cache_key("<p/>", None, &[], "v\0data-flow-scope");
        let vue = cache_key("<p/>", None, &[], "Vue\0data-flow-scope");
        assert_ne!(v, vue);
    }

    #[test]
    fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").is_none());
        cache.put("k", &sample("return 1;"));
        assert_eq!(cache.get("k").unwrap().render, "return 1;");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disk_cache_survives_new_instance() {
        let dir = temp_dir("persist");
        DiskCache::new(&dir).unwrap().put("abc", &sample("return 2;"));
        assert!(dir.join("template_abc.json").exists());

        let reopened = DiskCache::new(&dir).unwrap();
        assert_eq!(reopened.get("abc").unwrap().render, "return 2;");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_entry_is_removed() {
        let dir = temp_dir("corrupt");
        let cache = DiskCache::new(&dir).unwrap();
        let path = dir.join("template_bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(cache.get("bad").is_none());
        assert!(!path.exists());
        fs::remove_dir_all(&dir).ok();
    }
}
