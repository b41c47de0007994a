//! Content-hash based exploit-definition cache (§3 ExploitDefinition
//! lifecycle, §9 "Caching of definitions").
//!
//! The cache is a single `(hash, value)` slot that never returns a stale
//! value silently: [`DefinitionCache::refresh`] either returns the
//! current-hash set (from cache or freshly validated) or `None` when the
//! file changed but failed validation, in which case the caller keeps using
//! whatever it already had (SchemaDrift, §7).

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::warn;

use crate::config::client_schema::ExploitDefinitionSpec;

fn content_hash(bytes: &[u8]) -> u64 {
    // FNV-1a: cheap, stable across runs, good enough for change detection
    // (not a security boundary).
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

struct CacheSlot {
    hash: u64,
    definitions: Vec<ExploitDefinitionSpec>,
}

pub struct DefinitionCache {
    path: PathBuf,
    slot: RwLock<Option<CacheSlot>>,
}

impl DefinitionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: RwLock::new(None),
        }
    }

    /// Returns the current exploit definitions, reusing the cached set when
    /// the file's bytes are unchanged, revalidating when they differ, and
    /// falling back to the previous set (with a warning) when revalidation
    /// fails. Returns an empty list only if there has never been a valid set.
    pub fn refresh(&self) -> Vec<ExploitDefinitionSpec> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "exploit definitions file unreadable, reusing cache");
                return self.cached_or_empty();
            }
        };
        let hash = content_hash(&bytes);

        {
            let guard = self.slot.read().unwrap_or_else(|p| p.into_inner());
            if let Some(slot) = guard.as_ref() {
                if slot.hash == hash {
                    return slot.definitions.clone();
                }
            }
        }

        match super::load_client_config(&self.path) {
            Ok(config) => {
                let mut guard = self.slot.write().unwrap_or_else(|p| p.into_inner());
                *guard = Some(CacheSlot {
                    hash,
                    definitions: config.exploits.clone(),
                });
                config.exploits
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "new exploit definitions failed validation, reusing previous set");
                self.cached_or_empty()
            }
        }
    }

    fn cached_or_empty(&self) -> Vec<ExploitDefinitionSpec> {
        self.slot
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|s| s.definitions.clone())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fast_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const VALID: &str = r#"
connect:
  protocol: http
  host: 127.0.0.1
  port: 2023
  player: alice
listener:
  host: 127.0.0.1
  port: 9999
config:
  flag_format: "FLAG\\{.*\\}"
exploits:
  - name: example
    targets: ["10.0.0.1"]
    run: "echo [ip]"
"#;

    #[test]
    fn loads_valid_definitions() {
        let file = write_fast_yaml(VALID);
        let cache = DefinitionCache::new(file.path());
        let defs = cache.refresh();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "example");
    }

    #[test]
    fn reuses_cache_when_hash_unchanged() {
        let file = write_fast_yaml(VALID);
        let cache = DefinitionCache::new(file.path());
        let first = cache.refresh();
        let second = cache.refresh();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn falls_back_to_previous_set_on_invalid_rewrite() {
        let mut file = write_fast_yaml(VALID);
        let cache = DefinitionCache::new(file.path());
        let first = cache.refresh();
        assert_eq!(first.len(), 1);

        file.as_file_mut().set_len(0).unwrap();
        use std::io::Seek;
        file.as_file_mut().seek(std::io::SeekFrom::Start(0)).unwrap();
        file.write_all(b"not: valid: yaml: at: all: [").unwrap();
        file.flush().unwrap();

        let second = cache.refresh();
        assert_eq!(second.len(), 1, "invalid rewrite should keep the previous set");
    }
}
