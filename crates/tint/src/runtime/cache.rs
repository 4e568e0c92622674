//! On-disk cache of preprocessed effects and compiled entry points.
//!
//! Files are written to a temporary file next to the target and renamed into place,
//! so a reader never sees a partial file.

use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use xxhash_rust::xxh3::Xxh3;

/// Hash of everything that changes the preprocessor output of an effect.
pub fn preprocessor_hash(source: &str, definitions: &[String]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&(definitions.len() as u64).to_le_bytes());
    for definition in definitions {
        hasher.update(&(definition.len() as u64).to_le_bytes());
        hasher.update(definition.as_bytes());
    }
    hasher.update(source.as_bytes());
    hasher.digest()
}

#[derive(Debug, Clone)]
pub struct EffectCache {
    dir: PathBuf,
}

impl EffectCache {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create effect cache at {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn source_path(&self, effect: &str, hash: u64) -> PathBuf {
        self.dir.join(format!("{effect}-{hash:016x}.i"))
    }

    fn entry_point_path(&self, effect: &str, entry_point: &str, hash: u64) -> PathBuf {
        self.dir
            .join(format!("{effect}-{entry_point}-{hash:016x}.cso"))
    }

    pub fn load_source(&self, effect: &str, hash: u64) -> Option<String> {
        read_optional(&self.source_path(effect, hash))
            .ok()
            .flatten()
            .and_then(|data| String::from_utf8(data).ok())
    }

    pub fn save_source(&self, effect: &str, hash: u64, source: &str) -> anyhow::Result<()> {
        persist(&self.dir, &self.source_path(effect, hash), source.as_bytes())
    }

    /// Binary and disassembly of a cached entry point.
    pub fn load_entry_point(
        &self,
        effect: &str,
        entry_point: &str,
        hash: u64,
    ) -> Option<(Vec<u8>, String)> {
        let path = self.entry_point_path(effect, entry_point, hash);
        let code = read_optional(&path).ok()??;
        let disassembly = read_optional(&path.with_extension("asm"))
            .ok()
            .flatten()
            .and_then(|data| String::from_utf8(data).ok())
            .unwrap_or_default();

        trace!("cache hit {}", path.display());
        Some((code, disassembly))
    }

    pub fn save_entry_point(
        &self,
        effect: &str,
        entry_point: &str,
        hash: u64,
        code: &[u8],
        disassembly: &str,
    ) -> anyhow::Result<()> {
        let path = self.entry_point_path(effect, entry_point, hash);
        persist(&self.dir, &path, code)?;
        persist(&self.dir, &path.with_extension("asm"), disassembly.as_bytes())
    }

    /// Deletes every cache file. Returns the number of removed files.
    pub fn clear(&self) -> anyhow::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).context("cannot list effect cache")? {
            let path = entry?.path();
            let is_cache_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "i" | "cso" | "asm"));
            if is_cache_file && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        debug!("removed {removed} effect cache files");
        Ok(removed)
    }
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn persist(dir: &Path, path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let mut file = NamedTempFile::new_in(dir).context("cannot create temporary cache file")?;
    file.write_all(data)?;
    file.persist(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_follows_definitions() {
        let source = "float4 main() : SV_Target { return 0; }";
        let base = preprocessor_hash(source, &[]);
        assert_eq!(base, preprocessor_hash(source, &[]));
        assert_ne!(base, preprocessor_hash(source, &["QUALITY=1".to_string()]));
        assert_ne!(
            preprocessor_hash(source, &["A=1".to_string(), "B=2".to_string()]),
            preprocessor_hash(source, &["A=1;B=2".to_string()])
        );
        assert_ne!(
            preprocessor_hash(source, &["A=1".to_string()]),
            preprocessor_hash(source, &["A=1".to_string(), String::new()])
        );
    }

    #[test]
    fn entries_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EffectCache::new(dir.path().join("cache")).unwrap();

        cache.save_source("Bloom", 7, "#line 1\n").unwrap();
        cache
            .save_entry_point("Bloom", "PS_Blur", 7, &[1, 2, 3], "ps_5_0")
            .unwrap();

        assert_eq!(cache.load_source("Bloom", 7).as_deref(), Some("#line 1\n"));
        assert_eq!(cache.load_source("Bloom", 8), None);
        assert_eq!(
            cache.load_entry_point("Bloom", "PS_Blur", 7),
            Some((vec![1, 2, 3], "ps_5_0".to_string()))
        );

        // Rewrites replace the previous entry
        cache.save_entry_point("Bloom", "PS_Blur", 7, &[4], "").unwrap();
        assert_eq!(
            cache.load_entry_point("Bloom", "PS_Blur", 7),
            Some((vec![4], String::new()))
        );

        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(cache.load_source("Bloom", 7), None);
    }
}
