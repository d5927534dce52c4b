//! Result Cache (component G): a content-addressed cache of fully rendered
//! findings, distinct from the Analyzer-Info Store (F) — this stores
//! complete finding blobs keyed on (path, configuration, content hash) and
//! is meant to short-circuit preprocessing/tokenizing/checking entirely on
//! a hit.
//!
//! Grounded in `original_source/lib/cache.h`/`cache.cpp` in full: SHA3-512
//! over the preprocessed source, base64-encoded without line breaks, and an
//! XML tree of `<File Path=".." Configuration=".." Size=".." Hash="..">`.

use crate::error::{AnalysisError, Result};
use crate::path_utils::to_portable;
use crate::types::Finding;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};
use std::collections::HashMap;
use std::path::Path;

/// `CalcHash`: SHA3-512 of `code`, base64-encoded without line breaks.
pub fn calc_hash(code: &str) -> String {
    let mut hasher = Sha3_512::new();
    hasher.update(code.as_bytes());
    let digest = hasher.finalize();
    STANDARD_NO_PAD.encode(digest)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    size: usize,
    hash: String,
    reports: Vec<Finding>,
}

/// In-memory cache tree, loaded once at start and persisted on explicit
/// [`ResultCache::save`] (spec §3.2, §4.5).
#[derive(Default)]
pub struct ResultCache {
    entries: HashMap<(String, String), CacheEntry>,
    path: Option<std::path::PathBuf>,
}

impl ResultCache {
    pub fn new() -> Self {
        ResultCache::default()
    }

    /// Parses a single XML cache file into memory. A missing file yields an
    /// empty, still-usable cache (first run populates it).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut cache = ResultCache {
            entries: HashMap::new(),
            path: Some(path.to_path_buf()),
        };
        let Ok(text) = std::fs::read_to_string(path) else {
            return Ok(cache);
        };
        cache.entries = parse_cache_xml(&text)?;
        Ok(cache)
    }

    /// `report_cached(path, cfg, code)`: true iff an entry exists whose
    /// `size`/`hash` match `code` exactly.
    pub fn has_hit(&self, path: &str, cfg: &str, code: &str) -> bool {
        self.lookup(path, cfg, code).is_some()
    }

    /// Returns the cached reports on a hit, `None` on any mismatch or
    /// missing entry.
    pub fn lookup(&self, path: &str, cfg: &str, code: &str) -> Option<&[Finding]> {
        let key = (to_portable(path), cfg.to_string());
        let entry = self.entries.get(&key)?;
        if entry.size != code.len() {
            return None;
        }
        if entry.hash != calc_hash(code) {
            return None;
        }
        Some(&entry.reports)
    }

    /// Upserts the entry for (path, cfg): later calls with the same key
    /// replace earlier ones, per spec §3.2.
    pub fn cache(&mut self, path: &str, cfg: &str, code: &str, reports: Vec<Finding>) {
        let key = (to_portable(path), cfg.to_string());
        self.entries.insert(
            key,
            CacheEntry {
                size: code.len(),
                hash: calc_hash(code),
                reports,
            },
        );
    }

    pub fn remove(&mut self, path: &str, cfg: &str) {
        self.entries.remove(&(to_portable(path), cfg.to_string()));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the in-memory tree to the path given at [`ResultCache::load`]
    /// time, or to `path` if provided explicitly.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let target = path
            .map(|p| p.to_path_buf())
            .or_else(|| self.path.clone())
            .ok_or_else(|| AnalysisError::Config("no cache path to save to".to_string()))?;

        let mut files = Vec::with_capacity(self.entries.len());
        for ((path, cfg), entry) in &self.entries {
            let mut report = Vec::with_capacity(entry.reports.len());
            for finding in &entry.reports {
                report.push(serde_json::to_string(finding).map_err(|e| AnalysisError::Xml(e.to_string()))?);
            }
            files.push(FileXml {
                path: path.clone(),
                configuration: cfg.clone(),
                size: entry.size,
                hash: entry.hash.clone(),
                report,
            });
        }
        let body = quick_xml::se::to_string(&CacheXml { file: files })
            .map_err(|e| AnalysisError::Xml(e.to_string()))?;
        let out = format!("<?xml version=\"1.0\"?>\n{body}\n");
        std::fs::write(&target, out).map_err(AnalysisError::Io)
    }
}

/// `<CppCheckCache><File Path=".." Configuration=".." Size=".." Hash="..">`
/// round-tripped through `quick-xml`'s serde support, the same approach
/// `suppressions.rs` uses for the suppression-list XML form.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "CppCheckCache")]
struct CacheXml {
    #[serde(rename = "File", default)]
    file: Vec<FileXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileXml {
    #[serde(rename = "@Path")]
    path: String,
    #[serde(rename = "@Configuration")]
    configuration: String,
    #[serde(rename = "@Size")]
    size: usize,
    #[serde(rename = "@Hash")]
    hash: String,
    #[serde(rename = "Report", default)]
    report: Vec<String>,
}

fn parse_cache_xml(text: &str) -> Result<HashMap<(String, String), CacheEntry>> {
    let parsed: CacheXml = quick_xml::de::from_str(text).map_err(|e| AnalysisError::Xml(e.to_string()))?;
    let mut entries = HashMap::new();
    for file in parsed.file {
        let reports = file
            .report
            .iter()
            .filter_map(|blob| serde_json::from_str::<Finding>(blob).ok())
            .collect();
        entries.insert(
            (file.path, file.configuration),
            CacheEntry {
                size: file.size,
                hash: file.hash,
                reports,
            },
        );
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    #[test]
    fn hash_matches_known_algorithm_shape() {
        // SHA3-512/base64, no line breaks: exercised structurally rather
        // than against a fixed vector (algorithm choice is the contract).
        let h1 = calc_hash("int main(){}");
        let h2 = calc_hash("int main(){}");
        assert_eq!(h1, h2);
        assert!(!h1.contains('\n'));
    }

    #[test]
    fn cache_hit_implies_replay_and_one_byte_change_misses() {
        let mut cache = ResultCache::new();
        let code = "int main(){return 0;}";
        let findings = vec![Finding::new("style", Severity::Style, "trivial")];
        cache.cache("src/a.cpp", "", code, findings.clone());

        assert!(cache.has_hit("src/a.cpp", "", code));
        let replayed = cache.lookup("src/a.cpp", "", code).unwrap();
        assert_eq!(replayed.len(), 1);

        let mutated = "int main(){return 1;}";
        assert!(!cache.has_hit("src/a.cpp", "", mutated));
    }

    #[test]
    fn upsert_replaces_old_entry() {
        let mut cache = ResultCache::new();
        cache.cache("a.cpp", "", "code1", vec![Finding::new("a", Severity::Style, "x")]);
        cache.cache("a.cpp", "", "code2", vec![]);
        assert!(!cache.has_hit("a.cpp", "", "code1"));
        assert!(cache.has_hit("a.cpp", "", "code2"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.xml");
        let mut cache = ResultCache::new();
        cache.cache(
            "src/a.cpp",
            "DEBUG",
            "int x;",
            vec![Finding::new("style", Severity::Style, "unused")],
        );
        cache.save(Some(&path)).unwrap();

        let loaded = ResultCache::load(&path).unwrap();
        assert!(loaded.has_hit("src/a.cpp", "DEBUG", "int x;"));
    }

    #[test]
    fn path_normalization_applied_to_keys() {
        let mut cache = ResultCache::new();
        cache.cache(r"src\a.cpp", "", "code", vec![]);
        assert!(cache.has_hit("src/a.cpp", "", "code"));
    }
}
