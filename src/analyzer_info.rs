//! Analyzer-Info Store (component F): per-file sidecar records under a
//! build directory, checksum-gated, round-tripping findings and checker
//! summaries.
//!
//! Grounded in `original_source/lib/analyzerinfo.cpp` in full: the
//! `files.txt` stem-disambiguation scheme, the checksum-gate in
//! `skipAnalysis`, and the fallback naming in `getAnalyzerInfoFile`.

use crate::error::{AnalysisError, Result};
use crate::path_utils::{stem, to_portable};
use crate::types::Finding;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes `<buildDir>/files.txt`, disambiguating sources that share a
/// basename with a monotonically increasing `aN` suffix per stem, exactly
/// as `AnalyzerInformation::writeFilesTxt` computes it.
pub fn write_files_txt(build_dir: &Path, entries: &[(String, String)]) -> Result<()> {
    fs::create_dir_all(build_dir).map_err(AnalysisError::Io)?;
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut out = String::new();
    for (cfg, source_path) in entries {
        let base = stem(source_path);
        let count = counts.entry(base.clone()).or_insert(0);
        *count += 1;
        out.push_str(&format!("{base}.a{count}:{cfg}:{}\n", to_portable(source_path)));
    }
    let path = build_dir.join("files.txt");
    fs::write(path, out).map_err(AnalysisError::Io)
}

/// Incremental counterpart to [`write_files_txt`]: allocates one
/// disambiguated sidecar path per `(config, source_path)` pair as analysis
/// proceeds, appending its `files.txt` line immediately rather than
/// batching the whole table until the end. Without this, two files sharing
/// a basename (`src/a/foo.cpp`, `src/b/foo.cpp`) would both fall back to
/// `foo.cpp.analyzerinfo` and overwrite each other's sidecar before
/// `files.txt` ever got a chance to disambiguate them — the counters here
/// are guarded by one mutex so that holds across the worker pool (spec §5).
#[derive(Default)]
pub struct FilesTxtAllocator {
    counts: std::sync::Mutex<HashMap<String, u32>>,
}

impl FilesTxtAllocator {
    pub fn new() -> Self {
        FilesTxtAllocator::default()
    }

    /// Returns the sidecar path to write `(source_path, cfg)` to, creating
    /// `build_dir` and appending the corresponding `files.txt` line.
    pub fn allocate(&self, build_dir: &Path, source_path: &str, cfg: &str) -> Result<PathBuf> {
        fs::create_dir_all(build_dir).map_err(AnalysisError::Io)?;
        let base = stem(source_path);
        let count = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(base.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let stem_name = format!("{base}.a{count}");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(build_dir.join("files.txt"))
            .map_err(AnalysisError::Io)?;
        writeln!(file, "{stem_name}:{cfg}:{}", to_portable(source_path)).map_err(AnalysisError::Io)?;
        Ok(build_dir.join(stem_name))
    }
}

/// `getAnalyzerInfoFile`: looks up `files.txt` for a `stem.aN` entry ending
/// in `:cfg:sourcefile`; falls back to `<buildDir>/<basename>.analyzerinfo`
/// when no entry matches (e.g. `files.txt` hasn't been written yet).
pub fn analyzer_info_path(build_dir: &Path, source_file: &str, cfg: &str) -> PathBuf {
    let files_txt = build_dir.join("files.txt");
    let suffix = format!(":{cfg}:{}", to_portable(source_file));
    if let Ok(contents) = fs::read_to_string(&files_txt) {
        for line in contents.lines() {
            if line.len() <= suffix.len() + 2 || !line.ends_with(&suffix) {
                continue;
            }
            if let Some(stem_part) = line.split(':').next() {
                return build_dir.join(stem_part);
            }
        }
    }
    let base = to_portable(source_file);
    let name = base.rsplit('/').next().unwrap_or(&base);
    build_dir.join(format!("{name}.analyzerinfo"))
}

/// A fully-read sidecar: the recorded findings plus opaque per-checker
/// summary blobs.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerInfoRecord {
    pub checksum: u64,
    pub findings: Vec<Finding>,
    pub checker_summaries: HashMap<String, String>,
}

/// Presence-and-checksum is the only validity gate (spec §4.6); any
/// structural or checksum mismatch is treated as "not present", matching
/// `skipAnalysis`'s tolerant failure mode.
pub fn try_load(path: &Path, expected_checksum: u64) -> Option<AnalyzerInfoRecord> {
    let text = fs::read_to_string(path).ok()?;
    parse_analyzer_info(&text, expected_checksum)
}

/// Reads `<analyzerinfo checksum="..">` with `quick-xml`'s tokenizing
/// `Reader` rather than string slicing, so attribute order/spacing can
/// never desync the parse. `<FileInfo>` bodies are still sliced out of the
/// source by byte offset rather than structurally modeled: they are the
/// opaque, checker-owned blobs of spec §3.1 (e.g. `<functiondecl>`/
/// `<functioncall>` fragments) which this component only stores and
/// forwards, never interprets.
fn parse_analyzer_info(text: &str, expected_checksum: u64) -> Option<AnalyzerInfoRecord> {
    let mut reader = Reader::from_str(text);

    let mut record = AnalyzerInfoRecord::default();
    let mut checksum_ok = false;
    let mut root_closed = false;
    let mut current_finding: Option<Finding> = None;
    let mut current_check: Option<String> = None;
    let mut file_info_start = 0usize;

    loop {
        let pos_before = reader.buffer_position() as usize;
        let event = reader.read_event().ok()?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"analyzerinfo" => {
                let checksum: u64 = attr(&e, b"checksum")?.parse().ok()?;
                if checksum != expected_checksum {
                    return None;
                }
                checksum_ok = true;
            }
            Event::Start(e) if e.name().as_ref() == b"error" => {
                let mut finding = Finding::new(
                    attr(&e, b"id").unwrap_or_default(),
                    attr(&e, b"severity")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(crate::types::Severity::Information),
                    attr(&e, b"msg").unwrap_or_default(),
                );
                finding.verbose_message = attr(&e, b"verbose").unwrap_or_default();
                finding.cwe = attr(&e, b"cwe").and_then(|v| v.parse().ok()).unwrap_or(0);
                finding.hash = attr(&e, b"hash").and_then(|v| v.parse().ok()).unwrap_or(0);
                finding.file0 = attr(&e, b"file0").unwrap_or_default();
                if attr(&e, b"inconclusive").as_deref() == Some("true") {
                    finding.certainty = crate::types::Certainty::Inconclusive;
                }
                current_finding = Some(finding);
            }
            Event::Empty(e) if e.name().as_ref() == b"location" => {
                if let Some(finding) = current_finding.as_mut() {
                    let loc = crate::types::Location::new(
                        attr(&e, b"file").unwrap_or_default(),
                        attr(&e, b"line").and_then(|v| v.parse().ok()).unwrap_or(-1),
                        attr(&e, b"column").and_then(|v| v.parse().ok()).unwrap_or(0),
                    )
                    .with_info(attr(&e, b"info").unwrap_or_default());
                    finding.call_stack.push(loc);
                }
            }
            Event::Start(e) if e.name().as_ref() == b"symbol" => {
                if let Ok(Event::Text(t)) = reader.read_event() {
                    if let Ok(text) = t.unescape() {
                        if let Some(finding) = current_finding.take() {
                            current_finding = Some(finding.with_symbol(text.into_owned()));
                        }
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == b"error" => {
                if let Some(finding) = current_finding.take() {
                    record.findings.push(finding);
                }
            }
            Event::Start(e) if e.name().as_ref() == b"FileInfo" => {
                current_check = attr(&e, b"check");
                file_info_start = reader.buffer_position() as usize;
            }
            Event::End(e) if e.name().as_ref() == b"FileInfo" => {
                if let Some(check) = current_check.take() {
                    let blob = text.get(file_info_start..pos_before).unwrap_or("").to_string();
                    record.checker_summaries.insert(check, blob);
                }
            }
            Event::End(e) if e.name().as_ref() == b"analyzerinfo" => {
                root_closed = true;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !checksum_ok || !root_closed {
        // Either never found the root element's checksum, or the file is a
        // partial write from an abnormal termination (spec §4.6 atomicity).
        return None;
    }
    record.checksum = expected_checksum;
    Some(record)
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Incrementally built sidecar writer: open at pass entry, write findings
/// and checker summaries as they are produced, close at pass end. A
/// partially-written file (process killed mid-pass) fails the checksum or
/// structural check on the next run and is rewritten from scratch.
pub struct SidecarWriter {
    writer: Writer<fs::File>,
    path: PathBuf,
}

fn xml_err(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Xml(e.to_string())
}

impl SidecarWriter {
    pub fn open(path: PathBuf, checksum: u64) -> Result<Self> {
        let file = fs::File::create(&path).map_err(AnalysisError::Io)?;
        let mut writer = Writer::new(file);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .map_err(xml_err)?;
        let mut start = BytesStart::new("analyzerinfo");
        start.push_attribute(("checksum", checksum.to_string().as_str()));
        writer.write_event(Event::Start(start)).map_err(xml_err)?;
        Ok(SidecarWriter { writer, path })
    }

    pub fn write_finding(&mut self, finding: &Finding) -> Result<()> {
        write_finding_xml(&mut self.writer, finding)
    }

    /// `blob` is a checker-owned, already-well-formed XML fragment (spec
    /// §3.1's opaque summary blob), not character data — it is written
    /// as-is rather than through a text event, which would escape its `<`.
    pub fn write_file_info(&mut self, check: &str, blob: &str) -> Result<()> {
        if blob.is_empty() {
            return Ok(());
        }
        let mut start = BytesStart::new("FileInfo");
        start.push_attribute(("check", check));
        self.writer.write_event(Event::Start(start)).map_err(xml_err)?;
        self.writer.get_mut().write_all(blob.as_bytes()).map_err(AnalysisError::Io)?;
        self.writer
            .write_event(Event::End(BytesEnd::new("FileInfo")))
            .map_err(xml_err)
    }

    pub fn close(mut self) -> Result<PathBuf> {
        self.writer
            .write_event(Event::End(BytesEnd::new("analyzerinfo")))
            .map_err(xml_err)?;
        Ok(self.path)
    }
}

fn write_finding_xml(writer: &mut Writer<fs::File>, finding: &Finding) -> Result<()> {
    let mut start = BytesStart::new("error");
    start.push_attribute(("id", finding.id.as_str()));
    start.push_attribute(("severity", finding.severity.as_str()));
    start.push_attribute(("msg", finding.short_message.as_str()));
    start.push_attribute(("verbose", finding.verbose_message.as_str()));
    start.push_attribute(("cwe", finding.cwe.to_string().as_str()));
    start.push_attribute(("hash", finding.hash.to_string().as_str()));
    start.push_attribute(("file0", finding.file0.as_str()));
    if finding.certainty == crate::types::Certainty::Inconclusive {
        start.push_attribute(("inconclusive", "true"));
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;

    for loc in &finding.call_stack {
        let mut location = BytesStart::new("location");
        location.push_attribute(("file", loc.file_name.as_str()));
        location.push_attribute(("line", loc.line.to_string().as_str()));
        location.push_attribute(("column", loc.column.to_string().as_str()));
        location.push_attribute(("info", loc.info.as_str()));
        writer.write_event(Event::Empty(location)).map_err(xml_err)?;
    }
    for symbol in finding.symbols() {
        writer.write_event(Event::Start(BytesStart::new("symbol"))).map_err(xml_err)?;
        writer.write_event(Event::Text(BytesText::new(symbol))).map_err(xml_err)?;
        writer.write_event(Event::End(BytesEnd::new("symbol"))).map_err(xml_err)?;
    }
    writer.write_event(Event::End(BytesEnd::new("error"))).map_err(xml_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_disambiguates_same_basename_incrementally() {
        let tmp = tempfile::tempdir().unwrap();
        let allocator = FilesTxtAllocator::new();
        let a = allocator.allocate(tmp.path(), "src/a/foo.cpp", "").unwrap();
        let b = allocator.allocate(tmp.path(), "src/b/foo.cpp", "").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, tmp.path().join("foo.a1"));
        assert_eq!(b, tmp.path().join("foo.a2"));
        let text = fs::read_to_string(tmp.path().join("files.txt")).unwrap();
        assert!(text.contains("foo.a1::src/a/foo.cpp"));
        assert!(text.contains("foo.a2::src/b/foo.cpp"));
    }

    #[test]
    fn files_txt_disambiguates_same_basename() {
        let tmp = tempfile::tempdir().unwrap();
        write_files_txt(
            tmp.path(),
            &[
                ("".to_string(), "src/a/foo.cpp".to_string()),
                ("".to_string(), "src/b/foo.cpp".to_string()),
            ],
        )
        .unwrap();
        let text = fs::read_to_string(tmp.path().join("files.txt")).unwrap();
        assert!(text.contains("foo.a1::src/a/foo.cpp"));
        assert!(text.contains("foo.a2::src/b/foo.cpp"));
    }

    #[test]
    fn analyzer_info_path_resolves_from_files_txt() {
        let tmp = tempfile::tempdir().unwrap();
        write_files_txt(tmp.path(), &[("cfg".to_string(), "src/foo.cpp".to_string())]).unwrap();
        let path = analyzer_info_path(tmp.path(), "src/foo.cpp", "cfg");
        assert_eq!(path, tmp.path().join("foo.a1"));
    }

    #[test]
    fn analyzer_info_path_falls_back_without_files_txt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = analyzer_info_path(tmp.path(), "src/foo.cpp", "cfg");
        assert_eq!(path, tmp.path().join("foo.cpp.analyzerinfo"));
    }

    #[test]
    fn sidecar_round_trips_checksum_gate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("foo.analyzerinfo");
        let writer = SidecarWriter::open(path.clone(), 42).unwrap();
        writer.close().unwrap();

        assert!(try_load(&path, 42).is_some());
        assert!(try_load(&path, 43).is_none());
    }

    #[test]
    fn partial_file_is_treated_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("foo.analyzerinfo");
        std::fs::write(&path, "<?xml version=\"1.0\"?>\n<analyzerinfo checksum=\"42\">\n").unwrap();
        assert!(try_load(&path, 42).is_none());
    }

    #[test]
    fn finding_and_file_info_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("foo.analyzerinfo");
        let mut writer = SidecarWriter::open(path.clone(), 7).unwrap();
        let finding = crate::types::Finding::new("nullPointer", crate::types::Severity::Error, "msg")
            .at(crate::types::Location::new("foo.cpp", 3, 1));
        writer.write_finding(&finding).unwrap();
        writer.write_file_info("unusedFunctions", "<functiondecl name=\"foo\"/>\n").unwrap();
        writer.close().unwrap();

        let record = try_load(&path, 7).unwrap();
        assert_eq!(record.checker_summaries.get("unusedFunctions").unwrap().trim(), "<functiondecl name=\"foo\"/>");
        assert_eq!(record.findings.len(), 1);
        assert_eq!(record.findings[0].id, "nullPointer");
        assert_eq!(record.findings[0].call_stack[0].line, 3);
    }
}
