// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot namespace layout migration.
//!
//! Two idempotent phases, each guarded by a marker file under the data root:
//!
//! 1. `.namespace-migrated`: flat legacy layouts move into
//!    `<root>/…/<default-ns-id>/` subdirectories (DAG files, dag-runs,
//!    proc, queue, suspend, gitsync, logs).
//! 2. `.namespace-ns-migrated`: `<root>/{data,logs}/<ns>` relocate to
//!    `<root>/{data,logs}/ns/<ns>`.
//!
//! After each phase every `status.jsonl` under the data root is rewritten
//! with a three-step safe replace so log-path prefixes are never scoped
//! twice. Per-file errors are warnings (logged and counted); failing to
//! write a marker aborts the migration.

use dagrun_core::{namespace, Namespace};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const PHASE1_MARKER: &str = ".namespace-migrated";
pub const PHASE2_MARKER: &str = ".namespace-ns-migrated";

/// Subdirectories of `data/` that phase 1 namespaces.
const DATA_SUBDIRS: [&str; 5] = ["dag-runs", "proc", "queue", "suspend", "gitsync"];

/// Log-dir entries that are never namespace content.
const LOGS_ADMIN_DIR: &str = "admin";

/// Placeholder for the three-step safe replace. Contains a control char so
/// it can never collide with a real path fragment.
fn placeholder(i: usize) -> String {
    format!("\u{1}dagrun-ns-scoped-{i}\u{1}")
}

/// Errors that abort the migration
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot move {src}: destination {dst} is inside the source")]
    RecursiveMove { src: PathBuf, dst: PathBuf },
    #[error("failed to write migration marker {marker}: {source}")]
    Marker {
        marker: String,
        #[source]
        source: std::io::Error,
    },
}

/// Counters from one migration run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub phase1_applied: bool,
    pub phase2_applied: bool,
    /// Directories and files relocated.
    pub moved: usize,
    /// `status.jsonl` files whose log paths were rewritten.
    pub rewritten_logs: usize,
    /// Queue documents tagged with a namespace field.
    pub tagged_docs: usize,
    /// Per-file errors that were skipped.
    pub warnings: usize,
}

impl MigrationReport {
    pub fn nothing_to_do(&self) -> bool {
        self.moved == 0 && self.rewritten_logs == 0 && self.tagged_docs == 0
    }
}

/// The namespace layout migrator.
pub struct Migrator {
    root: PathBuf,
    ns: Namespace,
    dry_run: bool,
}

impl Migrator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ns: Namespace::default(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn dags_dir(&self) -> PathBuf {
        self.root.join("dags")
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Conservative detection of a layout needing migration.
    ///
    /// Fresh installs (no directories at all) report `false`.
    pub fn needs_migration(&self) -> Result<bool, MigrationError> {
        // DAG files at the root of the dags dir
        if let Ok(entries) = std::fs::read_dir(self.dags_dir()) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if entry.file_type()?.is_file()
                    && (name.ends_with(".yaml") || name.ends_with(".yml"))
                {
                    return Ok(true);
                }
            }
        }

        // Legacy flat stores, or a phase-2-pending <ns> dir, under data/
        let data = self.data_dir();
        for sub in DATA_SUBDIRS {
            if data.join(sub).is_dir() {
                return Ok(true);
            }
        }
        if let Ok(entries) = std::fs::read_dir(&data) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if entry.file_type()?.is_dir() && namespace::is_valid_id(name) {
                    return Ok(true);
                }
            }
        }

        // Log entries that are neither the admin subdir, the ns/ root,
        // nor a namespace id
        if let Ok(entries) = std::fs::read_dir(self.logs_dir()) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name == LOGS_ADMIN_DIR || name == "ns" {
                    continue;
                }
                if namespace::is_valid_id(name) {
                    return Ok(true); // phase 2 pending
                }
                return Ok(true); // legacy flat log dir
            }
        }

        Ok(false)
    }

    /// Run both phases, each skipped when its marker is present.
    pub fn run(&self) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();

        if !self.root.join(PHASE1_MARKER).exists() {
            self.phase1(&mut report)?;
            report.phase1_applied = true;
        }
        if !self.root.join(PHASE2_MARKER).exists() {
            self.phase2(&mut report)?;
            report.phase2_applied = true;
        }

        Ok(report)
    }

    /// Phase 1: flat legacy layout → `<…>/<ns>/` subdirectories.
    fn phase1(&self, report: &mut MigrationReport) -> Result<(), MigrationError> {
        let ns = self.ns.as_str();

        // DAG definition files
        let dags = self.dags_dir();
        if dags.is_dir() {
            let target = dags.join(ns);
            for entry in std::fs::read_dir(&dags)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name_str) = name.to_str() else { continue };
                if !entry.file_type()?.is_file()
                    || !(name_str.ends_with(".yaml") || name_str.ends_with(".yml"))
                {
                    continue;
                }
                self.rename(&entry.path(), &target.join(&name), report)?;
            }
        }

        // Flat data stores
        let data = self.data_dir();
        for sub in DATA_SUBDIRS {
            let src = data.join(sub);
            if src.is_dir() {
                self.rename(&src, &data.join(ns).join(sub), report)?;
            }
        }

        // Flat log directories (everything except admin and existing ids)
        let logs = self.logs_dir();
        if logs.is_dir() {
            for entry in std::fs::read_dir(&logs)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name_str) = name.to_str() else { continue };
                if name_str == LOGS_ADMIN_DIR
                    || name_str == "ns"
                    || namespace::is_valid_id(name_str)
                {
                    continue;
                }
                self.rename(&entry.path(), &logs.join(ns).join(&name), report)?;
            }
        }

        // Tag queue documents with the namespace they now belong to
        let queue_dir = data.join(ns).join("queue");
        if queue_dir.is_dir() {
            self.tag_json_docs(&queue_dir, report)?;
        }

        self.write_marker(PHASE1_MARKER)?;

        // logs/<dag>/… → logs/<ns>/<dag>/… inside every status document.
        // Both the phase-1 target and the final ns/-scoped form count as
        // already correct.
        let old_prefix = path_prefix(&logs);
        let new_prefix = path_prefix(&logs.join(ns));
        let protected = [path_prefix(&logs.join("ns").join(ns)), new_prefix.clone()];
        self.rewrite_status_logs(&protected, &old_prefix, &new_prefix, report)?;

        info!(moved = report.moved, "namespace migration phase 1 complete");
        Ok(())
    }

    /// Phase 2: `<root>/{data,logs}/<ns>` → `<root>/{data,logs}/ns/<ns>`.
    fn phase2(&self, report: &mut MigrationReport) -> Result<(), MigrationError> {
        for base in [self.data_dir(), self.logs_dir()] {
            if !base.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&base)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name_str) = name.to_str() else { continue };
                if !entry.file_type()?.is_dir() || !namespace::is_valid_id(name_str) {
                    continue;
                }
                self.rename(&entry.path(), &base.join("ns").join(&name), report)?;
            }
        }

        self.write_marker(PHASE2_MARKER)?;

        // logs/<ns>/… → logs/ns/<ns>/… inside every status document
        let ns = self.ns.as_str();
        let old_prefix = path_prefix(&self.logs_dir().join(ns));
        let new_prefix = path_prefix(&self.logs_dir().join("ns").join(ns));
        let protected = [new_prefix.clone()];
        self.rewrite_status_logs(&protected, &old_prefix, &new_prefix, report)?;

        info!(moved = report.moved, "namespace migration phase 2 complete");
        Ok(())
    }

    /// Move one path, refusing a destination inside the source.
    fn rename(
        &self,
        src: &Path,
        dst: &Path,
        report: &mut MigrationReport,
    ) -> Result<(), MigrationError> {
        if dst.starts_with(src) {
            return Err(MigrationError::RecursiveMove {
                src: src.to_owned(),
                dst: dst.to_owned(),
            });
        }
        report.moved += 1;
        if self.dry_run {
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = std::fs::rename(src, dst) {
            warn!(src = %src.display(), dst = %dst.display(), error = %e, "move failed, skipping");
            report.warnings += 1;
            report.moved -= 1;
        }
        Ok(())
    }

    /// Inject `"namespace":"default"` into JSON documents lacking the field.
    fn tag_json_docs(
        &self,
        dir: &Path,
        report: &mut MigrationReport,
    ) -> Result<(), MigrationError> {
        for path in walk_files(dir, "json")? {
            let parsed: Option<serde_json::Value> = std::fs::read_to_string(&path)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok());
            let Some(serde_json::Value::Object(mut obj)) = parsed else {
                warn!(path = %path.display(), "unparseable queue document, skipping");
                report.warnings += 1;
                continue;
            };
            if obj.contains_key("namespace") {
                continue;
            }
            obj.insert(
                "namespace".to_string(),
                serde_json::Value::String(namespace::DEFAULT_NAMESPACE.to_string()),
            );
            report.tagged_docs += 1;
            if self.dry_run {
                continue;
            }
            if let Err(e) = write_atomic(&path, serde_json::Value::Object(obj).to_string()) {
                warn!(path = %path.display(), error = %e, "failed to tag queue document");
                report.warnings += 1;
                report.tagged_docs -= 1;
            }
        }
        Ok(())
    }

    /// Rewrite log-path prefixes inside every `status.jsonl` under data/.
    ///
    /// Three-step safe replace, so a file straddling the migration is never
    /// scoped twice: (a) already-correct prefixes become placeholders,
    /// (b) the old prefix becomes the new prefix, (c) the placeholders are
    /// restored.
    fn rewrite_status_logs(
        &self,
        protected: &[String],
        old_prefix: &str,
        new_prefix: &str,
        report: &mut MigrationReport,
    ) -> Result<(), MigrationError> {
        if !self.data_dir().is_dir() {
            return Ok(());
        }
        for path in walk_files(&self.data_dir(), "jsonl")? {
            if path.file_name().and_then(|n| n.to_str()) != Some("status.jsonl") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable status log, skipping");
                    report.warnings += 1;
                    continue;
                }
            };

            let mut rewritten = content.clone();
            for (i, prefix) in protected.iter().enumerate() {
                rewritten = rewritten.replace(prefix, &placeholder(i));
            }
            rewritten = rewritten.replace(old_prefix, new_prefix);
            for (i, prefix) in protected.iter().enumerate() {
                rewritten = rewritten.replace(&placeholder(i), prefix);
            }

            if rewritten == content {
                continue;
            }
            report.rewritten_logs += 1;
            if self.dry_run {
                continue;
            }
            if let Err(e) = write_atomic(&path, rewritten) {
                warn!(path = %path.display(), error = %e, "failed to rewrite status log");
                report.warnings += 1;
                report.rewritten_logs -= 1;
            }
        }
        Ok(())
    }

    fn write_marker(&self, marker: &str) -> Result<(), MigrationError> {
        if self.dry_run {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root).map_err(|source| MigrationError::Marker {
            marker: marker.to_string(),
            source,
        })?;
        std::fs::write(self.root.join(marker), b"1").map_err(|source| MigrationError::Marker {
            marker: marker.to_string(),
            source,
        })
    }
}

/// Trailing-slash path prefix for string rewriting.
fn path_prefix(path: &Path) -> String {
    format!("{}/", path.display())
}

/// All files with the given extension under `dir`, recursively.
fn walk_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, MigrationError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_owned()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Write content via temp file + rename.
fn write_atomic(path: &Path, content: String) -> std::io::Result<()> {
    use std::io::Write as _;
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
