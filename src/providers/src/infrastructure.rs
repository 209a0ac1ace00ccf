//! Infrastructure repository provider
//!
//! Scans a local checkout of the configuration-management repository for
//! remaining references to a subject: a line consisting of the bare local
//! part (optionally as a quoted list item), or any line containing the full
//! identity. Every hit is reported as `path:line`.

use accessaudit::provider::{LookupResult, ACTIVE_DELETED};
use accessaudit::{AccountStatusProvider, AuditError, LookupError, StatusBucket, Subject, SubjectStatus};
use async_trait::async_trait;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories never scanned
const SKIPPED_DIRS: &[&str] = &[".git", ".terraform", "node_modules"];

/// Files larger than this are skipped
const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

fn reference_pattern(subject: &Subject) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"(?i)^\s*(?:-\s*)?["']?{}["']?,?\s*$|{}"#,
        regex::escape(subject.local_part()),
        regex::escape(subject.identity())
    ))
}

/// Every `path:line` under `root` referencing `subject`
pub fn scan_references(root: &Path, subject: &Subject) -> std::io::Result<Vec<String>> {
    let pattern = reference_pattern(subject)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let mut hits: Vec<(String, usize)> = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                let name = entry.file_name();
                if !SKIPPED_DIRS.iter().any(|skip| name == *skip) {
                    pending.push(path);
                }
                continue;
            }

            if !file_type.is_file() || entry.metadata()?.len() > MAX_FILE_SIZE {
                continue;
            }

            // Binary or non-UTF-8 files cannot hold a roster entry
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };

            let relative = path.strip_prefix(root).unwrap_or(&path).display().to_string();
            for (index, line) in contents.lines().enumerate() {
                if pattern.is_match(line) {
                    hits.push((relative.clone(), index + 1));
                }
            }
        }
    }

    hits.sort();
    Ok(hits
        .into_iter()
        .map(|(path, line)| format!("{}:{}", path, line))
        .collect())
}

pub struct InfrastructureRepoProvider {
    root: PathBuf,
}

impl InfrastructureRepoProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AccountStatusProvider for InfrastructureRepoProvider {
    fn name(&self) -> &str {
        "infrastructure"
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        ACTIVE_DELETED
    }

    async fn prepare(&self) -> accessaudit::Result<()> {
        if !self.root.is_dir() {
            return Err(AuditError::configuration(format!(
                "infrastructure checkout {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn lookup(&self, subject: &Subject) -> LookupResult {
        let root = self.root.clone();
        let target = subject.clone();

        let hits = tokio::task::spawn_blocking(move || scan_references(&root, &target))
            .await
            .map_err(|e| LookupError::Transport(format!("scan aborted: {}", e)))?
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        if hits.is_empty() {
            Err(LookupError::NotFound)
        } else {
            debug!("{} referenced in {} places", subject, hits.len());
            Ok(SubjectStatus::active_with_detail(hits))
        }
    }
}
