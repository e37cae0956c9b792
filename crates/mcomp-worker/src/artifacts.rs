//! Tracking and removal of per-job filesystem artifacts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use mcomp_models::JobId;

#[derive(Debug)]
struct Artifact {
    path: PathBuf,
    retained: bool,
}

#[derive(Debug, Default)]
struct JobArtifacts {
    artifacts: Vec<Artifact>,
    terminal_since: Option<Instant>,
}

/// Owns every path created for a job until it is removed or handed off.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    jobs: Mutex<HashMap<JobId, JobArtifacts>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobArtifacts>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind `path` to `job_id`.
    pub fn register(&self, job_id: &JobId, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(job_id = %job_id, path = %path.display(), "Registered artifact");
        let mut jobs = self.lock();
        let entry = jobs.entry(job_id.clone()).or_default();
        if !entry.artifacts.iter().any(|a| a.path == path) {
            entry.artifacts.push(Artifact {
                path,
                retained: false,
            });
        }
    }

    /// Keep `path` through [`release_all`](Self::release_all) for delivery.
    pub fn retain(&self, job_id: &JobId, path: &Path) -> bool {
        let mut jobs = self.lock();
        let Some(entry) = jobs.get_mut(job_id) else {
            return false;
        };
        match entry.artifacts.iter_mut().find(|a| a.path == path) {
            Some(artifact) => {
                artifact.retained = true;
                true
            }
            None => false,
        }
    }

    /// Remove every non-retained artifact of a finished job.
    ///
    /// Missing files count as removed. Calling it again is a no-op.
    pub fn release_all(&self, job_id: &JobId) -> usize {
        let pending: Vec<PathBuf> = {
            let mut jobs = self.lock();
            let Some(entry) = jobs.get_mut(job_id) else {
                return 0;
            };
            entry.terminal_since.get_or_insert_with(Instant::now);
            let (retained, released): (Vec<_>, Vec<_>) =
                entry.artifacts.drain(..).partition(|a| a.retained);
            entry.artifacts = retained;
            if entry.artifacts.is_empty() {
                jobs.remove(job_id);
            }
            released.into_iter().map(|a| a.path).collect()
        };

        self.remove_paths(job_id, pending)
    }

    /// The transport delivered the retained output; remove everything left.
    pub fn acknowledge_delivery(&self, job_id: &JobId) -> usize {
        let pending: Vec<PathBuf> = match self.lock().remove(job_id) {
            Some(entry) => entry.artifacts.into_iter().map(|a| a.path).collect(),
            None => return 0,
        };
        self.remove_paths(job_id, pending)
    }

    /// Record that `job_id` reached a terminal status at `since`.
    ///
    /// Lets [`sweep_orphans`](Self::sweep_orphans) collect jobs whose
    /// [`release_all`](Self::release_all) never ran. An earlier mark wins.
    pub fn mark_terminal(&self, job_id: &JobId, since: Instant) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(job_id) {
            Some(entry) => {
                let marked = entry.terminal_since.get_or_insert(since);
                if since < *marked {
                    *marked = since;
                }
                true
            }
            None => false,
        }
    }

    /// Remove artifacts of jobs that have been terminal for longer than `max_age`,
    /// including retained outputs nobody collected.
    pub fn sweep_orphans(&self, max_age: Duration) -> usize {
        let expired: Vec<(JobId, Vec<PathBuf>)> = {
            let mut jobs = self.lock();
            let ids: Vec<JobId> = jobs
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .terminal_since
                        .is_some_and(|since| since.elapsed() >= max_age)
                })
                .map(|(id, _)| id.clone())
                .collect();

            ids.into_iter()
                .filter_map(|id| {
                    let entry = jobs.remove(&id)?;
                    let paths = entry.artifacts.into_iter().map(|a| a.path).collect();
                    Some((id, paths))
                })
                .collect()
        };

        expired
            .into_iter()
            .map(|(id, paths)| self.remove_paths(&id, paths))
            .sum()
    }

    /// Stop tracking a job's artifacts without touching the files.
    pub fn forget(&self, job_id: &JobId) -> Vec<PathBuf> {
        self.lock()
            .remove(job_id)
            .map(|entry| entry.artifacts.into_iter().map(|a| a.path).collect())
            .unwrap_or_default()
    }

    /// Paths currently tracked for a job.
    pub fn tracked(&self, job_id: &JobId) -> Vec<PathBuf> {
        self.lock()
            .get(job_id)
            .map(|entry| entry.artifacts.iter().map(|a| a.path.clone()).collect())
            .unwrap_or_default()
    }

    /// Retained paths of a job awaiting delivery.
    pub fn retained(&self, job_id: &JobId) -> Vec<PathBuf> {
        self.lock()
            .get(job_id)
            .map(|entry| {
                entry
                    .artifacts
                    .iter()
                    .filter(|a| a.retained)
                    .map(|a| a.path.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of jobs with tracked artifacts.
    pub fn job_count(&self) -> usize {
        self.lock().len()
    }

    fn remove_paths(&self, job_id: &JobId, paths: Vec<PathBuf>) -> usize {
        let mut removed = 0;
        let mut failed = Vec::new();

        for path in paths {
            match remove_path(&path) {
                Ok(Removal::Removed) => removed += 1,
                Ok(Removal::SkippedDirectory) => {
                    warn!(
                        job_id = %job_id,
                        path = %path.display(),
                        "Artifact is a directory, leaving it in place"
                    );
                }
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        path = %path.display(),
                        "Failed to remove artifact: {}", e
                    );
                    failed.push(path);
                }
            }
        }

        // Keep failures tracked so the next sweep retries them.
        if !failed.is_empty() {
            let mut jobs = self.lock();
            let entry = jobs.entry(job_id.clone()).or_default();
            entry.terminal_since.get_or_insert_with(Instant::now);
            entry.artifacts.extend(failed.into_iter().map(|path| Artifact {
                path,
                retained: false,
            }));
        }

        if removed > 0 {
            debug!(job_id = %job_id, removed, "Removed artifacts");
        }
        removed
    }
}

enum Removal {
    Removed,
    SkippedDirectory,
}

/// Jobs only ever create plain files, so a directory at an artifact path
/// is never removed.
fn remove_path(path: &Path) -> std::io::Result<Removal> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(Removal::SkippedDirectory),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Removal::Removed),
        Err(e) => Err(e),
    }
}
