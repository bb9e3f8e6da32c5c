//! Virtual staging area over an engine's private namespace.
//!
//! Every job stages through a [`StagingScope`]. The scope generates virtual
//! paths from a monotonic counter, tracks every entry it creates or reserves,
//! and removes all of them on [`StagingScope::release`]. If a scope is
//! dropped without being released (the job future was abandoned), removal is
//! scheduled on the current runtime instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};
use transforge_common::paths::{extension, sanitize_name};
use transforge_common::{Direction, Result, TranscodeError};

use super::loader::EngineHandle;

/// A named entry in the engine's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub virtual_path: String,
    pub direction: Direction,
    pub size_bytes: u64,
}

/// Counters for staged entries and cleanup actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingStats {
    /// Entries written or reserved.
    pub staged: u64,
    /// Cleanup actions executed.
    pub cleanups: u64,
}

impl StagingStats {
    /// Entries not yet cleaned up.
    pub fn outstanding(&self) -> u64 {
        self.staged.saturating_sub(self.cleanups)
    }
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicU64,
    staged: AtomicU64,
    cleanups: AtomicU64,
}

/// Path generator and bookkeeping shared by all jobs of one engine.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    counters: Arc<Counters>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StagingStats {
        StagingStats {
            staged: self.counters.staged.load(Ordering::SeqCst),
            cleanups: self.counters.cleanups.load(Ordering::SeqCst),
        }
    }

    /// Open a scope for one job against `engine`.
    pub fn scope(&self, engine: EngineHandle) -> StagingScope {
        StagingScope {
            area: self.clone(),
            engine,
            entries: Vec::new(),
        }
    }

    /// Remove `file` from the engine's namespace.
    ///
    /// Idempotent: a missing entry is not an error, and other removal
    /// failures are logged rather than returned.
    pub async fn cleanup(&self, engine: &EngineHandle, file: &StagedFile) {
        remove_entry(engine, &self.counters, file).await;
    }

    fn allocate(&self, prefix: &str, ext: Option<&str>) -> String {
        let n = self.counters.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        match ext.map(sanitize_name).filter(|e| !e.is_empty()) {
            Some(ext) => format!("{prefix}_{n}.{ext}"),
            None => format!("{prefix}_{n}"),
        }
    }
}

async fn remove_entry(engine: &EngineHandle, counters: &Counters, file: &StagedFile) {
    match engine.delete_file(&file.virtual_path).await {
        Ok(()) => debug!(path = %file.virtual_path, "Removed staged file"),
        Err(e) if e.is_not_found() => {
            trace!(path = %file.virtual_path, "Staged file already absent")
        }
        Err(e) => warn!(
            path = %file.virtual_path,
            error = %e,
            "Failed to remove staged file"
        ),
    }
    counters.cleanups.fetch_add(1, Ordering::SeqCst);
}

/// Staged entries of a single job.
pub struct StagingScope {
    area: StagingArea,
    engine: EngineHandle,
    entries: Vec<StagedFile>,
}

impl StagingScope {
    /// Copy `bytes` into the namespace under a fresh name keeping the
    /// extension of `suggested_name`.
    ///
    /// The entry is tracked before the write starts, so a partial write is
    /// still cleaned up.
    pub async fn write_input(&mut self, bytes: Bytes, suggested_name: &str) -> Result<StagedFile> {
        let ext = extension(suggested_name);
        let file = self.track(StagedFile {
            virtual_path: self.area.allocate("in", ext.as_deref()),
            direction: Direction::Input,
            size_bytes: bytes.len() as u64,
        });

        if let Err(e) = self.engine.write_file(&file.virtual_path, bytes).await {
            warn!(path = %file.virtual_path, error = %e, "Staging write failed");
            return Err(TranscodeError::staging_write(&file.virtual_path, e.to_string()));
        }

        debug!(
            path = %file.virtual_path,
            size_bytes = file.size_bytes,
            "Staged input"
        );
        Ok(file)
    }

    /// Reserve the path the engine will write the output to.
    pub fn reserve_output(&mut self, output_name: &str) -> StagedFile {
        let ext = extension(output_name);
        self.track(StagedFile {
            virtual_path: self.area.allocate("out", ext.as_deref()),
            direction: Direction::Output,
            size_bytes: 0,
        })
    }

    /// Reserve an intermediate path with extension `ext`.
    pub fn reserve_scratch(&mut self, ext: &str) -> StagedFile {
        self.track(StagedFile {
            virtual_path: self.area.allocate("scratch", Some(ext)),
            direction: Direction::Scratch,
            size_bytes: 0,
        })
    }

    /// Read an entry back from the namespace.
    pub async fn read_output(&self, virtual_path: &str) -> Result<Bytes> {
        match self.engine.read_file(virtual_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_not_found() => {
                warn!(path = %virtual_path, "Output was not produced");
                Err(TranscodeError::staging_read(
                    virtual_path,
                    "output file does not exist",
                ))
            }
            Err(e) => {
                warn!(path = %virtual_path, error = %e, "Staging read failed");
                Err(TranscodeError::staging_read(virtual_path, e.to_string()))
            }
        }
    }

    /// Entries tracked so far.
    pub fn entries(&self) -> &[StagedFile] {
        &self.entries
    }

    /// Remove every tracked entry, newest first.
    ///
    /// An entry stays tracked until its removal finishes, so a release that
    /// is abandoned part way leaves the rest to the drop fallback.
    pub async fn release(mut self) {
        while let Some(file) = self.entries.last().cloned() {
            remove_entry(&self.engine, &self.area.counters, &file).await;
            self.entries.pop();
        }
    }

    fn track(&mut self, file: StagedFile) -> StagedFile {
        self.area.counters.staged.fetch_add(1, Ordering::SeqCst);
        self.entries.push(file.clone());
        file
    }
}

impl Drop for StagingScope {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let entries = std::mem::take(&mut self.entries);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(count = entries.len(), "Scheduling cleanup of abandoned staging scope");
                let engine = self.engine.clone();
                let counters = Arc::clone(&self.area.counters);
                runtime.spawn(async move {
                    for file in entries.iter().rev() {
                        remove_entry(&engine, &counters, file).await;
                    }
                });
            }
            Err(_) => {
                warn!(
                    count = entries.len(),
                    "Staging scope dropped outside a runtime; entries left in namespace"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::loader::EngineLoader;
    use assert_matches::assert_matches;
    use transforge_engine::PassthroughBuilder;

    async fn engine() -> EngineHandle {
        EngineLoader::new(Arc::new(PassthroughBuilder::new()))
            .ensure_ready()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn paths_are_unique_and_keep_extension() {
        let area = StagingArea::new();
        let mut scope = area.scope(engine().await);

        let a = scope
            .write_input(Bytes::from_static(b"x"), "My Clip.MP4")
            .await
            .unwrap();
        let b = scope.reserve_output("out.gif");
        let c = scope.reserve_scratch("png");
        let d = scope.reserve_output("noext");

        assert_eq!(a.virtual_path, "in_1.mp4");
        assert_eq!(b.virtual_path, "out_2.gif");
        assert_eq!(c.virtual_path, "scratch_3.png");
        assert_eq!(d.virtual_path, "out_4");
        assert_eq!(a.direction, Direction::Input);
        assert_eq!(a.size_bytes, 1);
        scope.release().await;
    }

    #[tokio::test]
    async fn release_removes_everything() {
        let area = StagingArea::new();
        let engine = engine().await;
        let mut scope = area.scope(engine.clone());

        let input = scope
            .write_input(Bytes::from_static(b"data"), "a.txt")
            .await
            .unwrap();
        scope.reserve_output("a.out");
        assert_eq!(scope.entries().len(), 2);
        scope.release().await;

        assert!(engine.read_file(&input.virtual_path).await.is_err());
        assert_eq!(area.stats(), StagingStats { staged: 2, cleanups: 2 });
        assert_eq!(area.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let area = StagingArea::new();
        let engine = engine().await;
        let mut scope = area.scope(engine.clone());
        let input = scope
            .write_input(Bytes::from_static(b"data"), "a.txt")
            .await
            .unwrap();

        area.cleanup(&engine, &input).await;
        area.cleanup(&engine, &input).await;
        scope.release().await;
        assert!(engine.read_file(&input.virtual_path).await.is_err());
    }

    #[tokio::test]
    async fn missing_output_is_a_read_error() {
        let area = StagingArea::new();
        let mut scope = area.scope(engine().await);
        let out = scope.reserve_output("a.mp3");

        let err = scope.read_output(&out.virtual_path).await.unwrap_err();
        assert_matches!(err, TranscodeError::StagingRead { ref path, .. } if path == "out_1.mp3");
        scope.release().await;
    }

    #[tokio::test]
    async fn rejected_write_is_tracked_and_reported() {
        let area = StagingArea::new();
        let engine = EngineLoader::new(Arc::new(PassthroughBuilder::new().with_capacity(1)))
            .ensure_ready()
            .await
            .unwrap();
        let mut scope = area.scope(engine);

        let err = scope
            .write_input(Bytes::from_static(b"too large"), "a.bin")
            .await
            .unwrap_err();
        assert_matches!(err, TranscodeError::StagingWrite { ref path, .. } if path == "in_1.bin");
        scope.release().await;
        assert_eq!(area.stats(), StagingStats { staged: 1, cleanups: 1 });
    }

    #[tokio::test]
    async fn dropped_scope_schedules_cleanup() {
        let area = StagingArea::new();
        let engine = engine().await;
        let path = {
            let mut scope = area.scope(engine.clone());
            scope
                .write_input(Bytes::from_static(b"data"), "a.txt")
                .await
                .unwrap()
                .virtual_path
        };

        for _ in 0..50 {
            if area.stats().outstanding() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(area.stats().outstanding(), 0);
        assert!(engine.read_file(&path).await.unwrap_err().is_not_found());
    }
}
