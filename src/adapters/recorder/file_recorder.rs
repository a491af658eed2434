//! File-backed interaction recorder.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   2026-10-17/
//!     <session_id>.jsonl        live segment, one JSON line per stage write
//!     <session_id>.1.jsonl.gz   rotated segments, oldest first
//! ```
//!
//! A record is filed under the UTC date it started, so every stage write of
//! that record lands in the same session file. Readers fold the lines by
//! record id and keep the most advanced stage.
//!
//! `record` only appends to an in-memory buffer. A background loop flushes
//! the buffer on an interval, or early once the buffer reaches its threshold,
//! and sweeps expired records on a slower schedule. The loop never touches
//! session locks.

use async_trait::async_trait;
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::foundation::{SessionId, Timestamp};
use crate::domain::interaction::{latest_by_id, InteractionRecord, RetentionClass};
use crate::ports::{InteractionRecorder, RecorderError};

const LIVE_SUFFIX: &str = ".jsonl";
const ROTATED_SUFFIX: &str = ".jsonl.gz";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Recorder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecorderConfig {
    pub dir: PathBuf,
    pub flush_interval: Duration,
    /// Buffered writes that trigger an early flush.
    pub buffer_threshold: usize,
    /// Live segments at or above this size are compressed.
    pub rotate_bytes: u64,
    pub success_retention_days: u32,
    /// Applies to failed and orphaned records.
    pub failure_retention_days: u32,
    pub sweep_interval: Duration,
}

impl FileRecorderConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            flush_interval: Duration::from_secs(1),
            buffer_threshold: 64,
            rotate_bytes: 8 * 1024 * 1024,
            success_retention_days: 30,
            failure_retention_days: 90,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

/// What a retention sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_removed: usize,
    pub files_rewritten: usize,
    pub files_deleted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Rotated(u32),
    Live,
}

#[derive(Debug, Clone)]
struct SegmentFile {
    session: String,
    segment: Segment,
    path: PathBuf,
}

fn parse_segment(file_name: &str) -> Option<(&str, Segment)> {
    if let Some(stem) = file_name.strip_suffix(ROTATED_SUFFIX) {
        let (session, n) = stem.rsplit_once('.')?;
        return Some((session, Segment::Rotated(n.parse().ok()?)));
    }
    file_name
        .strip_suffix(LIVE_SUFFIX)
        .map(|session| (session, Segment::Live))
}

fn read_error(path: &Path, err: impl std::fmt::Display) -> RecorderError {
    RecorderError::Read(format!("{}: {}", path.display(), err))
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> RecorderError {
    RecorderError::Write(format!("{}: {}", path.display(), err))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    config: FileRecorderConfig,
    buffer: Mutex<Vec<InteractionRecord>>,
    wake: Notify,
    /// Serialises flushes and sweeps against each other.
    io: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

/// Buffered, append-only recorder writing JSON lines to disk.
#[derive(Clone)]
pub struct FileInteractionRecorder {
    inner: Arc<Inner>,
}

impl FileInteractionRecorder {
    pub fn new(config: FileRecorderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                buffer: Mutex::new(Vec::new()),
                wake: Notify::new(),
                io: tokio::sync::Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &FileRecorderConfig {
        &self.inner.config
    }

    /// Writes accepted but not yet on disk.
    pub fn buffered(&self) -> usize {
        lock(&self.inner.buffer).len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts the flush and sweep loop. Sending `true` on `shutdown` stops it
    /// after a final flush.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move { recorder.run(shutdown).await })
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let config = &self.inner.config;
        let mut flush_tick = tokio::time::interval(config.flush_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_tick = tokio::time::interval(config.sweep_interval);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            dir = %config.dir.display(),
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            buffer_threshold = config.buffer_threshold,
            "interaction recorder started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = flush_tick.tick() => self.flush_logged().await,
                _ = self.inner.wake.notified() => self.flush_logged().await,
                _ = sweep_tick.tick() => self.sweep_logged().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        match self.flush_buffer().await {
            Ok(written) => tracing::info!(written, "interaction recorder stopped"),
            Err(err) => tracing::error!(
                error = %err,
                lost = self.buffered(),
                "final recorder flush failed"
            ),
        }
    }

    async fn flush_logged(&self) {
        match self.flush_buffer().await {
            Ok(0) => {}
            Ok(written) => tracing::debug!(written, "recorder buffer flushed"),
            Err(err) => tracing::warn!(
                error = %err,
                pending = self.buffered(),
                "recorder flush failed; will retry"
            ),
        }
    }

    async fn sweep_logged(&self) {
        match self.sweep(Timestamp::now()).await {
            Ok(report) if report.records_removed > 0 => tracing::info!(
                removed = report.records_removed,
                rewritten = report.files_rewritten,
                deleted = report.files_deleted,
                "recorder retention sweep"
            ),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "recorder retention sweep failed"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writing
    // ─────────────────────────────────────────────────────────────────────────

    /// Writes the buffer to disk. On failure the batch is put back in front
    /// of anything recorded meanwhile.
    async fn flush_buffer(&self) -> Result<usize, RecorderError> {
        let _io = self.inner.io.lock().await;

        let batch = std::mem::take(&mut *lock(&self.inner.buffer));
        if batch.is_empty() {
            return Ok(0);
        }

        match self.write_batch(&batch).await {
            Ok(()) => Ok(batch.len()),
            Err(err) => {
                // lines already written for part of the batch are written
                // again on retry; readers fold duplicates away
                let mut buffer = lock(&self.inner.buffer);
                let newer = std::mem::replace(&mut *buffer, batch);
                buffer.extend(newer);
                Err(err)
            }
        }
    }

    async fn write_batch(&self, batch: &[InteractionRecord]) -> Result<(), RecorderError> {
        let mut groups: BTreeMap<(NaiveDate, String), String> = BTreeMap::new();
        for record in batch {
            let line = serde_json::to_string(record)
                .map_err(|e| RecorderError::Write(format!("serialize {}: {}", record.id, e)))?;
            let file = groups
                .entry((record.started_at.date(), record.session_id.to_string()))
                .or_default();
            file.push_str(&line);
            file.push('\n');
        }

        for ((date, session), lines) in groups {
            let dir = self.date_dir(date);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| write_error(&dir, e))?;

            let path = dir.join(format!("{}{}", session, LIVE_SUFFIX));
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| write_error(&path, e))?;
            file.write_all(lines.as_bytes())
                .await
                .map_err(|e| write_error(&path, e))?;
            file.sync_data().await.map_err(|e| write_error(&path, e))?;

            let size = file
                .metadata()
                .await
                .map_err(|e| write_error(&path, e))?
                .len();
            if size >= self.inner.config.rotate_bytes {
                self.rotate(&dir, &session).await?;
            }
        }
        Ok(())
    }

    /// Compresses the live segment into the next numbered archive.
    async fn rotate(&self, dir: &Path, session: &str) -> Result<(), RecorderError> {
        let live = dir.join(format!("{}{}", session, LIVE_SUFFIX));
        let next = self
            .segments(dir)
            .await?
            .iter()
            .filter(|s| s.session == session)
            .filter_map(|s| match s.segment {
                Segment::Rotated(n) => Some(n),
                Segment::Live => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let archive = dir.join(format!("{}.{}{}", session, next, ROTATED_SUFFIX));

        let raw = fs::read(&live).await.map_err(|e| write_error(&live, e))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| write_error(&archive, e))?;
        let compressed = encoder.finish().map_err(|e| write_error(&archive, e))?;

        fs::write(&archive, compressed)
            .await
            .map_err(|e| write_error(&archive, e))?;
        fs::remove_file(&live)
            .await
            .map_err(|e| write_error(&live, e))?;

        tracing::info!(
            archive = %archive.display(),
            bytes = raw.len(),
            "recorder segment rotated"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retention
    // ─────────────────────────────────────────────────────────────────────────

    /// Removes records past their retention horizon as of `now`.
    ///
    /// Successful finalized records use the success horizon; failed and
    /// orphaned records use the failure horizon.
    pub async fn sweep(&self, now: Timestamp) -> Result<SweepReport, RecorderError> {
        let config = &self.inner.config;
        let success_cutoff = now.minus_days(i64::from(config.success_retention_days));
        let failure_cutoff = now.minus_days(i64::from(config.failure_retention_days));
        let expired = |record: &InteractionRecord| match record.retention_class() {
            RetentionClass::Success => record.started_at.is_before(&success_cutoff),
            RetentionClass::Failure => record.started_at.is_before(&failure_cutoff),
        };

        let _io = self.inner.io.lock().await;
        let mut report = SweepReport::default();

        for (date, dir) in self.date_dirs().await? {
            if date > success_cutoff.date() && date > failure_cutoff.date() {
                continue;
            }

            let mut by_session: BTreeMap<String, Vec<SegmentFile>> = BTreeMap::new();
            for segment in self.segments(&dir).await? {
                by_session.entry(segment.session.clone()).or_default().push(segment);
            }

            for (session, mut files) in by_session {
                files.sort_by_key(|f| f.segment);
                let records = latest_by_id(self.read_files(&files).await?);
                let (dropped, kept): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| expired(r));
                if dropped.is_empty() {
                    continue;
                }
                report.records_removed += dropped.len();

                if kept.is_empty() {
                    for file in &files {
                        fs::remove_file(&file.path)
                            .await
                            .map_err(|e| write_error(&file.path, e))?;
                    }
                    report.files_deleted += files.len();
                } else {
                    self.rewrite(&dir, &session, &files, &kept).await?;
                    report.files_rewritten += 1;
                }
            }

            if self.segments(&dir).await?.is_empty() {
                if let Err(err) = fs::remove_dir(&dir).await {
                    tracing::debug!(dir = %dir.display(), error = %err, "could not remove empty date directory");
                }
            }
        }
        Ok(report)
    }

    /// Replaces every segment of a session with one live file holding `kept`.
    async fn rewrite(
        &self,
        dir: &Path,
        session: &str,
        files: &[SegmentFile],
        kept: &[InteractionRecord],
    ) -> Result<(), RecorderError> {
        let mut body = String::new();
        for record in kept {
            let line = serde_json::to_string(record)
                .map_err(|e| RecorderError::Write(format!("serialize {}: {}", record.id, e)))?;
            body.push_str(&line);
            body.push('\n');
        }

        let tmp = dir.join(format!("{}{}.tmp", session, LIVE_SUFFIX));
        let live = dir.join(format!("{}{}", session, LIVE_SUFFIX));
        fs::write(&tmp, body).await.map_err(|e| write_error(&tmp, e))?;
        for file in files {
            fs::remove_file(&file.path)
                .await
                .map_err(|e| write_error(&file.path, e))?;
        }
        fs::rename(&tmp, &live)
            .await
            .map_err(|e| write_error(&live, e))?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────────

    fn date_dir(&self, date: NaiveDate) -> PathBuf {
        self.inner.config.dir.join(date.format(DATE_FORMAT).to_string())
    }

    async fn date_dirs(&self) -> Result<Vec<(NaiveDate, PathBuf)>, RecorderError> {
        let root = &self.inner.config.dir;
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(read_error(root, err)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| read_error(root, e))? {
            let name = entry.file_name();
            if let Some(date) = name
                .to_str()
                .and_then(|n| NaiveDate::parse_from_str(n, DATE_FORMAT).ok())
            {
                dirs.push((date, entry.path()));
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn segments(&self, dir: &Path) -> Result<Vec<SegmentFile>, RecorderError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(read_error(dir, err)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| read_error(dir, e))? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((session, segment)) = parse_segment(name) {
                files.push(SegmentFile {
                    session: session.to_string(),
                    segment,
                    path: entry.path(),
                });
            }
        }
        files.sort_by(|a, b| a.session.cmp(&b.session).then(a.segment.cmp(&b.segment)));
        Ok(files)
    }

    async fn read_files(&self, files: &[SegmentFile]) -> Result<Vec<InteractionRecord>, RecorderError> {
        let mut records = Vec::new();
        for file in files {
            let raw = match fs::read(&file.path).await {
                Ok(raw) => raw,
                // rotated or swept between listing and reading
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(read_error(&file.path, err)),
            };

            let text = match file.segment {
                Segment::Live => String::from_utf8_lossy(&raw).into_owned(),
                Segment::Rotated(_) => {
                    let mut text = String::new();
                    GzDecoder::new(raw.as_slice())
                        .read_to_string(&mut text)
                        .map_err(|e| read_error(&file.path, e))?;
                    text
                }
            };

            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<InteractionRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(err) => tracing::warn!(
                        path = %file.path.display(),
                        error = %err,
                        "skipping unreadable recorder line"
                    ),
                }
            }
        }
        Ok(records)
    }

    async fn read_where(
        &self,
        dirs: Vec<PathBuf>,
        session: Option<&str>,
    ) -> Result<Vec<InteractionRecord>, RecorderError> {
        let mut records = Vec::new();
        for dir in dirs {
            let files: Vec<_> = self
                .segments(&dir)
                .await?
                .into_iter()
                .filter(|f| session.map_or(true, |s| f.session == s))
                .collect();
            records.extend(self.read_files(&files).await?);
        }
        Ok(records)
    }

    fn pending(&self, keep: impl Fn(&InteractionRecord) -> bool) -> Vec<InteractionRecord> {
        lock(&self.inner.buffer)
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InteractionRecorder for FileInteractionRecorder {
    async fn record(&self, record: &InteractionRecord) -> Result<(), RecorderError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RecorderError::Closed);
        }

        let len = {
            let mut buffer = lock(&self.inner.buffer);
            buffer.push(record.clone());
            buffer.len()
        };
        if len >= self.inner.config.buffer_threshold {
            self.inner.wake.notify_one();
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), RecorderError> {
        self.flush_buffer().await.map(|_| ())
    }

    async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<InteractionRecord>, RecorderError> {
        let session = session_id.to_string();
        let dirs = self.date_dirs().await?.into_iter().map(|(_, d)| d).collect();
        let mut records = self.read_where(dirs, Some(&session)).await?;
        records.extend(self.pending(|r| &r.session_id == session_id));
        Ok(latest_by_id(records))
    }

    async fn records_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<InteractionRecord>, RecorderError> {
        let mut records = self.read_where(vec![self.date_dir(date)], None).await?;
        records.extend(self.pending(|r| r.started_at.date() == date));
        Ok(latest_by_id(records))
    }

    async fn orphaned_records(&self) -> Result<Vec<InteractionRecord>, RecorderError> {
        let dirs = self.date_dirs().await?.into_iter().map(|(_, d)| d).collect();
        let mut records = self.read_where(dirs, None).await?;
        records.extend(self.pending(|_| true));
        Ok(latest_by_id(records)
            .into_iter()
            .filter(InteractionRecord::is_orphaned)
            .collect())
    }
}
