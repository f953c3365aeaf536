use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::{Kpis, NormalizationStats, Report, ReportId};

/// Well-known file name of the most recent report
pub const LATEST_REPORT_FILE: &str = "rapport_veille.html";
const HISTORY_DIR: &str = "reports";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What the store keeps in memory about a persisted report
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub id: ReportId,
    pub kpis: Kpis,
    pub stats: NormalizationStats,
    pub html: Arc<str>,
    pub generated_at: DateTime<Utc>,
}

impl From<&Report> for StoredReport {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            kpis: report.kpis,
            stats: report.stats.clone(),
            html: Arc::from(report.html.as_str()),
            generated_at: report.generated_at,
        }
    }
}

/// Index entry for a complete report. The HTML itself stays on disk.
#[derive(Debug, Clone)]
struct ReportMeta {
    kpis: Kpis,
    stats: NormalizationStats,
    generated_at: DateTime<Utc>,
}

/// Content-addressed report history on local disk, plus the "latest" pointer
#[derive(Clone)]
pub struct ReportStore {
    root: PathBuf,
    index: Arc<DashMap<ReportId, ReportMeta>>,
    latest: Arc<RwLock<Option<ReportId>>>,
    promote_lock: Arc<Mutex<()>>,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: Arc::new(DashMap::new()),
            latest: Arc::new(RwLock::new(None)),
            promote_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_REPORT_FILE)
    }

    fn history_path(&self, id: &ReportId) -> PathBuf {
        self.root.join(HISTORY_DIR).join(format!("{}.html", id))
    }

    /// Persist a report under its id and make it the latest.
    ///
    /// Degraded reports are written but not indexed, so the next identical
    /// submission runs the pipeline again.
    pub async fn save(&self, report: &Report) -> Result<StoredReport, AppError> {
        write_atomic(&self.history_path(&report.id), report.html.as_bytes()).await?;

        let stored = StoredReport::from(report);
        if report.degraded {
            self.index.remove(&report.id);
            debug!("Report {} is missing an enrichment, not indexing it", report.id);
        } else {
            self.index.insert(
                report.id.clone(),
                ReportMeta {
                    kpis: stored.kpis,
                    stats: stored.stats.clone(),
                    generated_at: stored.generated_at,
                },
            );
        }
        self.promote(&stored).await?;

        info!("Saved report {} ({} mentions)", report.id, report.kpis.total_mentions);
        Ok(stored)
    }

    pub fn is_indexed(&self, id: &ReportId) -> bool {
        self.index.contains_key(id)
    }

    /// A complete report generated earlier in this process, HTML read back from disk
    pub async fn load(&self, id: &ReportId) -> Result<Option<StoredReport>, AppError> {
        let meta = match self.index.get(id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        match tokio::fs::read_to_string(self.history_path(id)).await {
            Ok(html) => Ok(Some(StoredReport {
                id: id.clone(),
                kpis: meta.kpis,
                stats: meta.stats,
                html: Arc::from(html),
                generated_at: meta.generated_at,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("History file for report {} is gone, dropping it from the index", id);
                self.index.remove(id);
                Ok(None)
            }
            Err(e) => Err(AppError::Storage(e)),
        }
    }

    /// Point "latest" at an already stored report and rewrite the well-known file
    pub async fn promote(&self, stored: &StoredReport) -> Result<(), AppError> {
        // Held across the file write and the pointer update
        let _guard = self.promote_lock.lock().await;
        write_atomic(&self.latest_path(), stored.html.as_bytes()).await?;
        *self.latest.write() = Some(stored.id.clone());
        debug!("Latest report is now {}", stored.id);
        Ok(())
    }

    /// HTML of the latest report generated by this process
    pub async fn latest_html(&self) -> Result<String, AppError> {
        let latest = self.latest.read().clone();
        let id = latest.ok_or(AppError::NotFound)?;
        self.read_html(&id).await
    }

    /// HTML of a report by id, from the history directory
    pub async fn read_html(&self, id: &ReportId) -> Result<String, AppError> {
        match tokio::fs::read_to_string(self.history_path(id)).await {
            Ok(html) => Ok(html),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound),
            Err(e) => Err(AppError::Storage(e)),
        }
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    let dir = path
        .parent()
        .ok_or_else(|| AppError::Internal(format!("No parent directory for {}", path.display())))?;
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("report");
    let temp = dir.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    replace_file(&temp, path, contents).await
}

/// Write `temp` and rename it over `path`. `temp` never outlives a failure.
async fn replace_file(temp: &Path, path: &Path, contents: &[u8]) -> Result<(), AppError> {
    let result = match tokio::fs::write(temp, contents).await {
        Ok(()) => tokio::fs::rename(temp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(temp).await;
        return Err(AppError::Storage(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChartSet, Granularity};

    fn report(id_byte: &str, html: &str) -> Report {
        Report {
            id: ReportId::parse(&id_byte.repeat(64)).unwrap(),
            granularity: Granularity::Month,
            kpis: Kpis::default(),
            stats: NormalizationStats::default(),
            charts: ChartSet {
                mentions_over_time: String::new(),
                sentiment_distribution: String::new(),
                author_sentiment: String::new(),
            },
            table_html: String::new(),
            summary: None,
            word_cloud: None,
            html: html.to_string(),
            generated_at: Utc::now(),
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_latest_is_not_found_before_any_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(matches!(store.latest_html().await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_save_writes_history_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());

        let first = report("a", "<p>first</p>");
        let second = report("b", "<p>second</p>");
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        assert_eq!(store.latest_html().await.unwrap(), "<p>second</p>");
        assert_eq!(
            std::fs::read_to_string(dir.path().join(LATEST_REPORT_FILE)).unwrap(),
            "<p>second</p>"
        );
        assert_eq!(store.read_html(&first.id).await.unwrap(), "<p>first</p>");
        assert!(dir
            .path()
            .join("reports")
            .join(format!("{}.html", first.id))
            .exists());
    }

    #[tokio::test]
    async fn test_read_html_falls_back_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let stored = report("c", "<p>old</p>");
        ReportStore::new(dir.path()).save(&stored).await.unwrap();

        // A fresh store has an empty index and no latest report
        let store = ReportStore::new(dir.path());
        assert_eq!(store.read_html(&stored.id).await.unwrap(), "<p>old</p>");
        assert!(!store.is_indexed(&stored.id));
        assert!(store.load(&stored.id).await.unwrap().is_none());
        assert!(matches!(store.latest_html().await, Err(AppError::NotFound)));

        let unknown = ReportId::parse(&"d".repeat(64)).unwrap();
        assert!(matches!(store.read_html(&unknown).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_load_serves_html_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let saved = report("e", "<p>v1</p>");
        store.save(&saved).await.unwrap();

        let history = dir.path().join("reports").join(format!("{}.html", saved.id));
        std::fs::write(&history, "<p>on disk</p>").unwrap();
        let loaded = store.load(&saved.id).await.unwrap().unwrap();
        assert_eq!(&*loaded.html, "<p>on disk</p>");
        assert_eq!(loaded.kpis, saved.kpis);

        std::fs::remove_file(&history).unwrap();
        assert!(store.load(&saved.id).await.unwrap().is_none());
        assert!(!store.is_indexed(&saved.id));
    }

    #[tokio::test]
    async fn test_degraded_report_is_saved_but_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let mut degraded = report("f", "<p>partial</p>");
        degraded.degraded = true;

        store.save(&degraded).await.unwrap();
        assert!(!store.is_indexed(&degraded.id));
        assert!(store.load(&degraded.id).await.unwrap().is_none());
        assert_eq!(store.latest_html().await.unwrap(), "<p>partial</p>");
        assert_eq!(store.read_html(&degraded.id).await.unwrap(), "<p>partial</p>");
    }

    #[tokio::test]
    async fn test_failed_replace_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();

        // Rename fails: the target is a non-empty directory
        let target = dir.path().join("occupied");
        std::fs::create_dir_all(target.join("inner")).unwrap();
        let temp = dir.path().join(".occupied.tmp");
        assert!(replace_file(&temp, &target, b"html").await.is_err());
        assert!(!temp.exists());

        // Write fails: the temp file's directory does not exist
        let temp = dir.path().join("missing").join(".report.tmp");
        let result = replace_file(&temp, &dir.path().join("report.html"), b"html").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(!temp.exists());
        assert!(!dir.path().join("report.html").exists());
    }
}
