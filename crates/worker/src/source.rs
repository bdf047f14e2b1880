//! Record sources feeding the tree worker
//!
//! Every source yields a [`Record::Meta`] first, then one record per file.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sd_core::history::parse_snapshot;
use sd_core::{classify, transform_changes, FileData, Record, RenamePattern, SizeError, Snapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

/// Single pass stream of records
pub type RecordStream = BoxStream<'static, Result<Record, SizeError>>;

/// Opens record streams for load requests
pub trait DataSource: Send + Sync + 'static {
    /// Start streaming `input`, or the source's default data when `None`
    fn open(&self, input: Option<&str>) -> RecordStream;
}

/// Serves the same in-memory snapshot for every load
#[derive(Debug, Clone)]
pub struct StaticSource {
    snapshot: Snapshot,
}

impl StaticSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

impl DataSource for StaticSource {
    fn open(&self, _input: Option<&str>) -> RecordStream {
        stream::iter(self.snapshot.clone().into_records().map(Ok)).boxed()
    }
}

/// Reads newline delimited JSON data files
///
/// The input names the file to read, falling back to the default path.
#[derive(Debug, Clone)]
pub struct NdjsonSource {
    default_path: PathBuf,
}

impl NdjsonSource {
    pub fn new(default_path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: default_path.into(),
        }
    }
}

enum NdjsonState {
    Pending(PathBuf),
    Reading {
        lines: Lines<BufReader<File>>,
        first: bool,
    },
    Done,
}

async fn next_record(
    mut lines: Lines<BufReader<File>>,
    first: bool,
) -> Option<(Result<Record, SizeError>, NdjsonState)> {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                let record = Record::from_ndjson_line(line.trim(), first);
                let next = match record {
                    Ok(_) => NdjsonState::Reading { lines, first: false },
                    Err(_) => NdjsonState::Done,
                };
                return Some((record, next));
            }
            Ok(None) => return None,
            Err(e) => return Some((Err(SizeError::Stream(e.to_string())), NdjsonState::Done)),
        }
    }
}

impl DataSource for NdjsonSource {
    fn open(&self, input: Option<&str>) -> RecordStream {
        let path = input.map(PathBuf::from).unwrap_or_else(|| self.default_path.clone());
        debug!(path = %path.display(), "opening data file");

        stream::unfold(NdjsonState::Pending(path), |state| async move {
            match state {
                NdjsonState::Pending(path) => match File::open(&path).await {
                    Ok(file) => next_record(BufReader::new(file).lines(), true).await,
                    Err(e) => Some((
                        Err(SizeError::Stream(format!("{}: {}", path.display(), e))),
                        NdjsonState::Done,
                    )),
                },
                NdjsonState::Reading { lines, first } => next_record(lines, first).await,
                NdjsonState::Done => None,
            }
        })
        .boxed()
    }
}

/// The two builds being compared; either may be unknown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPair {
    pub previous: Option<Vec<FileData>>,
    pub current: Option<Vec<FileData>>,
}

/// Supplies the build snapshots to compare
#[async_trait]
pub trait HistoryProvider: Send + Sync + 'static {
    /// Look up the builds for `input`, or the provider's default when `None`
    async fn builds(&self, input: Option<&str>) -> Result<BuildPair, SizeError>;
}

/// Streams the difference between the builds of a [`HistoryProvider`]
pub struct DiffSource<H> {
    provider: Arc<H>,
    rename: Option<Arc<RenamePattern>>,
}

impl<H: HistoryProvider> DiffSource<H> {
    pub fn new(provider: H) -> Self {
        Self {
            provider: Arc::new(provider),
            rename: None,
        }
    }

    /// Pair renamed artifacts using `pattern`
    pub fn with_rename(mut self, pattern: RenamePattern) -> Self {
        self.rename = Some(Arc::new(pattern));
        self
    }
}

async fn diff_records(
    provider: Arc<impl HistoryProvider>,
    rename: Option<Arc<RenamePattern>>,
    input: Option<String>,
) -> Result<Vec<Result<Record, SizeError>>, SizeError> {
    let builds = provider.builds(input.as_deref()).await?;
    let previous = builds
        .previous
        .ok_or_else(|| SizeError::Stream("Couldn't find previous build info".to_string()))?;
    let current = builds
        .current
        .ok_or_else(|| SizeError::Stream("Couldn't find current build info".to_string()))?;

    let matcher = rename.as_deref().map(|p| p as &dyn sd_core::FindRenamed);
    let changes = classify(&previous, &current, matcher)?;
    info!(
        previous = previous.len(),
        current = current.len(),
        changed = changes.changed_items.len(),
        "compared builds"
    );

    Ok(transform_changes(&changes).into_records().map(Ok).collect())
}

impl<H: HistoryProvider> DataSource for DiffSource<H> {
    fn open(&self, input: Option<&str>) -> RecordStream {
        let records = diff_records(self.provider.clone(), self.rename.clone(), input.map(String::from));
        stream::once(records)
            .map_ok(stream::iter)
            .try_flatten()
            .boxed()
    }
}

/// Builds read from snapshot files on disk
///
/// Files may hold a JSON array of artifacts or a CI log with a build size
/// marker. A missing file is an unknown build.
#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    pub previous: PathBuf,
    pub current: PathBuf,
}

async fn read_build(path: &Path) -> Result<Option<Vec<FileData>>, SizeError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_snapshot(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SizeError::Stream(format!("{}: {}", path.display(), e))),
    }
}

#[async_trait]
impl HistoryProvider for SnapshotFiles {
    async fn builds(&self, _input: Option<&str>) -> Result<BuildPair, SizeError> {
        Ok(BuildPair {
            previous: read_build(&self.previous).await?,
            current: read_build(&self.current).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{transform_build, Meta};
    use std::io::Write;

    struct FixedHistory(BuildPair);

    #[async_trait]
    impl HistoryProvider for FixedHistory {
        async fn builds(&self, _input: Option<&str>) -> Result<BuildPair, SizeError> {
            Ok(self.0.clone())
        }
    }

    async fn collect(source: &dyn DataSource, input: Option<&str>) -> Vec<Result<Record, SizeError>> {
        source.open(input).collect().await
    }

    #[tokio::test]
    async fn test_static_source_repeats() {
        let source = StaticSource::new(transform_build(&[FileData::new("a.js", 10, 4)]));
        for _ in 0..2 {
            let records = collect(&source, None).await;
            assert_eq!(records.len(), 2);
            assert!(matches!(records[0], Ok(Record::Meta(Meta { total: 1, diff_mode: false }))));
        }
    }

    #[tokio::test]
    async fn test_ndjson_source_reads_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"total":2,"diff_mode":false}}"#).unwrap();
        writeln!(file, r#"{{"p":"a.js","s":[{{"n":"a.js","b":10,"t":"t"}}]}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"p":"b.js","s":[{{"n":"b.js","b":4,"t":"t"}}]}}"#).unwrap();

        let source = NdjsonSource::new(file.path());
        let records = collect(&source, None).await;

        assert_eq!(records.len(), 3);
        match &records[2] {
            Ok(Record::File(entry)) => assert_eq!(entry.path, "b.js"),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ndjson_malformed_line_ends_stream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"total":2,"diff_mode":false}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"p":"b.js","s":[]}}"#).unwrap();

        let records = collect(&NdjsonSource::new("unused"), Some(file.path().to_str().unwrap())).await;

        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], Err(SizeError::MalformedEntry(_))));
    }

    #[tokio::test]
    async fn test_ndjson_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let records = collect(&NdjsonSource::new(dir.path().join("nope.ndjson")), None).await;

        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(SizeError::Stream(_))));
    }

    #[tokio::test]
    async fn test_diff_source_missing_previous() {
        let source = DiffSource::new(FixedHistory(BuildPair {
            previous: None,
            current: Some(vec![FileData::new("a.js", 1, 1)]),
        }));
        let records = collect(&source, None).await;

        assert_eq!(records.len(), 1);
        match &records[0] {
            Err(SizeError::Stream(msg)) => assert_eq!(msg, "Couldn't find previous build info"),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_diff_source_streams_changes() {
        let source = DiffSource::new(FixedHistory(BuildPair {
            previous: Some(vec![FileData::new("app-a1.js", 100, 50)]),
            current: Some(vec![FileData::new("app-b2.js", 120, 55), FileData::new("new.css", 9, 3)]),
        }))
        .with_rename(RenamePattern::compile("app-[hash].js").unwrap());

        let records = collect(&source, None).await;

        assert!(matches!(records[0], Ok(Record::Meta(Meta { total: 2, diff_mode: true }))));
        let paths: Vec<_> = records[1..]
            .iter()
            .map(|r| match r {
                Ok(Record::File(entry)) => entry.path.clone(),
                other => panic!("unexpected record: {:?}", other),
            })
            .collect();
        assert_eq!(paths, vec!["new.css", "app-b2.js"]);
    }

    #[tokio::test]
    async fn test_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("current.json");
        std::fs::write(&current, r#"[{"path":"a.js","size":3,"gzipSize":2}]"#).unwrap();

        let files = SnapshotFiles {
            previous: dir.path().join("missing.json"),
            current,
        };
        let builds = files.builds(None).await.unwrap();

        assert_eq!(builds.previous, None);
        assert_eq!(builds.current, Some(vec![FileData::new("a.js", 3, 2)]));
    }
}
