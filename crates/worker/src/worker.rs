//! The tree worker task
//!
//! Loads run as futures polled by the worker's own loop, so a long load keeps
//! making progress while `open` requests are served in between. A newer load
//! does not cancel an older one; the older one finishes into its own builder,
//! its progress updates are dropped and its tree is never opened. A queued
//! load replaced before it started is answered with an error.

use crate::debounce::Debouncer;
use crate::protocol::{
    Action, LoadRequest, ReplyResult, Request, TreeProgress, WorkerMessage, FROM_URL_INPUT,
};
use crate::source::{DataSource, RecordStream};
use crate::WorkerConfig;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use sd_core::{FilterOptions, Meta, Record, SizeError, Tree, TreeBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Channels connected to a running worker
pub struct WorkerChannels {
    pub requests: mpsc::UnboundedSender<Request>,
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
    pub handle: JoinHandle<()>,
}

/// Spawn a worker serving `source` on the current runtime
pub fn spawn(source: impl DataSource, config: WorkerConfig) -> WorkerChannels {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let worker = TreeWorker::new(Arc::new(source), config, request_rx, message_tx);

    WorkerChannels {
        requests: request_tx,
        messages: message_rx,
        handle: tokio::spawn(worker.run()),
    }
}

/// Result of a finished load
struct LoadOutcome {
    id: u64,
    generation: u64,
    tree: Option<Tree>,
    progress: TreeProgress,
}

/// Forwards progress updates while their load is still the newest one
#[derive(Clone)]
struct ProgressSink {
    messages: mpsc::UnboundedSender<WorkerMessage>,
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl ProgressSink {
    fn send(&self, progress: TreeProgress) {
        if self.latest.load(Ordering::Acquire) != self.generation {
            debug!(generation = self.generation, "dropping progress of superseded load");
            return;
        }
        let _ = self.messages.send(WorkerMessage::progress(progress));
    }
}

/// Serves load and open requests
pub struct TreeWorker {
    config: WorkerConfig,
    source: Arc<dyn DataSource>,
    requests: mpsc::UnboundedReceiver<Request>,
    messages: mpsc::UnboundedSender<WorkerMessage>,
    /// Generation of the newest started load
    latest: Arc<AtomicU64>,
    /// Tree of the newest finished load; partial when that load failed mid-stream
    completed: Option<Tree>,
    queued: Debouncer<(u64, LoadRequest)>,
}

impl TreeWorker {
    pub fn new(
        source: Arc<dyn DataSource>,
        config: WorkerConfig,
        requests: mpsc::UnboundedReceiver<Request>,
        messages: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            config,
            source,
            requests,
            messages,
            latest: Arc::new(AtomicU64::new(0)),
            completed: None,
            queued: Debouncer::new(),
        }
    }

    /// Run until every request sender is dropped and all loads finished
    pub async fn run(mut self) {
        let mut running: FuturesUnordered<BoxFuture<'static, LoadOutcome>> = FuturesUnordered::new();

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else { break };
                    match request.action {
                        Action::Open(path) => self.open(request.id, &path),
                        Action::Load(load) => {
                            if let Some((superseded, _)) = self.queued.push((request.id, load)) {
                                self.supersede(superseded, request.id);
                            }
                            if let Some((id, load)) = self.settle_loads().await {
                                running.push(self.start_load(id, load));
                            }
                        }
                    }
                }
                Some(outcome) = running.next(), if !running.is_empty() => self.finish_load(outcome),
            }
        }

        while let Some(outcome) = running.next().await {
            self.finish_load(outcome);
        }
        debug!("tree worker stopped");
    }

    /// Yield once, then fold every load queued meanwhile into the pending one
    ///
    /// Opens that arrive during the wait are answered right away. Repeats
    /// while new loads keep arriving.
    async fn settle_loads(&mut self) -> Option<(u64, LoadRequest)> {
        loop {
            tokio::task::yield_now().await;

            let mut more_loads = false;
            while let Ok(request) = self.requests.try_recv() {
                match request.action {
                    Action::Load(load) => {
                        if let Some((superseded, _)) = self.queued.push((request.id, load)) {
                            self.supersede(superseded, request.id);
                        }
                        more_loads = true;
                    }
                    Action::Open(path) => self.open(request.id, &path),
                }
            }

            if !more_loads {
                return self.queued.take();
            }
        }
    }

    /// Answer a queued load that will never run
    fn supersede(&self, id: u64, by: u64) {
        warn!(id, by, "load superseded before it started");
        self.send(WorkerMessage::error(id, format!("load superseded by request {}", by)));
    }

    fn start_load(&mut self, id: u64, load: LoadRequest) -> BoxFuture<'static, LoadOutcome> {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let options = FilterOptions::parse(&load.options);
        let input = match load.input.as_deref() {
            Some(FROM_URL_INPUT) => options.load_url.clone(),
            other => other.map(String::from),
        };

        info!(id, generation, input = input.as_deref().unwrap_or("<default>"), "starting load");
        let records = self.source.open(input.as_deref());
        let sink = ProgressSink {
            messages: self.messages.clone(),
            generation,
            latest: self.latest.clone(),
        };

        build_tree(records, options, sink, self.config.progress_interval())
            .map(move |(tree, progress)| LoadOutcome {
                id,
                generation,
                tree,
                progress,
            })
            .boxed()
    }

    fn finish_load(&mut self, outcome: LoadOutcome) {
        let is_latest = outcome.generation == self.latest.load(Ordering::Acquire);
        if let Some(error) = &outcome.progress.error {
            warn!(id = outcome.id, error = %error, "load failed");
        }
        match (outcome.tree, is_latest) {
            (Some(tree), true) => {
                info!(id = outcome.id, nodes = tree.len(), partial = outcome.progress.error.is_some(), "load complete");
                self.completed = Some(tree);
            }
            (Some(_), false) => {
                warn!(id = outcome.id, generation = outcome.generation, "discarding tree of superseded load");
            }
            (None, _) => {}
        }
        self.send(WorkerMessage::reply(outcome.id, ReplyResult::Tree(outcome.progress)));
    }

    fn open(&self, id: u64, path: &str) {
        let Some(tree) = &self.completed else {
            error!(id, path, "open requested before any load completed");
            self.send(WorkerMessage::error(id, SizeError::Lookup.to_string()));
            return;
        };

        let node = tree.find(path).map(|node| tree.format_node(node, 1));
        debug!(id, path, found = node.is_some(), "open");
        self.send(WorkerMessage::reply(id, ReplyResult::Node(node)));
    }

    fn send(&self, message: WorkerMessage) {
        if self.messages.send(message).is_err() {
            debug!("message receiver dropped");
        }
    }
}

/// Completion estimate sent with progress updates
pub fn estimate_percent(root_size: i64, meta: Option<Meta>) -> f64 {
    match meta {
        None => 0.0,
        Some(meta) if meta.total == 0 => 0.1,
        Some(meta) => (root_size as f64 / meta.total as f64).max(0.1),
    }
}

fn snapshot(builder: &TreeBuilder, meta: Option<Meta>, error: Option<String>) -> TreeProgress {
    let tree = builder.tree();
    TreeProgress {
        root: tree.format_root(),
        percent: estimate_percent(tree.root_node().size, meta),
        diff_mode: meta.is_some_and(|m| m.diff_mode),
        error,
    }
}

async fn consume(
    records: &mut RecordStream,
    builder: &mut TreeBuilder,
    meta: &mut Option<Meta>,
    sink: &ProgressSink,
    interval: Duration,
) -> Result<(), SizeError> {
    let mut last_sent = Instant::now();

    while let Some(record) = records.next().await {
        match (record?, *meta) {
            (Record::Meta(first), None) => {
                debug!(total = first.total, diff_mode = first.diff_mode, "received meta");
                *meta = Some(first);
                sink.send(snapshot(builder, *meta, None));
            }
            (Record::Meta(_), Some(_)) => {
                return Err(SizeError::MalformedEntry("meta record repeated".to_string()));
            }
            (Record::File(entry), None) => {
                return Err(SizeError::MalformedEntry(format!(
                    "file \"{}\" arrived before the meta record",
                    entry.path
                )));
            }
            (Record::File(entry), Some(current)) => {
                builder.add_file_entry(&entry, current.diff_mode)?;

                if last_sent.elapsed() > interval {
                    sink.send(snapshot(builder, *meta, None));
                    // Let the worker serve queued requests
                    tokio::task::yield_now().await;
                    last_sent = Instant::now();
                }
            }
        }
    }

    if meta.is_none() {
        return Err(SizeError::MalformedEntry("stream ended before the meta record".to_string()));
    }
    Ok(())
}

/// Drain `records` into a new tree
///
/// On failure the partial tree is reported through the progress error. It is
/// still returned once the meta record arrived, so it can be opened; a load
/// that failed before its meta record returns no tree.
async fn build_tree(
    mut records: RecordStream,
    options: FilterOptions,
    sink: ProgressSink,
    interval: Duration,
) -> (Option<Tree>, TreeProgress) {
    let mut builder = TreeBuilder::from_options(options);
    let mut meta = None;

    match consume(&mut records, &mut builder, &mut meta, &sink, interval).await {
        Ok(()) => {
            let tree = builder.build();
            let progress = TreeProgress {
                root: tree.format_root(),
                percent: 1.0,
                diff_mode: meta.is_some_and(|m| m.diff_mode),
                error: None,
            };
            (Some(tree), progress)
        }
        Err(e) => {
            let progress = snapshot(&builder, meta, Some(e.to_string()));
            let tree = meta.is_some().then(|| builder.build());
            (tree, progress)
        }
    }
}
