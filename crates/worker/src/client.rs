//! Handle for talking to a spawned tree worker
//!
//! Requests get increasing ids; replies are matched back to the waiting
//! caller. Progress updates go to whoever subscribed last.

use crate::protocol::{Action, LoadRequest, MessageBody, ReplyResult, Request, TreeProgress, WorkerMessage};
use crate::source::DataSource;
use crate::worker::{spawn, WorkerChannels};
use crate::WorkerConfig;
use ahash::AHashMap;
use parking_lot::Mutex;
use sd_core::{FormattedNode, SizeError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Pending = Arc<Mutex<AHashMap<u64, oneshot::Sender<MessageBody>>>>;
type ProgressSubscriber = Arc<Mutex<Option<mpsc::UnboundedSender<TreeProgress>>>>;

/// Client side of the worker protocol
pub struct WorkerClient {
    requests: mpsc::UnboundedSender<Request>,
    pending: Pending,
    progress: ProgressSubscriber,
    next_id: AtomicU64,
    worker: JoinHandle<()>,
    router: JoinHandle<()>,
}

impl WorkerClient {
    /// Spawn a worker for `source` and connect to it
    pub fn spawn(source: impl DataSource, config: WorkerConfig) -> Self {
        let WorkerChannels {
            requests,
            messages,
            handle,
        } = spawn(source, config);

        let pending: Pending = Arc::default();
        let progress: ProgressSubscriber = Arc::default();
        let router = tokio::spawn(route(messages, pending.clone(), progress.clone()));

        Self {
            requests,
            pending,
            progress,
            // The first request gets id 2
            next_id: AtomicU64::new(1),
            worker: handle,
            router,
        }
    }

    /// Receive progress updates of future loads, replacing any earlier subscriber
    pub fn subscribe_progress(&self) -> mpsc::UnboundedReceiver<TreeProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.progress.lock() = Some(tx);
        rx
    }

    /// Build a tree from `input` filtered by the `options` query string
    ///
    /// Resolves once the load finished. A load superseded before it started
    /// fails with a [`SizeError::Worker`] error.
    pub async fn load_tree(&self, input: Option<String>, options: &str) -> Result<TreeProgress, SizeError> {
        let load = LoadRequest {
            input,
            options: options.to_string(),
        };
        match self.wait_for_response(Action::Load(load)).await? {
            ReplyResult::Tree(progress) => Ok(progress),
            ReplyResult::Node(_) => Err(SizeError::Worker("unexpected reply to load".to_string())),
        }
    }

    /// Fetch a node and its direct children from the last completed load
    pub async fn open_node(&self, id_path: &str) -> Result<Option<FormattedNode>, SizeError> {
        match self.wait_for_response(Action::Open(id_path.to_string())).await? {
            ReplyResult::Node(node) => Ok(node),
            ReplyResult::Tree(_) => Err(SizeError::Worker("unexpected reply to open".to_string())),
        }
    }

    async fn wait_for_response(&self, action: Action) -> Result<ReplyResult, SizeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self.requests.send(Request { id, action }).is_err() {
            self.pending.lock().remove(&id);
            return Err(SizeError::Worker("worker stopped".to_string()));
        }

        match rx.await {
            Ok(MessageBody::Done { result }) => Ok(result),
            Ok(MessageBody::Failed { error }) => Err(SizeError::Worker(error)),
            Ok(MessageBody::Progress(_)) => Err(SizeError::Worker("progress sent as reply".to_string())),
            Err(_) => Err(SizeError::Worker("worker stopped".to_string())),
        }
    }

    /// Stop accepting requests and wait for running loads to finish
    pub async fn shutdown(self) {
        drop(self.requests);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "tree worker panicked");
        }
        let _ = self.router.await;
    }
}

async fn route(
    mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
    pending: Pending,
    progress: ProgressSubscriber,
) {
    while let Some(message) = messages.recv().await {
        if message.is_progress() {
            if let MessageBody::Progress(update) = message.body {
                if let Some(subscriber) = progress.lock().as_ref() {
                    let _ = subscriber.send(update);
                }
            }
            continue;
        }

        match pending.lock().remove(&message.id) {
            Some(waiter) => {
                let _ = waiter.send(message.body);
            }
            None => debug!(id = message.id, "reply without a waiter"),
        }
    }

    // Wake anyone still waiting
    pending.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use sd_core::{transform_build, FileData};

    fn client() -> WorkerClient {
        let snapshot = transform_build(&[
            FileData::new("js/app.js", 1200, 400),
            FileData::new("js/app.js.map", 5000, 1500),
            FileData::new("css/site.css", 300, 90),
        ]);
        WorkerClient::spawn(StaticSource::new(snapshot), WorkerConfig::default())
    }

    #[tokio::test]
    async fn test_load_and_open() {
        let client = client();
        let mut progress = client.subscribe_progress();

        let tree = client.load_tree(None, "").await.unwrap();
        assert_eq!(tree.percent, 1.0);
        assert!(!tree.diff_mode);
        assert_eq!(tree.root.size, 1200 + 400 + 5000 + 1500 + 300 + 90);

        // The meta update always arrives
        assert!(progress.recv().await.is_some());

        let app = client.open_node("js/app.js").await.unwrap().unwrap();
        assert_eq!(app.children.as_ref().unwrap().len(), 4);
        assert_eq!(client.open_node("js/nope.js").await.unwrap(), None);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_before_load_fails() {
        let client = client();
        let err = client.open_node("js").await.unwrap_err();
        assert!(matches!(err, SizeError::Worker(ref msg) if msg == "called open before load"));
    }

    #[tokio::test]
    async fn test_filters_apply() {
        let client = client();
        let tree = client.load_tree(None, "type=t&min_size=1000").await.unwrap();
        // Only the primary symbols of app.js and app.js.map pass
        assert_eq!(tree.root.size, 1200 + 5000);
    }

    #[tokio::test]
    async fn test_superseded_load_resolves_with_error() {
        let client = client();

        let (first, second) = tokio::join!(client.load_tree(None, ""), client.load_tree(None, "type=t"));
        let err = first.unwrap_err();
        assert!(matches!(err, SizeError::Worker(ref msg) if msg == "load superseded by request 3"));
        assert_eq!(second.unwrap().root.size, 1200 + 5000 + 300);

        assert!(client.pending.lock().is_empty());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_ids_start_at_two() {
        let client = client();
        let id = client.next_id.load(Ordering::Relaxed);
        assert_eq!(id + 1, 2);
    }
}
