//! Build and browse the size tree of a build, or of the diff between two builds

use crate::config::ReportConfig;
use crate::report;
use crate::util;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use sd_core::{transform_build, FormattedNode};
use sd_worker::{DiffSource, SnapshotFiles, StaticSource, TreeProgress, WorkerClient};
use serde::Serialize;
use std::path::Path;

/// Options of the `tree` command
pub struct TreeArgs<'a> {
    pub current: &'a Path,
    pub previous: Option<&'a Path>,
    pub open: &'a [String],
    pub json: bool,
    pub show_progress: bool,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    tree: &'a TreeProgress,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    opened: &'a [Option<FormattedNode>],
}

pub async fn run(args: TreeArgs<'_>, config: &ReportConfig) -> Result<()> {
    // 1. Pick the data source
    let client = match args.previous {
        Some(previous) => {
            let files = SnapshotFiles {
                previous: previous.to_path_buf(),
                current: args.current.to_path_buf(),
            };
            let source = match config.rename_pattern()? {
                Some(pattern) => DiffSource::new(files).with_rename(pattern),
                None => DiffSource::new(files),
            };
            WorkerClient::spawn(source, config.worker_config())
        }
        None => {
            let build = util::read_snapshot(args.current).await?;
            WorkerClient::spawn(StaticSource::new(transform_build(&build)), config.worker_config())
        }
    };

    // 2. Load, showing progress
    let bar = args.show_progress.then(progress_bar);
    let mut updates = client.subscribe_progress();
    let progress_task = bar.clone().map(|bar| {
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                bar.set_position((update.percent.clamp(0.0, 1.0) * 100.0) as u64);
            }
        })
    });

    let loaded = client.load_tree(None, &config.filters).await;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    if let Some(task) = progress_task {
        task.abort();
    }
    let mut progress = loaded?;

    // 3. Expand the requested levels; a failed load prints its partial root as is
    let mut opened = Vec::with_capacity(args.open.len());
    if progress.error.is_none() {
        let levels = config.depth.saturating_sub(1);
        progress.root = expand(&client, progress.root, levels).await?;

        for path in args.open {
            let node = match client.open_node(path).await? {
                Some(node) => Some(expand(&client, node, levels).await?),
                None => None,
            };
            opened.push(node);
        }
    }

    // 4. Display
    if args.json {
        let output = JsonOutput {
            tree: &progress,
            opened: &opened,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", report::render_tree(&progress.root, progress.diff_mode));
        for (path, node) in args.open.iter().zip(&opened) {
            println!();
            match node {
                Some(node) => print!("{}", report::render_tree(node, progress.diff_mode)),
                None => println!("{}: not found", path),
            }
        }
    }

    client.shutdown().await;

    match progress.error {
        Some(error) => Err(anyhow!(error)),
        None => Ok(()),
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.yellow} Building tree [{bar:40.blue/grey}] {percent}%") {
        bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    bar
}

/// Open unloaded children through the worker, `levels` deep
fn expand<'a>(client: &'a WorkerClient, node: FormattedNode, levels: usize) -> BoxFuture<'a, Result<FormattedNode>> {
    async move {
        let mut node = node;
        if levels == 0 {
            return Ok(node);
        }

        let Some(children) = node.children.take() else {
            return Ok(node);
        };

        let mut expanded = Vec::with_capacity(children.len());
        for child in children {
            let child = match child.children {
                None => match client.open_node(&child.id_path).await? {
                    Some(opened) => opened,
                    None => child,
                },
                Some(_) => child,
            };
            expanded.push(expand(client, child, levels - 1).await?);
        }
        node.children = Some(expanded);
        Ok(node)
    }
    .boxed()
}
