//! Files, permissions and shared drives, plus the [`FolderStore`] every
//! recursive verb walks through.

pub mod drives;
pub mod files;
pub mod permissions;

use crate::{
    api::{Api, Service},
    batch::{self, Cancellation, FailureRecord, Summary},
    cmd::{Handler, Runtime},
    compose::Query,
    error::Result,
    flags::{FlagValue, ValueMap},
    output::Sink,
    retry::{Retrier, RetryPolicy},
    traverse::{self, FolderStore, Node, FOLDER_MIME},
};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

/// Always requested so the traversal can classify and place every node
const NODE_FIELDS: &str = "id,name,mimeType,parents,size,modifiedTime";

fn url(api: &Api, segments: &[&str]) -> Result<Url> {
    api.url(Service::Drive, segments)
}

/// Every drive call must opt in to shared drive items
fn all_drives(query: Query) -> Query {
    query.push("supportsAllDrives", "true")
}

/// The folder tree as seen through the drive REST surface
#[derive(Clone, Debug)]
pub struct DriveStore {
    api: Api,
    retrier: Retrier,
    cancel: Cancellation,
}

impl DriveStore {
    pub fn new(rt: &Runtime) -> Self {
        Self {
            api: rt.api.clone(),
            retrier: rt.retrier.clone(),
            cancel: rt.cancel.clone(),
        }
    }

    /// A store for a call the caller already retries as a whole
    pub fn unretried(api: &Api) -> Self {
        Self {
            api: api.clone(),
            retrier: Retrier::new(RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            }),
            cancel: Cancellation::new(),
        }
    }

    /// Deletes a node permanently, bypassing the trash
    pub async fn delete(&self, id: &str) -> Result<()> {
        let url = url(&self.api, &["files", id])?;
        let query = all_drives(Query::new());
        self.retrier
            .run(&self.cancel, || self.api.delete(url.clone(), &query))
            .await?;
        Ok(())
    }
}

/// Drive queries quote ids with `'`
fn in_parents(folder: &str) -> String {
    let escaped = folder.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and trashed = false")
}

impl FolderStore for DriveStore {
    fn node<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Node>> {
        Box::pin(async move {
            let url = url(&self.api, &["files", id])?;
            let query = all_drives(Query::new()).push("fields", NODE_FIELDS);
            let raw = self
                .retrier
                .run(&self.cancel, || self.api.get(url.clone(), &query))
                .await?;
            Node::from_json(raw)
        })
    }

    fn children<'a>(&'a self, folder: &'a str) -> BoxFuture<'a, Result<Vec<Node>>> {
        Box::pin(async move {
            let url = url(&self.api, &["files"])?;
            let query = all_drives(Query::new())
                .push("q", in_parents(folder))
                .push("includeItemsFromAllDrives", "true")
                .push("pageSize", "1000")
                .push("fields", format!("files({NODE_FIELDS})"));

            let listed = self
                .retrier
                .run(&self.cancel, || self.api.list(url.clone(), query.clone(), "files"))
                .await?;

            match listed {
                Value::Array(items) => items.into_iter().map(Node::from_json).collect(),
                _ => Ok(Vec::new()),
            }
        })
    }

    fn create_folder<'a>(&'a self, name: &'a str, parent: &'a str) -> BoxFuture<'a, Result<Node>> {
        Box::pin(async move {
            let url = url(&self.api, &["files"])?;
            let query = all_drives(Query::new()).push("fields", NODE_FIELDS);
            let body = json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent],
            });

            // Not retried, a retry after a lost response would create a twin
            let raw = self.api.post(url, &query, &body).await?;
            Node::from_json(raw)
        })
    }
}

/// Runs `handler` once for every traversed node, with `fileId` bound to the
/// node's id on top of the recursive flags in `map`
pub async fn per_file(
    rt: &Runtime,
    handler: Handler,
    on_failure: Option<FailureRecord>,
    map: &ValueMap,
    sink: &mut dyn Sink,
) -> Result<Summary> {
    let traversal = rt.traversal(map)?;
    let threads = traversal.threads;

    let nodes = traverse::list_recursive(
        Arc::new(DriveStore::new(rt)),
        traversal,
        rt.cancel.clone(),
    )
    .await?;

    let template = map.clone();
    let rows = batch::channel_rows(nodes, move |node: Node| {
        let mut row = template.clone();
        row.set("fileId", FlagValue::String(node.id));
        Ok(row)
    });

    let api = &rt.api;
    rt.dispatcher(threads)
        .on_failure(on_failure)
        .run(
            rows,
            move |row: ValueMap| async move { handler(api, &row).await },
            sink,
        )
        .await
}
