//! Breadth-first enumeration of a folder tree with bounded fan-out.
//!
//! A single coordinator owns the work queue. It hands folders to expansion
//! tasks (at most `threads` at a time), forwards their children to the output
//! channel, and enqueues child folders. The channel closes once the queue is
//! empty and no expansion is in flight.

use crate::{
    batch::Cancellation,
    error::{Error, Result},
};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// A file or folder as the traversal sees it. `raw` is the resource exactly as
/// the remote returned it and is what gets emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
    pub size: Option<u64>,
    pub raw: Value,
}

impl Node {
    pub fn from_json(raw: Value) -> Result<Self> {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);

        let id = text("id")
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("id"))?;

        let parents = raw
            .get("parents")
            .and_then(Value::as_array)
            .map(|ps| {
                ps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        // int64 values travel as strings
        let size = match raw.get("size") {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.as_u64(),
            _ => None,
        };

        Ok(Self {
            id,
            name: text("name").unwrap_or_default(),
            mime_type: text("mimeType").unwrap_or_default(),
            parents,
            size,
            raw,
        })
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// The remote operations a traversal needs
pub trait FolderStore: Send + Sync {
    fn node<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Node>>;
    /// Every non-trashed node listing `folder` among its parents
    fn children<'a>(&'a self, folder: &'a str) -> BoxFuture<'a, Result<Vec<Node>>>;
    fn create_folder<'a>(&'a self, name: &'a str, parent: &'a str) -> BoxFuture<'a, Result<Node>>;
}

#[derive(Clone, Debug, Default)]
pub struct Traversal {
    pub root: String,
    /// Folder ids that are neither emitted nor descended into
    pub exclude: HashSet<String>,
    pub include_root: bool,
    pub threads: usize,
}

/// Emits every descendant of `traversal.root`. Fails only when the root
/// itself cannot be read; a folder that fails to list is logged and its
/// subtree is missing from the output.
pub async fn list_recursive<S>(
    store: Arc<S>,
    traversal: Traversal,
    cancel: Cancellation,
) -> Result<mpsc::Receiver<Node>>
where
    S: FolderStore + 'static,
{
    let threads = traversal.threads.max(1);
    let (tx, rx) = mpsc::channel(threads * 4);

    if traversal.exclude.contains(&traversal.root) {
        return Ok(rx);
    }

    let root = store.node(&traversal.root).await?;

    tokio::spawn(async move {
        if traversal.include_root && tx.send(root.clone()).await.is_err() {
            return;
        }

        if !root.is_folder() {
            return;
        }

        let permits = Arc::new(Semaphore::new(threads));
        let mut queue = VecDeque::from([root.id]);
        let mut expansions = JoinSet::new();

        loop {
            while let Some(folder) = queue.pop_front() {
                if cancel.is_cancelled() {
                    queue.clear();
                    break;
                }

                let Ok(permit) = permits.clone().acquire_owned().await else {
                    return;
                };

                let store = store.clone();
                expansions.spawn(async move {
                    let _permit = permit;
                    let children = store.children(&folder).await;
                    (folder, children)
                });
            }

            let Some(joined) = expansions.join_next().await else {
                break;
            };

            let (folder, children) = match joined {
                Ok(expanded) => expanded,
                Err(err) => {
                    tracing::warn!(error = %err, "folder expansion aborted");
                    continue;
                }
            };

            let children = match children {
                Ok(children) => children,
                Err(err) => {
                    tracing::warn!(%folder, error = %err, "unable to list folder, skipping subtree");
                    continue;
                }
            };

            for child in children {
                // Multi-parent nodes are only reached through their first parent
                if child.first_parent() != Some(folder.as_str()) {
                    continue;
                }

                if child.is_folder() {
                    if traversal.exclude.contains(&child.id) {
                        continue;
                    }
                    queue.push_back(child.id.clone());
                }

                if tx.send(child).await.is_err() {
                    return;
                }
            }
        }
    });

    Ok(rx)
}

/// A source folder and the folder created in its place
#[derive(Clone, Debug)]
pub struct CopiedFolder {
    pub source: Node,
    pub target: String,
    /// 0 for the root
    pub depth: usize,
}

pub struct Skeleton {
    /// The copy of the root, created under the new parent. `None` when the
    /// root itself is excluded and nothing was copied.
    pub root: Option<Node>,
    /// Every file of the source tree paired with the id of its new parent
    pub files: mpsc::Receiver<(Node, String)>,
    /// Resolves once the traversal is done, with every folder copied
    pub folders: tokio::task::JoinHandle<Vec<CopiedFolder>>,
}

/// Recreates the folder tree under `root` inside `new_parent` and streams
/// back every file together with the id of the folder it belongs in now.
/// Folders are created in discovery order, which always puts a parent
/// before its children.
pub async fn copy_folders_and_return_files_with_new_parents<S>(
    store: Arc<S>,
    traversal: Traversal,
    new_parent: &str,
    cancel: Cancellation,
) -> Result<Skeleton>
where
    S: FolderStore + 'static,
{
    if traversal.exclude.contains(&traversal.root) {
        tracing::debug!(root = %traversal.root, "root is excluded, nothing to copy");
        let (_, files) = mpsc::channel(1);
        return Ok(Skeleton {
            root: None,
            files,
            folders: tokio::spawn(async { Vec::new() }),
        });
    }

    let source_root = store.node(&traversal.root).await?;
    if !source_root.is_folder() {
        return Err(Error::argument(format!(
            "{} is not a folder",
            source_root.id
        )));
    }

    let root = store.create_folder(&source_root.name, new_parent).await?;
    tracing::debug!(source = %source_root.id, target = %root.id, "created root folder");

    let mut nodes = list_recursive(
        store.clone(),
        Traversal {
            include_root: false,
            ..traversal
        },
        cancel,
    )
    .await?;

    let (tx, files) = mpsc::channel(64);
    let target_root = root.id.clone();

    let folders = tokio::spawn(async move {
        let mut mapping = HashMap::<String, (String, usize)>::new();
        mapping.insert(source_root.id.clone(), (target_root.clone(), 0));

        let mut copied = vec![CopiedFolder {
            source: source_root,
            target: target_root,
            depth: 0,
        }];

        let mut files_open = true;

        while let Some(node) = nodes.recv().await {
            let Some((parent, depth)) = node
                .first_parent()
                .and_then(|p| mapping.get(p))
                .cloned()
            else {
                tracing::warn!(id = %node.id, name = %node.name, "parent was not copied, skipping");
                continue;
            };

            if node.is_folder() {
                match store.create_folder(&node.name, &parent).await {
                    Ok(created) => {
                        mapping.insert(node.id.clone(), (created.id.clone(), depth + 1));
                        copied.push(CopiedFolder {
                            source: node,
                            target: created.id,
                            depth: depth + 1,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(folder = %node.id, error = %err, "unable to create folder copy, skipping subtree");
                    }
                }
            } else if files_open && tx.send((node, parent)).await.is_err() {
                files_open = false;
            }
        }

        copied
    });

    Ok(Skeleton {
        root: Some(root),
        files,
        folders,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    /// An in-memory tree standing in for the remote
    #[derive(Default)]
    pub(crate) struct Tree {
        nodes: Mutex<HashMap<String, Node>>,
        broken: HashSet<String>,
        next_id: AtomicUsize,
        pub(crate) lists: AtomicUsize,
    }

    impl Tree {
        pub(crate) fn add(&self, id: &str, parents: &[&str], folder: bool) {
            let (mime, size) = if folder {
                (FOLDER_MIME, Value::Null)
            } else {
                ("text/plain", json!("10"))
            };
            let raw = json!({
                "id": id,
                "name": format!("name-{id}"),
                "mimeType": mime,
                "parents": parents,
                "size": size,
            });
            self.nodes
                .lock()
                .unwrap()
                .insert(id.to_owned(), Node::from_json(raw).unwrap());
        }

        fn with_broken(mut self, id: &str) -> Self {
            self.broken.insert(id.to_owned());
            self
        }

        fn created(&self) -> Vec<Node> {
            self.nodes
                .lock()
                .unwrap()
                .values()
                .filter(|n| n.id.starts_with("new"))
                .cloned()
                .collect()
        }
    }

    impl FolderStore for Tree {
        fn node<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Node>> {
            Box::pin(async move {
                self.nodes
                    .lock()
                    .unwrap()
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::Remote {
                        status: 404,
                        reason: None,
                        message: format!("File not found: {id}"),
                    })
            })
        }

        fn children<'a>(&'a self, folder: &'a str) -> BoxFuture<'a, Result<Vec<Node>>> {
            Box::pin(async move {
                self.lists.fetch_add(1, Ordering::SeqCst);
                if self.broken.contains(folder) {
                    return Err(Error::Remote {
                        status: 500,
                        reason: None,
                        message: "backend error".to_owned(),
                    });
                }

                let mut children: Vec<_> = self
                    .nodes
                    .lock()
                    .unwrap()
                    .values()
                    .filter(|n| n.parents.iter().any(|p| p == folder))
                    .cloned()
                    .collect();
                children.sort_by(|a, b| a.id.cmp(&b.id));
                Ok(children)
            })
        }

        fn create_folder<'a>(
            &'a self,
            name: &'a str,
            parent: &'a str,
        ) -> BoxFuture<'a, Result<Node>> {
            Box::pin(async move {
                let id = format!("new{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                let node = Node::from_json(json!({
                    "id": id,
                    "name": name,
                    "mimeType": FOLDER_MIME,
                    "parents": [parent],
                }))?;
                self.nodes
                    .lock()
                    .unwrap()
                    .insert(id.clone(), node.clone());
                Ok(node)
            })
        }
    }

    /// root ─┬─ f1 ─┬─ a
    ///       │      └─ f2 ── b
    ///       ├─ c
    ///       └─ f3 ── d
    pub(crate) fn sample() -> Tree {
        let tree = Tree::default();
        tree.add("root", &[], true);
        tree.add("f1", &["root"], true);
        tree.add("f2", &["f1"], true);
        tree.add("f3", &["root"], true);
        tree.add("a", &["f1"], false);
        tree.add("b", &["f2"], false);
        tree.add("c", &["root"], false);
        tree.add("d", &["f3"], false);
        tree
    }

    async fn collect<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        let mut ids: Vec<_> = nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    fn traversal(threads: usize) -> Traversal {
        Traversal {
            root: "root".to_owned(),
            threads,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn emits_every_descendant() {
        for threads in [1, 2, 8] {
            let rx = list_recursive(Arc::new(sample()), traversal(threads), Cancellation::new())
                .await
                .unwrap();
            let nodes = collect(rx).await;
            assert_eq!(ids(&nodes), ["a", "b", "c", "d", "f1", "f2", "f3"]);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn include_root() {
        let rx = list_recursive(
            Arc::new(sample()),
            Traversal {
                include_root: true,
                ..traversal(4)
            },
            Cancellation::new(),
        )
        .await
        .unwrap();
        let nodes = collect(rx).await;
        assert_eq!(nodes.len(), 8);
        assert_eq!(nodes[0].id, "root");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn excluded_folders_are_pruned() {
        let rx = list_recursive(
            Arc::new(sample()),
            Traversal {
                exclude: HashSet::from(["f1".to_owned()]),
                ..traversal(4)
            },
            Cancellation::new(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&collect(rx).await), ["c", "d", "f3"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn excluded_root_emits_nothing() {
        let tree = Arc::new(sample());
        let rx = list_recursive(
            tree.clone(),
            Traversal {
                exclude: HashSet::from(["root".to_owned()]),
                include_root: true,
                ..traversal(4)
            },
            Cancellation::new(),
        )
        .await
        .unwrap();
        assert!(collect(rx).await.is_empty());
        assert_eq!(tree.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_root_fails() {
        let err = list_recursive(
            Arc::new(Tree::default()),
            traversal(2),
            Cancellation::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Remote { status: 404, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broken_folders_are_skipped() {
        let rx = list_recursive(
            Arc::new(sample().with_broken("f1")),
            traversal(3),
            Cancellation::new(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&collect(rx).await), ["c", "d", "f1", "f3"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn multi_parent_nodes_follow_their_first_parent() {
        let tree = sample();
        // listed under both f1 and f3, but only reached through f3
        tree.add("shared", &["f3", "f1"], false);
        let rx = list_recursive(Arc::new(tree), traversal(4), Cancellation::new())
            .await
            .unwrap();
        let nodes = collect(rx).await;
        assert_eq!(nodes.iter().filter(|n| n.id == "shared").count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_traversals_stop_expanding() {
        let tree = Arc::new(sample());
        let cancel = Cancellation::new();
        cancel.cancel();
        let rx = list_recursive(tree.clone(), traversal(4), cancel).await.unwrap();
        assert!(collect(rx).await.is_empty());
        assert_eq!(tree.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn skeleton_mirrors_the_tree() {
        let tree = Arc::new(sample());
        tree.add("dest", &[], true);

        let skeleton = copy_folders_and_return_files_with_new_parents(
            tree.clone(),
            traversal(4),
            "dest",
            Cancellation::new(),
        )
        .await
        .unwrap();

        let root = skeleton.root.clone().unwrap();
        assert_eq!(root.parents, ["dest"]);
        assert_eq!(root.name, "name-root");

        let files = collect(skeleton.files).await;
        let folders = skeleton.folders.await.unwrap();

        // root plus f1, f2 and f3
        assert_eq!(folders.len(), 4);
        assert_eq!(tree.created().len(), 4);

        let target_of = |source: &str| {
            folders
                .iter()
                .find(|f| f.source.id == source)
                .map(|f| f.target.clone())
                .unwrap()
        };

        let mut placed: Vec<(String, String)> = files
            .iter()
            .map(|(file, parent)| (file.id.clone(), parent.clone()))
            .collect();
        placed.sort();
        assert_eq!(
            placed,
            vec![
                ("a".to_owned(), target_of("f1")),
                ("b".to_owned(), target_of("f2")),
                ("c".to_owned(), root.id.clone()),
                ("d".to_owned(), target_of("f3")),
            ]
        );

        let depth_of = |source: &str| folders.iter().find(|f| f.source.id == source).unwrap().depth;
        assert_eq!(depth_of("root"), 0);
        assert_eq!(depth_of("f1"), 1);
        assert_eq!(depth_of("f2"), 2);

        // every created folder sits under the copy of its source's parent
        for folder in folders.iter().filter(|f| f.depth > 0) {
            let created = tree.node(&folder.target).await.unwrap();
            let source_parent = folder.source.first_parent().unwrap();
            assert_eq!(created.first_parent(), Some(target_of(source_parent).as_str()));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn excluded_root_copies_nothing() {
        let tree = Arc::new(sample());
        tree.add("dest", &[], true);

        let skeleton = copy_folders_and_return_files_with_new_parents(
            tree.clone(),
            Traversal {
                exclude: HashSet::from(["root".to_owned()]),
                ..traversal(4)
            },
            "dest",
            Cancellation::new(),
        )
        .await
        .unwrap();

        assert!(skeleton.root.is_none());
        assert!(collect(skeleton.files).await.is_empty());
        assert!(skeleton.folders.await.unwrap().is_empty());
        assert!(tree.created().is_empty());
        assert_eq!(tree.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn skeleton_needs_a_folder_root() {
        let tree = Arc::new(sample());
        let err = copy_folders_and_return_files_with_new_parents(
            tree,
            Traversal {
                root: "a".to_owned(),
                ..traversal(1)
            },
            "dest",
            Cancellation::new(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, Error::Argument(_)));
    }
}
