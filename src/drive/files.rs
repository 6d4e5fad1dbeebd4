use super::{all_drives, url, DriveStore};
use crate::{
    api::{Api, Service},
    batch::{self, Summary},
    cmd::{driver, handler, id_result, Noun, Runtime, Verb},
    compose::{Composer, Query},
    error::{Error, Result},
    flags::{self, Flag, FlagValue, ValueMap},
    output::Sink,
    traverse::{self, FolderStore, Node},
};
use number_prefix::NumberPrefix;
use serde_json::{json, Value};
use std::sync::Arc;

const KEYED: &[&str] = &[
    "get",
    "copy",
    "update",
    "move",
    "delete",
    "modifyLabels",
    "listLabels",
];
const WRITE: &[&str] = &["create", "update"];

fn flags() -> Vec<Flag> {
    vec![
        Flag::string("fileId", "The id of the file")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("q", "Search query restricting the listing")
            .available_for(&["list"]),
        Flag::string("corpora", "user, drive, domain or allDrives")
            .available_for(&["list"]),
        Flag::string("driveId", "Shared drive to search, with --corpora drive")
            .available_for(&["list"]),
        Flag::string("orderBy", "Comma-separated sort keys such as modifiedTime desc")
            .available_for(&["list"]),
        Flag::string("spaces", "drive or appDataFolder").available_for(&["list"]),
        Flag::int64("pageSize", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "1000"),
        Flag::bool(
            "includeItemsFromAllDrives",
            "Include shared drive items in the listing",
        )
        .available_for(&["list"])
        .default_for(&["list"], "true"),
        Flag::string("name", "The name of the file")
            .available_for(&["create", "update", "copy"])
            .required_for(&["create"]),
        Flag::string("mimeType", "The MIME type of the file").available_for(WRITE),
        Flag::string("description", "A short description of the file")
            .available_for(&["create", "update", "copy"]),
        Flag::bool("starred", "Whether the user has starred the file").available_for(WRITE),
        Flag::bool("trashed", "Whether the file is in the trash").available_for(&["update"]),
        Flag::string_list("parents", "Folders the file is created in")
            .available_for(&["create"]),
        Flag::string_list("addParents", "Folders to add the file to")
            .available_for(&["update"]),
        Flag::string_list("removeParents", "Folders to remove the file from")
            .available_for(&["update"]),
        Flag::string("parent", "Folder the copy or the moved file ends up in")
            .available_for(&["copy", "move"])
            .required_for(&["move"])
            .recursive_for(&["copy", "move"]),
        Flag::string("folderId", "Folder whose direct children are counted")
            .available_for(&["count"])
            .required_for(&["count"]),
        Flag::string_list("addLabels", "Ids of labels to apply")
            .available_for(&["modifyLabels"])
            .recursive_for(&["modifyLabels"]),
        Flag::string_list("removeLabels", "Ids of labels to remove")
            .available_for(&["modifyLabels"])
            .recursive_for(&["modifyLabels"]),
        flags::fields(&["list", "get", "create", "copy", "update", "move", "listLabels"]),
    ]
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, &["files"])?,
        all_drives(Query::from_flags(
            map,
            &[
                "q",
                "corpora",
                "driveId",
                "orderBy",
                "spaces",
                "pageSize",
                "includeItemsFromAllDrives",
                "fields",
            ],
        )),
        "files",
    )
    .await
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, &["files", map.required("fileId")?])?,
        &all_drives(Query::from_flags(map, &["fields"])),
    )
    .await
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = Composer::new(map)
        .fields(&["name", "mimeType", "description", "starred", "parents"])
        .body();

    api.post(
        url(api, &["files"])?,
        &all_drives(Query::from_flags(map, &["fields"])),
        &body,
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = Composer::new(map)
        .fields(&["name", "mimeType", "description", "starred", "trashed"])
        .body();

    let query = Query::from_flags(map, &["fields"])
        .flag(map, "addParents", "addParents")
        .flag(map, "removeParents", "removeParents");

    api.patch(
        url(api, &["files", map.required("fileId")?])?,
        &all_drives(query),
        &body,
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(api, &["files", map.required("fileId")?])?,
        &all_drives(Query::new()),
    )
    .await?;
    Ok(id_result(map, "fileId", true))
}

fn copy_body(map: &ValueMap) -> Value {
    let mut composer = Composer::new(map);
    composer.fields(&["name", "description"]);
    if let Some(parent) = map.string("parent").filter(|p| !p.is_empty()) {
        composer.with("parents", json!([parent]));
    }
    composer.body()
}

async fn copy(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["files", map.required("fileId")?, "copy"])?,
        &all_drives(Query::from_flags(map, &["fields"])),
        &copy_body(map),
    )
    .await
}

/// Moves a file out of every folder it is in and into `parent`
async fn move_file(api: &Api, map: &ValueMap) -> Result<Value> {
    let file_id = map.required("fileId")?;
    let parent = map.required("parent")?;

    let current = api
        .get(
            url(api, &["files", file_id])?,
            &all_drives(Query::new().push("fields", "parents")),
        )
        .await?;

    let previous: Vec<&str> = current
        .get("parents")
        .and_then(Value::as_array)
        .map(|ps| ps.iter().filter_map(Value::as_str).filter(|p| *p != parent).collect())
        .unwrap_or_default();

    let mut query = Query::from_flags(map, &["fields"]).push("addParents", parent);
    if !previous.is_empty() {
        query = query.push("removeParents", previous.join(","));
    }

    api.patch(url(api, &["files", file_id])?, &all_drives(query), &json!({}))
        .await
}

fn label_modifications(map: &ValueMap) -> Value {
    let add = map
        .strings("addLabels")
        .iter()
        .map(|id| json!({ "labelId": id }));
    let remove = map
        .strings("removeLabels")
        .iter()
        .map(|id| json!({ "labelId": id, "removeLabel": true }));

    Value::Array(add.chain(remove).collect())
}

async fn modify_labels(api: &Api, map: &ValueMap) -> Result<Value> {
    let mods = label_modifications(map);
    if mods.as_array().map_or(true, Vec::is_empty) {
        return Err(Error::argument(
            "modifyLabels needs at least one of --addLabels or --removeLabels",
        ));
    }

    let body = Composer::new(map).with("labelModifications", mods).body();

    let res = api
        .post(
            url(api, &["files", map.required("fileId")?, "modifyLabels"])?,
            &Query::new(),
            &body,
        )
        .await?;

    Ok(json!({ "fileId": map.string("fileId"), "modifiedLabels": res.get("modifiedLabels") }))
}

async fn list_labels(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, &["files", map.required("fileId")?, "listLabels"])?,
        Query::from_flags(map, &["fields"]),
        "labels",
    )
    .await
}

/// File and folder totals of a traversal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Tally {
    files: u64,
    folders: u64,
    size: u64,
}

impl Tally {
    fn add(&mut self, node: &Node) {
        if node.is_folder() {
            self.folders += 1;
        } else {
            self.files += 1;
            self.size += node.size.unwrap_or_default();
        }
    }

    fn to_json(self) -> Value {
        json!({
            "files": self.files,
            "folders": self.folders,
            "size": self.size,
            "sizeHuman": human_size(self.size),
        })
    }
}

fn human_size(bytes: u64) -> String {
    match NumberPrefix::binary(bytes as f64) {
        NumberPrefix::Standalone(bytes) => format!("{bytes} B"),
        NumberPrefix::Prefixed(prefix, n) => format!("{n:.1} {prefix}B"),
    }
}

/// Counts the direct children of `--folderId`
async fn count(api: &Api, map: &ValueMap) -> Result<Value> {
    let store = DriveStore::unretried(api);
    let mut tally = Tally::default();
    for child in store.children(map.required("folderId")?).await? {
        tally.add(&child);
    }

    Ok(tally.to_json())
}

async fn list_tree(rt: &Runtime, map: &ValueMap, sink: &mut dyn Sink) -> Result<Summary> {
    let mut nodes = traverse::list_recursive(
        Arc::new(DriveStore::new(rt)),
        rt.traversal(map)?,
        rt.cancel.clone(),
    )
    .await?;

    let mut summary = Summary::default();
    while let Some(node) = nodes.recv().await {
        summary.rows += 1;
        sink.emit(node.raw)?;
        summary.succeeded += 1;
    }
    sink.finish()?;

    summary.cancelled = rt.cancel.is_cancelled();
    Ok(summary)
}

async fn count_tree(rt: &Runtime, map: &ValueMap, sink: &mut dyn Sink) -> Result<Summary> {
    let mut nodes = traverse::list_recursive(
        Arc::new(DriveStore::new(rt)),
        rt.traversal(map)?,
        rt.cancel.clone(),
    )
    .await?;

    let mut tally = Tally::default();
    let mut summary = Summary::default();
    while let Some(node) = nodes.recv().await {
        summary.rows += 1;
        tally.add(&node);
    }

    sink.emit(tally.to_json())?;
    sink.finish()?;

    summary.succeeded = summary.rows;
    summary.cancelled = rt.cancel.is_cancelled();
    Ok(summary)
}

/// Binds a skeleton file to the flags `copy` and `move_file` read
fn placed_row(map: &ValueMap, (file, parent): (Node, String)) -> ValueMap {
    let mut row = map.clone();
    row.set("fileId", FlagValue::String(file.id));
    row.set("name", FlagValue::String(file.name));
    row.set("parent", FlagValue::String(parent));
    row
}

async fn copy_tree(rt: &Runtime, map: &ValueMap, sink: &mut dyn Sink) -> Result<Summary> {
    let traversal = rt.traversal(map)?;
    let threads = traversal.threads;

    let skeleton = traverse::copy_folders_and_return_files_with_new_parents(
        Arc::new(DriveStore::new(rt)),
        traversal,
        map.required("parent")?,
        rt.cancel.clone(),
    )
    .await?;

    if let Some(root) = &skeleton.root {
        tracing::info!(root = %root.id, "created copy of the root folder");
    }

    let template = map.clone();
    let rows = batch::channel_rows(skeleton.files, move |placed| Ok(placed_row(&template, placed)));

    let api = &rt.api;
    let summary = rt
        .dispatcher(threads)
        .run(
            rows,
            move |row: ValueMap| async move { copy(api, &row).await },
            sink,
        )
        .await?;

    let folders = skeleton
        .folders
        .await
        .map_err(|err| Error::Task(err.to_string()))?;
    tracing::info!(folders = folders.len(), "copied folder tree");

    Ok(summary)
}

async fn move_tree(rt: &Runtime, map: &ValueMap, sink: &mut dyn Sink) -> Result<Summary> {
    let traversal = rt.traversal(map)?;
    let threads = traversal.threads;
    let store = Arc::new(DriveStore::new(rt));

    let skeleton = traverse::copy_folders_and_return_files_with_new_parents(
        store.clone(),
        traversal,
        map.required("parent")?,
        rt.cancel.clone(),
    )
    .await?;

    let template = map.clone();
    let rows = batch::channel_rows(skeleton.files, move |placed| Ok(placed_row(&template, placed)));

    let api = &rt.api;
    let summary = rt
        .dispatcher(threads)
        .run(
            rows,
            move |row: ValueMap| async move { move_file(api, &row).await },
            sink,
        )
        .await?;

    let mut folders = skeleton
        .folders
        .await
        .map_err(|err| Error::Task(err.to_string()))?;

    // Children go before their parents so every emptied folder can be removed
    folders.sort_by(|a, b| b.depth.cmp(&a.depth));

    for folder in folders {
        if rt.cancel.is_cancelled() {
            break;
        }

        let id = folder.source.id.as_str();
        match store.children(id).await {
            Ok(left) if left.is_empty() => {
                if let Err(err) = store.delete(id).await {
                    tracing::warn!(folder = id, error = %err, "unable to delete moved folder");
                }
            }
            Ok(left) => {
                tracing::warn!(folder = id, left = left.len(), "folder is not empty, keeping it");
            }
            Err(err) => {
                tracing::warn!(folder = id, error = %err, "unable to list moved folder");
            }
        }
    }

    Ok(summary)
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "fileId", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("list", "Lists or searches files", handler!(list))
            .batch()
            .recursive(driver!(list_tree)),
        Verb::new("get", "Gets the metadata of a file", handler!(get)).batch(),
        Verb::new("create", "Creates a file without content", handler!(create)).batch(),
        Verb::new("copy", "Copies a file", handler!(copy))
            .batch()
            .recursive(driver!(copy_tree)),
        Verb::new("update", "Updates the metadata of a file", handler!(update)).batch(),
        Verb::new("move", "Moves a file to another folder", handler!(move_file))
            .batch()
            .recursive(driver!(move_tree)),
        Verb::new(
            "delete",
            "Permanently deletes a file, skipping the trash",
            handler!(delete),
        )
        .batch()
        .on_failure(failed),
        Verb::new("count", "Counts files and folders and sums their size", handler!(count))
            .recursive(driver!(count_tree)),
        Verb::new(
            "modifyLabels",
            "Applies or removes labels on a file",
            handler!(modify_labels),
        )
        .batch()
        .per_file()
        .on_failure(failed),
        Verb::new("listLabels", "Lists the labels applied to a file", handler!(list_labels))
            .batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "files",
        about: "Manage drive files and folders",
        service: Service::Drive,
        flags,
        verbs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::FOLDER_MIME;

    fn node(mime: &str, size: Option<&str>) -> Node {
        Node::from_json(json!({ "id": "x", "mimeType": mime, "size": size })).unwrap()
    }

    #[test]
    fn tally_counts_files_and_folders() {
        let mut tally = Tally::default();
        tally.add(&node(FOLDER_MIME, None));
        tally.add(&node(FOLDER_MIME, None));
        tally.add(&node("text/plain", Some("100")));
        tally.add(&node("text/plain", Some("200")));
        tally.add(&node("image/png", Some("1748")));

        assert_eq!(
            tally,
            Tally {
                files: 3,
                folders: 2,
                size: 2048,
            }
        );
        assert_eq!(
            tally.to_json(),
            json!({"files": 3, "folders": 2, "size": 2048, "sizeHuman": "2.0 KiB"})
        );
    }

    #[test]
    fn small_sizes_have_no_prefix() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
    }

    #[test]
    fn label_modifications_combine() {
        let mut map = ValueMap::new();
        map.set("addLabels", FlagValue::StringList(vec!["a".to_owned()]));
        map.set("removeLabels", FlagValue::StringList(vec!["b".to_owned()]));

        assert_eq!(
            label_modifications(&map),
            json!([
                {"labelId": "a"},
                {"labelId": "b", "removeLabel": true},
            ])
        );
    }

    #[test]
    fn copies_only_name_the_parent_when_given() {
        let mut map = ValueMap::new();
        map.set("fileId", FlagValue::String("f".to_owned()));
        assert_eq!(copy_body(&map), json!({}));

        map.set("parent", FlagValue::String("p".to_owned()));
        map.set("name", FlagValue::String("copy of f".to_owned()));
        assert_eq!(
            copy_body(&map),
            json!({"name": "copy of f", "parents": ["p"]})
        );
    }
}
