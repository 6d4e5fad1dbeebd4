use super::{url, user_flag};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::{Error, Result},
    flags::{self, Flag, ValueMap},
};
use base64::Engine as _;
use serde_json::{json, Value};

const ALL: &[&str] = &[
    "list", "get", "delete", "trash", "untrash", "modify", "insert",
];
const KEYED: &[&str] = &["get", "delete", "trash", "untrash", "modify"];

fn flags() -> Vec<Flag> {
    vec![
        user_flag(ALL),
        Flag::string("id", "The id of the message")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("q", "Only return messages matching this search query")
            .available_for(&["list"]),
        Flag::string_list("labelIds", "Only return messages with all of these labels")
            .available_for(&["list", "insert"]),
        Flag::bool(
            "includeSpamTrash",
            "Include messages from SPAM and TRASH",
        )
        .available_for(&["list"]),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "500"),
        Flag::string("format", "minimal, full, raw or metadata")
            .available_for(&["get"])
            .default_for(&["get"], "full"),
        Flag::string_list(
            "metadataHeaders",
            "Headers to include with --format metadata",
        )
        .available_for(&["get"]),
        Flag::string_list("addLabelIds", "Labels to add to the message")
            .available_for(&["modify"]),
        Flag::string_list("removeLabelIds", "Labels to remove from the message")
            .available_for(&["modify"]),
        Flag::string("file", "Path of an RFC 822 message to insert")
            .available_for(&["insert"])
            .required_for(&["insert"]),
        Flag::string("threadId", "Thread the inserted message belongs to")
            .available_for(&["insert"]),
        Flag::string("internalDateSource", "receivedTime or dateHeader")
            .available_for(&["insert"])
            .default_for(&["insert"], "receivedTime"),
        Flag::bool(
            "deleted",
            "Mark the inserted message as permanently deleted, visible only to admins",
        )
        .available_for(&["insert"]),
        flags::fields(&["list", "get", "modify", "insert", "trash", "untrash"]),
    ]
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, map, &["messages"])?,
        Query::from_flags(
            map,
            &["q", "labelIds", "includeSpamTrash", "maxResults", "fields"],
        ),
        "messages",
    )
    .await
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["messages", map.required("id")?])?,
        &Query::from_flags(map, &["format", "metadataHeaders", "fields"]),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(url(api, map, &["messages", map.required("id")?])?, &Query::new())
        .await?;
    Ok(id_result(map, "id", true))
}

async fn trash(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["messages", map.required("id")?, "trash"])?,
        &Query::from_flags(map, &["fields"]),
        &json!({}),
    )
    .await
}

async fn untrash(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["messages", map.required("id")?, "untrash"])?,
        &Query::from_flags(map, &["fields"]),
        &json!({}),
    )
    .await
}

async fn modify(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = Composer::new(map)
        .fields(&["addLabelIds", "removeLabelIds"])
        .body();

    api.post(
        url(api, map, &["messages", map.required("id")?, "modify"])?,
        &Query::from_flags(map, &["fields"]),
        &body,
    )
    .await
}

/// Reads a message from disk into the url-safe base64 `raw` form
fn raw_message(path: &str) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|err| Error::argument(format!("unable to read --file {path}: {err}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE.encode(bytes))
}

async fn insert(api: &Api, map: &ValueMap) -> Result<Value> {
    let raw = raw_message(map.required("file")?)?;
    let body = Composer::new(map)
        .with("raw", json!(raw))
        .fields(&["labelIds", "threadId"])
        .body();

    api.post(
        url(api, map, &["messages"])?,
        &Query::from_flags(map, &["internalDateSource", "deleted", "fields"]),
        &body,
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "id", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("list", "Lists the messages of a mailbox", handler!(list)).batch(),
        Verb::new("get", "Gets a message", handler!(get)).batch(),
        Verb::new(
            "delete",
            "Immediately and permanently deletes a message",
            handler!(delete),
        )
        .batch()
        .on_failure(failed),
        Verb::new("trash", "Moves a message to the trash", handler!(trash))
            .batch()
            .on_failure(failed),
        Verb::new("untrash", "Removes a message from the trash", handler!(untrash))
            .batch()
            .on_failure(failed),
        Verb::new("modify", "Modifies the labels of a message", handler!(modify)).batch(),
        Verb::new(
            "insert",
            "Inserts a message into a mailbox without sending it",
            handler!(insert),
        )
        .batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "messages",
        about: "Manage mailbox messages",
        service: Service::Gmail,
        flags,
        verbs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_is_url_safe_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.eml");
        std::fs::write(&path, b"Subject: hi\r\n\r\n??>").unwrap();

        let raw = raw_message(path.to_str().unwrap()).unwrap();
        assert!(!raw.contains('+') && !raw.contains('/'));
        assert_eq!(
            base64::engine::general_purpose::URL_SAFE
                .decode(raw)
                .unwrap(),
            b"Subject: hi\r\n\r\n??>"
        );
    }

    #[test]
    fn missing_files_are_argument_errors() {
        assert!(matches!(
            raw_message("/nonexistent/m.eml"),
            Err(Error::Argument(_))
        ));
    }
}
