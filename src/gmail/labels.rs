use super::{url, user_flag};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;

const ALL: &[&str] = &["create", "delete", "get", "list", "update"];
const KEYED: &[&str] = &["delete", "get", "update"];
const WRITE: &[&str] = &["create", "update"];

fn flags() -> Vec<Flag> {
    vec![
        user_flag(ALL),
        Flag::string("id", "The id of the label")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("name", "The display name of the label")
            .available_for(WRITE)
            .required_for(&["create"]),
        Flag::string(
            "labelListVisibility",
            "labelShow, labelShowIfUnread or labelHide",
        )
        .available_for(WRITE),
        Flag::string("messageListVisibility", "show or hide").available_for(WRITE),
        Flag::string("textColor", "Text color of the label, as a hex string")
            .available_for(WRITE),
        Flag::string(
            "backgroundColor",
            "Background color of the label, as a hex string",
        )
        .available_for(WRITE),
        flags::fields(ALL),
    ]
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&["name", "labelListVisibility", "messageListVisibility"])
        .field("textColor", "color.textColor")
        .field("backgroundColor", "color.backgroundColor")
        .body()
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["labels"])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(url(api, map, &["labels", map.required("id")?])?, &Query::new())
        .await?;
    Ok(id_result(map, "id", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["labels", map.required("id")?])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, map, &["labels"])?,
        Query::from_flags(map, &["fields"]),
        "labels",
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        url(api, map, &["labels", map.required("id")?])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "id", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Creates a new label", handler!(create)).batch(),
        Verb::new("delete", "Deletes a label", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Gets a label", handler!(get)).batch(),
        Verb::new("list", "Lists all labels of a mailbox", handler!(list)).batch(),
        Verb::new("update", "Updates a label", handler!(update)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "gmailLabels",
        about: "Manage mailbox labels",
        service: Service::Gmail,
        flags,
        verbs,
    }
}
