use super::{url, user_flag};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;

const ALL: &[&str] = &["create", "delete", "get", "list"];
const KEYED: &[&str] = &["delete", "get"];
const CREATE: &[&str] = &["create"];

fn flags() -> Vec<Flag> {
    vec![
        user_flag(ALL),
        Flag::string("id", "The id of the filter")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("from", "Match on the sender's display name or address")
            .available_for(CREATE),
        Flag::string("to", "Match on the recipient's display name or address")
            .available_for(CREATE),
        Flag::string("subject", "Case-insensitive phrase in the subject")
            .available_for(CREATE),
        Flag::string("query", "Only match messages matching this search query")
            .available_for(CREATE),
        Flag::string(
            "negatedQuery",
            "Only match messages not matching this search query",
        )
        .available_for(CREATE),
        Flag::bool("hasAttachment", "Whether the message has any attachment")
            .available_for(CREATE),
        Flag::bool(
            "excludeChats",
            "Whether the response should exclude chats",
        )
        .available_for(CREATE),
        Flag::int64("size", "The size of the message in bytes, see --sizeComparison")
            .available_for(CREATE),
        Flag::string("sizeComparison", "larger or smaller").available_for(CREATE),
        Flag::string_list("addLabelIds", "Labels to add to matching messages")
            .available_for(CREATE),
        Flag::string_list("removeLabelIds", "Labels to remove from matching messages")
            .available_for(CREATE),
        Flag::string("forward", "Address to forward matching messages to")
            .available_for(CREATE),
        flags::fields(ALL),
    ]
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .field("from", "criteria.from")
        .field("to", "criteria.to")
        .field("subject", "criteria.subject")
        .field("query", "criteria.query")
        .field("negatedQuery", "criteria.negatedQuery")
        .field("hasAttachment", "criteria.hasAttachment")
        .field("excludeChats", "criteria.excludeChats")
        .field("size", "criteria.size")
        .field("sizeComparison", "criteria.sizeComparison")
        .field("addLabelIds", "action.addLabelIds")
        .field("removeLabelIds", "action.removeLabelIds")
        .field("forward", "action.forward")
        .body()
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["settings", "filters"])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(api, map, &["settings", "filters", map.required("id")?])?,
        &Query::new(),
    )
    .await?;
    Ok(id_result(map, "id", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["settings", "filters", map.required("id")?])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, map, &["settings", "filters"])?,
        Query::from_flags(map, &["fields"]),
        "filter",
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "id", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Creates a message filter", handler!(create)).batch(),
        Verb::new("delete", "Deletes a message filter", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Gets a message filter", handler!(get)).batch(),
        Verb::new("list", "Lists the message filters of a mailbox", handler!(list)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "gmailFilters",
        about: "Manage message filters",
        service: Service::Gmail,
        flags,
        verbs,
    }
}
