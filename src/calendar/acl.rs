use super::{calendar_flag, url};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;

const ALL: &[&str] = &["list", "get", "insert", "delete"];
const KEYED: &[&str] = &["get", "delete"];

fn flags() -> Vec<Flag> {
    vec![
        calendar_flag(ALL),
        Flag::string("ruleId", "The id of the rule, e.g. user:a@example.com")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string(
            "role",
            "none, freeBusyReader, reader, writer or owner",
        )
        .available_for(&["insert"])
        .required_for(&["insert"]),
        Flag::string("scopeType", "default, user, group or domain")
            .available_for(&["insert"])
            .required_for(&["insert"]),
        Flag::string(
            "scopeValue",
            "The address or domain the rule applies to, omitted for default",
        )
        .available_for(&["insert"]),
        Flag::bool("sendNotifications", "Notify about the sharing change")
            .available_for(&["insert"]),
        Flag::bool("showDeleted", "Include deleted rules").available_for(&["list"]),
        flags::fields(&["list", "get", "insert"]),
    ]
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, map, &["acl"])?,
        Query::from_flags(map, &["showDeleted", "fields"]),
        "items",
    )
    .await
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["acl", map.required("ruleId")?])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn insert(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = Composer::new(map)
        .field("role", "role")
        .field("scopeType", "scope.type")
        .field("scopeValue", "scope.value")
        .body();

    api.post(
        url(api, map, &["acl"])?,
        &Query::from_flags(map, &["sendNotifications", "fields"]),
        &body,
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(api, map, &["acl", map.required("ruleId")?])?,
        &Query::new(),
    )
    .await?;
    Ok(id_result(map, "ruleId", true))
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "ruleId", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("list", "Lists the access rules of a calendar", handler!(list)).batch(),
        Verb::new("get", "Gets an access rule", handler!(get)).batch(),
        Verb::new("insert", "Creates an access rule", handler!(insert)).batch(),
        Verb::new("delete", "Deletes an access rule", handler!(delete))
            .batch()
            .on_failure(failed),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "calendarAcl",
        about: "Manage who can see and edit calendars",
        service: Service::Calendar,
        flags,
        verbs,
    }
}
