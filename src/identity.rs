//! Groups as the identity service sees them, addressed by resource name
//! rather than by address.

use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::Query,
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;
use url::Url;

const KEYED: &[&str] = &["get", "delete"];

fn flags() -> Vec<Flag> {
    vec![
        Flag::string("name", "Resource name of the group, groups/<id> or just <id>")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("parent", "The account to list groups of, customers/<customer id>")
            .available_for(&["list"])
            .required_for(&["list"]),
        Flag::string("view", "BASIC or FULL")
            .available_for(&["get", "list"])
            .default_for(&["list"], "BASIC"),
        Flag::int64("pageSize", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "500"),
        Flag::string("email", "Address of the group to look up")
            .available_for(&["lookup"])
            .required_for(&["lookup"]),
        Flag::string("namespace", "Namespace of the address, for groups synced from elsewhere")
            .available_for(&["lookup"]),
        flags::fields(&["get", "list", "lookup"]),
    ]
}

/// Accepts a bare id as well as the full `groups/<id>` name
fn group_url(api: &Api, map: &ValueMap) -> Result<Url> {
    let name = map.required("name")?;
    let id = name.strip_prefix("groups/").unwrap_or(name);
    api.url(Service::CloudIdentity, &["groups", id])
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(group_url(api, map)?, &Query::from_flags(map, &["view", "fields"]))
        .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        api.url(Service::CloudIdentity, &["groups"])?,
        Query::from_flags(map, &["parent", "view", "pageSize", "fields"]),
        "groups",
    )
    .await
}

async fn lookup(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        api.url(Service::CloudIdentity, &["groups:lookup"])?,
        &Query::new()
            .flag(map, "email", "groupKey.id")
            .flag(map, "namespace", "groupKey.namespace")
            .flag(map, "fields", "fields"),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(group_url(api, map)?, &Query::new()).await?;
    Ok(id_result(map, "name", true))
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "name", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("get", "Gets a group", handler!(get)).batch(),
        Verb::new("list", "Lists the groups of an account", handler!(list)),
        Verb::new(
            "lookup",
            "Finds the resource name of a group by its address",
            handler!(lookup),
        )
        .batch(),
        Verb::new("delete", "Deletes a group", handler!(delete))
            .batch()
            .on_failure(failed),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "ciGroups",
        about: "Manage groups through the identity service",
        service: Service::CloudIdentity,
        flags,
        verbs,
    }
}
