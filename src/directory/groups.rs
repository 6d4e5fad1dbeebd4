use super::{scope_flags, scoped, url};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;

const KEYED: &[&str] = &["delete", "get", "update"];

fn flags() -> Vec<Flag> {
    let mut flags = vec![
        Flag::string(
            "groupKey",
            "Email address, alias, or unique id of the group",
        )
        .available_for(KEYED)
        .required_for(KEYED),
        Flag::string("email", "The group's email address")
            .available_for(&["create", "update"])
            .required_for(&["create"]),
        Flag::string("name", "The group's display name").available_for(&["create", "update"]),
        Flag::string("description", "What the group is for").available_for(&["create", "update"]),
        Flag::string(
            "userKey",
            "Only list the groups this user or group is a direct member of",
        )
        .available_for(&["list"]),
        Flag::string("query", "Search query, e.g. 'email:sales*'").available_for(&["list"]),
        Flag::string("orderBy", "Column to sort by, only email is supported")
            .available_for(&["list"]),
        Flag::string("sortOrder", "ASCENDING or DESCENDING").available_for(&["list"]),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "200"),
        flags::fields(&["create", "get", "list", "update"]),
    ];
    flags.extend(scope_flags(&["list"]));
    flags
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&["email", "name", "description"])
        .body()
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["groups"])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(url(api, &["groups", map.required("groupKey")?])?, &Query::new())
        .await?;
    Ok(id_result(map, "groupKey", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, &["groups", map.required("groupKey")?])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    // Listing a member's groups must not be narrowed to a customer
    let query = Query::from_flags(
        map,
        &["userKey", "query", "orderBy", "sortOrder", "maxResults", "fields"],
    );
    let query = if map.is_set("userKey") {
        query
    } else {
        scoped(map, query)
    };

    api.list(url(api, &["groups"])?, query, "groups").await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        url(api, &["groups", map.required("groupKey")?])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "groupKey", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Creates a group", handler!(create)).batch(),
        Verb::new("delete", "Deletes a group", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Retrieves a group's properties", handler!(get)).batch(),
        Verb::new(
            "list",
            "Retrieves all groups of a domain or of a user",
            handler!(list),
        )
        .batch(),
        Verb::new("update", "Updates a group's properties", handler!(update)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "groups",
        about: "Manage groups",
        service: Service::Directory,
        flags,
        verbs,
    }
}
