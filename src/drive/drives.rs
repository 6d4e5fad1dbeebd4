use super::url;
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::{json, Value};

const KEYED: &[&str] = &["delete", "get", "update", "hide", "unhide"];

fn flags() -> Vec<Flag> {
    vec![
        Flag::string("driveId", "The id of the shared drive")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string(
            "requestId",
            "Idempotency key, a repeated create with the same key is a no-op",
        )
        .available_for(&["create"])
        .required_for(&["create"]),
        Flag::string("name", "The name of the shared drive")
            .available_for(&["create", "update"])
            .required_for(&["create"]),
        Flag::string("themeId", "Theme to apply").available_for(&["create", "update"]),
        Flag::string("colorRgb", "Color of the drive as an RGB hex string")
            .available_for(&["create", "update"]),
        Flag::bool("adminManagedRestrictions", "Restrict changes to administrators")
            .available_for(&["update"]),
        Flag::bool("copyRequiresWriterPermission", "Disable copy, print and download for readers")
            .available_for(&["update"]),
        Flag::bool("domainUsersOnly", "Only domain users may access the drive")
            .available_for(&["update"]),
        Flag::bool("driveMembersOnly", "Only members may access items of the drive")
            .available_for(&["update"]),
        Flag::string("q", "Search query restricting the listing").available_for(&["list"]),
        Flag::int64("pageSize", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "100"),
        Flag::bool("useDomainAdminAccess", "Act as a domain administrator")
            .available_for(&["list", "get", "update", "delete"]),
        Flag::bool(
            "allowItemDeletion",
            "Delete the items of the drive too, needs --useDomainAdminAccess",
        )
        .available_for(&["delete"]),
        flags::fields(&["create", "get", "list", "update", "hide", "unhide"]),
    ]
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&["name", "themeId", "colorRgb"])
        .field("adminManagedRestrictions", "restrictions.adminManagedRestrictions")
        .field(
            "copyRequiresWriterPermission",
            "restrictions.copyRequiresWriterPermission",
        )
        .field("domainUsersOnly", "restrictions.domainUsersOnly")
        .field("driveMembersOnly", "restrictions.driveMembersOnly")
        .body()
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["drives"])?,
        &Query::from_flags(map, &["requestId", "fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(api, &["drives", map.required("driveId")?])?,
        &Query::from_flags(map, &["useDomainAdminAccess", "allowItemDeletion"]),
    )
    .await?;
    Ok(id_result(map, "driveId", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, &["drives", map.required("driveId")?])?,
        &Query::from_flags(map, &["useDomainAdminAccess", "fields"]),
    )
    .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, &["drives"])?,
        Query::from_flags(map, &["q", "pageSize", "useDomainAdminAccess", "fields"]),
        "drives",
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        url(api, &["drives", map.required("driveId")?])?,
        &Query::from_flags(map, &["useDomainAdminAccess", "fields"]),
        &body(map),
    )
    .await
}

async fn hide(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["drives", map.required("driveId")?, "hide"])?,
        &Query::from_flags(map, &["fields"]),
        &json!({}),
    )
    .await
}

async fn unhide(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["drives", map.required("driveId")?, "unhide"])?,
        &Query::from_flags(map, &["fields"]),
        &json!({}),
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "driveId", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Creates a shared drive", handler!(create)).batch(),
        Verb::new("delete", "Deletes a shared drive", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Gets a shared drive", handler!(get)).batch(),
        Verb::new("list", "Lists shared drives", handler!(list)),
        Verb::new("update", "Updates a shared drive", handler!(update)).batch(),
        Verb::new("hide", "Hides a shared drive from the default view", handler!(hide)).batch(),
        Verb::new("unhide", "Restores a shared drive to the default view", handler!(unhide))
            .batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "drives",
        about: "Manage shared drives",
        service: Service::Drive,
        flags,
        verbs,
    }
}
