use super::{all_drives, url};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::{json, Value};

const ALL: &[&str] = &["create", "delete", "get", "list", "update"];
const KEYED: &[&str] = &["delete", "get", "update"];
const WRITE: &[&str] = &["create", "update"];

fn flags() -> Vec<Flag> {
    vec![
        Flag::string("fileId", "The id of the file or shared drive")
            .available_for(ALL)
            .required_for(ALL),
        Flag::string("permissionId", "The id of the permission")
            .available_for(KEYED)
            .required_for(KEYED)
            .recursive_for(&["delete"]),
        Flag::string("role", "owner, organizer, fileOrganizer, writer, commenter or reader")
            .available_for(WRITE)
            .required_for(&["create"])
            .recursive_for(&["create"]),
        Flag::string("type", "user, group, domain or anyone")
            .available_for(&["create"])
            .required_for(&["create"])
            .recursive_for(&["create"]),
        Flag::string("emailAddress", "Address of the user or group to grant access to")
            .available_for(&["create"])
            .recursive_for(&["create"]),
        Flag::string("domain", "Domain to grant access to, with --type domain")
            .available_for(&["create"])
            .recursive_for(&["create"]),
        Flag::bool(
            "allowFileDiscovery",
            "Whether the file can be found through search, for domain and anyone grants",
        )
        .available_for(&["create"])
        .recursive_for(&["create"]),
        Flag::string("expirationTime", "RFC 3339 time the permission expires at")
            .available_for(WRITE)
            .recursive_for(&["create"]),
        Flag::bool("sendNotificationEmail", "Notify the grantee by mail")
            .available_for(&["create"])
            .recursive_for(&["create"]),
        Flag::string("emailMessage", "Plain text added to the notification mail")
            .available_for(&["create"])
            .recursive_for(&["create"]),
        Flag::bool(
            "transferOwnership",
            "Confirms an ownership transfer, required with --role owner",
        )
        .available_for(WRITE)
        .recursive_for(&["create"]),
        Flag::bool(
            "useDomainAdminAccess",
            "Act as a domain administrator",
        )
        .available_for(ALL)
        .recursive_for(&["create", "delete", "list"]),
        flags::fields(&["create", "get", "list", "update"]).recursive_for(&["create", "list"]),
    ]
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&[
            "role",
            "type",
            "emailAddress",
            "domain",
            "allowFileDiscovery",
            "expirationTime",
        ])
        .body()
}

fn query(map: &ValueMap, params: &[&str]) -> Query {
    all_drives(Query::from_flags(map, params)).flag(
        map,
        "useDomainAdminAccess",
        "useDomainAdminAccess",
    )
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["files", map.required("fileId")?, "permissions"])?,
        &query(
            map,
            &[
                "sendNotificationEmail",
                "emailMessage",
                "transferOwnership",
                "fields",
            ],
        ),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(
            api,
            &[
                "files",
                map.required("fileId")?,
                "permissions",
                map.required("permissionId")?,
            ],
        )?,
        &query(map, &[]),
    )
    .await?;

    Ok(result(map, true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(
            api,
            &[
                "files",
                map.required("fileId")?,
                "permissions",
                map.required("permissionId")?,
            ],
        )?,
        &query(map, &["fields"]),
    )
    .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    let permissions = api
        .list(
            url(api, &["files", map.required("fileId")?, "permissions"])?,
            query(map, &["fields"]),
            "permissions",
        )
        .await?;

    Ok(json!({ "fileId": map.string("fileId"), "permissions": permissions }))
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = Composer::new(map).fields(&["role", "expirationTime"]).body();

    api.patch(
        url(
            api,
            &[
                "files",
                map.required("fileId")?,
                "permissions",
                map.required("permissionId")?,
            ],
        )?,
        &query(map, &["transferOwnership", "fields"]),
        &body,
    )
    .await
}

/// Delete records name the file since the permission id repeats across files
fn result(map: &ValueMap, ok: bool) -> Value {
    let mut record = id_result(map, "permissionId", ok);
    record["fileId"] = json!(map.string("fileId"));
    record
}

fn failed(map: &ValueMap) -> Value {
    result(map, false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Shares a file or shared drive", handler!(create))
            .batch()
            .per_file(),
        Verb::new("delete", "Removes a permission", handler!(delete))
            .batch()
            .per_file()
            .on_failure(failed),
        Verb::new("get", "Gets a permission", handler!(get)).batch(),
        Verb::new("list", "Lists the permissions of a file", handler!(list))
            .batch()
            .per_file(),
        Verb::new("update", "Changes the role of a permission", handler!(update)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "permissions",
        about: "Manage sharing of drive files",
        service: Service::Drive,
        flags,
        verbs,
    }
}
