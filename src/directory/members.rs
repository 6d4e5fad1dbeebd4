use super::url;
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::{json, Value};

const ALL: &[&str] = &["insert", "delete", "get", "hasMember", "list", "update"];
const MEMBER: &[&str] = &["delete", "get", "hasMember", "update"];

fn flags() -> Vec<Flag> {
    vec![
        Flag::string("groupKey", "Email address, alias, or unique id of the group")
            .available_for(ALL)
            .required_for(ALL),
        Flag::string(
            "memberKey",
            "Email address or unique id of the member",
        )
        .available_for(MEMBER)
        .required_for(MEMBER),
        Flag::string("email", "The member's email address")
            .available_for(&["insert"])
            .required_for(&["insert"]),
        Flag::string("role", "OWNER, MANAGER or MEMBER")
            .available_for(&["insert", "update"])
            .default_for(&["insert"], "MEMBER"),
        Flag::string(
            "deliverySettings",
            "ALL_MAIL, DAILY, DIGEST, DISABLED or NONE",
        )
        .available_for(&["insert", "update"]),
        Flag::string_list(
            "roles",
            "Only list members with these roles: OWNER, MANAGER, MEMBER",
        )
        .available_for(&["list"]),
        Flag::bool(
            "includeDerivedMembership",
            "Also list indirect memberships",
        )
        .available_for(&["list"]),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "200"),
        flags::fields(&["insert", "get", "list", "update"]),
    ]
}

async fn insert(api: &Api, map: &ValueMap) -> Result<Value> {
    // A defaulted role is still what gets created
    let body = Composer::new(map)
        .field("email", "email")
        .with("role", json!(map.string("role").unwrap_or("MEMBER")))
        .field("deliverySettings", "delivery_settings")
        .body();

    api.post(
        url(api, &["groups", map.required("groupKey")?, "members"])?,
        &Query::from_flags(map, &["fields"]),
        &body,
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(
            api,
            &[
                "groups",
                map.required("groupKey")?,
                "members",
                map.required("memberKey")?,
            ],
        )?,
        &Query::new(),
    )
    .await?;
    Ok(id_result(map, "memberKey", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(
            api,
            &[
                "groups",
                map.required("groupKey")?,
                "members",
                map.required("memberKey")?,
            ],
        )?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn has_member(api: &Api, map: &ValueMap) -> Result<Value> {
    let member = map.required("memberKey")?;
    let res = api
        .get(
            url(
                api,
                &["groups", map.required("groupKey")?, "hasMember", member],
            )?,
            &Query::new(),
        )
        .await?;

    Ok(json!({
        "groupKey": map.string("groupKey"),
        "memberKey": member,
        "isMember": res.get("isMember").and_then(Value::as_bool).unwrap_or(false),
    }))
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    let mut query = Query::from_flags(map, &["includeDerivedMembership", "maxResults", "fields"]);
    let roles = map.strings("roles");
    if !roles.is_empty() {
        query = query.push("roles", roles.join(","));
    }

    api.list(
        url(api, &["groups", map.required("groupKey")?, "members"])?,
        query,
        "members",
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = Composer::new(map)
        .field("role", "role")
        .field("deliverySettings", "delivery_settings")
        .body();

    api.patch(
        url(
            api,
            &[
                "groups",
                map.required("groupKey")?,
                "members",
                map.required("memberKey")?,
            ],
        )?,
        &Query::from_flags(map, &["fields"]),
        &body,
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "memberKey", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("insert", "Adds a user or group to a group", handler!(insert)).batch(),
        Verb::new("delete", "Removes a member from a group", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Retrieves a group member's properties", handler!(get)).batch(),
        Verb::new(
            "hasMember",
            "Checks whether a user is a member of a group, directly or not",
            handler!(has_member),
        )
        .batch(),
        Verb::new("list", "Retrieves all members of a group", handler!(list)).batch(),
        Verb::new("update", "Updates a membership", handler!(update)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "members",
        about: "Manage group memberships",
        service: Service::Directory,
        flags,
        verbs,
    }
}
