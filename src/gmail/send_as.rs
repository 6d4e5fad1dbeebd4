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
const KEYED: &[&str] = &["create", "delete", "get", "update"];
const WRITE: &[&str] = &["create", "update"];

fn flags() -> Vec<Flag> {
    vec![
        user_flag(ALL),
        Flag::string("sendAsEmail", "The address that appears in the From header")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("displayName", "Name that appears in the From header")
            .available_for(WRITE),
        Flag::string("replyToAddress", "Address to put in the Reply-To header")
            .available_for(WRITE),
        Flag::string("signature", "HTML signature appended to new messages")
            .available_for(WRITE),
        Flag::bool("isDefault", "Use this alias by default").available_for(WRITE),
        Flag::bool(
            "treatAsAlias",
            "Whether the mail client treats the address as an alias",
        )
        .available_for(WRITE),
        Flag::string("smtpHost", "Hostname of the SMTP relay").available_for(WRITE),
        Flag::int64("smtpPort", "Port of the SMTP relay").available_for(WRITE),
        Flag::string("smtpUsername", "Username for the SMTP relay").available_for(WRITE),
        Flag::string("smtpPassword", "Password for the SMTP relay").available_for(WRITE),
        Flag::string("smtpSecurityMode", "none, ssl or starttls").available_for(WRITE),
        flags::fields(ALL),
    ]
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&[
            "sendAsEmail",
            "displayName",
            "replyToAddress",
            "signature",
            "isDefault",
            "treatAsAlias",
        ])
        .field("smtpHost", "smtpMsa.host")
        .field("smtpPort", "smtpMsa.port")
        .field("smtpUsername", "smtpMsa.username")
        .field("smtpPassword", "smtpMsa.password")
        .field("smtpSecurityMode", "smtpMsa.securityMode")
        .body()
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["settings", "sendAs"])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(api, map, &["settings", "sendAs", map.required("sendAsEmail")?])?,
        &Query::new(),
    )
    .await?;
    Ok(id_result(map, "sendAsEmail", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["settings", "sendAs", map.required("sendAsEmail")?])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, map, &["settings", "sendAs"])?,
        Query::from_flags(map, &["fields"]),
        "sendAs",
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        url(api, map, &["settings", "sendAs", map.required("sendAsEmail")?])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "sendAsEmail", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Creates a custom from alias", handler!(create)).batch(),
        Verb::new("delete", "Deletes a send-as alias", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Gets a send-as alias", handler!(get)).batch(),
        Verb::new("list", "Lists the send-as aliases of a mailbox", handler!(list)).batch(),
        Verb::new("update", "Updates a send-as alias", handler!(update)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "sendAs",
        about: "Manage send-as aliases",
        service: Service::Gmail,
        flags,
        verbs,
    }
}
