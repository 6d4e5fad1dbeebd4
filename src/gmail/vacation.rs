use super::{url, user_flag};
use crate::{
    api::{Api, Service},
    cmd::{handler, Noun, Verb},
    compose::{Composer, Query},
    error::{Error, Result},
    flags::{self, Flag, ValueMap},
};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const ALL: &[&str] = &["get", "update"];
const UPDATE: &[&str] = &["update"];

fn flags() -> Vec<Flag> {
    vec![
        user_flag(ALL),
        Flag::bool("enableAutoReply", "Whether to respond automatically")
            .available_for(UPDATE),
        Flag::string("responseSubject", "Subject line prepended to responses")
            .available_for(UPDATE),
        Flag::string("responseBodyPlainText", "Plain text body of responses")
            .available_for(UPDATE),
        Flag::string("responseBodyHtml", "HTML body of responses").available_for(UPDATE),
        Flag::bool(
            "restrictToContacts",
            "Only respond to senders in the user's contacts",
        )
        .available_for(UPDATE),
        Flag::bool(
            "restrictToDomain",
            "Only respond to senders in the user's domain",
        )
        .available_for(UPDATE),
        Flag::string(
            "startTime",
            "Start of the auto-reply period, RFC 3339, e.g. 2024-07-01T00:00:00Z",
        )
        .available_for(UPDATE),
        Flag::string("endTime", "End of the auto-reply period, RFC 3339")
            .available_for(UPDATE),
        flags::fields(ALL),
    ]
}

/// Converts an RFC 3339 timestamp into the epoch milliseconds the remote wants
fn epoch_millis(flag: &str, raw: &str) -> Result<String> {
    let at = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| Error::composer(flag, raw, format!("not an RFC 3339 timestamp: {err}")))?;
    Ok((at.unix_timestamp_nanos() / 1_000_000).to_string())
}

fn body(map: &ValueMap) -> Result<Value> {
    let mut composer = Composer::new(map);
    composer.fields(&[
        "enableAutoReply",
        "responseSubject",
        "responseBodyPlainText",
        "responseBodyHtml",
        "restrictToContacts",
        "restrictToDomain",
    ]);

    for flag in ["startTime", "endTime"] {
        if !map.is_set(flag) {
            continue;
        }

        match map.string(flag) {
            Some("") | None => composer.with(flag, json!("")),
            Some(raw) => composer.with(flag, json!(epoch_millis(flag, raw)?)),
        };
    }

    Ok(composer.body())
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["settings", "vacation"])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = body(map)?;
    api.put(
        url(api, map, &["settings", "vacation"])?,
        &Query::from_flags(map, &["fields"]),
        &body,
    )
    .await
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("get", "Gets vacation responder settings", handler!(get)).batch(),
        Verb::new(
            "update",
            "Updates vacation responder settings",
            handler!(update),
        )
        .batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "vacation",
        about: "Manage the vacation responder",
        service: Service::Gmail,
        flags,
        verbs,
    }
}
