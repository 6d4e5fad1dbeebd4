use super::{calendar_flag, url};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::{json, Value};

const KEYED: &[&str] = &["get", "update", "delete", "clear"];
const WRITE: &[&str] = &["insert", "update"];

fn flags() -> Vec<Flag> {
    vec![
        calendar_flag(KEYED),
        Flag::string("summary", "Title of the calendar")
            .available_for(WRITE)
            .required_for(&["insert"]),
        Flag::string("description", "Description of the calendar").available_for(WRITE),
        Flag::string("location", "Geographic location of the calendar").available_for(WRITE),
        Flag::string("timeZone", "IANA time zone of the calendar, e.g. Europe/Zurich")
            .available_for(WRITE),
        flags::fields(&["get", "insert", "update"]),
    ]
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&["summary", "description", "location", "timeZone"])
        .body()
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(url(api, map, &[])?, &Query::from_flags(map, &["fields"]))
        .await
}

async fn insert(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        api.url(Service::Calendar, &["calendars"])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        url(api, map, &[])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(url(api, map, &[])?, &Query::new()).await?;
    Ok(id_result(map, "calendarId", true))
}

/// Only valid on a primary calendar, removes every event
async fn clear(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(url(api, map, &["clear"])?, &Query::new(), &json!({}))
        .await?;
    Ok(id_result(map, "calendarId", true))
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "calendarId", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("get", "Gets a calendar", handler!(get)).batch(),
        Verb::new("insert", "Creates a secondary calendar", handler!(insert)).batch(),
        Verb::new("update", "Updates a calendar", handler!(update)).batch(),
        Verb::new("delete", "Deletes a secondary calendar", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("clear", "Deletes every event of a primary calendar", handler!(clear))
            .batch()
            .on_failure(failed),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "calendars",
        about: "Manage calendars",
        service: Service::Calendar,
        flags,
        verbs,
    }
}
