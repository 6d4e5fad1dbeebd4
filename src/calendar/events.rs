use super::{calendar_flag, url};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query, Schema},
    error::Result,
    flags::{self, Flag, Kind, ValueMap},
};
use serde_json::{json, Value};

const ALL: &[&str] = &[
    "list", "get", "insert", "delete", "patch", "move", "quickAdd",
];
const KEYED: &[&str] = &["get", "delete", "patch", "move"];
const WRITE: &[&str] = &["insert", "patch"];
const NOTIFYING: &[&str] = &["insert", "delete", "patch", "move", "quickAdd"];

const ATTENDEE: Schema = &[
    ("email", Kind::String),
    ("displayName", Kind::String),
    ("optional", Kind::Bool),
    ("responseStatus", Kind::String),
    ("comment", Kind::String),
    ("additionalGuests", Kind::Int64),
];

const REMINDER: Schema = &[("method", Kind::String), ("minutes", Kind::Int64)];

fn flags() -> Vec<Flag> {
    vec![
        calendar_flag(ALL),
        Flag::string("eventId", "The id of the event")
            .available_for(KEYED)
            .required_for(KEYED),
        Flag::string("q", "Free text search over the events").available_for(&["list"]),
        Flag::string("timeMin", "Lower bound (exclusive) of an event's end, RFC 3339")
            .available_for(&["list"]),
        Flag::string("timeMax", "Upper bound (exclusive) of an event's start, RFC 3339")
            .available_for(&["list"]),
        Flag::bool("singleEvents", "Expand recurring events into instances")
            .available_for(&["list"]),
        Flag::string("orderBy", "startTime or updated").available_for(&["list"]),
        Flag::bool("showDeleted", "Include cancelled events").available_for(&["list"]),
        Flag::string_list("eventTypes", "Only list events of these types")
            .available_for(&["list"]),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "2500"),
        Flag::string("summary", "Title of the event")
            .available_for(WRITE)
            .required_for(&["insert"]),
        Flag::string("description", "Description of the event").available_for(WRITE),
        Flag::string("location", "Free form location of the event").available_for(WRITE),
        Flag::string("startDateTime", "Start of a timed event, RFC 3339")
            .available_for(WRITE),
        Flag::string("startDate", "Start of an all-day event, yyyy-mm-dd")
            .available_for(WRITE),
        Flag::string("endDateTime", "End of a timed event, RFC 3339").available_for(WRITE),
        Flag::string("endDate", "End (exclusive) of an all-day event, yyyy-mm-dd")
            .available_for(WRITE),
        Flag::string("timeZone", "IANA time zone the start and end are expressed in")
            .available_for(WRITE),
        Flag::string_array(
            "attendees",
            "email=..;displayName=..;optional=..;responseStatus=.., repeatable",
        )
        .available_for(WRITE),
        Flag::string_array("recurrence", "RRULE, EXRULE, RDATE or EXDATE line, repeatable")
            .available_for(WRITE),
        Flag::string_array("reminders", "method=email|popup;minutes=.., repeatable")
            .available_for(WRITE),
        Flag::string("colorId", "Color of the event").available_for(WRITE),
        Flag::string("visibility", "default, public, private or confidential")
            .available_for(WRITE),
        Flag::string("transparency", "opaque or transparent").available_for(WRITE),
        Flag::bool("guestsCanModify", "Whether attendees may modify the event")
            .available_for(WRITE),
        Flag::string("sendUpdates", "all, externalOnly or none").available_for(NOTIFYING),
        Flag::string("destination", "Calendar the event is moved to")
            .available_for(&["move"])
            .required_for(&["move"]),
        Flag::string("text", "Text describing the event, e.g. 'Lunch tomorrow at noon'")
            .available_for(&["quickAdd"])
            .required_for(&["quickAdd"]),
        flags::fields(&["list", "get", "insert", "patch", "move", "quickAdd"]),
    ]
}

fn body(map: &ValueMap) -> Result<Value> {
    let mut composer = Composer::new(map);
    composer
        .fields(&[
            "summary",
            "description",
            "location",
            "recurrence",
            "colorId",
            "visibility",
            "transparency",
            "guestsCanModify",
        ])
        .field("startDateTime", "start.dateTime")
        .field("startDate", "start.date")
        .field("endDateTime", "end.dateTime")
        .field("endDate", "end.date")
        .field("timeZone", "start.timeZone")
        .field("timeZone", "end.timeZone")
        .records("attendees", "attendees", ATTENDEE)?
        .records("reminders", "reminders.overrides", REMINDER)?;

    if map.is_set("reminders") {
        composer.with("reminders.useDefault", json!(false));
    }

    Ok(composer.body())
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(api, map, &["events"])?,
        Query::from_flags(
            map,
            &[
                "q",
                "timeMin",
                "timeMax",
                "singleEvents",
                "orderBy",
                "showDeleted",
                "eventTypes",
                "maxResults",
                "fields",
            ],
        ),
        "items",
    )
    .await
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(
        url(api, map, &["events", map.required("eventId")?])?,
        &Query::from_flags(map, &["fields"]),
    )
    .await
}

async fn insert(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["events"])?,
        &Query::from_flags(map, &["sendUpdates", "fields"]),
        &body(map)?,
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(
        url(api, map, &["events", map.required("eventId")?])?,
        &Query::from_flags(map, &["sendUpdates"]),
    )
    .await?;
    Ok(id_result(map, "eventId", true))
}

async fn patch(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        url(api, map, &["events", map.required("eventId")?])?,
        &Query::from_flags(map, &["sendUpdates", "fields"]),
        &body(map)?,
    )
    .await
}

async fn move_event(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["events", map.required("eventId")?, "move"])?,
        &Query::from_flags(map, &["destination", "sendUpdates", "fields"]),
        &json!({}),
    )
    .await
}

async fn quick_add(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, map, &["events", "quickAdd"])?,
        &Query::from_flags(map, &["text", "sendUpdates", "fields"]),
        &json!({}),
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "eventId", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("list", "Lists the events of a calendar", handler!(list)).batch(),
        Verb::new("get", "Gets an event", handler!(get)).batch(),
        Verb::new("insert", "Creates an event", handler!(insert)).batch(),
        Verb::new("delete", "Deletes an event", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("patch", "Updates the given fields of an event", handler!(patch)).batch(),
        Verb::new("move", "Moves an event to another calendar", handler!(move_event)).batch(),
        Verb::new(
            "quickAdd",
            "Creates an event from a line of text",
            handler!(quick_add),
        )
        .batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "events",
        about: "Manage calendar events",
        service: Service::Calendar,
        flags,
        verbs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FlagValue;

    fn set(map: &mut ValueMap, name: &str, value: FlagValue) {
        map.set(name, value);
    }

    #[test]
    fn timed_event_body() {
        let mut map = ValueMap::new();
        set(&mut map, "summary", FlagValue::String("Standup".to_owned()));
        set(
            &mut map,
            "startDateTime",
            FlagValue::String("2024-07-01T09:00:00".to_owned()),
        );
        set(
            &mut map,
            "endDateTime",
            FlagValue::String("2024-07-01T09:15:00".to_owned()),
        );
        set(&mut map, "timeZone", FlagValue::String("Europe/Zurich".to_owned()));
        set(
            &mut map,
            "attendees",
            FlagValue::StringArray(vec![
                "email=a@b.c;optional=true".to_owned(),
                "email=d@b.c".to_owned(),
            ]),
        );

        assert_eq!(
            body(&map).unwrap(),
            json!({
                "summary": "Standup",
                "start": {"dateTime": "2024-07-01T09:00:00", "timeZone": "Europe/Zurich"},
                "end": {"dateTime": "2024-07-01T09:15:00", "timeZone": "Europe/Zurich"},
                "attendees": [
                    {"email": "a@b.c", "optional": true},
                    {"email": "d@b.c"},
                ],
            })
        );
    }

    #[test]
    fn reminder_overrides_disable_the_default() {
        let mut map = ValueMap::new();
        set(
            &mut map,
            "reminders",
            FlagValue::StringArray(vec!["method=popup;minutes=10".to_owned()]),
        );

        assert_eq!(
            body(&map).unwrap(),
            json!({
                "reminders": {
                    "useDefault": false,
                    "overrides": [{"method": "popup", "minutes": 10}],
                },
            })
        );
    }

    #[test]
    fn unknown_attendee_keys_are_rejected() {
        let mut map = ValueMap::new();
        set(
            &mut map,
            "attendees",
            FlagValue::StringArray(vec!["mail=a@b.c".to_owned()]),
        );
        assert!(matches!(
            body(&map),
            Err(crate::Error::Composer { .. })
        ));
    }
}
