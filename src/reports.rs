//! Audit activity and usage reports. Reports are read-only, so every verb
//! here only lists.

use crate::{
    api::{Api, Service},
    cmd::{handler, Noun, Verb},
    compose::Query,
    error::{Error, Result},
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;
use time::{macros::format_description, Date};
use url::Url;

fn url(api: &Api, segments: &[&str]) -> Result<Url> {
    api.url(Service::Reports, segments)
}

/// Usage reports are addressed by day, and a malformed day would only be
/// rejected by the remote after the token round-trip
fn date(map: &ValueMap) -> Result<&str> {
    let raw = map.required("date")?;
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|err| Error::argument(format!("--date {raw}: expected YYYY-MM-DD, {err}")))?;
    Ok(raw)
}

fn customer_flag(subs: &[&'static str]) -> Flag {
    Flag::string("customerId", "The immutable id of the account").available_for(subs)
}

fn activity_flags() -> Vec<Flag> {
    const LIST: &[&str] = &["list"];
    vec![
        Flag::string("userKey", "Address or id of the user, all for everyone")
            .available_for(LIST)
            .default_for(LIST, "all"),
        Flag::string(
            "applicationName",
            "admin, calendar, drive, groups, login, mobile, token, user_accounts and others",
        )
        .available_for(LIST)
        .required_for(LIST),
        Flag::string("startTime", "Only report activity after this RFC 3339 time")
            .available_for(LIST),
        Flag::string("endTime", "Only report activity before this RFC 3339 time")
            .available_for(LIST),
        Flag::string("eventName", "Only report events of this name").available_for(LIST),
        Flag::string("filters", "Comma-separated parameter conditions, e.g. doc_id==12345")
            .available_for(LIST),
        Flag::string("actorIpAddress", "Only report activity from this address")
            .available_for(LIST),
        Flag::string("orgUnitID", "Only report activity of users in this unit")
            .available_for(LIST),
        Flag::string("groupIdFilter", "Only report activity of members of these groups")
            .available_for(LIST),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(LIST)
            .default_for(LIST, "1000"),
        customer_flag(LIST),
        flags::fields(LIST),
    ]
}

async fn list_activities(api: &Api, map: &ValueMap) -> Result<Value> {
    api.list(
        url(
            api,
            &[
                "activity",
                "users",
                map.required("userKey")?,
                "applications",
                map.required("applicationName")?,
            ],
        )?,
        Query::from_flags(
            map,
            &[
                "startTime",
                "endTime",
                "eventName",
                "filters",
                "actorIpAddress",
                "orgUnitID",
                "groupIdFilter",
                "maxResults",
                "customerId",
                "fields",
            ],
        ),
        "items",
    )
    .await
}

fn activity_verbs() -> Vec<Verb> {
    vec![Verb::new(
        "list",
        "Lists the audit events of an application",
        handler!(list_activities),
    )
    .batch()]
}

pub fn activities() -> Noun {
    Noun {
        name: "activities",
        about: "Read audit activity reports",
        service: Service::Reports,
        flags: activity_flags,
        verbs: activity_verbs,
    }
}

fn user_usage_flags() -> Vec<Flag> {
    const GET: &[&str] = &["get"];
    vec![
        Flag::string("userKey", "Address or id of the user, all for everyone")
            .available_for(GET)
            .default_for(GET, "all"),
        Flag::string("date", "The day to report on, YYYY-MM-DD")
            .available_for(GET)
            .required_for(GET),
        Flag::string_list("parameters", "Parameters to report, e.g. gmail:num_emails_sent")
            .available_for(GET),
        Flag::string("filters", "Comma-separated parameter conditions")
            .available_for(GET),
        Flag::string("orgUnitID", "Only report users in this unit").available_for(GET),
        Flag::string("groupIdFilter", "Only report members of these groups")
            .available_for(GET),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(GET)
            .default_for(GET, "1000"),
        customer_flag(GET),
        flags::fields(GET),
    ]
}

/// Parameters are comma-joined rather than repeated
fn parameters(map: &ValueMap, query: Query) -> Query {
    match map.strings("parameters") {
        [] => query,
        params => query.push("parameters", params.join(",")),
    }
}

async fn get_user_usage(api: &Api, map: &ValueMap) -> Result<Value> {
    let date = date(map)?;
    let query = Query::from_flags(
        map,
        &[
            "filters",
            "orgUnitID",
            "groupIdFilter",
            "maxResults",
            "customerId",
            "fields",
        ],
    );

    api.list(
        url(api, &["usage", "users", map.required("userKey")?, "dates", date])?,
        parameters(map, query),
        "usageReports",
    )
    .await
}

fn user_usage_verbs() -> Vec<Verb> {
    vec![Verb::new(
        "get",
        "Gets the usage of one or all users on a day",
        handler!(get_user_usage),
    )
    .batch()]
}

pub fn user_usage() -> Noun {
    Noun {
        name: "userUsageReport",
        about: "Read per-user usage reports",
        service: Service::Reports,
        flags: user_usage_flags,
        verbs: user_usage_verbs,
    }
}

fn customer_usage_flags() -> Vec<Flag> {
    const GET: &[&str] = &["get"];
    vec![
        Flag::string("date", "The day to report on, YYYY-MM-DD")
            .available_for(GET)
            .required_for(GET),
        Flag::string_list("parameters", "Parameters to report, e.g. accounts:num_users")
            .available_for(GET),
        customer_flag(GET),
        flags::fields(GET),
    ]
}

async fn get_customer_usage(api: &Api, map: &ValueMap) -> Result<Value> {
    let date = date(map)?;
    let query = Query::from_flags(map, &["customerId", "fields"]);

    api.list(
        url(api, &["usage", "dates", date])?,
        parameters(map, query),
        "usageReports",
    )
    .await
}

fn customer_usage_verbs() -> Vec<Verb> {
    vec![Verb::new(
        "get",
        "Gets the usage of the whole account on a day",
        handler!(get_customer_usage),
    )
    .batch()]
}

pub fn customer_usage() -> Noun {
    Noun {
        name: "customerUsageReport",
        about: "Read account-wide usage reports",
        service: Service::Reports,
        flags: customer_usage_flags,
        verbs: customer_usage_verbs,
    }
}
