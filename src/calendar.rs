//! Calendars, their events and their access control lists.

pub mod acl;
pub mod calendars;
pub mod events;

use crate::{
    api::{Api, Service},
    error::Result,
    flags::{Flag, ValueMap},
};
use url::Url;

/// `--calendarId`, the mailbox's own calendar unless given
fn calendar_flag(subs: &[&'static str]) -> Flag {
    Flag::string(
        "calendarId",
        "The id of the calendar, primary means the user's own",
    )
    .available_for(subs)
    .default_for(subs, "primary")
}

/// `calendars/<calendarId>/...`
fn url(api: &Api, map: &ValueMap, rest: &[&str]) -> Result<Url> {
    let mut segments = vec!["calendars", map.required("calendarId")?];
    segments.extend_from_slice(rest);
    api.url(Service::Calendar, &segments)
}
