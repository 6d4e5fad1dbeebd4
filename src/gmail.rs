//! Labels, filters, vacation responder, send-as aliases and messages of a
//! mailbox.

pub mod filters;
pub mod labels;
pub mod messages;
pub mod send_as;
pub mod vacation;

use crate::{
    api::{Api, Service},
    error::Result,
    flags::{Flag, ValueMap},
};
use url::Url;

/// `--userId`, the mailbox every gmail verb acts on
fn user_flag(subs: &[&'static str]) -> Flag {
    Flag::string(
        "userId",
        "The user's email address, me is the authenticated user",
    )
    .available_for(subs)
    .default_for(subs, "me")
}

/// `users/<userId>/<rest...>`
fn url(api: &Api, map: &ValueMap, rest: &[&str]) -> Result<Url> {
    let mut segments = vec!["users", map.string("userId").unwrap_or("me")];
    segments.extend_from_slice(rest);
    api.url(Service::Gmail, &segments)
}
