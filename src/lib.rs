pub mod api;
pub mod auth;
pub mod batch;
pub mod calendar;
pub mod cmd;
pub mod compose;
pub mod config;
pub mod directory;
pub mod drive;
pub mod error;
pub mod flags;
pub mod gmail;
pub mod groups_settings;
pub mod identity;
pub mod output;
pub mod reports;
pub mod retry;
pub mod traverse;

pub use error::{Error, Result};

pub trait Scopes {
    fn scopes(&self) -> &'static [&'static str];
}

/// Every resource family the command line exposes, in help order
pub fn nouns() -> Vec<cmd::Noun> {
    vec![
        directory::users::noun(),
        directory::groups::noun(),
        directory::members::noun(),
        directory::orgunits::noun(),
        gmail::labels::noun(),
        gmail::filters::noun(),
        gmail::vacation::noun(),
        gmail::send_as::noun(),
        gmail::messages::noun(),
        drive::files::noun(),
        drive::permissions::noun(),
        drive::drives::noun(),
        calendar::calendars::noun(),
        calendar::events::noun(),
        calendar::acl::noun(),
        groups_settings::noun(),
        reports::activities(),
        reports::user_usage(),
        reports::customer_usage(),
        identity::noun(),
    ]
}
