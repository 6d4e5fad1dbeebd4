//! Users, groups, group membership and organizational units.

pub mod groups;
pub mod members;
pub mod orgunits;
pub mod users;

use crate::{
    api::{Api, Service},
    compose::Query,
    error::Result,
    flags::{Flag, ValueMap},
};
use url::Url;

fn url(api: &Api, segments: &[&str]) -> Result<Url> {
    api.url(Service::Directory, segments)
}

/// `--customer` and `--domain`, shared by the list verbs
fn scope_flags(subs: &[&'static str]) -> Vec<Flag> {
    vec![
        Flag::string(
            "customer",
            "Immutable id of the account, my_customer means the caller's own",
        )
        .available_for(subs)
        .default_for(subs, "my_customer"),
        Flag::string("domain", "Restrict the listing to one domain of the account")
            .available_for(subs),
    ]
}

/// Listing by domain replaces the customer scope
fn scoped(map: &ValueMap, query: Query) -> Query {
    if map.is_set("domain") {
        query.flag(map, "domain", "domain")
    } else {
        query.flag(map, "customer", "customer")
    }
}
