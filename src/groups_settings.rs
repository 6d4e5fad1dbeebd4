//! Posting, moderation and visibility settings of a group.

use crate::{
    api::{Api, Service},
    cmd::{handler, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;

const ALL: &[&str] = &["get", "patch"];
const PATCH: &[&str] = &["patch"];

/// Settings that are plain strings on the wire. The remote also models its
/// booleans as the strings `"true"` and `"false"`, so they are here too.
const SETTINGS: &[(&str, &str)] = &[
    ("name", "Name of the group"),
    ("description", "Description of the group"),
    ("whoCanJoin", "ANYONE_CAN_JOIN, ALL_IN_DOMAIN_CAN_JOIN, INVITED_CAN_JOIN or CAN_REQUEST_TO_JOIN"),
    ("whoCanViewMembership", "ALL_IN_DOMAIN_CAN_VIEW, ALL_MEMBERS_CAN_VIEW, ALL_MANAGERS_CAN_VIEW or ALL_OWNERS_CAN_VIEW"),
    ("whoCanViewGroup", "ANYONE_CAN_VIEW, ALL_IN_DOMAIN_CAN_VIEW, ALL_MEMBERS_CAN_VIEW, ALL_MANAGERS_CAN_VIEW or ALL_OWNERS_CAN_VIEW"),
    ("whoCanPostMessage", "NONE_CAN_POST, ALL_MANAGERS_CAN_POST, ALL_MEMBERS_CAN_POST, ALL_OWNERS_CAN_POST, ALL_IN_DOMAIN_CAN_POST or ANYONE_CAN_POST"),
    ("whoCanContactOwner", "ALL_IN_DOMAIN_CAN_CONTACT, ALL_MANAGERS_CAN_CONTACT, ALL_MEMBERS_CAN_CONTACT or ANYONE_CAN_CONTACT"),
    ("whoCanModerateMembers", "ALL_MEMBERS, OWNERS_AND_MANAGERS, OWNERS_ONLY or NONE"),
    ("whoCanModerateContent", "ALL_MEMBERS, OWNERS_AND_MANAGERS, OWNERS_ONLY or NONE"),
    ("whoCanAssistContent", "ALL_MEMBERS, OWNERS_AND_MANAGERS, MANAGERS_ONLY, OWNERS_ONLY or NONE"),
    ("whoCanDiscoverGroup", "ANYONE_CAN_DISCOVER, ALL_IN_DOMAIN_CAN_DISCOVER or ALL_MEMBERS_CAN_DISCOVER"),
    ("whoCanLeaveGroup", "ALL_MANAGERS_CAN_LEAVE, ALL_MEMBERS_CAN_LEAVE or NONE_CAN_LEAVE"),
    ("messageModerationLevel", "MODERATE_ALL_MESSAGES, MODERATE_NON_MEMBERS, MODERATE_NEW_MEMBERS or MODERATE_NONE"),
    ("spamModerationLevel", "ALLOW, MODERATE, SILENTLY_MODERATE or REJECT"),
    ("replyTo", "REPLY_TO_CUSTOM, REPLY_TO_SENDER, REPLY_TO_LIST, REPLY_TO_OWNER, REPLY_TO_IGNORE or REPLY_TO_MANAGERS"),
    ("customReplyTo", "Address replies go to with REPLY_TO_CUSTOM"),
    ("primaryLanguage", "Language tag of the group, e.g. en"),
    ("defaultMessageDenyNotificationText", "Text sent to authors of rejected messages"),
    ("customFooterText", "Footer appended to every message"),
    ("allowExternalMembers", "true or false"),
    ("allowWebPosting", "true or false"),
    ("archiveOnly", "true or false"),
    ("isArchived", "true or false"),
    ("membersCanPostAsTheGroup", "true or false"),
    ("includeInGlobalAddressList", "true or false"),
    ("includeCustomFooter", "true or false"),
    ("sendMessageDenyNotification", "true or false"),
    ("enableCollaborativeInbox", "true or false"),
];

fn flags() -> Vec<Flag> {
    let mut flags = vec![
        Flag::string("groupUniqueId", "The address of the group")
            .available_for(ALL)
            .required_for(ALL),
        flags::fields(ALL),
    ];

    flags.extend(
        SETTINGS
            .iter()
            .map(|&(name, help)| Flag::string(name, help).available_for(PATCH)),
    );

    flags
}

fn url(api: &Api, map: &ValueMap) -> Result<url::Url> {
    api.url(Service::GroupsSettings, &[map.required("groupUniqueId")?])
}

/// The remote answers in XML unless asked otherwise
fn query(map: &ValueMap) -> Query {
    Query::new().push("alt", "json").flag(map, "fields", "fields")
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(url(api, map)?, &query(map)).await
}

async fn patch(api: &Api, map: &ValueMap) -> Result<Value> {
    let names: Vec<&str> = SETTINGS.iter().map(|(name, _)| *name).collect();
    let body = Composer::new(map).fields(&names).body();

    api.patch(url(api, map)?, &query(map), &body).await
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("get", "Gets the settings of a group", handler!(get)).batch(),
        Verb::new("patch", "Updates the given settings of a group", handler!(patch)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "groupSettings",
        about: "Manage group settings",
        service: Service::GroupsSettings,
        flags,
        verbs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_setting_is_a_patch_flag() {
        let flags = flags();
        flags::validate(&flags).unwrap();
        for (name, _) in SETTINGS {
            assert!(flags
                .iter()
                .any(|f| f.name == *name && f.is_available("patch")));
        }
    }
}
