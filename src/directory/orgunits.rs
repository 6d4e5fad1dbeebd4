use super::url;
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query},
    error::Result,
    flags::{self, Flag, ValueMap},
};
use serde_json::Value;
use url::Url;

const ALL: &[&str] = &["create", "delete", "get", "list", "update"];
const KEYED: &[&str] = &["delete", "get", "update"];

fn flags() -> Vec<Flag> {
    vec![
        Flag::string("customerId", "Unique id of the account")
            .available_for(ALL)
            .default_for(ALL, "my_customer"),
        Flag::string(
            "orgUnitPath",
            "Full path of the organizational unit, or its unique id",
        )
        .available_for(&["delete", "get", "list", "update"])
        .required_for(KEYED),
        Flag::string("name", "The organizational unit's name")
            .available_for(&["create", "update"])
            .required_for(&["create"]),
        Flag::string(
            "parentOrgUnitPath",
            "Full path of the parent organizational unit",
        )
        .available_for(&["create", "update"]),
        Flag::string(
            "parentOrgUnitId",
            "Unique id of the parent organizational unit",
        )
        .available_for(&["create", "update"]),
        Flag::string("description", "What the unit is for").available_for(&["create", "update"]),
        Flag::bool(
            "blockInheritance",
            "Stop settings of parent units from applying",
        )
        .available_for(&["create", "update"]),
        Flag::string("type", "all, children or allIncludingParent")
            .available_for(&["list"])
            .default_for(&["list"], "children"),
        flags::fields(&["create", "get", "list", "update"]),
    ]
}

/// Unit paths address nested resources, so every path element is a segment
fn unit_url(api: &Api, map: &ValueMap) -> Result<Url> {
    let customer = map.string("customerId").unwrap_or("my_customer");
    let path = map.required("orgUnitPath")?;

    let mut segments = vec!["customer", customer, "orgunits"];
    segments.extend(path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()));
    url(api, &segments)
}

fn body(map: &ValueMap) -> Value {
    Composer::new(map)
        .fields(&[
            "name",
            "parentOrgUnitPath",
            "parentOrgUnitId",
            "description",
            "blockInheritance",
        ])
        .body()
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    let customer = map.string("customerId").unwrap_or("my_customer");
    api.post(
        url(api, &["customer", customer, "orgunits"])?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(unit_url(api, map)?, &Query::new()).await?;
    Ok(id_result(map, "orgUnitPath", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    api.get(unit_url(api, map)?, &Query::from_flags(map, &["fields"]))
        .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    let customer = map.string("customerId").unwrap_or("my_customer");
    api.list(
        url(api, &["customer", customer, "orgunits"])?,
        Query::from_flags(map, &["orgUnitPath", "type", "fields"]),
        "organizationUnits",
    )
    .await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    api.patch(
        unit_url(api, map)?,
        &Query::from_flags(map, &["fields"]),
        &body(map),
    )
    .await
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "orgUnitPath", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Adds an organizational unit", handler!(create)).batch(),
        Verb::new("delete", "Removes an organizational unit", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Retrieves an organizational unit", handler!(get)).batch(),
        Verb::new(
            "list",
            "Retrieves the organizational units of an account",
            handler!(list),
        ),
        Verb::new("update", "Updates an organizational unit", handler!(update)).batch(),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "orgUnits",
        about: "Manage organizational units",
        service: Service::Directory,
        flags,
        verbs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::Authenticator, flags::FlagValue};

    #[test]
    fn nested_units_keep_their_slashes() {
        let api = Api::new(
            reqwest::Client::new(),
            Authenticator::fixed("t").unwrap(),
            Vec::new(),
        );
        let mut map = ValueMap::new();
        map.set("orgUnitPath", FlagValue::String("/Sales/EMEA North".to_owned()));

        assert_eq!(
            unit_url(&api, &map).unwrap().as_str(),
            "https://admin.googleapis.com/admin/directory/v1/customer/my_customer/orgunits/Sales/EMEA%20North"
        );
    }
}
