use super::{scope_flags, scoped, url};
use crate::{
    api::{Api, Service},
    cmd::{handler, id_result, Noun, Verb},
    compose::{Composer, Query, Schema},
    error::Result,
    flags::{self, Flag, Kind, ValueMap},
};
use serde_json::{json, Value};

const WRITE: &[&str] = &["create", "update"];

const PHONE: Schema = &[
    ("value", Kind::String),
    ("type", Kind::String),
    ("customType", Kind::String),
    ("primary", Kind::Bool),
];

const EMAIL: Schema = &[
    ("address", Kind::String),
    ("type", Kind::String),
    ("customType", Kind::String),
    ("primary", Kind::Bool),
];

const EXTERNAL_ID: Schema = &[
    ("value", Kind::String),
    ("type", Kind::String),
    ("customType", Kind::String),
];

const ORGANIZATION: Schema = &[
    ("name", Kind::String),
    ("title", Kind::String),
    ("department", Kind::String),
    ("description", Kind::String),
    ("costCenter", Kind::String),
    ("location", Kind::String),
    ("domain", Kind::String),
    ("symbol", Kind::String),
    ("type", Kind::String),
    ("customType", Kind::String),
    ("primary", Kind::Bool),
];

const RELATION: Schema = &[
    ("value", Kind::String),
    ("type", Kind::String),
    ("customType", Kind::String),
];

const ADDRESS: Schema = &[
    ("type", Kind::String),
    ("customType", Kind::String),
    ("formatted", Kind::String),
    ("streetAddress", Kind::String),
    ("locality", Kind::String),
    ("region", Kind::String),
    ("postalCode", Kind::String),
    ("country", Kind::String),
    ("countryCode", Kind::String),
    ("poBox", Kind::String),
    ("extendedAddress", Kind::String),
    ("primary", Kind::Bool),
];

const LOCATION: Schema = &[
    ("area", Kind::String),
    ("buildingId", Kind::String),
    ("deskCode", Kind::String),
    ("floorName", Kind::String),
    ("floorSection", Kind::String),
    ("type", Kind::String),
    ("customType", Kind::String),
];

fn flags() -> Vec<Flag> {
    let mut flags = vec![
        Flag::string(
            "userKey",
            "Primary email address, alias email address, or unique user id",
        )
        .available_for(&[
            "delete", "get", "update", "undelete", "makeAdmin", "signOut",
        ])
        .required_for(&[
            "delete", "get", "update", "undelete", "makeAdmin", "signOut",
        ]),
        Flag::string("primaryEmail", "The user's primary email address")
            .available_for(WRITE)
            .required_for(&["create"]),
        Flag::string("firstName", "The user's first name")
            .available_for(WRITE)
            .required_for(&["create"]),
        Flag::string("lastName", "The user's last name")
            .available_for(WRITE)
            .required_for(&["create"]),
        Flag::string("password", "The user's password")
            .available_for(WRITE)
            .required_for(&["create"]),
        Flag::string(
            "hashFunction",
            "Hash function of --password: MD5, SHA-1 or crypt",
        )
        .available_for(WRITE),
        Flag::bool(
            "changePasswordAtNextLogin",
            "Force a password change at next login",
        )
        .available_for(WRITE),
        Flag::bool("suspended", "Whether the user is suspended").available_for(WRITE),
        Flag::bool("archived", "Whether the user is archived").available_for(WRITE),
        Flag::bool(
            "includeInGlobalAddressList",
            "Whether the user's profile is visible in the global address list",
        )
        .available_for(WRITE),
        Flag::bool(
            "ipWhitelisted",
            "Apply the account's IP address allowlist to this user",
        )
        .available_for(WRITE),
        Flag::string(
            "orgUnitPath",
            "Full path of the parent organization, / is the top-level one",
        )
        .available_for(&["create", "update", "undelete"])
        .default_for(&["undelete"], "/"),
        Flag::string("recoveryEmail", "Recovery email of the user").available_for(WRITE),
        Flag::string(
            "recoveryPhone",
            "Recovery phone of the user, in E.164 format",
        )
        .available_for(WRITE),
        Flag::string_array(
            "phones",
            "Phone number, as value=...;type=...;customType=...;primary=true, repeatable",
        )
        .available_for(WRITE),
        Flag::string_array(
            "emails",
            "Additional email, as address=...;type=...;primary=false, repeatable",
        )
        .available_for(WRITE),
        Flag::string_array(
            "externalIds",
            "External id, as value=...;type=...;customType=..., repeatable",
        )
        .available_for(WRITE),
        Flag::string_array(
            "organizations",
            "Organization, as name=...;title=...;department=...;primary=true, repeatable",
        )
        .available_for(WRITE),
        Flag::string_array(
            "relations",
            "Relation, as value=...;type=..., repeatable",
        )
        .available_for(WRITE),
        Flag::string_array(
            "addresses",
            "Address, as type=...;streetAddress=...;locality=...;postalCode=..., repeatable",
        )
        .available_for(WRITE),
        Flag::string_array(
            "locations",
            "Location, as type=...;area=...;buildingId=...;floorName=..., repeatable",
        )
        .available_for(WRITE),
        Flag::string(
            "customSchemas",
            "Custom schema values, as schema.field=value;schema.other=value",
        )
        .available_for(WRITE),
        Flag::bool("status", "Grant (true) or revoke (false) super admin status")
            .available_for(&["makeAdmin"])
            .default_for(&["makeAdmin"], "true"),
        Flag::string(
            "projection",
            "What subset of fields to fetch: basic, custom or full",
        )
        .available_for(&["get", "list"])
        .default_for(&["get", "list"], "basic"),
        Flag::string(
            "customFieldMask",
            "Comma separated schema names to fetch with projection=custom",
        )
        .available_for(&["get", "list"]),
        Flag::string(
            "viewType",
            "admin_view or domain_public, the latter hides admin-only fields",
        )
        .available_for(&["get", "list"])
        .default_for(&["get", "list"], "admin_view"),
        Flag::string("query", "Search query, e.g. 'orgUnitPath=/Sales isSuspended=false'")
            .available_for(&["list"]),
        Flag::bool("showDeleted", "List deleted users instead").available_for(&["list"]),
        Flag::string("orderBy", "email, familyName or givenName").available_for(&["list"]),
        Flag::string("sortOrder", "ASCENDING or DESCENDING").available_for(&["list"]),
        Flag::int64("maxResults", "Page size of each listing request")
            .available_for(&["list"])
            .default_for(&["list"], "500"),
        flags::fields(&["create", "get", "list", "update"]),
    ];
    flags.extend(scope_flags(&["list"]));
    flags
}

fn body(map: &ValueMap) -> Result<Value> {
    Ok(Composer::new(map)
        .fields(&[
            "primaryEmail",
            "password",
            "hashFunction",
            "changePasswordAtNextLogin",
            "suspended",
            "archived",
            "includeInGlobalAddressList",
            "ipWhitelisted",
            "orgUnitPath",
            "recoveryEmail",
            "recoveryPhone",
        ])
        .field("firstName", "name.givenName")
        .field("lastName", "name.familyName")
        .records("phones", "phones", PHONE)?
        .records("emails", "emails", EMAIL)?
        .records("externalIds", "externalIds", EXTERNAL_ID)?
        .records("organizations", "organizations", ORGANIZATION)?
        .records("relations", "relations", RELATION)?
        .records("addresses", "addresses", ADDRESS)?
        .records("locations", "locations", LOCATION)?
        .map_field("customSchemas", "customSchemas")?
        .body())
}

async fn create(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = body(map)?;
    api.post(url(api, &["users"])?, &Query::from_flags(map, &["fields"]), &body)
        .await
}

async fn delete(api: &Api, map: &ValueMap) -> Result<Value> {
    api.delete(url(api, &["users", map.required("userKey")?])?, &Query::new())
        .await?;
    Ok(id_result(map, "userKey", true))
}

async fn get(api: &Api, map: &ValueMap) -> Result<Value> {
    let query = Query::from_flags(map, &["projection", "customFieldMask", "viewType", "fields"]);
    api.get(url(api, &["users", map.required("userKey")?])?, &query)
        .await
}

async fn list(api: &Api, map: &ValueMap) -> Result<Value> {
    let query = scoped(
        map,
        Query::from_flags(
            map,
            &[
                "projection",
                "customFieldMask",
                "viewType",
                "query",
                "showDeleted",
                "orderBy",
                "sortOrder",
                "maxResults",
                "fields",
            ],
        ),
    );
    api.list(url(api, &["users"])?, query, "users").await
}

async fn update(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = body(map)?;
    api.patch(
        url(api, &["users", map.required("userKey")?])?,
        &Query::from_flags(map, &["fields"]),
        &body,
    )
    .await
}

async fn undelete(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = json!({ "orgUnitPath": map.string("orgUnitPath").unwrap_or("/") });
    api.post(
        url(api, &["users", map.required("userKey")?, "undelete"])?,
        &Query::new(),
        &body,
    )
    .await?;
    Ok(id_result(map, "userKey", true))
}

async fn make_admin(api: &Api, map: &ValueMap) -> Result<Value> {
    let body = json!({ "status": map.bool("status") });
    api.post(
        url(api, &["users", map.required("userKey")?, "makeAdmin"])?,
        &Query::new(),
        &body,
    )
    .await?;
    Ok(id_result(map, "userKey", true))
}

async fn sign_out(api: &Api, map: &ValueMap) -> Result<Value> {
    api.post(
        url(api, &["users", map.required("userKey")?, "signOut"])?,
        &Query::new(),
        &json!({}),
    )
    .await?;
    Ok(id_result(map, "userKey", true))
}

fn failed(map: &ValueMap) -> Value {
    id_result(map, "userKey", false)
}

fn verbs() -> Vec<Verb> {
    vec![
        Verb::new("create", "Creates a user", handler!(create)).batch(),
        Verb::new("delete", "Deletes a user", handler!(delete))
            .batch()
            .on_failure(failed),
        Verb::new("get", "Retrieves a user", handler!(get)).batch(),
        Verb::new("list", "Retrieves a paginated list of users", handler!(list)).batch(),
        Verb::new("update", "Updates a user", handler!(update)).batch(),
        Verb::new("undelete", "Restores a recently deleted user", handler!(undelete))
            .batch()
            .on_failure(failed),
        Verb::new(
            "makeAdmin",
            "Makes a user a super administrator",
            handler!(make_admin),
        )
        .batch()
        .on_failure(failed),
        Verb::new(
            "signOut",
            "Signs a user out of all web and device sessions",
            handler!(sign_out),
        )
        .batch()
        .on_failure(failed),
    ]
}

pub fn noun() -> Noun {
    Noun {
        name: "users",
        about: "Manage users",
        service: Service::Directory,
        flags,
        verbs,
    }
}
