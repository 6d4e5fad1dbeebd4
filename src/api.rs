//! The authenticated transport every verb talks through. Each endpoint is
//! treated as an opaque `(query, body) -> JSON` call.

use crate::{
    auth::Authenticator,
    compose::Query,
    error::{Error, Result},
    Scopes,
};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    Directory,
    Reports,
    Gmail,
    Drive,
    Calendar,
    GroupsSettings,
    CloudIdentity,
}

impl Service {
    fn host(self) -> &'static str {
        match self {
            Self::Directory | Self::Reports => "https://admin.googleapis.com",
            Self::Gmail => "https://gmail.googleapis.com",
            Self::Drive | Self::Calendar | Self::GroupsSettings => "https://www.googleapis.com",
            Self::CloudIdentity => "https://cloudidentity.googleapis.com",
        }
    }

    /// The versioned path every resource of the service lives under
    pub fn path(self) -> &'static str {
        match self {
            Self::Directory => "admin/directory/v1",
            Self::Reports => "admin/reports/v1",
            Self::Gmail => "gmail/v1",
            Self::Drive => "drive/v3",
            Self::Calendar => "calendar/v3",
            Self::GroupsSettings => "groups/v1/groups",
            Self::CloudIdentity => "v1",
        }
    }
}

impl Scopes for Service {
    fn scopes(&self) -> &'static [&'static str] {
        match self {
            Self::Directory => &[
                "https://www.googleapis.com/auth/admin.directory.user",
                "https://www.googleapis.com/auth/admin.directory.user.security",
                "https://www.googleapis.com/auth/admin.directory.group",
                "https://www.googleapis.com/auth/admin.directory.group.member",
                "https://www.googleapis.com/auth/admin.directory.orgunit",
            ],
            Self::Reports => &[
                "https://www.googleapis.com/auth/admin.reports.audit.readonly",
                "https://www.googleapis.com/auth/admin.reports.usage.readonly",
            ],
            Self::Gmail => &[
                "https://mail.google.com/",
                "https://www.googleapis.com/auth/gmail.settings.basic",
                "https://www.googleapis.com/auth/gmail.settings.sharing",
            ],
            Self::Drive => &["https://www.googleapis.com/auth/drive"],
            Self::Calendar => &["https://www.googleapis.com/auth/calendar"],
            Self::GroupsSettings => &["https://www.googleapis.com/auth/apps.groups.settings"],
            Self::CloudIdentity => &["https://www.googleapis.com/auth/cloud-identity.groups"],
        }
    }
}

/// A pooled client plus the credentials to use it. Cloning is cheap and every
/// clone shares the same connection pool and token cache.
#[derive(Clone, Debug)]
pub struct Api {
    client: reqwest::Client,
    auth: Arc<Authenticator>,
    scopes: Arc<[String]>,
    root: Option<Arc<str>>,
}

impl Api {
    pub fn new(client: reqwest::Client, auth: Authenticator, scopes: Vec<String>) -> Self {
        Self {
            client,
            auth: Arc::new(auth),
            scopes: scopes.into(),
            root: None,
        }
    }

    /// Sends every service to `root` instead of its public host
    pub fn with_root(mut self, root: &str) -> Self {
        self.root = Some(root.trim_end_matches('/').into());
        self
    }

    /// Builds the URL of a resource, percent-encoding each segment on its own
    pub fn url(&self, service: Service, segments: &[&str]) -> Result<Url> {
        let base = match &self.root {
            Some(root) => format!("{root}/{}", service.path()),
            None => format!("{}/{}", service.host(), service.path()),
        };

        let mut url = Url::parse(&base)
            .map_err(|err| Error::config(format!("invalid api root '{base}': {err}")))?;

        url.path_segments_mut()
            .map_err(|()| Error::config(format!("'{base}' cannot be a base url")))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    /// Executes one call and decodes the JSON response. An empty response
    /// body, such as the 204 a delete answers with, decodes to `null`.
    pub async fn call(
        &self,
        method: Method,
        url: Url,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.auth.header(&self.client, &self.scopes).await?;

        tracing::debug!(%method, %url, "sending request");

        let mut req = self
            .client
            .request(method, url)
            .header(http::header::AUTHORIZATION, token)
            .query(query.pairs());

        if let Some(body) = body {
            req = req.json(body);
        }

        let res = req.send().await?;
        let status = res.status();
        let body = read_body(res).await?;

        if !status.is_success() {
            return Err(Error::from_response(status.as_u16(), &body));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn get(&self, url: Url, query: &Query) -> Result<Value> {
        self.call(Method::GET, url, query, None).await
    }

    pub async fn post(&self, url: Url, query: &Query, body: &Value) -> Result<Value> {
        self.call(Method::POST, url, query, Some(body)).await
    }

    pub async fn patch(&self, url: Url, query: &Query, body: &Value) -> Result<Value> {
        self.call(Method::PATCH, url, query, Some(body)).await
    }

    pub async fn put(&self, url: Url, query: &Query, body: &Value) -> Result<Value> {
        self.call(Method::PUT, url, query, Some(body)).await
    }

    pub async fn delete(&self, url: Url, query: &Query) -> Result<Value> {
        self.call(Method::DELETE, url, query, None).await
    }

    /// Follows `nextPageToken` until exhausted and returns the concatenation
    /// of every page's `items` array
    pub async fn list(&self, url: Url, query: Query, items: &str) -> Result<Value> {
        let mut query = page_token_in_fields(query);
        let mut out = Vec::new();

        loop {
            let mut page = self.get(url.clone(), &query).await?;

            if let Some(Value::Array(batch)) = page.get_mut(items).map(Value::take) {
                out.extend(batch);
            }

            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => {
                    query = query.set("pageToken", token);
                }
                _ => break,
            }
        }

        Ok(Value::Array(out))
    }
}

/// A partial response mask without `nextPageToken` silently stops paging
fn page_token_in_fields(query: Query) -> Query {
    match query.get("fields") {
        Some(fields) if !fields.contains("nextPageToken") => {
            let fields = format!("nextPageToken,{fields}");
            query.set("fields", fields)
        }
        _ => query,
    }
}

/// Reads the entire response body into a single buffer
async fn read_body(res: reqwest::Response) -> Result<bytes::Bytes> {
    use bytes::BufMut;
    use futures_util::StreamExt;

    let content_len = res
        .content_length()
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or_default();
    let mut buffer = bytes::BytesMut::with_capacity(content_len);

    let mut stream = res.bytes_stream();

    while let Some(item) = stream.next().await {
        buffer.put(item?);
    }

    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> Api {
        Api::new(
            reqwest::Client::new(),
            Authenticator::fixed("t").unwrap(),
            Vec::new(),
        )
    }

    #[test]
    fn public_hosts() {
        let api = api();
        assert_eq!(
            api.url(Service::Directory, &["users", "a@b.c"])
                .unwrap()
                .as_str(),
            "https://admin.googleapis.com/admin/directory/v1/users/a@b.c"
        );
        assert_eq!(
            api.url(Service::GroupsSettings, &["g@b.c"]).unwrap().as_str(),
            "https://www.googleapis.com/groups/v1/groups/g@b.c"
        );
        assert_eq!(
            api.url(Service::CloudIdentity, &["groups:lookup"])
                .unwrap()
                .as_str(),
            "https://cloudidentity.googleapis.com/v1/groups:lookup"
        );
    }

    #[test]
    fn segments_are_escaped() {
        let api = api().with_root("http://127.0.0.1:1234/");
        let url = api
            .url(Service::Drive, &["files", "a/b c", "permissions"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:1234/drive/v3/files/a%2Fb%20c/permissions"
        );
    }

    #[test]
    fn page_token_joins_the_mask() {
        let q = page_token_in_fields(Query::new().push("fields", "users(id)"));
        assert_eq!(q.get("fields"), Some("nextPageToken,users(id)"));

        let q = page_token_in_fields(Query::new().push("fields", "nextPageToken,files"));
        assert_eq!(q.get("fields"), Some("nextPageToken,files"));

        let q = page_token_in_fields(Query::new());
        assert_eq!(q.get("fields"), None);
    }

    #[test]
    fn every_service_declares_scopes() {
        for service in [
            Service::Directory,
            Service::Reports,
            Service::Gmail,
            Service::Drive,
            Service::Calendar,
            Service::GroupsSettings,
            Service::CloudIdentity,
        ] {
            assert!(!service.scopes().is_empty());
        }
    }
}
