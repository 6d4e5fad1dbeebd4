use crate::error::{Error, Result};
use camino::Utf8Path;
use http::header::HeaderValue;
use tame_oauth::gcp::{self, TokenProvider};

/// Where bearer tokens come from. Providers cache tokens until they expire,
/// so asking for one before every call is cheap.
pub enum Authenticator {
    /// A service account acting on behalf of `subject`
    Delegated {
        provider: gcp::ServiceAccountProvider,
        subject: String,
    },
    /// Application default credentials, including an end user's login
    Default(gcp::TokenProviderWrapper),
    /// A token obtained elsewhere
    Static(HeaderValue),
}

impl Authenticator {
    pub fn delegated(key_file: &Utf8Path, subject: impl Into<String>) -> Result<Self> {
        let key = std::fs::read(key_file)
            .map_err(|err| Error::config(format!("unable to read credentials {key_file}: {err}")))?;
        let info = gcp::ServiceAccountInfo::deserialize(key)
            .map_err(|err| Error::config(format!("invalid credentials {key_file}: {err}")))?;
        let provider = gcp::ServiceAccountProvider::new(info)
            .map_err(|err| Error::config(format!("invalid credentials {key_file}: {err}")))?;

        Ok(Self::Delegated {
            provider,
            subject: subject.into(),
        })
    }

    pub fn default_credentials() -> Result<Self> {
        let provider = gcp::TokenProviderWrapper::get_default_provider()
            .map_err(|err| Error::config(format!("unable to read default credentials: {err}")))?
            .ok_or_else(|| Error::config("unable to determine default credentials"))?;

        Ok(Self::Default(provider))
    }

    pub fn fixed(token: &str) -> Result<Self> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| Error::Auth(format!("invalid access token: {err}")))?;
        Ok(Self::Static(value))
    }

    /// The `Authorization` header value for a call needing `scopes`
    pub async fn header(&self, client: &reqwest::Client, scopes: &[String]) -> Result<HeaderValue> {
        match self {
            Self::Delegated { provider, subject } => {
                bearer_token(provider, Some(subject), scopes, client).await
            }
            Self::Default(provider) => bearer_token(provider, None, scopes, client).await,
            Self::Static(value) => Ok(value.clone()),
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delegated { subject, .. } => f.debug_struct("Delegated").field("subject", subject).finish(),
            Self::Default(_) => f.write_str("Default"),
            Self::Static(_) => f.write_str("Static"),
        }
    }
}

fn auth_err(context: &str) -> impl FnOnce(tame_oauth::Error) -> Error + '_ {
    move |err| Error::Auth(format!("{context}: {err}"))
}

async fn bearer_token<P: TokenProvider>(
    tp: &P,
    subject: Option<&str>,
    scopes: &[String],
    client: &reqwest::Client,
) -> Result<HeaderValue> {
    let token_or_request = match subject {
        Some(subject) => tp.get_token_with_subject(Some(subject), scopes.iter()),
        None => tp.get_token(scopes.iter()),
    }
    .map_err(auth_err("failed to make token request"))?;

    match token_or_request {
        gcp::TokenOrRequest::Token(tok) => tok
            .try_into()
            .map_err(auth_err("failed to convert token to header value")),
        gcp::TokenOrRequest::Request {
            request,
            scope_hash,
            ..
        } => {
            let response = fetch_token(client, request).await?;

            tp.parse_token_response(scope_hash, response)
                .and_then(TryInto::try_into)
                .map_err(auth_err("failed to convert token to header value"))
        }
    }
}

/// Sends a token request. Transport failures and throttled or failing
/// endpoints come back retryable, a refusal of the credentials does not.
async fn fetch_token(
    client: &reqwest::Client,
    request: http::Request<Vec<u8>>,
) -> Result<http::Response<bytes::Bytes>> {
    let (parts, body) = request.into_parts();
    let uri = parts.uri.to_string();

    // Token requests are always POST
    let res = client
        .post(&uri)
        .headers(parts.headers)
        .body(body)
        .send()
        .await?;

    let code = res.status();

    let mut builder = http::Response::builder()
        .status(code)
        .version(res.version());

    if let Some(headers) = builder.headers_mut() {
        headers.extend(
            res.headers()
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    let buffer = res.bytes().await?;

    if !code.is_success() {
        return Err(token_failure(code.as_u16(), &buffer));
    }

    builder
        .body(buffer)
        .map_err(|err| Error::Auth(format!("invalid token response: {err}")))
}

fn token_failure(status: u16, body: &[u8]) -> Error {
    if status == 429 || status >= 500 {
        return Error::from_response(status, body);
    }

    Error::Auth(match std::str::from_utf8(body) {
        Ok(err_str) if !err_str.trim().is_empty() => err_str.trim().to_owned(),
        _ => format!("token request refused with {status}"),
    })
}
