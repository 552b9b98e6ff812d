use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel label value used whenever a header fact cannot be derived.
pub const UNKNOWN: &str = "UNKNOWN";

/// How the username in an [`Identity`] was derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    Jwt,
    Password,
    None,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Jwt => "jwt",
            AuthScheme::Password => "password",
            AuthScheme::None => "none",
        }
    }
}

/// Best-effort identity derived from the `authorization` header.
///
/// This is an identity *label* for metrics, not a trust decision: bearer
/// tokens are decoded without signature verification and basic credentials
/// are never checked against any user store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub scheme: AuthScheme,
}

impl Identity {
    fn unknown() -> Self {
        Identity {
            username: UNKNOWN.to_string(),
            scheme: AuthScheme::None,
        }
    }
}

/// Client name and version derived from the `user-agent` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAgent {
    pub name: String,
    pub version: Option<String>,
}

impl ClientAgent {
    fn unknown() -> Self {
        ClientAgent {
            name: UNKNOWN.to_string(),
            version: None,
        }
    }
}

/// Derive the username and auth scheme from an `authorization` header value.
///
/// Accepts either basic authentication (`Basic base64(user:pass)`) or a
/// bearer JWT (`Bearer header.payload.signature`, reading the unverified
/// `name` claim from the payload). Any malformed input degrades to
/// `UNKNOWN`/[`AuthScheme::None`]; this function never fails.
pub fn derive_identity(auth_header: Option<&str>) -> Identity {
    let header = match auth_header {
        Some(h) if !h.is_empty() => h,
        _ => {
            tracing::debug!("authorization header is not present or is empty");
            return Identity::unknown();
        }
    };

    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default().trim().to_lowercase();
    let value = match parts.next() {
        Some(v) => v,
        None => return Identity::unknown(),
    };

    match scheme.as_str() {
        "bearer" => parse_bearer(value).unwrap_or_else(|| {
            tracing::debug!("error parsing bearer authorization header");
            Identity::unknown()
        }),
        "basic" => parse_basic(value).unwrap_or_else(|| {
            tracing::debug!("error parsing basic authorization header");
            Identity::unknown()
        }),
        _ => Identity::unknown(),
    }
}

fn parse_bearer(value: &str) -> Option<Identity> {
    let payload = value.split('.').nth(1)?;
    let decoded = decode_base64_lenient(payload)?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    claims.as_object()?;
    let username = claims
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or(UNKNOWN)
        .to_string();
    Some(Identity {
        username,
        scheme: AuthScheme::Jwt,
    })
}

fn parse_basic(value: &str) -> Option<Identity> {
    let decoded = decode_base64_lenient(value.trim())?;
    let credentials = String::from_utf8(decoded).ok()?;
    let username = credentials.split(':').next().unwrap_or_default();
    // An all-ASCII username is the heuristic that separates real credentials
    // from non-base64 garbage that happened to decode.
    if !username.is_ascii() {
        return None;
    }
    let username = if username.is_empty() { UNKNOWN } else { username };
    Some(Identity {
        username: username.to_string(),
        scheme: AuthScheme::Password,
    })
}

/// Decode base64 accepting both the standard and URL-safe alphabets, padded
/// or not. JWT segments use unpadded URL-safe encoding while basic-auth
/// values use padded standard encoding.
fn decode_base64_lenient(input: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(input)
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .ok()
}

static AGENT_NAME_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w-]").unwrap());
static AGENT_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+[-_]?\d*[.]?){2,4}").unwrap());

/// Derive the client name and version from a `user-agent` header value.
///
/// The name is the leading run of word characters and hyphens; the version is
/// the first version-number-shaped substring anywhere in the header. Example:
/// `npm/7.20.5 node/v14.17.1 darwin x64` yields `npm` / `7.20.5`. Browser
/// agent strings resolve to `Mozilla` / `5.0`, which is accepted behavior.
/// This function never fails.
pub fn derive_client(user_agent_header: Option<&str>) -> ClientAgent {
    let header = match user_agent_header {
        Some(h) if !h.is_empty() => h,
        _ => {
            tracing::debug!("user agent header is not present or is empty");
            return ClientAgent::unknown();
        }
    };

    let name = AGENT_NAME_BOUNDARY
        .split(header)
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string();
    let version = AGENT_VERSION.find(header).map(|m| m.as_str().to_string());
    tracing::debug!(name, ?version, "parsed user agent header");

    ClientAgent { name, version }
}
