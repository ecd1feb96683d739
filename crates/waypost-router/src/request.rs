//! HTTP request type.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::RouterError;
use crate::websocket::OnUpgrade;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// GET method
    Get,
    /// POST method
    Post,
    /// PUT method
    Put,
    /// PATCH method
    Patch,
    /// DELETE method
    Delete,
    /// HEAD method
    Head,
    /// OPTIONS method
    Options,
    /// TRACE method
    Trace,
    /// CONNECT method
    Connect,
}

impl Method {
    /// Parses a method from a string, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "TRACE" => Some(Self::Trace),
            "CONNECT" => Some(Self::Connect),
            _ => None,
        }
    }

    /// Returns the method as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl FromStr for Method {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| RouterError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Path parameters extracted from the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: HashMap<String, String>,
}

impl PathParams {
    /// Creates new empty path params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Gets a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns true if the parameter was present in the URL.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Gets a parameter value or returns an error.
    pub fn require(&self, key: &str) -> Result<&str, String> {
        self.get(key)
            .ok_or_else(|| format!("Missing path parameter: {key}"))
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Number of parameters present.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true when no parameter was extracted.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Metadata about the route a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// The name the endpoint was declared with.
    pub name: String,
    /// The normalized full path, parameter tokens included.
    pub full_name: String,
}

/// An address or CIDR range whose forwarding headers are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedProxy {
    network: IpAddr,
    prefix_len: u8,
}

impl TrustedProxy {
    /// Returns true if `ip` falls inside this range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for TrustedProxy {
    type Err = String;

    /// Accepts `10.0.0.1`, `10.0.0.0/8`, `::1` or `fd00::/8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let network: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| format!("invalid proxy address: {s}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match len {
            Some(len) => len
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|l| *l <= max)
                .ok_or_else(|| format!("invalid prefix length: {s}"))?,
            None => max,
        };
        Ok(Self {
            network,
            prefix_len,
        })
    }
}

/// An HTTP request.
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Path parameters extracted from URL patterns.
    pub params: PathParams,
    /// The route this request resolved to, if any.
    pub route: Option<RouteInfo>,
    /// Query string parameters.
    pub query: HashMap<String, String>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
    /// Address of the connected peer.
    pub remote_addr: Option<SocketAddr>,
    /// Raw stream handed over by the transport once a `101` is sent.
    pub(crate) upgrade: Option<OnUpgrade>,
    /// Body limit applied by [`Request::json`], set by the router.
    pub(crate) json_limit: Option<usize>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("route", &self.route)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("remote_addr", &self.remote_addr)
            .field("upgradable", &self.upgrade.is_some())
            .finish()
    }
}

impl Request {
    /// Creates a new request. The path part of `target` is percent-decoded;
    /// a `?query` suffix is parsed into [`Request::query`].
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (percent_decode(path), Self::parse_query_string(query)),
            None => (percent_decode(&target), HashMap::new()),
        };
        Self {
            method,
            path,
            params: PathParams::new(),
            route: None,
            query,
            headers: HashMap::new(),
            body: Vec::new(),
            remote_addr: None,
            upgrade: None,
            json_limit: None,
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a query parameter.
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Attaches the transport's pending upgrade.
    #[must_use]
    pub fn with_upgrade(mut self, upgrade: OnUpgrade) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    /// Gets a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the request asks for a WebSocket upgrade.
    pub fn is_websocket(&self) -> bool {
        self.get_header("Upgrade")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
    }

    /// Gets a query parameter.
    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Parses every cookie sent in `Cookie` headers.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.get_header("Cookie")
            .map(|raw| {
                raw.split(';')
                    .filter_map(|pair| {
                        let (name, value) = pair.split_once('=')?;
                        let name = name.trim();
                        if name.is_empty() {
                            return None;
                        }
                        Some((name.to_string(), value.trim().trim_matches('"').to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gets a single cookie value.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    /// Parses the body as JSON, honoring the router's `max_json_bytes`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.json_limit {
            Some(limit) => self.json_limited(limit),
            None => serde_json::from_slice(&self.body),
        }
    }

    /// Parses the body as JSON, refusing bodies larger than `max_bytes`.
    pub fn json_limited<T: serde::de::DeserializeOwned>(
        &self,
        max_bytes: usize,
    ) -> Result<T, serde_json::Error> {
        if self.body.len() > max_bytes {
            return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                "body of {} bytes exceeds limit of {max_bytes}",
                self.body.len()
            )));
        }
        serde_json::from_slice(&self.body)
    }

    /// Resolves the client address.
    ///
    /// `X-Forwarded-For` is walked right to left and the first address not
    /// in `trusted` wins; then `X-Real-IP`; then the peer address.
    pub fn client_ip(&self, trusted: &[TrustedProxy]) -> Option<IpAddr> {
        let is_trusted = |ip: IpAddr| trusted.iter().any(|t| t.contains(ip));

        if let Some(forwarded) = self.get_header("X-Forwarded-For") {
            let found = forwarded
                .rsplit(',')
                .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
                .find(|ip| !is_trusted(*ip));
            if found.is_some() {
                return found;
            }
        }

        if let Some(real) = self
            .get_header("X-Real-IP")
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        {
            if !is_trusted(real) {
                return Some(real);
            }
        }

        self.remote_addr.map(|addr| addr.ip())
    }

    /// Parses query parameters from a query string.
    pub fn parse_query_string(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next().unwrap_or("");
                Some((urlencoding_decode(key), urlencoding_decode(value)))
            })
            .collect()
    }
}

/// Percent-decodes a path. Invalid UTF-8 is replaced rather than rejected.
fn percent_decode(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

/// Percent-decodes a query component, treating `+` as a space.
fn urlencoding_decode(s: &str) -> String {
    percent_decode(&s.replace('+', " "))
}
