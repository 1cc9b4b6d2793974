//! §4.1 URI: `scheme://user@host:port/path?query#fragment`, plus the two
//! schemeless forms `/absolute/path` and `relative/path`.

use std::fmt;

use crate::error::{Error, ErrorKind};

/// An ordered, key-unique `name=value` mapping, matching the wire grammar
/// `name[=value](&name[=value])*`. Kept as a `Vec` rather than a `HashMap`
/// because insertion order must survive a round trip to `toString()`.
pub type ParamList = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct Uri {
    scheme: Option<String>,
    user: Option<String>,
    host: Option<String>,
    port: i32,
    path: String,
    params: ParamList,
    fragment: Option<String>,
}

impl Uri {
    /// An empty, schemeless, path-less URI. Mutate it with the setters
    /// below, or use [`Uri::parse`] to build one from a wire string.
    pub fn new() -> Uri {
        Uri {
            scheme: None,
            user: None,
            host: None,
            port: -1,
            path: String::new(),
            params: Vec::new(),
            fragment: None,
        }
    }

    pub fn parse(input: &str) -> Result<Uri, Error> {
        let (before_fragment, fragment) = match input.find('#') {
            Some(idx) => (&input[..idx], Some(input[idx + 1..].to_string())),
            None => (input, None),
        };
        let (before_query, query) = match before_fragment.find('?') {
            Some(idx) => (
                &before_fragment[..idx],
                Some(&before_fragment[idx + 1..]),
            ),
            None => (before_fragment, None),
        };

        let mut uri = Uri::new();
        uri.fragment = fragment;
        if let Some(query) = query {
            uri.params = parse_query(query)?;
        }

        if let Some(scheme_end) = before_query.find("://") {
            let scheme = &before_query[..scheme_end];
            if scheme.is_empty() {
                return Err(Error::new(ErrorKind::InvalidUri(input.to_string())));
            }
            uri.scheme = Some(scheme.to_string());
            let rest = &before_query[scheme_end + 3..];
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            parse_authority(authority, &mut uri)?;
            uri.path = path.to_string();
        } else {
            uri.path = before_query.to_string();
        }

        Ok(uri)
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn set_scheme(&mut self, scheme: Option<String>) {
        self.scheme = scheme;
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn set_host(&mut self, host: Option<String>) {
        self.host = host;
    }

    /// `-1` means "default port" (i.e. unset).
    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn set_port(&mut self, port: i32) {
        self.port = port;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// When a scheme and a non-empty host are set, the path must be
    /// absolute; a missing leading `/` is inserted rather than rejected.
    pub fn set_path(&mut self, path: impl Into<String>) {
        let mut path = path.into();
        if self.scheme.is_some() && self.host.as_deref().map_or(false, |h| !h.is_empty()) && !path.starts_with('/')
        {
            path.insert(0, '/');
        }
        self.path = path;
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn set_fragment(&mut self, fragment: Option<String>) {
        self.fragment = fragment;
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.params.iter().any(|(k, _)| k == name)
    }

    pub fn get_parameter(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts or overwrites `name`, preserving its original position when
    /// it already existed (so round trips don't reorder unrelated params).
    pub fn set_parameter(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.params.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        } else {
            self.params.push((name.to_string(), value));
        }
    }

    pub fn remove_parameter(&mut self, name: &str) {
        self.params.retain(|(k, _)| k != name);
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }
}

impl Default for Uri {
    fn default() -> Uri {
        Uri::new()
    }
}

fn parse_authority(authority: &str, uri: &mut Uri) -> Result<(), Error> {
    if authority.is_empty() {
        return Ok(());
    }
    let (userinfo, host_port) = match authority.rfind('@') {
        Some(idx) => (Some(&authority[..idx]), &authority[idx + 1..]),
        None => (None, authority),
    };
    if let Some(userinfo) = userinfo {
        uri.user = Some(percent_decode(userinfo));
    }
    match host_port.rfind(':') {
        Some(idx) => {
            uri.host = Some(host_port[..idx].to_string());
            let port_str = &host_port[idx + 1..];
            uri.port = port_str
                .parse()
                .map_err(|_| Error::new(ErrorKind::InvalidUri(authority.to_string())))?;
        }
        None => {
            uri.host = Some(host_port.to_string());
        }
    }
    Ok(())
}

fn parse_query(query: &str) -> Result<ParamList, Error> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let mut params = Vec::new();
    for pair in query.split('&') {
        match pair.find('=') {
            Some(idx) => params.push((pair[..idx].to_string(), pair[idx + 1..].to_string())),
            None => params.push((pair.to_string(), String::new())),
        }
    }
    Ok(params)
}

/// Decodes `%XX` escapes. The wire grammar only requires round-tripping
/// `@` (`%40`) in user info, but any escape is honored on the way in.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

fn percent_encode_userinfo(input: &str) -> String {
    input.replace('@', "%40")
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
            if let Some(user) = &self.user {
                write!(f, "{}@", percent_encode_userinfo(user))?;
            }
            if let Some(host) = &self.host {
                write!(f, "{}", host)?;
            }
            if self.port != -1 {
                write!(f, ":{}", self.port)?;
            }
        }
        write!(f, "{}", self.path)?;
        if !self.params.is_empty() {
            write!(f, "?")?;
            let mut first = true;
            for (name, value) in &self.params {
                if !first {
                    write!(f, "&")?;
                }
                first = false;
                if value.is_empty() {
                    write!(f, "{}", name)?;
                } else {
                    write!(f, "{}={}", name, value)?;
                }
            }
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}
