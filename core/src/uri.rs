/*
 * uri.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a toolkit for line-oriented TCP dialogues.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Request targets and `http://` URLs. Targets are percent-encoded on the way out and
//! decoded before being resolved under the server root.

use std::path::{Component, Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{Error, Result};
use crate::protocol::Protocol;

/// Bytes that cannot appear raw in a request target. `%`, `/`, `?` and `#` are left alone
/// so an already escaped target goes out unchanged.
const REQUEST_TARGET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Escape what a request line cannot carry (spaces, controls, non-ASCII) and ensure a leading `/`.
pub fn encode_request_path(path: &str) -> String {
    let encoded = utf8_percent_encode(path, REQUEST_TARGET).to_string();
    if encoded.starts_with('/') {
        encoded
    } else {
        format!("/{}", encoded)
    }
}

/// Map a request target onto a file under `root`.
///
/// Query and fragment are ignored. Returns `None` when the target is not an absolute path,
/// does not decode to UTF-8, or contains a `..` segment.
pub fn resolve_request_path(root: &Path, target: &str) -> Option<PathBuf> {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    if !path.starts_with('/') {
        return None;
    }
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let mut resolved = root.to_path_buf();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains(['\0', '\\']) => return None,
            s => {
                // a decoded segment must stay a single plain component
                let mut components = Path::new(s).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(c)), None) => resolved.push(c),
                    _ => return None,
                }
            }
        }
    }
    Some(resolved)
}

/// `http://host[:port][/path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl HttpUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| Error::Config(format!("not an http:// URL: {}", url)))?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("invalid port in URL: {}", url)))?;
                (h, port)
            }
            None => (authority, Protocol::Http.default_port()),
        };
        if host.is_empty() {
            return Err(Error::Config(format!("missing host in URL: {}", url)));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Value for the `Host:` header; the port is omitted when it is the default.
    pub fn host_header(&self) -> String {
        host_header(&self.host, self.port)
    }
}

/// `host` or `host:port` for a `Host:` header.
pub fn host_header(host: &str, port: u16) -> String {
    if port == Protocol::Http.default_port() {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_what_a_request_line_cannot_carry() {
        assert_eq!(encode_request_path("docs/my file.txt"), "/docs/my%20file.txt");
        assert_eq!(encode_request_path("/caf\u{e9}"), "/caf%C3%A9");
        assert_eq!(encode_request_path("/already%20escaped?q=1"), "/already%20escaped?q=1");
        assert_eq!(encode_request_path(""), "/");
    }

    #[test]
    fn encoded_target_resolves_back_to_the_name() {
        let root = Path::new("/srv/www");
        let target = encode_request_path("/docs/my file.txt");
        assert_eq!(
            resolve_request_path(root, &target),
            Some(PathBuf::from("/srv/www/docs/my file.txt"))
        );
    }

    #[test]
    fn resolves_under_root() {
        let root = Path::new("/srv/www");
        assert_eq!(
            resolve_request_path(root, "/index.html"),
            Some(PathBuf::from("/srv/www/index.html"))
        );
        assert_eq!(
            resolve_request_path(root, "/docs/my%20file.txt?x=1"),
            Some(PathBuf::from("/srv/www/docs/my file.txt"))
        );
        assert_eq!(
            resolve_request_path(root, "//a/./b"),
            Some(PathBuf::from("/srv/www/a/b"))
        );
        assert_eq!(resolve_request_path(root, "/"), Some(PathBuf::from("/srv/www")));
    }

    #[test]
    fn parent_segments_never_escape() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_request_path(root, "/../etc/passwd"), None);
        assert_eq!(resolve_request_path(root, "/a/%2e%2e/%2e%2e/etc/passwd"), None);
        assert_eq!(resolve_request_path(root, "/a%2f..%2fb"), None);
        assert_eq!(resolve_request_path(root, "index.html"), None);
        assert_eq!(resolve_request_path(root, "/%ff"), None);
    }

    #[test]
    fn parses_http_urls() {
        let u = HttpUrl::parse("http://localhost:8080/a/b.txt").unwrap();
        assert_eq!(u.host, "localhost");
        assert_eq!(u.port, 8080);
        assert_eq!(u.path, "/a/b.txt");
        assert_eq!(u.host_header(), "localhost:8080");

        let u = HttpUrl::parse("http://example.org").unwrap();
        assert_eq!(u.port, 80);
        assert_eq!(u.path, "/");
        assert_eq!(u.host_header(), "example.org");

        assert!(HttpUrl::parse("ftp://example.org/").is_err());
        assert!(HttpUrl::parse("http://:80/").is_err());
        assert!(HttpUrl::parse("http://h:port/").is_err());
    }
}
