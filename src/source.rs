//! Source URL validation and parsing.

use crate::error::Error;
use url::Url;

/// Parsed identity of a remote source tree.
///
/// `base_url` uniquely identifies the tree independent of any requested
/// subdirectory. Immutable after parsing; the subdirectory, when present, is
/// validated to exist only after the tree has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub owner: String,
    pub name: String,
    pub base_url: String,
    pub fetch_url: String,
    pub subdirectory: Option<String>,
}

impl SourceRef {
    /// Validate and parse a repository URL.
    ///
    /// Accepted forms:
    /// - `https://host/owner/name[.git]`
    /// - `https://host/owner/name/tree/branch[/sub/dir]` (web UI URLs)
    /// - `https://host/owner/name/sub/dir`
    ///
    /// Input is trimmed and stray `(`, `)` and `@` characters are dropped
    /// before parsing.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(*c, '(' | ')' | '@'))
            .collect();

        let invalid = |reason: String| Error::InvalidSource {
            url: raw.trim().to_string(),
            reason,
        };

        let parsed = Url::parse(&cleaned).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;

        let segments: Vec<&str> = parsed
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(invalid(
                "expected format: https://host/owner/repository[/path/to/directory]".to_string(),
            ));
        }

        let owner = segments[0].to_string();
        let name = segments[1]
            .strip_suffix(".git")
            .unwrap_or(segments[1])
            .to_string();
        if owner.is_empty() || name.is_empty() {
            return Err(invalid("missing owner or repository name".to_string()));
        }

        // Subdirectory: either a web-UI /tree/<branch>/<path> form or a
        // direct /<path> suffix after owner/name.
        let subdirectory = if segments.len() > 2 {
            if segments[2] == "tree" && segments.len() > 3 {
                if segments.len() > 4 {
                    Some(segments[4..].join("/"))
                } else {
                    None
                }
            } else {
                Some(segments[2..].join("/"))
            }
        } else {
            None
        };

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let base_url = format!("{}://{}/{}/{}", parsed.scheme(), authority, owner, name);
        let fetch_url = format!("{}.git", base_url);

        Ok(SourceRef {
            owner,
            name,
            base_url,
            fetch_url,
            subdirectory,
        })
    }

    /// Fetch URL with an access credential injected into the authority, for
    /// private sources. The result must never be logged.
    pub fn fetch_url_with_credential(&self, credential: Option<&str>) -> String {
        match credential.filter(|c| !c.is_empty()) {
            Some(token) => self
                .fetch_url
                .replacen("://", &format!("://{}@", token), 1),
            None => self.fetch_url.clone(),
        }
    }

    /// Human-readable `owner/name` identifier.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
