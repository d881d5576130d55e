//! Build scan URL parsing.

use anyhow::{bail, Context, Result};
use build_scan_export::Url;

/// A build scan reference taken from `https://host[/ctx]/s/<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildScanUrl {
    /// Everything before `/s/`, with a trailing slash.
    pub server_url: Url,
    pub build_scan_id: String,
}

impl BuildScanUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).with_context(|| format!("invalid build scan URL '{input}'"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            bail!("build scan URL '{input}' must be an http(s) URL with a host");
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let (id, rest) = match segments.split_last() {
            Some((id, rest)) if rest.last() == Some(&"s") => (*id, &rest[..rest.len() - 1]),
            _ => bail!("build scan URL '{input}' does not end in /s/<build-scan-id>"),
        };

        let mut server_url = url.clone();
        server_url.set_query(None);
        server_url.set_fragment(None);
        let mut path = String::from("/");
        for segment in rest {
            path.push_str(segment);
            path.push('/');
        }
        server_url.set_path(&path);

        Ok(BuildScanUrl {
            server_url,
            build_scan_id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_server() {
        let scan = BuildScanUrl::parse("https://ge.example.com/s/abc123xyz").unwrap();
        assert_eq!(scan.server_url.as_str(), "https://ge.example.com/");
        assert_eq!(scan.build_scan_id, "abc123xyz");
    }

    #[test]
    fn test_parse_keeps_port_and_context_path() {
        let scan =
            BuildScanUrl::parse("http://ge.example.com:8080/gradle/s/abc123/?tab=console#x").unwrap();
        assert_eq!(scan.server_url.as_str(), "http://ge.example.com:8080/gradle/");
        assert_eq!(scan.build_scan_id, "abc123");
    }

    #[test]
    fn test_parse_rejects_non_scan_urls() {
        assert!(BuildScanUrl::parse("https://ge.example.com/").is_err());
        assert!(BuildScanUrl::parse("https://ge.example.com/scans/abc").is_err());
        assert!(BuildScanUrl::parse("ftp://ge.example.com/s/abc").is_err());
        assert!(BuildScanUrl::parse("abc123").is_err());
    }
}
