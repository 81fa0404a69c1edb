//! [`NegotiationEndpoint`]: the path pattern key exchange requests must hit.

use http::Uri;

use super::NegotiationError;

/// Path pattern for the negotiation endpoint.
///
/// Supports exact segments, `*` for a single segment, and a trailing `/**`
/// for any remainder (including none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationEndpoint {
    pattern: String,
}

impl NegotiationEndpoint {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if `path` matches the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let mut pattern = segments(&self.pattern).peekable();
        let mut path = segments(path);
        loop {
            match (pattern.next(), path.next()) {
                (Some("**"), _) if pattern.peek().is_none() => return true,
                (Some(p), Some(s)) if p == "*" || p == s => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }

    /// Check the path of a full URL (or bare path) against the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::EndpointMismatch`] if the URL cannot be
    /// parsed or its path does not match.
    pub fn check_url(&self, url: &str) -> Result<(), NegotiationError> {
        let path = url
            .parse::<Uri>()
            .map(|uri| uri.path().to_owned())
            .unwrap_or_else(|_| url.to_owned());
        if self.matches(&path) {
            Ok(())
        } else {
            Err(NegotiationError::EndpointMismatch {
                path,
                pattern: self.pattern.clone(),
            })
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let ep = NegotiationEndpoint::new("/security/negotiate");
        assert!(ep.matches("/security/negotiate"));
        assert!(ep.matches("/security/negotiate/"));
        assert!(!ep.matches("/security/negotiate/x"));
        assert!(!ep.matches("/security"));
        assert!(!ep.matches("/other/negotiate"));
    }

    #[test]
    fn wildcards() {
        let one = NegotiationEndpoint::new("/api/*/negotiate");
        assert!(one.matches("/api/v1/negotiate"));
        assert!(!one.matches("/api/negotiate"));

        let rest = NegotiationEndpoint::new("/security/**");
        assert!(rest.matches("/security"));
        assert!(rest.matches("/security/a/b/c"));
        assert!(!rest.matches("/public/a"));
    }

    #[test]
    fn url_path_is_checked() {
        let ep = NegotiationEndpoint::new("/security/negotiate");
        assert!(ep.check_url("http://svc:8080/security/negotiate").is_ok());
        assert!(ep.check_url("/security/negotiate").is_ok());
        assert!(matches!(
            ep.check_url("http://svc:8080/wrong"),
            Err(NegotiationError::EndpointMismatch { path, .. }) if path == "/wrong"
        ));
    }
}
