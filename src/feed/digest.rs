//! HTTP authentication challenges sent by camera feeds.
//!
//! Cameras answer the first unauthenticated request with `401` and a
//! `WWW-Authenticate` challenge. Digest (RFC 2617, MD5 / MD5-sess with
//! `qop=auth` or legacy mode) is what the eventManager endpoint uses; Basic is
//! accepted for cameras configured that way.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Digest(DigestChallenge),
    Basic,
}

impl Challenge {
    /// Parse one `WWW-Authenticate` header value
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = match header.find(char::is_whitespace) {
            Some(split) => (&header[..split], &header[split..]),
            None => (header, ""),
        };

        if scheme.eq_ignore_ascii_case("digest") {
            DigestChallenge::from_params(rest).map(Challenge::Digest)
        } else if scheme.eq_ignore_ascii_case("basic") {
            Some(Challenge::Basic)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
}

impl DigestChallenge {
    fn from_params(params: &str) -> Option<Self> {
        let mut params = parse_params(params);

        Some(Self {
            realm: params.remove("realm")?,
            nonce: params.remove("nonce")?,
            opaque: params.remove("opaque"),
            algorithm: params.remove("algorithm"),
            qop: params.remove("qop"),
        })
    }

    fn is_session_algorithm(&self) -> bool {
        self.algorithm
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case("md5-sess"))
    }

    fn supports_auth_qop(&self) -> bool {
        self.qop
            .as_deref()
            .is_some_and(|qop| qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")))
    }

    /// Build the `Authorization` header value answering this challenge
    pub fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
        nonce_count: u32,
    ) -> String {
        let mut ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        if self.is_session_algorithm() {
            ha1 = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = md5_hex(&format!("{}:{}", method, uri));
        let nc = format!("{:08x}", nonce_count);

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
            username, self.realm, self.nonce, uri
        );

        if self.supports_auth_qop() {
            let response = md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1, self.nonce, nc, cnonce, ha2
            ));
            header.push_str(&format!(
                ", qop=auth, nc={}, cnonce=\"{}\", response=\"{}\"",
                nc, cnonce, response
            ));
        } else {
            let response = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2));
            header.push_str(&format!(", response=\"{}\"", response));
        }

        if let Some(algorithm) = &self.algorithm {
            header.push_str(&format!(", algorithm={}", algorithm));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", opaque));
        }

        header
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Parse `key=value` / `key="quoted, value"` pairs separated by commas.
/// Keys are lowercased.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect::<String>()
            .trim()
            .to_ascii_lowercase();
        if key.is_empty() {
            break;
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut escaped = false;
            for c in chars.by_ref() {
                match c {
                    _ if escaped => {
                        value.push(c);
                        escaped = false;
                    }
                    '\\' => escaped = true,
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        params.insert(key, value);
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_CHALLENGE: &str = "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
        nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"";

    #[test]
    fn test_parse_digest_challenge() {
        let challenge = Challenge::parse(RFC_CHALLENGE).unwrap();
        let Challenge::Digest(digest) = challenge else {
            panic!("expected a digest challenge");
        };

        assert_eq!(digest.realm, "testrealm@host.com");
        assert_eq!(digest.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(digest.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(
            digest.opaque.as_deref(),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
        assert_eq!(digest.algorithm, None);
    }

    #[test]
    fn test_rfc2617_response() {
        let Some(Challenge::Digest(digest)) = Challenge::parse(RFC_CHALLENGE) else {
            panic!("expected a digest challenge");
        };

        let header = digest.authorization(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            "0a4f113b",
            1,
        );

        assert!(header.starts_with("Digest username=\"Mufasa\""));
        assert!(header.contains("uri=\"/dir/index.html\""));
        assert!(header.contains("qop=auth, nc=00000001, cnonce=\"0a4f113b\""));
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
    }

    #[test]
    fn test_legacy_digest_without_qop() {
        let digest = DigestChallenge {
            realm: "cam".to_string(),
            nonce: "abc".to_string(),
            opaque: None,
            algorithm: Some("MD5".to_string()),
            qop: None,
        };

        let header = digest.authorization("admin", "pw", "GET", "/cgi-bin/x", "ignored", 1);

        let ha1 = md5_hex("admin:cam:pw");
        let ha2 = md5_hex("GET:/cgi-bin/x");
        let expected = md5_hex(&format!("{}:abc:{}", ha1, ha2));
        assert!(header.contains(&format!("response=\"{}\"", expected)));
        assert!(!header.contains("qop="));
        assert!(header.contains("algorithm=MD5"));
    }

    #[test]
    fn test_md5_sess_rehashes_ha1() {
        let mut digest = DigestChallenge {
            realm: "cam".to_string(),
            nonce: "n".to_string(),
            opaque: None,
            algorithm: Some("MD5".to_string()),
            qop: Some("auth".to_string()),
        };
        let plain = digest.authorization("u", "p", "GET", "/", "c", 1);

        digest.algorithm = Some("MD5-sess".to_string());
        let session = digest.authorization("u", "p", "GET", "/", "c", 1);

        assert_ne!(plain, session);
    }

    #[test]
    fn test_parse_basic_and_unknown() {
        assert_eq!(
            Challenge::parse("Basic realm=\"camera\""),
            Some(Challenge::Basic)
        );
        assert_eq!(Challenge::parse("Bearer realm=\"x\""), None);
        assert_eq!(Challenge::parse("Digest qop=\"auth\""), None);
    }

    #[test]
    fn test_parse_params_unquoted_and_escaped() {
        let params = parse_params(" realm=\"a \\\"b\\\", c\", nonce=xyz , stale=FALSE");

        assert_eq!(params.get("realm").map(String::as_str), Some("a \"b\", c"));
        assert_eq!(params.get("nonce").map(String::as_str), Some("xyz"));
        assert_eq!(params.get("stale").map(String::as_str), Some("FALSE"));
    }
}
