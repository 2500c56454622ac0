//! HTTP Digest authentication (RFC 2617 / RFC 7616)
//!
//! TR-064 devices protect control URLs with Digest auth. The challenge is
//! cached after the first 401 and reused with an incrementing nonce count
//! until the device reports it stale.

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Hash algorithm requested by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// `MD5` (default when the challenge names none)
    Md5,
    /// `SHA-256`
    Sha256,
}

impl Algorithm {
    fn hash(self, input: &str) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(input.as_bytes())),
            Self::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Parsed `WWW-Authenticate: Digest ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Protection realm
    pub realm: String,
    /// Server nonce
    pub nonce: String,
    /// Opaque value echoed back verbatim
    pub opaque: Option<String>,
    /// Whether `qop=auth` was offered
    pub qop_auth: bool,
    /// Hash algorithm
    pub algorithm: Algorithm,
    /// Server marked the previous nonce as stale
    pub stale: bool,
}

impl Challenge {
    /// Parse a `WWW-Authenticate` header value
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the header is not a Digest challenge or
    /// lacks a realm or nonce
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let Some(params) = header
            .get(..6)
            .filter(|scheme| scheme.eq_ignore_ascii_case("digest"))
            .map(|_| &header[6..])
        else {
            return Err(Error::Auth(format!("unsupported auth scheme: {header}")));
        };

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop_auth = false;
        let mut algorithm = Algorithm::Md5;
        let mut stale = false;

        for (key, value) in split_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop_auth = value.split(',').any(|q| q.trim() == "auth"),
                "algorithm" => {
                    algorithm = match value.to_ascii_uppercase().as_str() {
                        "MD5" => Algorithm::Md5,
                        "SHA-256" => Algorithm::Sha256,
                        other => {
                            return Err(Error::Auth(format!("unsupported digest algorithm: {other}")));
                        }
                    };
                }
                "stale" => stale = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        Ok(Self {
            realm: realm.ok_or_else(|| Error::Auth("digest challenge without realm".into()))?,
            nonce: nonce.ok_or_else(|| Error::Auth("digest challenge without nonce".into()))?,
            opaque,
            qop_auth,
            algorithm,
            stale,
        })
    }

    /// Build the `Authorization` header for one request
    #[must_use]
    pub fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        nonce_count: u32,
        cnonce: &str,
    ) -> String {
        let ha1 = self
            .algorithm
            .hash(&format!("{username}:{}:{password}", self.realm));
        let ha2 = self.algorithm.hash(&format!("{method}:{uri}"));
        let nc = format!("{nonce_count:08x}");

        let response = if self.qop_auth {
            self.algorithm
                .hash(&format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            self.algorithm.hash(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            r#"Digest username="{username}", realm="{}", nonce="{}", uri="{uri}", algorithm={}, response="{response}""#,
            self.realm,
            self.nonce,
            self.algorithm.label(),
        );
        if self.qop_auth {
            header.push_str(&format!(r#", qop=auth, nc={nc}, cnonce="{cnonce}""#));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{opaque}""#));
        }
        header
    }
}

/// Split `key=value, key="quoted, value"` pairs
fn split_params(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.trim().is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }

        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }

    pairs
}

/// Random client nonce
#[must_use]
pub fn client_nonce() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fritz_style_challenge() {
        let challenge = Challenge::parse(
            r#"Digest realm="F!Box SOAP-Auth", nonce="A1B2C3D4", algorithm=MD5, qop="auth""#,
        )
        .unwrap();

        assert_eq!(challenge.realm, "F!Box SOAP-Auth");
        assert_eq!(challenge.nonce, "A1B2C3D4");
        assert!(challenge.qop_auth);
        assert_eq!(challenge.algorithm, Algorithm::Md5);
        assert!(!challenge.stale);
    }

    #[test]
    fn parses_quoted_commas_and_stale() {
        let challenge = Challenge::parse(
            r#"Digest realm="a, b", nonce="n", qop="auth,auth-int", stale=TRUE, opaque="xyz""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "a, b");
        assert!(challenge.qop_auth);
        assert!(challenge.stale);
        assert_eq!(challenge.opaque.as_deref(), Some("xyz"));
    }

    #[test]
    fn rejects_basic_scheme() {
        assert!(matches!(
            Challenge::parse(r#"Basic realm="x""#),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn rejects_challenge_without_nonce() {
        assert!(Challenge::parse(r#"Digest realm="x""#).is_err());
    }

    #[test]
    fn rfc2617_reference_response() {
        // Worked example from RFC 2617 section 3.5
        let challenge = Challenge {
            realm: "testrealm@host.com".to_string(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".to_string(),
            opaque: Some("5ccc069c403ebaf9f0171e9517f40e41".to_string()),
            qop_auth: true,
            algorithm: Algorithm::Md5,
            stale: false,
        };

        let header = challenge.authorization(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            1,
            "0a4f113b",
        );

        assert!(header.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }

    #[test]
    fn sha256_challenge_is_accepted() {
        let challenge =
            Challenge::parse(r#"Digest realm="r", nonce="n", algorithm=SHA-256, qop="auth""#)
                .unwrap();
        assert_eq!(challenge.algorithm, Algorithm::Sha256);

        let header = challenge.authorization("u", "p", "POST", "/ctl", 2, "c");
        assert!(header.contains("algorithm=SHA-256"));
        assert!(header.contains("nc=00000002"));
    }

    #[test]
    fn client_nonce_is_hex() {
        let nonce = client_nonce();
        assert_eq!(nonce.len(), 16);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
