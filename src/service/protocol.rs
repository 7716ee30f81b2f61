//! Line protocol spoken over the cache FIFO
//!
//! ```text
//! get_pw:<service/user>            ->  pw:<secret> | none:
//! set_pw:<service/user>:<secret>   ->  (no response)
//! ```

use crate::credentials::CredentialKey;
use crate::error::{CredpipeError, CredpipeResult};
use std::fmt;

/// A client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(CredentialKey),
    Set(CredentialKey, String),
}

/// The service's answer to `Get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Password(String),
    NotFound,
}

impl Request {
    pub fn parse(line: &str) -> CredpipeResult<Self> {
        let (verb, rest) = line
            .split_once(':')
            .ok_or_else(|| CredpipeError::Protocol("message without a verb".to_string()))?;

        match verb {
            "get_pw" => Ok(Self::Get(CredentialKey::parse(rest)?)),
            "set_pw" => {
                let (key, value) = rest
                    .split_once(':')
                    .ok_or_else(|| CredpipeError::Protocol("set_pw without a value".to_string()))?;
                Ok(Self::Set(CredentialKey::parse(key)?, value.to_string()))
            }
            other => Err(CredpipeError::Protocol(format!("unknown verb {other:?}"))),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get(key) => write!(f, "get_pw:{key}"),
            Self::Set(key, value) => write!(f, "set_pw:{key}:{value}"),
        }
    }
}

impl Response {
    pub fn parse(line: &str) -> CredpipeResult<Self> {
        if let Some(value) = line.strip_prefix("pw:") {
            return Ok(Self::Password(value.to_string()));
        }
        if line.starts_with("none:") {
            return Ok(Self::NotFound);
        }
        Err(CredpipeError::Protocol(format!(
            "unexpected response {:?}",
            verb_of(line)
        )))
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Password(value) => Some(value),
            Self::NotFound => None,
        }
    }
}

impl From<Option<String>> for Response {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::NotFound, Self::Password)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(value) => write!(f, "pw:{value}"),
            Self::NotFound => write!(f, "none:"),
        }
    }
}

/// Leading word of a line, safe to log (never includes a secret)
fn verb_of(line: &str) -> &str {
    let end = line.find(':').unwrap_or(line.len()).min(16);
    line.get(..end).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CredentialKey {
        CredentialKey::new("alpha", "bob").unwrap()
    }

    #[test]
    fn parses_get() {
        assert_eq!(
            Request::parse("get_pw:alpha/bob").unwrap(),
            Request::Get(key())
        );
    }

    #[test]
    fn set_value_may_contain_colons() {
        let request = Request::parse("set_pw:alpha/bob:a:b:c").unwrap();
        assert_eq!(request, Request::Set(key(), "a:b:c".to_string()));
        assert_eq!(request.to_string(), "set_pw:alpha/bob:a:b:c");
    }

    #[test]
    fn empty_value_is_allowed() {
        let request = Request::parse("set_pw:alpha/bob:").unwrap();
        assert_eq!(request, Request::Set(key(), String::new()));
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(Request::parse("hello").is_err());
        assert!(Request::parse("del_pw:alpha/bob").is_err());
        assert!(Request::parse("set_pw:alpha/bob").is_err());
        assert!(Request::parse("get_pw:alphabob").is_err());
    }

    #[test]
    fn responses() {
        assert_eq!(
            Response::parse("pw:s3:cr3t").unwrap(),
            Response::Password("s3:cr3t".to_string())
        );
        assert_eq!(Response::parse("none:").unwrap(), Response::NotFound);
        assert!(Response::parse("get_pw:alpha/bob").is_err());
        assert_eq!(Response::from(None).to_string(), "none:");
    }

    #[test]
    fn errors_never_echo_the_secret() {
        let err = Request::parse("bogus_verb_that_is_long:hunter2").unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }
}
