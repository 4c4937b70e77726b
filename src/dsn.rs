//! Connection descriptor parsing.
//!
//! Descriptors use the Go MySQL driver shape `user:password@tcp(host:port)`.

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("user", &self.user)
            .field("password", &"[hidden]")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DsnError {
    #[error("expected user:password@tcp(host:port)")]
    Shape,
    #[error("invalid user:password section")]
    Credentials,
    #[error("invalid host:port section")]
    Address,
    #[error("invalid port {0:?}")]
    Port(String),
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self, DsnError> {
        let raw = raw.trim();
        let (creds, rest) = raw.split_once("@tcp(").ok_or(DsnError::Shape)?;
        // A trailing "/" (schema separator) carries no schema here.
        let addr = rest.trim_end_matches('/');
        let addr = addr.strip_suffix(')').unwrap_or(addr);
        if addr.contains('(') || addr.contains(')') {
            return Err(DsnError::Shape);
        }

        let (user, password) = creds.split_once(':').ok_or(DsnError::Credentials)?;
        if user.is_empty() {
            return Err(DsnError::Credentials);
        }

        let (host, port) = addr.rsplit_once(':').ok_or(DsnError::Address)?;
        if host.is_empty() {
            return Err(DsnError::Address);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| DsnError::Port(port.to_string()))?;

        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_descriptor() {
        let dsn = Dsn::parse("root:password@tcp(127.0.0.1:3306)").unwrap();
        assert_eq!(dsn.user, "root");
        assert_eq!(dsn.password, "password");
        assert_eq!(dsn.host, "127.0.0.1");
        assert_eq!(dsn.port, 3306);
    }

    #[test]
    fn password_may_contain_colons() {
        let dsn = Dsn::parse("app:a:b@tcp(db.internal:3307)/").unwrap();
        assert_eq!(dsn.password, "a:b");
        assert_eq!(dsn.host, "db.internal");
        assert_eq!(dsn.port, 3307);
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert_eq!(Dsn::parse("bad-host"), Err(DsnError::Shape));
        assert_eq!(Dsn::parse("root@tcp(h:1)"), Err(DsnError::Credentials));
        assert_eq!(Dsn::parse("root:pw@tcp(h)"), Err(DsnError::Address));
        assert_eq!(
            Dsn::parse("root:pw@tcp(h:port)"),
            Err(DsnError::Port("port".into()))
        );
    }

    #[test]
    fn debug_hides_password() {
        let dsn = Dsn::parse("root:secret@tcp(h:1)").unwrap();
        assert!(!format!("{dsn:?}").contains("secret"));
    }
}
