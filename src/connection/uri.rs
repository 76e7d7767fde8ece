//! Connection strings for the external tools.
//!
//! `mongodump`/`mongorestore` refuse a URI whose path names a database when
//! `--db` is also given, and they do not negotiate a SASL mechanism the way
//! the driver does. This module rewrites a stored connection string so the
//! tools accept it:
//!
//! - [`strip_database_segment`] drops the `/database` path segment and, when
//!   no `authSource` is present, re-adds it as `authSource` so the credential
//!   is still looked up in the same database.
//! - [`negotiate_auth_mechanism`] asks the server which SCRAM mechanisms the
//!   user supports and pins the strongest one. A configured
//!   `authMechanism` is never replaced.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ConnectionError, Result};
use crate::utils::mask::mask_credentials;

pub const AUTH_SOURCE: &str = "authSource";
pub const AUTH_MECHANISM: &str = "authMechanism";

/// SCRAM mechanisms in order of preference.
const PREFERRED_MECHANISMS: &[&str] = &["SCRAM-SHA-256", "SCRAM-SHA-1"];

/// Asks a server which SASL mechanisms a user can authenticate with.
///
/// Implemented over the driver by [`super::DriverMechanismProbe`]; tests use
/// an in-memory fake.
#[async_trait]
pub trait MechanismProbe: Send + Sync {
    /// Mechanisms listed by `hello { saslSupportedMechs: "<source>.<user>" }`.
    async fn supported_mechanisms(
        &self,
        uri: &str,
        auth_source: &str,
        username: &str,
    ) -> Result<Vec<String>>;
}

/// A `mongodb://` / `mongodb+srv://` connection string split into parts.
///
/// Option order is preserved so rewriting a URI only touches what it has to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    scheme: String,
    credentials: Option<String>,
    hosts: String,
    database: Option<String>,
    options: Vec<(String, String)>,
}

impl ConnectionUri {
    /// Parse a connection string
    ///
    /// # Arguments
    /// * `uri` - Connection string in the form
    ///   `scheme://[user[:password]@]hosts[/database][?options]`
    ///
    /// # Returns
    /// * `Result<ConnectionUri>` - Parsed URI or an invalid-URI error (masked)
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || ConnectionError::InvalidUri(mask_credentials(uri));

        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        if scheme.is_empty() {
            return Err(invalid().into());
        }

        let (before_query, query) = match rest.split_once('?') {
            Some((before, query)) => (before, Some(query)),
            None => (rest, None),
        };

        let (credentials, location) = match before_query.rfind('@') {
            Some(at) => (
                Some(before_query[..at].to_string()),
                &before_query[at + 1..],
            ),
            None => (None, before_query),
        };

        let (hosts, database) = match location.split_once('/') {
            Some((hosts, db)) => (hosts, (!db.is_empty()).then(|| db.to_string())),
            None => (location, None),
        };
        if hosts.is_empty() {
            return Err(invalid().into());
        }

        let options = query
            .map(|q| {
                q.split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            scheme: scheme.to_string(),
            credentials,
            hosts: hosts.to_string(),
            database,
            options,
        })
    }

    /// Database named by the path segment, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Percent-decoded user name.
    pub fn username(&self) -> Option<String> {
        let credentials = self.credentials.as_deref()?;
        let user = credentials.split(':').next().unwrap_or(credentials);
        (!user.is_empty()).then(|| decode_component(user))
    }

    /// Value of a query option. Option names are case-insensitive.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a query option, replacing an existing value.
    pub fn set_option(&mut self, name: &str, value: &str) {
        match self
            .options
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.options.push((name.to_string(), value.to_string())),
        }
    }

    /// Database the credential is defined in.
    ///
    /// Explicit `authSource`, then the path database, then `admin`.
    pub fn auth_source(&self) -> String {
        self.option(AUTH_SOURCE)
            .map(decode_component)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| "admin".to_string())
    }

    /// Remove the path database segment.
    ///
    /// The removed name becomes `authSource` unless one is already set.
    ///
    /// # Returns
    /// * `Option<String>` - The removed database name
    pub fn strip_database(&mut self) -> Option<String> {
        let database = self.database.take()?;
        if self.option(AUTH_SOURCE).is_none() {
            self.options
                .push((AUTH_SOURCE.to_string(), database.clone()));
        }
        Some(database)
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(credentials) = &self.credentials {
            write!(f, "{credentials}@")?;
        }
        write!(f, "{}", self.hosts)?;

        if self.database.is_some() || !self.options.is_empty() {
            write!(f, "/{}", self.database.as_deref().unwrap_or(""))?;
        }
        if !self.options.is_empty() {
            let query = self
                .options
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Remove a path-style database segment from a connection string.
///
/// Idempotent: the output contains no database segment, so stripping it again
/// changes nothing.
pub fn strip_database_segment(uri: &str) -> Result<String> {
    let mut parsed = ConnectionUri::parse(uri)?;
    parsed.strip_database();
    Ok(parsed.to_string())
}

/// Pick the strongest supported SCRAM mechanism.
pub fn preferred_mechanism<S: AsRef<str>>(supported: &[S]) -> Option<&'static str> {
    PREFERRED_MECHANISMS.iter().copied().find(|wanted| {
        supported
            .iter()
            .any(|m| m.as_ref().eq_ignore_ascii_case(wanted))
    })
}

/// Pin an explicit `authMechanism` when the URI has credentials but none set.
///
/// Probe failures are not fatal: the URI is returned unmodified.
pub async fn negotiate_auth_mechanism(uri: &str, probe: &dyn MechanismProbe) -> Result<String> {
    let mut parsed = ConnectionUri::parse(uri)?;

    if parsed.option(AUTH_MECHANISM).is_some() {
        return Ok(uri.to_string());
    }
    let Some(username) = parsed.username() else {
        return Ok(uri.to_string());
    };

    let auth_source = parsed.auth_source();
    match probe
        .supported_mechanisms(uri, &auth_source, &username)
        .await
    {
        Ok(mechanisms) => match preferred_mechanism(&mechanisms) {
            Some(mechanism) => {
                debug!("Negotiated auth mechanism {} for {}", mechanism, username);
                parsed.set_option(AUTH_MECHANISM, mechanism);
                Ok(parsed.to_string())
            }
            None => {
                debug!("Server listed no SCRAM mechanism: {:?}", mechanisms);
                Ok(uri.to_string())
            }
        },
        Err(e) => {
            warn!(
                "Could not query supported auth mechanisms, using URI as-is: {}",
                e.masked_message()
            );
            Ok(uri.to_string())
        }
    }
}

/// Connection string for one tool invocation.
///
/// The database segment is removed when the job targets a database, since the
/// tool receives the database through `--db`.
pub fn tool_uri_for(uri: &str, target_database: Option<&str>) -> Result<String> {
    match target_database {
        Some(_) => strip_database_segment(uri),
        None => Ok(uri.to_string()),
    }
}

/// Percent-decode a URI component, keeping the raw text if it is not UTF-8.
fn decode_component(input: &str) -> String {
    urlencoding::decode(input)
        .unwrap_or_else(|_| input.into())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;
    use std::sync::Mutex;

    struct FakeProbe {
        answer: std::result::Result<Vec<String>, String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeProbe {
        fn with(mechanisms: &[&str]) -> Self {
            Self {
                answer: Ok(mechanisms.iter().map(|m| m.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err("server selection timeout".to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MechanismProbe for FakeProbe {
        async fn supported_mechanisms(
            &self,
            _uri: &str,
            auth_source: &str,
            username: &str,
        ) -> Result<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .push((auth_source.to_string(), username.to_string()));
            self.answer.clone().map_err(TransferError::Generic)
        }
    }

    #[test]
    fn test_username_is_percent_decoded() {
        let uri = ConnectionUri::parse("mongodb://caf%C3%A9:pw@h1").unwrap();
        assert_eq!(uri.username().as_deref(), Some("café"));
        // not UTF-8 once decoded, so the raw text is kept
        let uri = ConnectionUri::parse("mongodb://bad%FFname:pw@h1").unwrap();
        assert_eq!(uri.username().as_deref(), Some("bad%FFname"));
    }

    #[test]
    fn test_parse_components() {
        let uri = ConnectionUri::parse("mongodb://u%40x:pw@h1:1,h2:2/app?replicaSet=rs0").unwrap();
        assert_eq!(uri.database(), Some("app"));
        assert_eq!(uri.username().as_deref(), Some("u@x"));
        assert_eq!(uri.option("replicaset"), Some("rs0"));
        assert_eq!(uri.auth_source(), "app");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ConnectionUri::parse("localhost:27017").is_err());
        assert!(ConnectionUri::parse("mongodb:///app").is_err());
    }

    #[test]
    fn test_strip_moves_database_to_auth_source() {
        let stripped = strip_database_segment("mongodb://u:p@host:27017/app?tls=true").unwrap();
        assert_eq!(stripped, "mongodb://u:p@host:27017/?tls=true&authSource=app");
    }

    #[test]
    fn test_strip_keeps_existing_auth_source() {
        let stripped =
            strip_database_segment("mongodb://u:p@host/app?authSource=admin").unwrap();
        assert_eq!(stripped, "mongodb://u:p@host/?authSource=admin");
    }

    #[test]
    fn test_strip_without_database_is_noop() {
        assert_eq!(
            strip_database_segment("mongodb://host:27017").unwrap(),
            "mongodb://host:27017"
        );
        assert_eq!(
            strip_database_segment("mongodb://host/?w=1").unwrap(),
            "mongodb://host/?w=1"
        );
    }

    #[test]
    fn test_strip_is_idempotent() {
        for uri in [
            "mongodb://u:p@host:27017/app",
            "mongodb://u:p@host:27017/app?retryWrites=true",
            "mongodb+srv://u:p@cluster0.example.net/app?authSource=admin",
            "mongodb://host",
        ] {
            let once = strip_database_segment(uri).unwrap();
            let twice = strip_database_segment(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {uri}");
        }
    }

    #[test]
    fn test_tool_uri_only_strips_when_scoped() {
        let uri = "mongodb://host/app";
        assert_eq!(tool_uri_for(uri, None).unwrap(), uri);
        assert_eq!(
            tool_uri_for(uri, Some("app")).unwrap(),
            "mongodb://host/?authSource=app"
        );
    }

    #[test]
    fn test_preferred_mechanism() {
        assert_eq!(
            preferred_mechanism(&["SCRAM-SHA-1", "SCRAM-SHA-256"]),
            Some("SCRAM-SHA-256")
        );
        assert_eq!(preferred_mechanism(&["SCRAM-SHA-1"]), Some("SCRAM-SHA-1"));
        assert_eq!(preferred_mechanism(&["PLAIN"]), None);
    }

    #[tokio::test]
    async fn test_negotiate_appends_strongest_mechanism() {
        let probe = FakeProbe::with(&["SCRAM-SHA-1", "SCRAM-SHA-256"]);
        let uri = negotiate_auth_mechanism("mongodb://alice:pw@host/app", &probe)
            .await
            .unwrap();
        assert_eq!(uri, "mongodb://alice:pw@host/app?authMechanism=SCRAM-SHA-256");
        assert_eq!(
            probe.calls.lock().unwrap().as_slice(),
            &[("app".to_string(), "alice".to_string())]
        );
    }

    #[tokio::test]
    async fn test_negotiate_never_overrides_explicit_mechanism() {
        let probe = FakeProbe::with(&["SCRAM-SHA-256"]);
        let uri = "mongodb://alice:pw@host/?authMechanism=SCRAM-SHA-1";
        assert_eq!(negotiate_auth_mechanism(uri, &probe).await.unwrap(), uri);
        assert!(probe.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negotiate_skips_anonymous_uri() {
        let probe = FakeProbe::with(&["SCRAM-SHA-256"]);
        let uri = "mongodb://host:27017";
        assert_eq!(negotiate_auth_mechanism(uri, &probe).await.unwrap(), uri);
        assert!(probe.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negotiate_failure_is_not_fatal() {
        let probe = FakeProbe::failing();
        let uri = "mongodb://alice:pw@host/app";
        assert_eq!(negotiate_auth_mechanism(uri, &probe).await.unwrap(), uri);
    }

    #[tokio::test]
    async fn test_negotiated_uri_scoped_for_database() {
        let probe = FakeProbe::with(&["SCRAM-SHA-256"]);
        let negotiated = negotiate_auth_mechanism("mongodb://alice:pw@host/app", &probe)
            .await
            .unwrap();
        let uri = tool_uri_for(&negotiated, Some("app")).unwrap();
        assert_eq!(
            uri,
            "mongodb://alice:pw@host/?authMechanism=SCRAM-SHA-256&authSource=app"
        );
    }
}
