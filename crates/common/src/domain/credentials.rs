use crate::domain::{DomainError, DomainResult};
use serde::Deserialize;
use std::fmt;

/// Destination store credentials resolved from a secret.
///
/// Held by the ingestion handler for a single invocation and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// `host` or `host:port`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Destination table, optionally schema-qualified
    pub table: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

/// Secret document layout as provisioned alongside the destination store
#[derive(Debug, Deserialize)]
struct SecretDocument {
    #[serde(rename = "ENDPOINT")]
    endpoint: Option<String>,
    #[serde(rename = "DB_USERNAME")]
    username: Option<String>,
    #[serde(rename = "PASSWORD")]
    password: Option<String>,
    #[serde(rename = "DATABASE_NAME")]
    database: Option<String>,
    #[serde(rename = "DESTINATION_TABLE")]
    table: Option<String>,
}

impl Credentials {
    /// Parse and validate a JSON secret document
    pub fn from_secret_json(identifier: &str, raw: &[u8]) -> DomainResult<Self> {
        let document: SecretDocument = serde_json::from_slice(raw).map_err(|e| {
            DomainError::InvalidCredentials(format!(
                "secret {} is not a valid credentials document: {}",
                identifier, e
            ))
        })?;

        let field = |value: Option<String>, name: &str| -> DomainResult<String> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(DomainError::InvalidCredentials(format!(
                    "secret {} is missing {}",
                    identifier, name
                ))),
            }
        };

        Ok(Self {
            endpoint: field(document.endpoint, "ENDPOINT")?,
            username: field(document.username, "DB_USERNAME")?,
            password: field(document.password, "PASSWORD")?,
            database: field(document.database, "DATABASE_NAME")?,
            table: field(document.table, "DESTINATION_TABLE")?,
        })
    }

    /// Split the endpoint into host and port
    pub fn host_and_port(&self, default_port: u16) -> DomainResult<(String, u16)> {
        let endpoint = self.endpoint.trim();

        // Bracketed IPv6 literal, with or without a port
        if let Some(rest) = endpoint.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                DomainError::InvalidCredentials(format!("malformed endpoint: {}", endpoint))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(endpoint, port)?,
                None if tail.is_empty() => default_port,
                None => {
                    return Err(DomainError::InvalidCredentials(format!(
                        "malformed endpoint: {}",
                        endpoint
                    )))
                }
            };
            return Ok((host.to_string(), port));
        }

        match endpoint.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                Ok((host.to_string(), parse_port(endpoint, port)?))
            }
            _ => Ok((endpoint.to_string(), default_port)),
        }
    }
}

fn parse_port(endpoint: &str, port: &str) -> DomainResult<u16> {
    port.parse::<u16>().map_err(|_| {
        DomainError::InvalidCredentials(format!("invalid port in endpoint: {}", endpoint))
    })
}
