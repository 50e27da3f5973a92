//! Credentials and endpoint handling for store sessions.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::schema::StoreSettings;
use crate::store::StoreError;

const DEFAULT_PORT: u16 = 2379;

/// Everything needed to open a session. Read-only once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_cert_path: Option<PathBuf>,
    pub root_key: Option<String>,
}

impl ClientCredentials {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: None,
            password: None,
            ca_cert_path: None,
            root_key: None,
        }
    }

    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_root_key(mut self, root_key: impl Into<String>) -> Self {
        self.root_key = Some(root_key.into());
        self
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            username: non_empty(&settings.username),
            password: non_empty(&settings.password),
            ca_cert_path: settings.ca_cert_path.clone(),
            root_key: non_empty(&settings.root_key),
        }
    }

    /// Whether the session must authenticate before use.
    pub fn has_user(&self) -> bool {
        self.username.is_some()
    }

    /// Parsed endpoint URL.
    pub fn endpoint_url(&self) -> Result<Url, StoreError> {
        parse_endpoint(&self.endpoint)
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ca_cert_path", &self.ca_cert_path)
            .field("root_key", &self.root_key)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Parse `host`, `host:port` or a full URL. Missing scheme is `http`,
/// missing port is 2379.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, StoreError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(StoreError::Connection("no endpoint configured".into()));
    }
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| StoreError::Connection(format!("invalid endpoint {:?}: {}", endpoint, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(StoreError::Connection(format!(
                "unsupported endpoint scheme {:?}",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(StoreError::Connection(format!(
            "endpoint {:?} has no host",
            endpoint
        )));
    }
    if url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|_| StoreError::Connection(format!("cannot set port on {:?}", endpoint)))?;
    }
    Ok(url)
}

/// Load every certificate in a PEM bundle as DER.
pub fn load_ca_bundle(path: &Path) -> Result<Vec<Vec<u8>>, StoreError> {
    let file = File::open(path).map_err(|e| {
        StoreError::Connection(format!("cannot open CA bundle {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|c| c.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            StoreError::Connection(format!("invalid CA bundle {}: {}", path.display(), e))
        })?;

    if certs.is_empty() {
        return Err(StoreError::Connection(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}
