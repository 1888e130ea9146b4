//! Registration tokens and agent command construction
//!
//! Custom clusters register their nodes out-of-band: the user runs a
//! generated `docker run` command on each machine. The command embeds the
//! server URL, a one-time registration token, a checksum of the CA bundle,
//! the role flags for the node, and any labels.

use std::fmt::Write as _;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;

#[cfg(test)]
use mockall::automock;

use crate::topology::{NodeRole, RoleFlags};
use crate::Result;

/// Compute the content-addressed checksum of a CA certificate bundle
///
/// Stable SHA-256 over the certificate bytes with a trailing newline,
/// rendered as lowercase hex. Agents recompute this to verify the bundle
/// they fetch matches what the server advertised.
pub fn ca_checksum(cacerts: &str) -> String {
    use aws_lc_rs::digest::{digest, SHA256};

    let hash = digest(&SHA256, format!("{cacerts}\n").as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// A one-time cluster registration token
#[derive(Clone)]
pub struct RegistrationToken {
    string: String,
}

impl RegistrationToken {
    /// Generate a new random registration token
    pub fn generate() -> Self {
        let mut raw = [0u8; 32];
        aws_lc_rs::rand::fill(&mut raw).expect("random generation failed");

        Self {
            string: URL_SAFE_NO_PAD.encode(raw),
        }
    }

    /// Wrap an existing token string (e.g. one issued by the server)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self { string: s.into() }
    }

    /// Get the token as a string
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the actual token in debug output
        use aws_lc_rs::digest::{digest, SHA256};

        let hash = digest(&SHA256, self.string.as_bytes());
        let prefix = hash.as_ref()[..4]
            .iter()
            .fold(String::with_capacity(8), |mut s, b| {
                let _ = write!(s, "{:02x}", b);
                s
            });
        f.debug_struct("RegistrationToken")
            .field("hash", &prefix)
            .finish()
    }
}

impl std::fmt::Display for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.string)
    }
}

/// Source of per-cluster registration tokens
///
/// Token persistence belongs to an external store; Rudder only asks for the
/// cluster's token once the save has gone through.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return the cluster's registration token, minting one if needed
    async fn get_or_create_token(&self, cluster_id: &str) -> Result<RegistrationToken>;
}

/// Thread-safe in-memory token source
///
/// Tokens are minted on first request and stable per cluster id afterwards.
#[derive(Debug, Default)]
pub struct MemoryTokenSource {
    tokens: DashMap<String, RegistrationToken>,
}

impl MemoryTokenSource {
    /// Create an empty token source
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenSource for MemoryTokenSource {
    async fn get_or_create_token(&self, cluster_id: &str) -> Result<RegistrationToken> {
        let token = self
            .tokens
            .entry(cluster_id.to_string())
            .or_insert_with(RegistrationToken::generate);
        Ok(token.clone())
    }
}

/// Builder for the agent registration command line
///
/// Pure string construction: missing inputs render as empty placeholders so
/// the wizard can show the command shape before the token exists, and the
/// build itself never fails.
#[derive(Clone, Debug, Default)]
pub struct AgentCommand {
    image: Option<String>,
    server_url: Option<String>,
    token: Option<String>,
    ca_certs: Option<String>,
    roles: RoleFlags,
    labels: Vec<(String, String)>,
}

impl AgentCommand {
    /// Start an empty command
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent container image
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the server URL agents connect back to
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the registration token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the CA certificate bundle to checksum
    pub fn ca_certs(mut self, cacerts: impl Into<String>) -> Self {
        self.ca_certs = Some(cacerts.into());
        self
    }

    /// Set the role flags appended to the command
    pub fn roles(mut self, roles: RoleFlags) -> Self {
        self.roles = roles;
        self
    }

    /// Append a `--label key=value` pair (order is preserved)
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Append several label pairs in order
    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Render the command line
    ///
    /// Role flags come out in the fixed order etcd, controlplane, worker;
    /// labels in insertion order.
    pub fn build(&self) -> String {
        let image = self.image.as_deref().unwrap_or("");
        let url = self.server_url.as_deref().unwrap_or("");
        let token = self.token.as_deref().unwrap_or("");
        let checksum = ca_checksum(self.ca_certs.as_deref().unwrap_or(""));

        let mut out = format!(
            "docker run -d --restart=unless-stopped \
             -v /var/run/docker.sock:/var/run/docker.sock --net=host \
             {image} --server {url} --token {token} --ca-checksum {checksum}"
        );

        for role in NodeRole::ORDERED {
            if self.roles.has(role) {
                out.push(' ');
                out.push_str(role.flag());
            }
        }

        for (key, value) in &self.labels {
            let _ = write!(out, " --label {key}={value}");
        }

        out
    }
}
