//! GitHub Actions repository secret publisher.
//!
//! The secrets API accepts only pre-encrypted payloads: the repository
//! exposes a libsodium public key, the caller seals the plaintext against it
//! (sealed box, so the publisher cannot decrypt its own output), and PUTs the
//! base64 ciphertext together with the key id. Single attempt per call; any
//! transport or non-2xx failure is fatal to the publish operation.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crypto_box::PublicKey;
use crypto_box::aead::OsRng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

const API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const ACCEPT: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Errors from the secret store.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The store answered with a non-2xx status.
    #[error("secret store rejected {operation}: {status} - {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The repository public key could not be decoded.
    #[error("invalid repository public key: {0}")]
    Key(String),

    /// Sealed-box encryption failed.
    #[error("encryption failed: {0}")]
    Crypto(String),
}

/// The secret-publishing capability used by the keep-alive workflow.
#[async_trait]
pub trait SecretPublisher: Send + Sync {
    /// Overwrite the named secret with `plaintext`.
    async fn publish(&self, secret_name: &str, plaintext: &str) -> Result<(), SecretStoreError>;
}

#[derive(Debug, Deserialize)]
struct RepoPublicKey {
    key_id: String,
    /// Base64-encoded 32-byte Curve25519 public key.
    key: String,
}

/// Client for one repository's Actions secrets.
pub struct GithubSecretsClient {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    api_base: String,
}

impl GithubSecretsClient {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point the client at a different API host (tests).
    #[doc(hidden)]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn secrets_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/actions/secrets/{suffix}",
            self.api_base, self.owner, self.repo
        )
    }

    async fn fetch_public_key(&self) -> Result<RepoPublicKey, SecretStoreError> {
        let response = self
            .client
            .get(self.secrets_url("public-key"))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecretStoreError::Api {
                operation: "public-key fetch",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SecretPublisher for GithubSecretsClient {
    async fn publish(&self, secret_name: &str, plaintext: &str) -> Result<(), SecretStoreError> {
        let public_key = self.fetch_public_key().await?;
        debug!(key_id = %public_key.key_id, "fetched repository public key");

        let encrypted_value = seal_to_base64(&public_key.key, plaintext.as_bytes())?;

        let response = self
            .client
            .put(self.secrets_url(secret_name))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&json!({
                "encrypted_value": encrypted_value,
                "key_id": public_key.key_id,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecretStoreError::Api {
                operation: "secret update",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        info!(secret = secret_name, repo = %format!("{}/{}", self.owner, self.repo), "secret updated");
        Ok(())
    }
}

/// Seal `plaintext` against a base64-encoded Curve25519 public key and
/// return the base64 ciphertext.
///
/// Sealed boxes are non-deterministic (an ephemeral sender key is folded into
/// the ciphertext), so two seals of the same plaintext differ on the wire
/// while decrypting to the same value.
fn seal_to_base64(public_key_b64: &str, plaintext: &[u8]) -> Result<String, SecretStoreError> {
    let key_bytes: [u8; 32] = BASE64
        .decode(public_key_b64)
        .map_err(|e| SecretStoreError::Key(e.to_string()))?
        .try_into()
        .map_err(|_| SecretStoreError::Key("public key is not 32 bytes".to_string()))?;

    let recipient = PublicKey::from(key_bytes);
    let sealed = recipient
        .seal(&mut OsRng, plaintext)
        .map_err(|e| SecretStoreError::Crypto(e.to_string()))?;

    Ok(BASE64.encode(sealed))
}
