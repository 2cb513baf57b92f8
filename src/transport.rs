//! Raw HTTP transport with a browser-shaped TLS handshake.
//!
//! Search engines fingerprint the TLS ClientHello, so headers alone are not
//! enough to look like a browser. The client below offers Chrome's cipher
//! suite order, key exchange groups and ALPN list instead of the rustls
//! defaults.
//!
//! This is an approximation. rustls decides the extension set and its order,
//! and sends no GREASE values, no certificate compression and no ALPS, so the
//! JA3/JA4 hash is still a rustls one rather than Chrome's.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::debug;

use crate::user_agent;
use crate::{Result, SearchError};

/// Fixed per-request timeout for raw mode.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of a fetched page.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches a URL and returns its body. The seam raw-mode engines use, so
/// tests can substitute canned pages.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, proxy: Option<&str>, insecure: bool) -> Result<RawResponse>;
}

/// Cipher suites in the order Chrome offers them.
fn chrome_cipher_suites() -> Vec<rustls::SupportedCipherSuite> {
    use ring::cipher_suite::*;
    vec![
        TLS13_AES_128_GCM_SHA256,
        TLS13_AES_256_GCM_SHA384,
        TLS13_CHACHA20_POLY1305_SHA256,
        TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ]
}

/// Crypto provider shaped like Chrome's ClientHello.
pub fn chrome_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: chrome_cipher_suites(),
        kx_groups: vec![
            ring::kx_group::X25519,
            ring::kx_group::SECP256R1,
            ring::kx_group::SECP384R1,
        ],
        ..ring::default_provider()
    }
}

/// Accepts any server certificate. Only installed when the caller asked for
/// insecure mode.
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Builds the rustls client configuration used by raw mode.
pub fn tls_config(insecure: bool) -> Result<ClientConfig> {
    let provider = chrome_provider();
    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|e| SearchError::RawRequest(format!("TLS setup failed: {}", e)))?;

    let mut config = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { algorithms }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers
}

type ClientKey = (Option<String>, bool);

/// reqwest-backed transport. One client is built per (proxy, insecure) pair
/// and reused for later requests.
pub struct RawTransport {
    clients: Mutex<HashMap<ClientKey, Client>>,
    timeout: Duration,
}

impl RawTransport {
    pub fn new() -> Self {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client(&self, proxy: Option<&str>, insecure: bool) -> Result<Client> {
        let key = (proxy.map(str::to_string), insecure);
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| SearchError::RawRequest("client cache poisoned".to_string()))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .use_preconfigured_tls(tls_config(insecure)?)
            .default_headers(browser_headers())
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        debug!(proxy = ?proxy, insecure, "Built raw transport client");
        clients.insert(key, client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for RawTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for RawTransport {
    async fn fetch(&self, url: &str, proxy: Option<&str>, insecure: bool) -> Result<RawResponse> {
        let client = self.client(proxy, insecure)?;
        let response = client
            .get(url)
            .header(USER_AGENT, user_agent::random())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url, status, bytes = body.len(), "Raw request complete");
        Ok(RawResponse { status, body })
    }
}
