//! Kubernetes-compatible node API client.
//!
//! Speaks HTTP/1.1 to an API endpoint that exposes the core `v1` node
//! resources. `https` endpoints are reached over rustls, verified against
//! either the cluster CA (in-cluster or `with_ca_file`) or the Mozilla root
//! store. Plain `http` is accepted for API proxies such as `kubectl proxy`.
//! An optional bearer token is forwarded on every request.
//!
//! Endpoints used:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `/api/v1/nodes` | list nodes with labels and conditions |
//! | GET | `/api/v1/nodes/{name}` | latest conditions of one node |

use std::collections::HashMap;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::NodeRegistry;
use crate::types::{NodeCondition, NodeSnapshot};

/// Service-account mount inside a pod: `token`, `ca.crt`.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<Node>,
}

#[derive(Deserialize)]
struct Node {
    metadata: ObjectMeta,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct NodeStatus {
    #[serde(default)]
    conditions: Vec<NodeCondition>,
}

impl From<Node> for NodeSnapshot {
    fn from(node: Node) -> Self {
        NodeSnapshot {
            name: node.metadata.name,
            labels: node.metadata.labels,
            conditions: node.status.conditions,
        }
    }
}

#[derive(Clone)]
struct Tls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

/// HTTP(S) registry client for a Kubernetes-style node API.
#[derive(Clone)]
pub struct KubeApiRegistry {
    /// `host:port` to connect to.
    authority: String,
    /// Path prefix from the base URL, without trailing slash.
    prefix: String,
    token: Option<String>,
    timeout: Duration,
    tls: Option<Tls>,
}

impl std::fmt::Debug for KubeApiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApiRegistry")
            .field("authority", &self.authority)
            .field("prefix", &self.prefix)
            .field("tls", &self.tls.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KubeApiRegistry {
    /// Create a client for `base_url`, e.g. `https://10.96.0.1:443` or
    /// `http://127.0.0.1:8001`.
    ///
    /// `https` servers are verified against the Mozilla root store until
    /// [`with_ca_file`](Self::with_ca_file) supplies the cluster CA.
    pub fn new(base_url: &str) -> RegistryResult<Self> {
        let uri: Uri = base_url
            .parse()
            .map_err(|e| RegistryError::Config(format!("invalid registry url {base_url:?}: {e}")))?;

        let secure = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(other) => {
                return Err(RegistryError::Config(format!(
                    "unsupported registry url scheme {other:?}"
                )));
            }
            None => {
                return Err(RegistryError::Config(format!(
                    "registry url {base_url:?} has no scheme"
                )));
            }
        };

        let authority = uri
            .authority()
            .ok_or_else(|| RegistryError::Config(format!("registry url {base_url:?} has no host")))?;
        let port = authority
            .port_u16()
            .unwrap_or(if secure { 443 } else { 80 });
        let host = authority.host();

        let tls = if secure {
            Some(Tls::new(host, client_config(webpki_root_store())?)?)
        } else {
            None
        };

        Ok(Self {
            authority: format!("{host}:{port}"),
            prefix: uri.path().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(5),
            tls,
        })
    }

    /// Whether the process runs inside a pod with the API service injected.
    pub fn in_cluster_available() -> bool {
        std::env::var_os(SERVICE_HOST_ENV).is_some()
    }

    /// Connect to the API server from inside a pod, using the injected
    /// service address and the mounted service-account token and CA.
    pub fn in_cluster() -> RegistryResult<Self> {
        let host = std::env::var(SERVICE_HOST_ENV)
            .map_err(|_| RegistryError::Config(format!("{SERVICE_HOST_ENV} is not set")))?;
        let port = std::env::var(SERVICE_PORT_ENV).unwrap_or_else(|_| "443".to_string());
        Self::from_service_account(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// In-cluster connection with explicit service address and
    /// service-account directory.
    pub fn from_service_account(host: &str, port: &str, account_dir: &Path) -> RegistryResult<Self> {
        // IPv6 service hosts need brackets in the authority.
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let client = Self::new(&format!("https://{host}:{port}"))?
            .with_ca_file(&account_dir.join("ca.crt"))?
            .with_token_file(&account_dir.join("token"))?;
        debug!(authority = %client.authority, "in-cluster registry configured");
        Ok(client)
    }

    /// Verify the server against the PEM certificates in `path` instead of
    /// the default roots. Only valid for `https` URLs.
    pub fn with_ca_file(self, path: &Path) -> RegistryResult<Self> {
        let roots = load_ca_file(path)?;
        self.with_client_config(client_config(roots)?)
    }

    /// Use a prebuilt rustls client configuration. Only valid for `https` URLs.
    pub fn with_client_config(mut self, config: Arc<ClientConfig>) -> RegistryResult<Self> {
        let Some(tls) = self.tls.as_mut() else {
            return Err(RegistryError::Config(format!(
                "{} is not an https registry",
                self.authority
            )));
        };
        tls.connector = TlsConnector::from(config);
        Ok(self)
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Read the bearer token from a file (e.g. a mounted service-account token).
    pub fn with_token_file(self, path: &Path) -> RegistryResult<Self> {
        let token = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("read token {}: {e}", path.display())))?;
        Ok(self.with_token(token.trim()))
    }

    /// Per-request timeout (connect + response).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RegistryResult<T> {
        let (status, body) = tokio::time::timeout(self.timeout, self.get(path))
            .await
            .map_err(|_| RegistryError::Timeout(self.timeout))??;

        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| RegistryError::Decode(format!("{path}: {e}")))
    }

    async fn get(&self, path: &str) -> RegistryResult<(StatusCode, Bytes)> {
        let stream = tokio::net::TcpStream::connect(self.authority.as_str())
            .await
            .map_err(|e| RegistryError::Connect(format!("{}: {e}", self.authority)))?;

        match &self.tls {
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(|e| RegistryError::Connect(format!("tls handshake: {e}")))?;
                self.send(stream, path).await
            }
            None => self.send(stream, path).await,
        }
    }

    async fn send<S>(&self, stream: S, path: &str) -> RegistryResult<(StatusCode, Bytes)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| RegistryError::Connect(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "registry connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(HOST, self.authority.as_str())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "dispatch-registry/0.1");
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = builder
            .body(Empty::<Bytes>::new())
            .map_err(|e| RegistryError::Config(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| RegistryError::Connect(format!("request {path}: {e}")))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| RegistryError::Connect(format!("read body {path}: {e}")))?
            .to_bytes();

        debug!(%path, %status, bytes = body.len(), "registry response");
        Ok((status, body))
    }
}

impl Tls {
    fn new(host: &str, config: Arc<ClientConfig>) -> RegistryResult<Self> {
        let name = host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(name.to_string())
            .map_err(|e| RegistryError::Config(format!("invalid tls server name {name:?}: {e}")))?;
        Ok(Self {
            connector: TlsConnector::from(config),
            server_name,
        })
    }
}

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

fn load_ca_file(path: &Path) -> RegistryResult<RootCertStore> {
    let file = std::fs::File::open(path)
        .map_err(|e| RegistryError::Config(format!("read ca {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert
            .map_err(|e| RegistryError::Config(format!("parse ca {}: {e}", path.display())))?;
        roots
            .add(cert)
            .map_err(|e| RegistryError::Config(format!("load ca {}: {e}", path.display())))?;
    }
    if roots.is_empty() {
        return Err(RegistryError::Config(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(roots)
}

fn client_config(roots: RootCertStore) -> RegistryResult<Arc<ClientConfig>> {
    let config = ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .map_err(|e| RegistryError::Config(format!("tls protocol versions: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

impl NodeRegistry for KubeApiRegistry {
    async fn list_nodes(&self) -> RegistryResult<Vec<NodeSnapshot>> {
        let path = format!("{}/api/v1/nodes", self.prefix);
        let list: NodeList = self.get_json(&path).await?;
        Ok(list.items.into_iter().map(NodeSnapshot::from).collect())
    }

    async fn node_conditions(&self, name: &str) -> RegistryResult<Vec<NodeCondition>> {
        if !is_valid_node_name(name) {
            return Err(RegistryError::InvalidNodeName(name.to_string()));
        }
        let path = format!("{}/api/v1/nodes/{name}", self.prefix);
        match self.get_json::<Node>(&path).await {
            Ok(node) => Ok(node.status.conditions),
            Err(RegistryError::Status { status: 404, .. }) => {
                Err(RegistryError::NodeNotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Node names are DNS subdomains; anything else must not reach a URL path.
fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_')
}
