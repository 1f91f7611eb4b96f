use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Proxy, Url};
use serde_json::json;
use tracing::{debug, trace, warn};

use super::{SearchRequest, Transport, TransportReply, keep_alive_param};
use crate::error::{ConnectorError, Result};
use crate::settings::{ProxySettings, Settings};

const NDJSON: &str = "application/x-ndjson";
const JSON: &str = "application/json";

/// 📡 The real thing: reqwest over a list of nodes, with failover.
///
/// Each request starts at the next node in rotation. A connect error or timeout moves on to
/// the following node, up to `es.http.retries` extra attempts. Anything that produced a
/// response (any status) is returned as-is; the caller decides what a 429 means.
///
/// 🔒 Auth is basic auth from `es.net.http.auth.user` / `.pass`, applied to every request.
/// 🧦 Proxies: an explicit HTTP or SOCKS proxy wins (setting both is refused); with none
/// configured and `use.system.props` switched off, the system proxy environment is ignored too.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    nodes: Vec<Url>,
    retries: u32,
    auth: Option<(String, Option<String>)>,
    next_node: Arc<AtomicUsize>,
}

impl HttpTransport {
    /// 🚀 Build the client and the node list from settings. No request is sent here.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let port = settings.port()?;
        let nodes = settings
            .nodes()
            .iter()
            .map(|node| node_url(node, port))
            .collect::<Result<Vec<_>>>()?;
        if nodes.is_empty() {
            return Err(ConnectorError::Transport("no nodes configured".to_string()));
        }
        if settings.nodes_discovery()? {
            // -- 🗺️ discovery is accepted and reported, never acted on. the list you give is the list we use.
            debug!("🗺️ node discovery requested; using the configured node list as-is");
        }

        let timeout = settings.http_timeout()?;
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout);

        let (http_proxy, socks_proxy) = settings.proxies()?;
        if let Some(proxy) = build_proxy(&http_proxy, "http")? {
            builder = builder.proxy(proxy);
        }
        if let Some(proxy) = build_proxy(&socks_proxy, "socks5")? {
            builder = builder.proxy(proxy);
        }
        let explicit = http_proxy.host.is_some() || socks_proxy.host.is_some();
        if !explicit && !(http_proxy.use_system_props && socks_proxy.use_system_props) {
            builder = builder.no_proxy();
        }

        let client = builder.build().map_err(|err| {
            ConnectorError::Transport(format!(
                "💀 the HTTP client refused to be born: {err}. Probably TLS. It is always TLS."
            ))
        })?;

        Ok(Self {
            client,
            nodes,
            retries: settings.http_retries()?,
            auth: settings.http_auth(),
            next_node: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// 📋 the resolved base URLs, in rotation order
    pub fn nodes(&self) -> &[Url] {
        &self.nodes
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<(&'static str, String)>,
    ) -> Result<TransportReply> {
        let start = self.next_node.fetch_add(1, Ordering::Relaxed);
        let attempts = self.retries as usize + 1;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let base = &self.nodes[(start + attempt) % self.nodes.len()];
            let mut url = base
                .join(path)
                .map_err(|err| ConnectorError::Transport(format!("bad request path '{path}': {err}")))?;
            if !query.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in query {
                    pairs.append_pair(key, value);
                }
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some((user, pass)) = &self.auth {
                request = request.basic_auth(user, pass.as_ref());
            }
            if let Some((content_type, payload)) = &body {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, *content_type)
                    .body(payload.clone());
            }

            trace!("📡 {method} {url} (attempt {}/{attempts})", attempt + 1);
            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.map_err(|err| {
                        ConnectorError::Transport(format!("reading the response body from {url} failed: {err}"))
                    })?;
                    return Ok(TransportReply::new(status, text));
                }
                Err(err) if err.is_connect() || err.is_timeout() => {
                    warn!(
                        "🔌 {method} {url} failed ({err}); {} attempt(s) left",
                        attempts - attempt - 1
                    );
                    last_error = err.to_string();
                }
                Err(err) => {
                    return Err(ConnectorError::Transport(format!("{method} {url} failed: {err}")));
                }
            }
        }

        Err(ConnectorError::Transport(format!(
            "{method} {path} failed on every node after {attempts} attempt(s); last error: {last_error}"
        )))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn bulk(&self, payload: String) -> Result<TransportReply> {
        debug!("📡 POST _bulk with {} bytes", payload.len());
        self.execute(Method::POST, "_bulk", &[], Some((NDJSON, payload))).await
    }

    async fn refresh(&self, index: &str) -> Result<TransportReply> {
        self.execute(Method::POST, &format!("{index}/_refresh"), &[], None).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let reply = self.execute(Method::HEAD, index, &[], None).await?;
        match reply.status {
            200..=299 => Ok(true),
            404 => Ok(false),
            other => Err(ConnectorError::Transport(format!(
                "checking index '{index}' returned unexpected status {other}"
            ))),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<TransportReply> {
        let path = match &request.doc_type {
            Some(doc_type) => format!("{}/{doc_type}/_search", request.index),
            None => format!("{}/_search", request.index),
        };
        let mut query = vec![("scroll", keep_alive_param(request.keep_alive))];
        if let Some(q) = &request.uri_query {
            query.push(("q", q.clone()));
        }
        self.execute(
            Method::POST,
            &path,
            &query,
            Some((JSON, request.body.to_string())),
        )
        .await
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<TransportReply> {
        let body = json!({ "scroll": keep_alive_param(keep_alive), "scroll_id": scroll_id });
        self.execute(Method::POST, "_search/scroll", &[], Some((JSON, body.to_string())))
            .await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<TransportReply> {
        let body = json!({ "scroll_id": [scroll_id] });
        self.execute(Method::DELETE, "_search/scroll", &[], Some((JSON, body.to_string())))
            .await
    }
}

/// 🔧 `host`, `host:port` or a full URL → base URL ending in `/`.
fn node_url(node: &str, default_port: u16) -> Result<Url> {
    let node = node.trim().trim_end_matches('/');
    let with_scheme = if node.contains("://") {
        node.to_string()
    } else {
        format!("http://{node}")
    };
    let mut url = Url::parse(&format!("{with_scheme}/"))
        .map_err(|err| ConnectorError::Transport(format!("node '{node}' is not a valid address: {err}")))?;
    if url.port().is_none() && !node.contains("://") {
        url.set_port(Some(default_port))
            .map_err(|_| ConnectorError::Transport(format!("node '{node}' cannot carry a port")))?;
    }
    Ok(url)
}

fn build_proxy(proxy: &ProxySettings, scheme: &str) -> Result<Option<Proxy>> {
    let Some(host) = &proxy.host else {
        return Ok(None);
    };
    let address = match proxy.port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };
    let mut built = Proxy::all(&address)
        .map_err(|err| ConnectorError::Transport(format!("proxy '{address}' is not usable: {err}")))?;
    if let Some(user) = &proxy.user {
        built = built.basic_auth(user, proxy.pass.as_deref().unwrap_or_default());
    }
    Ok(Some(built))
}
