//! HTTP/1.1 connection and accept loop (C6): keep-alive, response encoding,
//! path dispatch, and the RFC 6455 Upgrade handoff.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use bytes::BytesMut;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use ring::digest::{SHA1_FOR_LEGACY_USE_ONLY, digest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Decoder;
use tracing::{info, warn};

use super::parser::HttpCodec;
use super::types::{CiMultiMap, HttpRequest, HttpResponse, Method, reason_phrase};
use crate::config::GatewayConfig;
use crate::net::ServerTransport;
use crate::ws::{MethodTable, WsConnection};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const READ_BUF: usize = 64 * 1024;

pub type RouteHandler = Arc<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

#[derive(Clone)]
pub struct HttpServerConfig {
    pub keep_alive_timeout: Duration,
    pub keep_alive_max: u32,
    pub websocket_close_timeout: Duration,
}

impl HttpServerConfig {
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        Self {
            keep_alive_timeout: Duration::from_secs(config.http_keep_alive_timeout_sec),
            keep_alive_max: config.http_keep_alive_max_count,
            websocket_close_timeout: Duration::from_secs(config.websocket_close_timeout_sec),
        }
    }
}

pub struct HttpServer {
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    routes: Arc<HashMap<&'static str, RouteHandler>>,
    config: HttpServerConfig,
    methods: MethodTable,
}

impl HttpServer {
    pub async fn bind(
        port: u16,
        gateway_config: &GatewayConfig,
        routes: HashMap<&'static str, RouteHandler>,
        methods: MethodTable,
    ) -> std::io::Result<Self> {
        let v6_addr = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port);
        let listener = match TcpListener::bind(v6_addr).await {
            Ok(l) => l,
            Err(err) => {
                warn!(error = %err, "ipv6 bind failed, falling back to ipv4");
                TcpListener::bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port)).await?
            }
        };
        let tls_acceptor = build_tls_acceptor(gateway_config)?;

        Ok(Self {
            listener,
            tls_acceptor,
            routes: Arc::new(routes),
            config: HttpServerConfig::from_gateway(gateway_config),
            methods,
        })
    }

    pub async fn serve(self) {
        info!(addr = %self.listener.local_addr().ok().map(|a| a.to_string()).unwrap_or_default(), "http server listening");
        loop {
            let (tcp, _peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let tls_acceptor = self.tls_acceptor.clone();
            let routes = self.routes.clone();
            let config = self.config.clone();
            let methods = self.methods.clone();

            tokio::spawn(async move {
                let transport = match tls_acceptor {
                    Some(acceptor) => match acceptor.accept(tcp).await {
                        Ok(stream) => ServerTransport::Tls(Box::new(stream)),
                        Err(err) => {
                            warn!(error = %err, "tls handshake failed");
                            return;
                        }
                    },
                    None => ServerTransport::Plain(tcp),
                };
                handle_connection(transport, routes, config, methods).await;
            });
        }
    }
}

async fn handle_connection(
    mut transport: ServerTransport,
    routes: Arc<HashMap<&'static str, RouteHandler>>,
    config: HttpServerConfig,
    methods: MethodTable,
) {
    let mut buf = BytesMut::with_capacity(READ_BUF);
    let mut codec = HttpCodec;
    let mut remaining = config.keep_alive_max;
    let mut chunk = vec![0u8; READ_BUF];

    loop {
        let request = match read_request(&mut transport, &mut codec, &mut buf, &mut chunk, config.keep_alive_timeout).await {
            ReadOutcome::Request(req) => req,
            ReadOutcome::Eof => return,
            ReadOutcome::ParseError => {
                let response = finalize_response(simple_response(400, "Bad Request"), None, false, &config);
                let _ = write_response(&mut transport, response, true).await;
                return;
            }
            ReadOutcome::IoError => return,
        };

        let keep_alive = next_keep_alive(request.keep_alive, &mut remaining);

        if request.upgrade && request.headers.has_token("Upgrade", "websocket") {
            match build_upgrade_response(&request) {
                Ok(response) => {
                    let _ = write_response(&mut transport, response, true).await;
                    WsConnection::spawn(transport, std::mem::take(&mut buf), config.websocket_close_timeout, methods);
                    return;
                }
                Err(response) => {
                    let response = finalize_response(response, Some(&request), false, &config);
                    let _ = write_response(&mut transport, response, request.http11).await;
                    return;
                }
            }
        }

        let response = dispatch(&routes, &request);
        let response = finalize_response(response, Some(&request), keep_alive, &config);
        if write_response(&mut transport, response, request.http11).await.is_err() {
            return;
        }
        if !keep_alive {
            return;
        }
    }
}

/// Decrements the per-connection keep-alive counter and decides whether
/// another request may follow. Pulled out of `handle_connection`'s loop so
/// the counter-exhaustion behavior is directly testable.
fn next_keep_alive(request_keep_alive: bool, remaining: &mut u32) -> bool {
    *remaining = remaining.saturating_sub(1);
    request_keep_alive && *remaining > 0
}

enum ReadOutcome {
    Request(HttpRequest),
    Eof,
    ParseError,
    IoError,
}

async fn read_request(
    transport: &mut ServerTransport,
    codec: &mut HttpCodec,
    buf: &mut BytesMut,
    chunk: &mut [u8],
    idle_timeout: Duration,
) -> ReadOutcome {
    loop {
        match codec.decode(buf) {
            Ok(Some(request)) => return ReadOutcome::Request(request),
            Ok(None) => {}
            Err(_) => return ReadOutcome::ParseError,
        }
        match tokio::time::timeout(idle_timeout, transport.read(chunk)).await {
            Ok(Ok(0)) => return ReadOutcome::Eof,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(_)) => return ReadOutcome::IoError,
            Err(_elapsed) => return ReadOutcome::Eof,
        }
    }
}

fn dispatch(routes: &HashMap<&'static str, RouteHandler>, request: &HttpRequest) -> HttpResponse {
    match routes.get(request.target.as_str()) {
        Some(handler) => handler(request),
        None => simple_response(404, "Not found"),
    }
}

fn simple_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse::with_body(status, body.as_bytes().to_vec())
}

fn build_upgrade_response(request: &HttpRequest) -> Result<HttpResponse, HttpResponse> {
    if !request.http11 {
        return Err(simple_response(400, "Bad Request"));
    }
    let version_ok = request
        .headers
        .get("Sec-WebSocket-Version")
        .map(|v| v.split(',').any(|t| t.trim() == "13"))
        .unwrap_or(false);
    if !version_ok {
        return Err(simple_response(400, "Bad Request"));
    }
    let Some(client_key) = request.headers.get("Sec-WebSocket-Key") else {
        return Err(simple_response(400, "Bad Request"));
    };

    let mut response = HttpResponse::new(101);
    response.headers.insert("Upgrade", "websocket");
    response.headers.insert("Connection", "Upgrade");
    response.headers.insert("Sec-WebSocket-Accept", compute_accept_key(client_key));
    response.headers.insert("Sec-WebSocket-Version", "13");
    Ok(response)
}

fn compute_accept_key(client_key: &str) -> String {
    let mut input = client_key.to_string();
    input.push_str(WEBSOCKET_GUID);
    let hash = digest(&SHA1_FOR_LEGACY_USE_ONLY, input.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hash.as_ref())
}

fn finalize_response(
    mut response: HttpResponse,
    request: Option<&HttpRequest>,
    keep_alive: bool,
    config: &HttpServerConfig,
) -> HttpResponse {
    response.headers.insert("Server", "sudagureum");
    response.headers.insert("Date", httpdate_now());

    let wants_deflate = request.map(|r| r.headers.has_token("Accept-Encoding", "deflate")).unwrap_or(false);
    if wants_deflate && !response.body.is_empty() {
        if let Ok(compressed) = deflate(&response.body) {
            if compressed.len() < response.body.len() {
                response.body = compressed;
                response.headers.insert("Content-Encoding", "deflate");
            }
        }
    }

    response.headers.insert("Content-Length", response.body.len().to_string());
    if keep_alive {
        response.headers.insert("Connection", "keep-alive");
        response.headers.insert(
            "Keep-Alive",
            format!("timeout={}, max={}", config.keep_alive_timeout.as_secs(), config.keep_alive_max),
        );
    } else {
        response.headers.insert("Connection", "close");
    }
    response
}

fn deflate(body: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::io::Write;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(body)?;
    encoder.finish()
}

fn httpdate_now() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn write_response(transport: &mut ServerTransport, response: HttpResponse, http11: bool) -> std::io::Result<()> {
    let version = if http11 { "HTTP/1.1" } else { "HTTP/1.0" };
    let mut out = Vec::with_capacity(response.body.len() + 256);
    out.extend_from_slice(format!("{version} {} {}\r\n", response.status, reason_phrase(response.status)).as_bytes());
    for (name, value) in response.headers.iter() {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&response.body);
    transport.write_all(&out).await?;
    transport.flush().await
}

fn build_tls_acceptor(config: &GatewayConfig) -> std::io::Result<Option<TlsAcceptor>> {
    let Some(key_path) = &config.ssl_private_key_file else {
        return Ok(None);
    };
    let cert_path = config
        .ssl_certificate_chain_file
        .as_ref()
        .or(config.ssl_certificate_file.as_ref())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "ssl cert file required alongside a private key"))?;

    let cert_bytes = std::fs::read(cert_path)?;
    let certs = rustls_pemfile::certs(&mut cert_bytes.as_slice()).collect::<Result<Vec<_>, _>>()?;

    let key_bytes = std::fs::read(key_path)?;
    let key = rustls_pemfile::private_key(&mut key_bytes.as_slice())?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no private key in ssl_private_key_file"))?;

    let tls_config = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;

    Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_test_vector() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn not_found_route_yields_404() {
        let routes: HashMap<&'static str, RouteHandler> = HashMap::new();
        let request = HttpRequest {
            method: Method::Get,
            http11: true,
            upgrade: false,
            keep_alive: true,
            raw_target: "/missing".to_string(),
            target: "/missing".to_string(),
            queries: CiMultiMap::default(),
            headers: CiMultiMap::default(),
            raw_body: Vec::new(),
        };
        let response = dispatch(&routes, &request);
        assert_eq!(response.status, 404);
    }

    #[test]
    fn keep_alive_counter_exhaustion_forces_close() {
        let mut remaining = 3u32;
        assert!(next_keep_alive(true, &mut remaining));
        assert!(next_keep_alive(true, &mut remaining));
        assert!(!next_keep_alive(true, &mut remaining));
        assert_eq!(remaining, 0);

        // Once exhausted, further requests on the same counter stay closed.
        assert!(!next_keep_alive(true, &mut remaining));
    }

    #[test]
    fn request_not_wanting_keep_alive_closes_even_with_budget_left() {
        let mut remaining = 5u32;
        assert!(!next_keep_alive(false, &mut remaining));
        assert_eq!(remaining, 4);
    }
}
