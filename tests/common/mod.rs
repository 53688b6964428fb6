//! Shared utilities for integration testing.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use tokio::net::TcpListener;

use funnel_proxy::{HttpServer, ProxyConfig};

/// One canned upstream response, keyed by request path.
#[derive(Clone)]
pub struct MockRoute {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl MockRoute {
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type", "text/html; charset=utf-8".to_string())],
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicU32>,
}

impl MockUpstream {
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hit_count(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Bind a mock upstream on an ephemeral port. Two-step so tests can embed the
/// mock's own origin inside its response bodies.
pub async fn bind_mock() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Serve canned routes from a bound mock listener. Unknown paths get a 404.
pub fn serve_mock(listener: TcpListener, routes: HashMap<String, MockRoute>) -> Arc<AtomicU32> {
    let hits = Arc::new(AtomicU32::new(0));
    let routes = Arc::new(routes);
    let hits_handle = hits.clone();

    let service = tower::service_fn(move |req: Request<Body>| {
        let routes = routes.clone();
        let hits = hits_handle.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let response = match routes.get(req.uri().path()) {
                Some(route) => {
                    let mut builder = Response::builder().status(route.status);
                    for (name, value) in &route.headers {
                        builder = builder.header(*name, value);
                    }
                    builder.body(Body::from(route.body.clone())).unwrap()
                }
                None => Response::builder()
                    .status(404)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, Infallible>(response)
        }
    });

    let app = Router::new().fallback_service(service);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    hits
}

/// Convenience: bind and serve in one call when bodies do not need the
/// mock's own origin.
pub async fn start_mock_upstream(routes: HashMap<String, MockRoute>) -> MockUpstream {
    let (listener, addr) = bind_mock().await;
    let hits = serve_mock(listener, routes);
    MockUpstream { addr, hits }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(mut config: ProxyConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();
    let server = HttpServer::new(config).unwrap();
    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });
    addr
}

/// Client that never follows redirects, so intercepted `Location` headers
/// stay observable.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
