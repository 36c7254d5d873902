//! A loopback HTTP server for exercising the download pipeline in tests.
//!
//! Serves canned bodies for exact paths, answers 404 for everything else and
//! records every requested path so tests can assert what was (not) fetched.
//! The axum router runs on its own thread and runtime, so the server works
//! the same from plain `#[test]` functions and from inside `#[tokio::test]`.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

#[derive(Default)]
struct Routes {
    responses: HashMap<String, (u16, Vec<u8>)>,
    requests: Vec<String>,
}

type SharedRoutes = Arc<Mutex<Routes>>;

pub struct TestServer {
    addr: SocketAddr,
    routes: SharedRoutes,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Bind to an ephemeral loopback port and start serving in the background.
    pub fn start() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        listener.set_nonblocking(true).expect("non-blocking listener");

        let routes = SharedRoutes::default();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = Router::new().fallback(respond).with_state(Arc::clone(&routes));

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("test server runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("adopt listener");
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Self {
            addr,
            routes,
            shutdown: Some(shutdown),
        }
    }

    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.serve_status(path, 200, body);
    }

    pub fn serve_status(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().responses.insert(path.to_string(), (status, body.into()));
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Paths requested so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.routes.lock().unwrap().requests.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn respond(State(routes): State<SharedRoutes>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let found = {
        let mut routes = routes.lock().unwrap();
        routes.requests.push(path.clone());
        routes.responses.get(&path).cloned()
    };

    match found {
        Some((status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, "application/octet-stream")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
