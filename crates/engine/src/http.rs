use crate::config::HttpServerConfig;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct HttpServer {
    router: Arc<Router>,
    config: HttpServerConfig,
}

impl HttpServer {
    pub fn new(router: Router, config: HttpServerConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
        }
    }

    /// Serve until ctrl-c, letting in-flight requests finish.
    pub async fn start(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");

        axum::serve(listener, (*self.router).clone())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
