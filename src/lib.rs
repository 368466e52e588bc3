pub mod config;
pub mod image;
pub mod inference;
pub mod quota;
pub mod server;

/// Process and request helpers
pub mod util {
    use actix_web::HttpRequest;
    use tracing_subscriber::EnvFilter;

    /// Quota key used when the peer address is unknown
    pub const UNKNOWN_CLIENT: &str = "unknown";

    /// Identify a client by the IP address of its connection
    pub fn client_key(req: &HttpRequest) -> String {
        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.into())
    }

    /// Log to stdout, filtered by `RUST_LOG` or `config::DEFAULT_LOG_FILTER`
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(super::config::DEFAULT_LOG_FILTER));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Log panics through tracing. actix restarts the worker that panicked,
    /// so the process keeps serving
    pub fn install_panic_hook() {
        std::panic::set_hook(Box::new(|info| {
            tracing::error!("uncaught panic: {info}");
        }));
    }

}
