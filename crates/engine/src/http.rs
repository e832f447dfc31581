use axum::Router;
use tokio::net::TcpListener;

pub struct HttpServer {
    router: Router,
    addr: String,
}

impl HttpServer {
    pub fn new(router: Router, addr: impl Into<String>) -> Self {
        Self {
            router,
            addr: addr.into(),
        }
    }

    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        log::info!("listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router).await
    }
}
