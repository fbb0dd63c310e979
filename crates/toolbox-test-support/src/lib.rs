use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use toolbox::{default_registry, ClientConfig, ToolClient, ToolRegistry};

pub const FIXTURE_NAME: &str = "toolbox-fixture";
pub const FIXTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Toolbox server on an ephemeral localhost port, stopped on drop.
pub struct ToolboxFixture {
    pub url: String,
    handle: JoinHandle<()>,
}

impl Drop for ToolboxFixture {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl ToolboxFixture {
    pub async fn new() -> Self {
        Self::with_registry(default_registry()).await
    }

    pub async fn with_registry(registry: ToolRegistry) -> Self {
        let router = toolbox::http::router(Arc::new(registry), FIXTURE_NAME, "/mcp");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{addr}/mcp");

        let handle = tokio::spawn(async move {
            toolbox::http::serve_listener(listener, router, std::future::pending())
                .await
                .unwrap();
        });

        Self { url, handle }
    }

    pub fn client(&self) -> ToolClient {
        ToolClient::new(ClientConfig::new(&self.url).with_timeout(FIXTURE_TIMEOUT))
    }
}
