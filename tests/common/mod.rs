#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use waypost::{Error, Health, Router, Server, ServerConfig};

/// A server on an ephemeral loopback port, stopped by [`TestServer::trigger`].
pub struct TestServer {
    pub addr: SocketAddr,
    pub health: Health,
    trigger: Option<oneshot::Sender<()>>,
    done: JoinHandle<Result<(), Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Fire the shutdown trigger without waiting for the drain.
    pub fn trigger(&mut self) {
        if let Some(tx) = self.trigger.take() {
            let _ = tx.send(());
        }
    }

    /// Trigger shutdown and wait for the lifecycle manager to return.
    pub async fn stop(mut self) -> Result<(), Error> {
        self.trigger();
        self.join().await
    }

    pub async fn join(self) -> Result<(), Error> {
        self.done.await.expect("lifecycle task panicked")
    }
}

pub fn config() -> ServerConfig {
    ServerConfig::default().with_port(0)
}

pub async fn spawn(router: Router) -> TestServer {
    spawn_with(config(), router).await
}

pub async fn spawn_with(config: ServerConfig, router: Router) -> TestServer {
    let running = Server::new(config, router).start().await.expect("server starts");
    let addr = running.local_addr();
    let health = running.health();
    let (tx, rx) = oneshot::channel::<()>();
    let done = tokio::spawn(running.shutdown_on(async move {
        let _ = rx.await;
    }));
    TestServer { addr, health, trigger: Some(tx), done }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client builds")
}

/// Sends `raw` on a fresh connection and reads until the server closes it.
pub async fn raw_exchange(addr: SocketAddr, raw: &str) -> (SocketAddr, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let local = stream.local_addr().expect("local addr");
    stream.write_all(raw.as_bytes()).await.expect("write");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read");
    (local, String::from_utf8_lossy(&buf).into_owned())
}
