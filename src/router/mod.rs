//! Network-backed store handles.
//!
//! [`connect`] picks the handle that matches a config's topology: a pooled
//! single server, or a slot-routing cluster client.

pub mod cluster;
pub mod standalone;

pub use cluster::ClusterRouter;
pub use standalone::StandaloneStore;

use crate::config::{ConnectionConfig, Topology};
use crate::error::Result;
use crate::store::StoreHandle;

use std::sync::Arc;

/// Open a handle for `config`. Cluster handles fetch the slot map up front.
pub fn connect(config: ConnectionConfig) -> Result<Arc<dyn StoreHandle>> {
    match config.topology {
        Topology::Standalone => Ok(Arc::new(StandaloneStore::new(config))),
        Topology::Cluster { .. } => {
            let router: Arc<dyn StoreHandle> = ClusterRouter::connect(config)?;
            Ok(router)
        }
    }
}

/// Scriptable RESP server for socket-level tests.
#[cfg(test)]
pub(crate) mod mock {
    use crate::resp::parser::parse;
    use crate::resp::types::RespValue;
    use crate::runtime;

    use bytes::BytesMut;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reserve a local port before the handler is known.
    pub fn bind() -> (TcpListener, String) {
        runtime::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            (listener, addr)
        })
    }

    /// Answer every command on every connection with `handler(words)`,
    /// which returns raw RESP.
    pub fn serve<H>(listener: TcpListener, handler: H)
    where
        H: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        runtime::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = session(socket, &*handler).await;
                });
            }
        });
    }

    /// `bind` + `serve`.
    pub fn start<H>(handler: H) -> String
    where
        H: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        let (listener, addr) = bind();
        serve(listener, handler);
        addr
    }

    async fn session<H>(mut socket: TcpStream, handler: &H) -> std::io::Result<()>
    where
        H: Fn(&[String]) -> String,
    {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if socket.read_buf(&mut buf).await? == 0 {
                return Ok(());
            }
            let mut out = String::new();
            while let Ok((frame, consumed)) = parse(&buf.clone().freeze()) {
                let _ = buf.split_to(consumed);
                out.push_str(&handler(&words(frame)));
            }
            socket.write_all(out.as_bytes()).await?;
        }
    }

    fn words(frame: RespValue) -> Vec<String> {
        match frame {
            RespValue::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// RESP bulk string.
    pub fn bulk(s: &str) -> String {
        format!("${}\r\n{s}\r\n", s.len())
    }
}
