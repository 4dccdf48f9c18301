use crate::{api::ApiError, constants::DEFAULT_PEER_SCHEME};
use anyhow::Result;
use async_trait::async_trait;
use ledger_core::{ChainSnapshot, PeerError, PeerFetcher};
use reqwest::{Client, Url};
use std::time::Duration;

/// Reduces a peer URL to `host:port`. A missing scheme is taken to be `http`, a missing
/// port defaults to 80. Peers are always fetched over plain HTTP, so other schemes are
/// rejected.
pub fn normalize_peer(address: &str) -> Result<String, ApiError> {
    let invalid = || ApiError::InvalidPeer(address.to_string());
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{DEFAULT_PEER_SCHEME}{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
    if url.scheme() != "http" {
        return Err(invalid());
    }
    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let port = url.port_or_known_default().ok_or_else(invalid)?;
    Ok(format!("{host}:{port}"))
}

/// Fetches `GET http://{peer}/chain` with a per-request timeout.
#[derive(Clone)]
pub struct HttpPeerFetcher {
    client: Client,
}

impl HttpPeerFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PeerFetcher for HttpPeerFetcher {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
        let res = self
            .client
            .get(format!("http://{peer}/chain"))
            .send()
            .await
            .map_err(|e| PeerError::Unreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        let status = res.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }
        res.json::<ChainSnapshot>()
            .await
            .map_err(|e| PeerError::Decode {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }
}
