//! `PeerTransport`: typed point-to-point sends to one peer or all peers
//! (spec §2, §6). Realized over HTTP with `reqwest` rather than the
//! teacher's raw-TCP `net::session::Tcp` — the spec's wire protocol is
//! "HTTP POST, JSON bodies or query parameters" -- but the failure
//! posture is the same one `net::session.rs` documents: a send is
//! one-way and best-effort, failures are logged and otherwise swallowed,
//! never propagated to the algorithm that issued them (spec §7,
//! "Transport failure").

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::multicast::{Ack, MulticastMessage};
use crate::mutex::MutexRequest;

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PeerTransport {
    client: Client,
    peers: Vec<String>,
    self_id: u32,
}

impl PeerTransport {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .expect("reqwest client builds with no custom TLS config");
        Self {
            client,
            peers: config.peers.clone(),
            self_id: config.process_id,
        }
    }

    pub fn self_id(&self) -> u32 {
        self.self_id
    }

    pub fn peer_ids_excluding_self(&self, total_processes: u32) -> Vec<u32> {
        (0..total_processes).filter(|&id| id != self.self_id).collect()
    }

    pub async fn send_message(&self, peer_id: u32, message: &MulticastMessage) {
        self.post_json(peer_id, "/message", message).await
    }

    pub async fn send_ack(&self, peer_id: u32, ack: &Ack) {
        self.post_json(peer_id, "/ack", ack).await
    }

    pub async fn send_request(&self, peer_id: u32, request: &MutexRequest) {
        self.post_json(peer_id, "/receive-request", request).await
    }

    pub async fn send_reply(&self, peer_id: u32) {
        self.post_query(peer_id, "/receive-reply", &[("sender_id", self.self_id.to_string())])
            .await
    }

    pub async fn send_election(&self, peer_id: u32) {
        self.post_query(peer_id, "/receive-election", &[("candidate_id", self.self_id.to_string())])
            .await
    }

    pub async fn send_answer(&self, peer_id: u32) {
        self.post_query(peer_id, "/receive-answer", &[("peer_id", self.self_id.to_string())])
            .await
    }

    pub async fn send_coordinator(&self, peer_id: u32, leader_id: u32) {
        self.post_query(peer_id, "/receive-coordinator", &[("leader_id", leader_id.to_string())])
            .await
    }

    async fn post_json<T: Serialize>(&self, peer_id: u32, path: &str, body: &T) {
        let Some(addr) = self.peers.get(peer_id as usize) else {
            warn!("no known address for peer {peer_id}, dropping {path}");
            return;
        };
        let url = format!("http://{addr}{path}");
        if let Err(err) = self.client.post(&url).json(body).send().await {
            warn!(">>> {url} {err}");
        }
    }

    async fn post_query(&self, peer_id: u32, path: &str, query: &[(&str, String)]) {
        let Some(addr) = self.peers.get(peer_id as usize) else {
            warn!("no known address for peer {peer_id}, dropping {path}");
            return;
        };
        let url = format!("http://{addr}{path}");
        if let Err(err) = self.client.post(&url).query(query).send().await {
            warn!(">>> {url} {err}");
        }
    }
}
