use crate::error::{Result, WagerbookError};
use crate::ledger::LedgerClient;
use crate::types::{Address, SignedTransfer, TransferHandle, TransferStatus};
use async_trait::async_trait;
use bitcoin::Amount;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

/// JSON client for a ledger gateway.
///
/// `GET  /accounts/{address}/balance`  -> `{"sats": u64}`
/// `POST /transfers` (signed transfer)  -> `{"id": str}`
/// `GET  /transfers/{id}`              -> `{"status": "pending"|"confirmed"|"failed", "reason"?: str}`
pub struct HttpLedger {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct BalanceResponse {
    sats: u64,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    reason: Option<String>,
}

impl HttpLedger {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("wagerbook")
            .build()
            .map_err(|e| WagerbookError::ledger(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl LedgerClient for HttpLedger {
    async fn get_balance(&self, address: &Address) -> Result<Amount> {
        let response = self
            .client
            .get(self.url(&format!("/accounts/{}/balance", address)))
            .send()
            .await
            .map_err(|e| WagerbookError::ledger(format!("Balance request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WagerbookError::ledger(format!(
                "Balance request for {} returned {}",
                address,
                response.status()
            )));
        }

        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| WagerbookError::ledger(format!("Malformed balance response: {}", e)))?;
        Ok(Amount::from_sat(body.sats))
    }

    async fn submit_transfer(&self, transfer: &SignedTransfer) -> Result<TransferHandle> {
        let key: Uuid = transfer.request.idempotency_key;
        let response = self
            .client
            .post(self.url("/transfers"))
            .header("Idempotency-Key", key.to_string())
            .json(transfer)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_builder() {
                    WagerbookError::TransferRejected {
                        reason: format!("Submission not sent: {}", e),
                    }
                } else {
                    WagerbookError::ledger(format!("Submission response lost: {}", e))
                }
            })?;

        let status = response.status();
        if !(status.is_success() || status == StatusCode::CONFLICT) {
            let detail = response.text().await.unwrap_or_default();
            // Only a 4xx proves the gateway refused the transfer outright.
            if status.is_client_error() {
                return Err(WagerbookError::TransferRejected {
                    reason: format!("Gateway returned {}: {}", status, detail),
                });
            }
            return Err(WagerbookError::ledger(format!(
                "Gateway returned {}: {}",
                status, detail
            )));
        }

        // 409 carries the handle of the earlier submission with this key
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| WagerbookError::ledger(format!("Malformed submit response: {}", e)))?;

        Ok(TransferHandle {
            id: body.id,
            idempotency_key: key,
        })
    }

    async fn confirm_transfer(&self, handle: &TransferHandle) -> Result<TransferStatus> {
        let response = self
            .client
            .get(self.url(&format!("/transfers/{}", handle.id)))
            .send()
            .await
            .map_err(|e| WagerbookError::ledger(format!("Status request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(TransferStatus::Pending);
        }
        if !response.status().is_success() {
            return Err(WagerbookError::ledger(format!(
                "Status request for {} returned {}",
                handle,
                response.status()
            )));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| WagerbookError::ledger(format!("Malformed status response: {}", e)))?;

        Ok(match body.status.as_str() {
            "confirmed" | "finalized" => TransferStatus::Confirmed,
            "failed" => TransferStatus::Failed {
                reason: body.reason.unwrap_or_else(|| "unspecified".to_string()),
            },
            _ => TransferStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::custody::{KeypairSigner, TransferSigner};
    use crate::ledger::Ledger;
    use crate::types::TransferRequest;
    use bitcoin::Network;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one connection: reads the full request, then writes `reply`
    /// (or just hangs up when `reply` is `None`).
    async fn one_shot_gateway(reply: Option<&'static str>) -> (String, tokio::task::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let received = read_request(&mut socket).await;
            if let Some(reply) = reply {
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
            socket.shutdown().await.ok();
            received
        });

        (url, server)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> usize {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return buf.len();
                }
            }
        }
    }

    fn signed_transfer() -> SignedTransfer {
        let signer = KeypairSigner::generate(Network::Regtest).unwrap();
        let request = TransferRequest::new(
            signer.address().clone(),
            Address::new("pot"),
            Amount::from_sat(1_000),
        );
        signer.sign(request).unwrap()
    }

    fn gateway_config(url: &str) -> LedgerConfig {
        LedgerConfig {
            gateway_url: url.to_string(),
            query_timeout: Duration::from_secs(2),
            submit_timeout: Duration::from_secs(2),
            confirm_timeout: Duration::from_millis(200),
            confirm_poll_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_gateway_handle() {
        let (url, server) = one_shot_gateway(Some(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 13\r\nconnection: close\r\n\r\n{\"id\":\"tx-1\"}",
        ))
        .await;
        let ledger = HttpLedger::new(&url).unwrap();
        let transfer = signed_transfer();

        let handle = ledger.submit_transfer(&transfer).await.unwrap();
        assert_eq!(handle.id, "tx-1");
        assert_eq!(handle.idempotency_key, transfer.request.idempotency_key);
        assert!(server.await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_lost_response_after_delivery_is_ambiguous() {
        let (url, server) = one_shot_gateway(None).await;
        let ledger = Ledger::new(Arc::new(HttpLedger::new(&url).unwrap()), gateway_config(&url));

        let err = ledger.transfer(&signed_transfer()).await.unwrap_err();
        assert!(server.await.unwrap() > 0);
        assert!(!matches!(err, WagerbookError::TransferRejected { .. }));
        assert!(err.is_ambiguous_transfer());
    }

    #[tokio::test]
    async fn test_gateway_5xx_is_ambiguous() {
        let (url, _server) = one_shot_gateway(Some(
            "HTTP/1.1 504 Gateway Timeout\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        ))
        .await;
        let ledger = Ledger::new(Arc::new(HttpLedger::new(&url).unwrap()), gateway_config(&url));

        let err = ledger.transfer(&signed_transfer()).await.unwrap_err();
        assert!(err.is_ambiguous_transfer());
    }

    #[tokio::test]
    async fn test_gateway_4xx_is_rejected() {
        let (url, _server) = one_shot_gateway(Some(
            "HTTP/1.1 400 Bad Request\r\ncontent-length: 9\r\nconnection: close\r\n\r\nbad input",
        ))
        .await;
        let ledger = HttpLedger::new(&url).unwrap();

        let err = ledger.submit_transfer(&signed_transfer()).await.unwrap_err();
        assert!(matches!(err, WagerbookError::TransferRejected { .. }));
        assert!(!err.transfer_was_submitted());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let ledger = HttpLedger::new(&url).unwrap();
        let err = ledger.submit_transfer(&signed_transfer()).await.unwrap_err();
        assert!(matches!(err, WagerbookError::TransferRejected { .. }));
    }
}
