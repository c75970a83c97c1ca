//! REST client for the backend's room lifecycle and gift-thank settings.
//!
//! Every endpoint answers `{"success": bool, "payload": T | null}`.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use danmuji_core::{GiftThankConfig, Room};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} reported failure")]
    Rejected { endpoint: String },

    #[error("{endpoint} succeeded without a payload")]
    MissingPayload { endpoint: String },
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    payload: Option<T>,
}

/// Room lifecycle and settings calls the client depends on.
#[allow(async_fn_in_trait)]
pub trait RoomApi {
    /// Subscribe the backend to `room_id`.
    async fn room_init(&self, room_id: &str) -> Result<Room, ApiError>;

    /// Room the backend is currently subscribed to, `None` if there is none.
    async fn room_status(&self) -> Result<Option<Room>, ApiError>;

    async fn disconnect(&self) -> Result<(), ApiError>;

    async fn gift_config(&self) -> Result<GiftThankConfig, ApiError>;

    async fn set_gift_config(&self, config: &GiftThankConfig) -> Result<(), ApiError>;
}

/// [`RoomApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRoomApi {
    client: reqwest::Client,
    base: String,
}

impl HttpRoomApi {
    /// `server` is the backend origin, e.g. `http://127.0.0.1:9000`.
    pub fn new(server: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Http {
                endpoint: server.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            base: format!("{}/api", server.trim_end_matches('/')),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        let url = format!("{}{path}", self.base);
        tracing::debug!(%url, "GET");
        let resp = self.client.get(&url).send().await;
        Self::read(path, resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<Envelope<T>, ApiError> {
        let url = format!("{}{path}", self.base);
        tracing::debug!(%url, "POST");
        let resp = self.client.post(&url).json(body).send().await;
        Self::read(path, resp).await
    }

    async fn read<T: DeserializeOwned>(
        path: &str,
        resp: reqwest::Result<reqwest::Response>,
    ) -> Result<Envelope<T>, ApiError> {
        let http = |source| ApiError::Http {
            endpoint: path.to_string(),
            source,
        };
        let resp = resp.map_err(http)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json::<Envelope<T>>().await.map_err(http)
    }
}

/// Require `success` and a payload.
fn payload<T>(path: &str, envelope: Envelope<T>) -> Result<T, ApiError> {
    if !envelope.success {
        return Err(ApiError::Rejected {
            endpoint: path.to_string(),
        });
    }
    envelope.payload.ok_or_else(|| ApiError::MissingPayload {
        endpoint: path.to_string(),
    })
}

/// Require `success`; the payload is ignored.
fn accepted<T>(path: &str, envelope: Envelope<T>) -> Result<(), ApiError> {
    if envelope.success {
        Ok(())
    } else {
        Err(ApiError::Rejected {
            endpoint: path.to_string(),
        })
    }
}

impl RoomApi for HttpRoomApi {
    async fn room_init(&self, room_id: &str) -> Result<Room, ApiError> {
        let path = format!("/roomInit/{room_id}");
        let envelope = self.get::<Room>(&path).await?;
        payload(&path, envelope)
    }

    async fn room_status(&self) -> Result<Option<Room>, ApiError> {
        let envelope = self.get::<Room>("/roomStatus").await?;
        // `success: false` is how the backend says "no room".
        Ok(if envelope.success {
            envelope.payload
        } else {
            None
        })
    }

    async fn disconnect(&self) -> Result<(), ApiError> {
        let envelope = self.get::<serde_json::Value>("/disconnect").await?;
        accepted("/disconnect", envelope)
    }

    async fn gift_config(&self) -> Result<GiftThankConfig, ApiError> {
        let envelope = self.get::<GiftThankConfig>("/getGiftConfig").await?;
        payload("/getGiftConfig", envelope)
    }

    async fn set_gift_config(&self, config: &GiftThankConfig) -> Result<(), ApiError> {
        let envelope = self
            .post::<serde_json::Value>("/setGiftConfig", config)
            .await?;
        accepted("/setGiftConfig", envelope)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal HTTP/1.1 responder for exercising [`HttpRoomApi`].

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// A request as seen by the responder.
    #[derive(Debug, Clone)]
    pub struct Seen {
        pub method: String,
        pub path: String,
        pub body: String,
    }

    pub struct HttpStub {
        pub base: String,
        pub requests: mpsc::UnboundedReceiver<Seen>,
    }

    /// Answer each incoming connection with the next `(status, body)` pair.
    pub async fn serve(responses: Vec<(u16, &'static str)>) -> HttpStub {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = read_request(&mut stream).await;
                let _ = tx.send(seen);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        HttpStub {
            base: format!("http://{addr}"),
            requests: rx,
        }
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> Seen {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        Seen {
            method: request_line.next().unwrap_or_default().to_string(),
            path: request_line.next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[head_end..]).to_string(),
        }
    }
}
