use crate::error::{ProfileError, Result};
use crate::schema::{Document, SourceFeed};
use crate::source::TransactionSource;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_SOURCE_URL: &str = "http://api.nessieisreal.com";

/// HTTP client for the upstream banking API.
#[derive(Clone)]
pub struct HttpTransactionSource {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpTransactionSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// GETs `endpoint`; a 404 is `Ok(None)`, any other failure is an error.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {}", url);

        let res = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                ProfileError::RemoteFetch(format!("Could not connect to {}: {}", endpoint, e))
            })?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            return Err(ProfileError::RemoteFetch(format!(
                "{} returned status {}: {}",
                endpoint, status, error_text
            )));
        }

        Ok(Some(res.json().await?))
    }
}

impl TransactionSource for HttpTransactionSource {
    async fn customer(&self, customer_id: &str) -> Result<Option<Document>> {
        self.get_json(&format!("/customers/{}", customer_id)).await
    }

    async fn customer_accounts(&self, customer_id: &str) -> Result<Option<Vec<Document>>> {
        self.get_json(&format!("/customers/{}/accounts", customer_id))
            .await
    }

    async fn accounts(&self) -> Result<Option<Vec<Document>>> {
        self.get_json("/accounts").await
    }

    async fn account_feed(&self, account_id: &str, feed: SourceFeed) -> Result<Option<Vec<Document>>> {
        self.get_json(&format!("/accounts/{}/{}", account_id, feed.endpoint()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves canned responses keyed on the request path until the test ends.
    async fn canned_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");

                    let (status, body) = if path.starts_with("/customers/missing") {
                        ("404 Not Found", r#"{"code":404,"message":"Customer not found"}"#)
                    } else if path.starts_with("/customers/broken") {
                        ("500 Internal Server Error", "upstream unavailable")
                    } else if path.starts_with("/customers/c-1?key=secret") {
                        ("200 OK", r#"{"_id":"c-1","first_name":"Jane"}"#)
                    } else {
                        ("401 Unauthorized", r#"{"message":"bad key"}"#)
                    };

                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/", addr)
    }

    fn source(base_url: String) -> HttpTransactionSource {
        HttpTransactionSource::new(base_url, "secret", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_success_is_parsed() {
        let source = source(canned_server().await);
        let customer = source.customer("c-1").await.unwrap().unwrap();
        assert_eq!(customer["_id"], "c-1");
        assert_eq!(customer["first_name"], "Jane");
    }

    #[tokio::test]
    async fn test_not_found_is_absent() {
        let source = source(canned_server().await);
        assert!(source.customer("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_statuses_are_remote_failures() {
        let source = source(canned_server().await);

        match source.customer("broken").await {
            Err(ProfileError::RemoteFetch(message)) => {
                assert!(message.contains("500"), "{}", message);
                assert!(message.contains("upstream unavailable"), "{}", message);
            }
            other => panic!("expected a remote fetch failure, got {:?}", other),
        }
        assert!(matches!(
            source.accounts().await,
            Err(ProfileError::RemoteFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_remote_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = source(format!("http://{}", addr));
        assert!(matches!(
            source.customer("c-1").await,
            Err(ProfileError::RemoteFetch(_))
        ));
    }
}
