use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {} {}", .status.as_u16(), .status_text)]
    Status {
        status: StatusCode,
        status_text: String,
        body: String,
    },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            ApiError::Decode(_) => None,
        }
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status,
            status_text: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
            body,
        });
    }

    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn get<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, ApiError> {
    decode(send(client.get(url)).await?).await
}

/// Like [`get`], but a 404 is an absent value rather than an error
pub async fn get_optional<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<Option<T>, ApiError> {
    match send(client.get(url)).await {
        Ok(response) => Ok(Some(decode(response).await?)),
        Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn post<T: DeserializeOwned, B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
) -> Result<T, ApiError> {
    decode(send(client.post(url).json(body)).await?).await
}

/// POST whose response body is ignored
pub async fn post_void<B: Serialize>(client: &Client, url: &str, body: &B) -> Result<(), ApiError> {
    send(client.post(url).json(body)).await?;
    Ok(())
}

pub async fn delete(client: &Client, url: &str) -> Result<(), ApiError> {
    send(client.delete(url)).await?;
    Ok(())
}

pub async fn open_event_stream(client: &Client, url: &str) -> Result<Response, ApiError> {
    send(
        client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache"),
    )
    .await
}
