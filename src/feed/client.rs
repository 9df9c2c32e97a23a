use super::digest::Challenge;
use crate::config::CameraConfig;
use crate::error::{CamwatchError, FeedError, Result};
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Opens authenticated event feeds
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    read_timeout: Duration,
}

impl FeedClient {
    /// `read_timeout` bounds connecting, waiting for response headers, and
    /// every later read of the body.
    pub fn new(read_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(read_timeout)
            .build()
            .map_err(|e| {
                CamwatchError::component("feed", &format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { http, read_timeout })
    }

    /// Issue the streaming GET for `camera`, answering an authentication
    /// challenge once if the camera asks for one.
    pub async fn connect(&self, camera: &CameraConfig) -> std::result::Result<FeedStream, FeedError> {
        debug!("Connecting to {} at {}", camera.name, camera.url);

        let response = self.send(camera, self.http.get(&camera.url)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.accept(camera, response);
        }

        if camera.username.is_empty() {
            return Err(FeedError::Unauthorized {
                camera: camera.name.clone(),
            });
        }

        let challenge = pick_challenge(&response).ok_or_else(|| FeedError::Challenge {
            camera: camera.name.clone(),
            details: "no supported WWW-Authenticate scheme".to_string(),
        })?;

        let request = match challenge {
            Challenge::Digest(digest) => {
                let url = response.url();
                let uri = match url.query() {
                    Some(query) => format!("{}?{}", url.path(), query),
                    None => url.path().to_string(),
                };
                let cnonce = uuid::Uuid::new_v4().simple().to_string();
                let header = digest.authorization(
                    &camera.username,
                    &camera.password,
                    "GET",
                    &uri,
                    &cnonce,
                    1,
                );
                debug!("Answering digest challenge from {} (realm {})", camera.name, digest.realm);
                self.http.get(&camera.url).header(AUTHORIZATION, header)
            }
            Challenge::Basic => self
                .http
                .get(&camera.url)
                .basic_auth(&camera.username, Some(&camera.password)),
        };

        let response = self.send(camera, request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(FeedError::Unauthorized {
                camera: camera.name.clone(),
            });
        }
        self.accept(camera, response)
    }

    async fn send(
        &self,
        camera: &CameraConfig,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<Response, FeedError> {
        match timeout(self.read_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(FeedError::Request {
                camera: camera.name.clone(),
                source,
            }),
            Err(_) => Err(FeedError::ReadTimeout {
                camera: camera.name.clone(),
                seconds: self.read_timeout.as_secs(),
            }),
        }
    }

    fn accept(
        &self,
        camera: &CameraConfig,
        response: Response,
    ) -> std::result::Result<FeedStream, FeedError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                camera: camera.name.clone(),
                status: status.as_u16(),
            });
        }

        info!("Connected to {} (HTTP {})", camera.name, status.as_u16());
        Ok(FeedStream {
            camera: camera.name.clone(),
            response,
            read_timeout: self.read_timeout,
        })
    }
}

/// Digest is preferred when a camera offers several schemes
fn pick_challenge(response: &Response) -> Option<Challenge> {
    let challenges: Vec<Challenge> = response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(Challenge::parse)
        .collect();

    challenges
        .iter()
        .find(|c| matches!(c, Challenge::Digest(_)))
        .or_else(|| challenges.first())
        .cloned()
}

/// An open feed body
pub struct FeedStream {
    camera: String,
    response: Response,
    read_timeout: Duration,
}

impl FeedStream {
    /// Next body chunk. End of body and silence longer than the read timeout
    /// are both errors: a feed is never expected to finish.
    pub async fn next_chunk(&mut self) -> std::result::Result<Bytes, FeedError> {
        match timeout(self.read_timeout, self.response.chunk()).await {
            Ok(Ok(Some(chunk))) => Ok(chunk),
            Ok(Ok(None)) => Err(FeedError::StreamEnded {
                camera: self.camera.clone(),
            }),
            Ok(Err(source)) => Err(FeedError::Request {
                camera: self.camera.clone(),
                source,
            }),
            Err(_) => Err(FeedError::ReadTimeout {
                camera: self.camera.clone(),
                seconds: self.read_timeout.as_secs(),
            }),
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }
}
