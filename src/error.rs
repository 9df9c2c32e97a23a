use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamwatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures while connecting to or reading from a camera feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("request to {camera} failed: {source}")]
    Request {
        camera: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{camera} answered with HTTP {status}")]
    Status { camera: String, status: u16 },

    #[error("{camera} rejected the supplied credentials")]
    Unauthorized { camera: String },

    #[error("unusable authentication challenge from {camera}: {details}")]
    Challenge { camera: String, details: String },

    #[error("no data from {camera} for {seconds}s")]
    ReadTimeout { camera: String, seconds: u64 },

    #[error("event stream from {camera} ended")]
    StreamEnded { camera: String },
}

/// Failures reported by the notification gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

impl CamwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CamwatchError>;
