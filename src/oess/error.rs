use thiserror::Error;

#[derive(Debug, Error)]
pub enum OessError {
    #[error("Api error: {0}")]
    Api(String),
    #[error("No workgroup named {0}")]
    WorkgroupNotFound(String),
    #[error("Circuit {0} has no endpoints")]
    EmptyCircuit(String),
    #[error("A circuit needs at least two endpoints, got {0}")]
    TooFewEndpoints(usize),
    #[error("Malformed credentials file {0}")]
    Credentials(String),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
