// Blocking HTTP plumbing shared by the Ollama and Qdrant clients

use std::time::Duration;

use tracing::debug;
use ureq::Agent;

use crate::{RagError, Result};

/// Status and body of a completed HTTP exchange, whatever the status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub(crate) fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JsonMethod {
    Post,
    Put,
}

/// Agent that hands back non-2xx responses instead of turning them into errors,
/// so callers can surface the backend's status and body
pub(crate) fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

pub(crate) fn send_json(
    agent: &Agent,
    method: JsonMethod,
    url: &str,
    body: &str,
) -> std::result::Result<HttpResponse, ureq::Error> {
    debug!("{:?} {} ({} bytes)", method, url, body.len());

    let mut response = match method {
        JsonMethod::Post => agent
            .post(url)
            .header("Content-Type", "application/json")
            .send(body)?,
        JsonMethod::Put => agent
            .put(url)
            .header("Content-Type", "application/json")
            .send(body)?,
    };

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string()?;
    debug!("{} responded with status {}", url, status);

    Ok(HttpResponse { status, body })
}

pub(crate) fn get(agent: &Agent, url: &str) -> std::result::Result<HttpResponse, ureq::Error> {
    debug!("GET {}", url);

    let mut response = agent.get(url).call()?;
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string()?;

    Ok(HttpResponse { status, body })
}

/// Run a blocking client call on the runtime's blocking pool
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}
