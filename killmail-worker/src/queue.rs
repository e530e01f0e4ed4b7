use reqwest::redirect;
use tracing::{debug, warn};

use crate::metrics_consts::QUEUE_POLLS;

/// Long-polls the event queue for the next kill event.
#[derive(Clone)]
pub struct QueuePoller {
    client: reqwest::Client,
    url: String,
}

impl QueuePoller {
    /// No request timeout is set: the server holds the request for up to the requested wait.
    pub fn new(url: &str, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            url: url.to_owned(),
        })
    }

    /// Fetch one raw event body, waiting up to `wait_seconds` server-side.
    ///
    /// Returns an empty string when nothing is queued and also when the request failed: callers
    /// cannot tell the two apart and must treat both as "nothing to do". Failures are logged and
    /// counted separately.
    pub async fn poll(&self, queue_id: &str, wait_seconds: u64) -> String {
        let wait = wait_seconds.to_string();
        let request = self
            .client
            .get(&self.url)
            .query(&[("queueID", queue_id), ("ttw", wait.as_str())]);

        let body = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    debug!(%status, "queue poll returned a non-success status");
                }
                response.text().await
            }
            Err(error) => Err(error),
        };

        match body {
            Ok(body) => {
                let result = if body.is_empty() { "empty" } else { "event" };
                metrics::counter!(QUEUE_POLLS, "result" => result).increment(1);
                body
            }
            Err(error) => {
                warn!("queue poll failed: {}", error);
                metrics::counter!(QUEUE_POLLS, "result" => "transport_error").increment(1);
                String::new()
            }
        }
    }
}
