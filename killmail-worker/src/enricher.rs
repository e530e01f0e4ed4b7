use std::time;

use killmail_common::killmail::{EnrichedKillmail, KillReference, KillmailDocument};
use reqwest::StatusCode;

use crate::error::EnrichError;
use crate::metrics_consts::ENRICH_DURATION;

/// Fetches authoritative killmails and merges them with the queue's kill references.
#[derive(Clone)]
pub struct Enricher {
    client: reqwest::Client,
    base_url: String,
}

impl Enricher {
    pub fn new(
        base_url: &str,
        request_timeout: time::Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn killmail_url(&self, reference: &KillReference) -> String {
        format!(
            "{}/killmails/{}/{}/",
            self.base_url, reference.killmail_id, reference.hash
        )
    }

    /// Fetch the authoritative killmail for `reference` and validate it.
    pub async fn enrich(&self, reference: KillReference) -> Result<EnrichedKillmail, EnrichError> {
        let url = self.killmail_url(&reference);

        let now = tokio::time::Instant::now();
        let response = self.client.get(&url).send().await;
        metrics::histogram!(ENRICH_DURATION).record(now.elapsed().as_secs_f64());

        let response = response?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(EnrichError::StatusError { status, url });
        }

        let body = response.text().await?;
        if body.is_empty() {
            return Err(EnrichError::EmptyBodyError { url });
        }

        let document: KillmailDocument = serde_json::from_str(&body)?;

        Ok(document.into_killmail(reference)?)
    }
}
