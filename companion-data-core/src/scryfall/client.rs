use crate::config::ScryfallConfig;
use crate::error::DataError;
use crate::rate_governor::RateGovernor;
use super::models::ScryfallErrorBody;
use log::debug;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

// Headers required according to https://scryfall.com/docs/api/
const ACCEPT: &str = "application/json;q=0.9,*/*;q=0.8";

#[derive(Debug)]
pub struct ScryfallClient {
    client: reqwest::Client,
    config: ScryfallConfig,
    governor: RateGovernor,
}

impl ScryfallClient {
    pub fn new() -> Result<Self, DataError> {
        Self::with_config(ScryfallConfig::default())
    }

    pub fn with_config(config: ScryfallConfig) -> Result<Self, DataError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_str(&config.user_agent)
                .map_err(|e| DataError::InvalidParams(format!("Invalid user agent: {}", e)))?,
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(ACCEPT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let governor = RateGovernor::new(config.rate_interval);
        Ok(ScryfallClient {
            client,
            config,
            governor,
        })
    }

    pub fn config(&self) -> &ScryfallConfig {
        &self.config
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path))
    }

    /// Send one request: wait for a rate slot, then map the status onto
    /// [`DataError`] and decode the JSON body.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, DataError> {
        let request = request.build()?;
        let url = request.url().to_string();

        self.governor.throttle_cancellable(cancel).await?;
        debug!("calling scryfall API: {}", url);

        let exchange = async {
            let response = self.client.execute(request).await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, DataError>((status, body))
        };
        let (status, body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DataError::Cancelled),
            result = exchange => result?,
        };

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("scryfall 404 for {}: {}", url, error_details(&body));
            return Err(DataError::NotFound(url));
        }
        if !status.is_success() {
            debug!("scryfall {} for {}: {}", status, url, error_details(&body));
            return Err(DataError::Status {
                status: status.as_u16(),
                url,
            });
        }

        serde_json::from_str(&body).map_err(|e| DataError::Parse(format!("{}: {}", url, e)))
    }
}

fn error_details(body: &str) -> String {
    match serde_json::from_str::<ScryfallErrorBody>(body) {
        Ok(error) => format!("{} ({})", error.details, error.code),
        Err(_) => body.chars().take(200).collect(),
    }
}
