//! InfluxDB v2 HTTP API client.

use crate::annotated_csv::{self, FluxRecord};
use crate::config::InfluxConfig;
use crate::errors::{Error, Result};
use crate::flux::FluxQuery;
use crate::line_protocol::Point;
use crate::store::{StoreHealth, TimeSeriesStore};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const USER_AGENT: &str = concat!("sensor-gateway/", env!("CARGO_PKG_VERSION"));

pub struct InfluxClient {
    client: Client,
    base_url: String,
    org: String,
    bucket: String,
}

/// Error body returned by the v2 API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(&format!("Token {}", config.token))
            .map_err(|_| Error::Config("INFLUXDB_TOKEN contains invalid characters".to_string()))?;
        token.set_sensitive(true);
        headers.insert(AUTHORIZATION, token);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turns a non-2xx response into [`Error::Status`], preferring the store's
/// own message over the raw body.
async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody {
            code: Some(code),
            message,
        }) => format!("{}: {}", code, message),
        Ok(ApiErrorBody { message, .. }) => message,
        Err(_) => body,
    };

    Err(Error::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn write_point(&self, point: &Point) -> Result<()> {
        let line = point.to_line()?;
        debug!("Writing point: {}", line);

        let response = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await?;

        error_for_status(response).await?;
        Ok(())
    }

    async fn query(&self, query: &FluxQuery) -> Result<Vec<FluxRecord>> {
        let flux = query.build();
        debug!("Running query:\n{}", flux);

        let body = json!({
            "query": flux,
            "type": "flux",
            "dialect": {
                "header": true,
                "delimiter": ",",
                "annotations": ["datatype", "group", "default"],
                "dateTimeFormat": "RFC3339",
            },
        });

        let response = self
            .client
            .post(self.endpoint("/api/v2/query"))
            .query(&[("org", self.org.as_str())])
            .header(ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await?;

        let text = error_for_status(response).await?.text().await?;
        annotated_csv::parse(&text)
    }

    async fn health(&self) -> Result<StoreHealth> {
        // An unhealthy server answers 503 with the same JSON shape.
        let response = self.client.get(self.endpoint("/health")).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<StoreHealth>(&bytes) {
            Ok(health) => Ok(health),
            Err(e) if status.is_success() => Err(Error::Json(e)),
            Err(_) => Err(Error::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }
}
