use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use avl_analyzer::analyzers::types::PositionSample;
use avl_analyzer::fetch::auth::UrlParam;
use avl_analyzer::fetch::{BasicClient, fetch_bytes};
use avl_analyzer::parser::{parse_positions, parse_routes, parse_stop_locations, parse_timetable};
use avl_analyzer::reference::{RouteStop, StopLocation, TimetableKey};
use reqwest::Url;
use tracing::debug;

use crate::services::transit_api::TransitApi;

pub const API_URL: &str = "https://api.um.warszawa.pl/api/action/";

const POSITIONS_RESOURCE: &str = "f2e5503e-927d-4ad3-9500-4ab9e55deb59";
const STOPS_RESOURCE: &str = "ab75c33d-3a26-4342-b36a-6e5fef0a3ac3";
const TIMETABLE_RESOURCE: &str = "e923fa0e-d96c-43f9-ae6e-60518c9f3238";

/// Vehicle type filter for positions: 1 is buses, 2 is trams.
const BUSES: &str = "1";

pub struct WarsawApiClient {
    base_url: String,
    http: UrlParam<BasicClient>,
}

impl WarsawApiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = BasicClient::with_timeout(Duration::from_secs(10))?;

        Ok(Self {
            base_url: API_URL.to_string(),
            http: UrlParam::new(http, "apikey", api_key),
        })
    }

    fn url(&self, action: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, action))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn get(&self, action: &str, params: &[(&str, &str)]) -> Result<bytes::Bytes> {
        let url = self.url(action, params)?;
        let bytes = fetch_bytes(&self.http, url.as_str()).await?;
        debug!(action, bytes = bytes.len(), "API response received");
        Ok(bytes)
    }
}

#[async_trait]
impl TransitApi for WarsawApiClient {
    async fn vehicle_positions(&self) -> Result<Vec<PositionSample>> {
        let bytes = self
            .get(
                "busestrams_get",
                &[("resource_id", POSITIONS_RESOURCE), ("type", BUSES)],
            )
            .await?;
        parse_positions(&bytes)
    }

    async fn stop_locations(&self) -> Result<Vec<StopLocation>> {
        let bytes = self.get("dbstore_get", &[("id", STOPS_RESOURCE)]).await?;
        parse_stop_locations(&bytes)
    }

    async fn routes(&self) -> Result<Vec<RouteStop>> {
        let bytes = self.get("public_transport_routes", &[]).await?;
        parse_routes(&bytes)
    }

    async fn departures(&self, key: &TimetableKey) -> Result<Vec<String>> {
        let bytes = self
            .get(
                "dbtimetable_get",
                &[
                    ("id", TIMETABLE_RESOURCE),
                    ("busstopId", &key.stop_group),
                    ("busstopNr", &key.stop_post),
                    ("line", &key.route_id),
                ],
            )
            .await?;
        parse_timetable(&bytes)
    }
}
