//! TfL cycle hire docking stations
//!
//! Looks up a station by id (`BikePoint/{id}`) or the nearest one to a
//! position (`BikePoint?lat=&lon=&radius=`) and reports its bike and dock
//! counts. An application key is optional.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use webnodes_core::{
    diff::{BaselinePolicy, ChangePolicy, DiffOptions, ListingEntry},
    ports::{InputNode, NodeContext, NodeStatus},
    ChangeEvent, Location, Message, NodeError, SubscriptionId, WatchState,
};
use webnodes_watch::{FetchOutcome, WatchError, WatchSource};

use crate::{
    client::{parse_json, ApiAuth, ApiClient},
    credentials::CredentialSource,
    ApiError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.tfl.gov.uk";

/// Default poll interval of a station watcher
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Search radius for the nearest station, in metres
pub const SEARCH_RADIUS_METRES: u32 = 500;

/// Which station to report
#[derive(Debug, Clone, PartialEq)]
pub enum StationQuery {
    /// A BikePoint id such as `BikePoints_1`
    Station(String),
    Nearest { lat: f64, lon: f64 },
}

impl StationQuery {
    /// Builds a query from optional settings, preferring a named station
    pub fn from_parts(
        station: Option<&str>,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<Self, NodeError> {
        if let Some(station) = station.map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(Self::Station(station.to_string()));
        }
        match (lat, lon) {
            (Some(lat), Some(lon)) => Ok(Self::Nearest { lat, lon }),
            _ => Err(NodeError::config("No station or location specified")),
        }
    }

    fn key(&self) -> String {
        match self {
            Self::Station(id) => id.clone(),
            Self::Nearest { lat, lon } => format!("{lat},{lon}"),
        }
    }
}

// ============================================================================
// Response shape
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Place {
    id: String,
    common_name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    additional_properties: Vec<Property>,
}

#[derive(Debug, Clone, Deserialize)]
struct Property {
    key: String,
    value: String,
}

/// Search answers come either as a bare array or wrapped in `places`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Places { places: Vec<Place> },
    List(Vec<Place>),
}

impl Place {
    fn count(&self, key: &str) -> Option<u64> {
        self.additional_properties
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.value.trim().parse().ok())
    }
}

/// Bike and dock counts of one station
#[derive(Debug, Clone, PartialEq)]
pub struct StationStatus {
    pub id: String,
    pub name: String,
    pub bikes: Option<u64>,
    pub empty_docks: Option<u64>,
    pub total_docks: Option<u64>,
    pub distance: Option<f64>,
    pub lat: f64,
    pub lon: f64,
}

impl From<Place> for StationStatus {
    fn from(place: Place) -> Self {
        Self {
            bikes: place.count("NbBikes"),
            empty_docks: place.count("NbEmptyDocks"),
            total_docks: place.count("NbDocks"),
            id: place.id,
            name: place.common_name,
            distance: place.distance,
            lat: place.lat,
            lon: place.lon,
        }
    }
}

impl StationStatus {
    /// Compared between polls
    pub fn fingerprint(&self) -> Value {
        json!({
            "bikes": self.bikes,
            "emptyDocks": self.empty_docks,
            "totalDocks": self.total_docks,
        })
    }

    pub fn to_message(&self) -> Message {
        Message::new(json!({
            "name": self.name,
            "id": self.id,
            "bikes": self.bikes,
            "emptyDocks": self.empty_docks,
            "totalDocks": self.total_docks,
            "distance": self.distance,
        }))
        .with_location(Location::at(self.lat, self.lon))
        .with_title(format!("Cycle hire station {}", self.name))
        .with_description(format!(
            "{} bikes and {} empty docks at {}",
            self.bikes.map_or_else(|| "?".to_string(), |n| n.to_string()),
            self.empty_docks
                .map_or_else(|| "?".to_string(), |n| n.to_string()),
            self.name
        ))
    }
}

// ============================================================================
// CycleHireClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct CycleHireClient {
    api: ApiClient,
}

impl CycleHireClient {
    pub fn new(base_url: impl Into<String>, app_key: Option<String>) -> Self {
        let auth = match app_key {
            Some(value) => ApiAuth::QueryParam {
                name: "app_key",
                value,
            },
            None => ApiAuth::None,
        };
        Self {
            api: ApiClient::new(base_url, auth),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(http);
        self
    }

    pub async fn station(&self, query: &StationQuery) -> Result<StationStatus, ApiError> {
        match query {
            StationQuery::Station(id) => {
                let path = format!("/BikePoint/{}", utf8_percent_encode(id, PATH_SEGMENT));
                let place: Place = self.api.get_json(&path, &[]).await?;
                Ok(place.into())
            }
            StationQuery::Nearest { lat, lon } => self.nearest(*lat, *lon).await,
        }
    }

    async fn nearest(&self, lat: f64, lon: f64) -> Result<StationStatus, ApiError> {
        let (lat_s, lon_s) = (lat.to_string(), lon.to_string());
        let radius = SEARCH_RADIUS_METRES.to_string();
        let response = self
            .api
            .send(|| {
                self.api.request(Method::GET, "/BikePoint").query(&[
                    ("lat", lat_s.as_str()),
                    ("lon", lon_s.as_str()),
                    ("radius", radius.as_str()),
                ])
            })
            .await?;
        let places = match parse_json::<SearchResponse>(response).await? {
            SearchResponse::Places { places } | SearchResponse::List(places) => places,
        };
        debug!(lat, lon, found = places.len(), "Searched docking stations");

        places
            .into_iter()
            .min_by(|a, b| {
                let d = |p: &Place| p.distance.unwrap_or(f64::MAX);
                d(a).total_cmp(&d(b))
            })
            .map(StationStatus::from)
            .ok_or_else(|| {
                ApiError::Upstream(format!(
                    "No docking stations within {SEARCH_RADIUS_METRES}m"
                ))
            })
    }
}

/// Optional app key and endpoint shared by the query node and the watcher
#[derive(Debug, Clone)]
pub struct CycleHireSettings {
    pub credentials: Option<CredentialSource>,
    pub base_url: String,
    pub http: reqwest::Client,
}

impl CycleHireSettings {
    pub fn new(credentials: Option<CredentialSource>) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn client(&self) -> Result<CycleHireClient, NodeError> {
        let app_key = match &self.credentials {
            Some(source) => Some(source.api_key().await?),
            None => None,
        };
        Ok(CycleHireClient::new(self.base_url.as_str(), app_key)
            .with_http_client(self.http.clone()))
    }
}

// ============================================================================
// CycleHireNode
// ============================================================================

/// Reports a station for each inbound message
///
/// `msg.station` or the coordinates in `msg.location` override the
/// configured query.
pub struct CycleHireNode {
    settings: CycleHireSettings,
    query: Option<StationQuery>,
}

impl CycleHireNode {
    pub fn new(settings: CycleHireSettings, query: Option<StationQuery>) -> Self {
        Self { settings, query }
    }
}

#[async_trait]
impl InputNode for CycleHireNode {
    fn kind(&self) -> &'static str {
        "tfl bikes"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let coordinates = msg.location.as_ref().and_then(|l| l.coordinates());
        let query = StationQuery::from_parts(
            msg.str_field("station"),
            coordinates.map(|c| c.0),
            coordinates.map(|c| c.1),
        )
        .ok()
        .or_else(|| self.query.clone())
        .ok_or_else(|| NodeError::config("No station or location specified"))?;
        let client = self.settings.client().await?;

        ctx.status(NodeStatus::busy("requesting"));
        let mut out = client.station(&query).await?.to_message();
        out.topic = msg.topic;
        ctx.status(NodeStatus::clear());
        ctx.send(out);
        Ok(())
    }
}

// ============================================================================
// CycleHireWatch
// ============================================================================

/// Emits the station once at start and again when its counts change
pub struct CycleHireWatch {
    settings: CycleHireSettings,
    query: StationQuery,
    subscription: SubscriptionId,
    interval: Duration,
    latest: Option<StationStatus>,
}

impl CycleHireWatch {
    pub fn new(settings: CycleHireSettings, query: StationQuery) -> Result<Self, NodeError> {
        let subscription = SubscriptionId::new(format!("cyclehire:{}", query.key()))?;
        Ok(Self {
            settings,
            query,
            subscription,
            interval: DEFAULT_POLL_INTERVAL,
            latest: None,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl WatchSource for CycleHireWatch {
    fn subscription(&self) -> SubscriptionId {
        self.subscription.clone()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            change_policy: ChangePolicy::ReportChanged,
            baseline: BaselinePolicy::Emit,
            ..DiffOptions::default()
        }
    }

    async fn fetch(&mut self, _state: &WatchState) -> Result<FetchOutcome, WatchError> {
        let client = self.settings.client().await?;
        let status = client.station(&self.query).await?;
        let entry = ListingEntry::with_payload(
            status.id.clone(),
            status.fingerprint(),
            status.to_message().payload,
        );
        self.latest = Some(status);
        Ok(FetchOutcome::snapshot(vec![entry]))
    }

    fn message_for(&self, event: &ChangeEvent) -> Message {
        let mut msg = match &self.latest {
            Some(status) => status.to_message(),
            None => Message::new(event.payload.clone()),
        };
        msg.event = Some(event.kind);
        msg
    }
}
