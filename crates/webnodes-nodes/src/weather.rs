//! OpenWeatherMap current conditions
//!
//! [`WeatherClient::current`] queries `data/2.5/weather` by city (and
//! optional country) or by coordinates. [`WeatherNode`] answers inbound
//! messages; [`WeatherWatch`] emits whenever the reported values change.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Method, StatusCode};
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
    client::{parse_json, status_error, ApiAuth, ApiClient},
    credentials::CredentialSource,
    ApiError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Default poll interval of a weather watcher
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

const TITLE: &str = "Current Weather Information";

/// Where to report the weather for
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    City {
        city: String,
        country: Option<String>,
    },
    Coordinates {
        lat: f64,
        lon: f64,
    },
}

impl WeatherQuery {
    /// Builds a query from optional settings, preferring coordinates
    pub fn from_parts(
        city: Option<&str>,
        country: Option<&str>,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<Self, NodeError> {
        if let (Some(lat), Some(lon)) = (lat, lon) {
            return Ok(Self::Coordinates { lat, lon });
        }
        match city.map(str::trim).filter(|c| !c.is_empty()) {
            Some(city) => Ok(Self::City {
                city: city.to_string(),
                country: country
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
            }),
            None => Err(NodeError::config("No location specified")),
        }
    }

    /// Overrides from an inbound message's `location`
    fn from_message(msg: &Message) -> Option<Self> {
        let location = msg.location.as_ref()?;
        Self::from_parts(
            location.city.as_deref(),
            location.country.as_deref(),
            location.lat,
            location.lon,
        )
        .ok()
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::City { city, country } => {
                let q = match country {
                    Some(country) => format!("{city},{country}"),
                    None => city.clone(),
                };
                vec![("q", q)]
            }
            Self::Coordinates { lat, lon } => {
                vec![("lat", lat.to_string()), ("lon", lon.to_string())]
            }
        }
    }

    fn key(&self) -> String {
        match self {
            Self::City { city, country } => match country {
                Some(country) => format!("{city},{country}"),
                None => city.clone(),
            },
            Self::Coordinates { lat, lon } => format!("{lat},{lon}"),
        }
    }
}

// ============================================================================
// Response shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    weather: Vec<Condition>,
    main: Main,
    #[serde(default)]
    wind: Wind,
    #[serde(default)]
    clouds: Clouds,
    coord: Coord,
    #[serde(default)]
    sys: Sys,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct Main {
    temp: f64,
    humidity: f64,
    temp_max: f64,
    temp_min: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Wind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Clouds {
    #[serde(default)]
    all: f64,
}

#[derive(Debug, Deserialize)]
struct Coord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Sys {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    sunrise: Option<i64>,
    #[serde(default)]
    sunset: Option<i64>,
}

/// Kelvin to Celsius, rounded to one decimal
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    ((kelvin - 273.15) * 10.0).round() / 10.0
}

/// Checks the `cod` field OpenWeatherMap puts in every body
///
/// It is a number on success and sometimes a string on errors.
fn check_cod(body: &Value) -> Result<(), ApiError> {
    let cod = match body.get("cod") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    match cod {
        Some(200) | None => Ok(()),
        Some(_) => Err(ApiError::Upstream(
            body.get("message")
                .and_then(Value::as_str)
                .unwrap_or("weather service error")
                .to_string(),
        )),
    }
}

/// Maps an error status, keeping the upstream `message` when the body has one
///
/// Unknown cities come back as HTTP 404 with `{"cod":"404","message":...}`.
fn error_response(status: StatusCode, text: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string));
    match message {
        Some(message) if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            status_error(status, message)
        }
        Some(message) => ApiError::Upstream(message),
        None => status_error(status, format!("HTTP {status}: {text}")),
    }
}

/// Reshapes a raw `weather` response into a message
pub fn weather_message(body: Value) -> Result<Message, ApiError> {
    check_cod(&body)?;
    let current: CurrentWeather = serde_json::from_value(body.clone())
        .map_err(|e| ApiError::InvalidResponse(format!("weather: {e}")))?;
    let condition = current
        .weather
        .first()
        .ok_or_else(|| ApiError::InvalidResponse("weather: no conditions".to_string()))?;

    let location = Location {
        lat: Some(current.coord.lat),
        lon: Some(current.coord.lon),
        city: Some(current.name.clone()).filter(|n| !n.is_empty()),
        country: current.sys.country.clone(),
    };
    let unix = |secs: Option<i64>| secs.and_then(|s| Utc.timestamp_opt(s, 0).single());
    let sunrise: Option<DateTime<Utc>> = unix(current.sys.sunrise);
    let sunset: Option<DateTime<Utc>> = unix(current.sys.sunset);

    let payload = json!({
        "weather": condition.main,
        "detail": condition.description,
        "tempk": current.main.temp,
        "tempc": kelvin_to_celsius(current.main.temp),
        "humidity": current.main.humidity,
        "maxtemp": current.main.temp_max,
        "mintemp": current.main.temp_min,
        "windspeed": current.wind.speed,
        "winddirection": current.wind.deg,
        "location": current.name,
        "sunrise": sunrise,
        "sunset": sunset,
        "clouds": current.clouds.all,
    });

    Ok(Message::new(payload)
        .with_description(format!(
            "Current weather information at coordinates: {}, {}",
            current.coord.lat, current.coord.lon
        ))
        .with_title(TITLE)
        .with_location(location)
        .with_data(body))
}

// ============================================================================
// WeatherClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct WeatherClient {
    api: ApiClient,
}

impl WeatherClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(
                base_url,
                ApiAuth::QueryParam {
                    name: "APPID",
                    value: api_key.into(),
                },
            ),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.api = self.api.with_http_client(http);
        self
    }

    /// Current conditions as a message
    pub async fn current(&self, query: &WeatherQuery) -> Result<Message, ApiError> {
        let params = query.params();
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        debug!(query = %query.key(), "Fetching current weather");
        let response = self
            .api
            .execute_with_retry(|| self.api.request(Method::GET, "/data/2.5/weather").query(&params))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_response(status, &text));
        }
        let body: Value = parse_json(response).await?;
        weather_message(body)
    }
}

/// Settings shared by the query node and the watcher
#[derive(Debug, Clone)]
pub struct WeatherSettings {
    pub credentials: CredentialSource,
    pub base_url: String,
    pub http: reqwest::Client,
}

impl WeatherSettings {
    pub fn new(credentials: CredentialSource) -> Self {
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

    async fn client(&self) -> Result<WeatherClient, NodeError> {
        let key = self.credentials.api_key().await?;
        Ok(WeatherClient::with_base_url(self.base_url.as_str(), key)
            .with_http_client(self.http.clone()))
    }
}

// ============================================================================
// WeatherNode
// ============================================================================

/// Reports the current weather for each inbound message
///
/// The message's `location` overrides the configured query.
pub struct WeatherNode {
    settings: WeatherSettings,
    query: Option<WeatherQuery>,
}

impl WeatherNode {
    pub fn new(settings: WeatherSettings, query: Option<WeatherQuery>) -> Self {
        Self { settings, query }
    }
}

#[async_trait]
impl InputNode for WeatherNode {
    fn kind(&self) -> &'static str {
        "openweathermap"
    }

    async fn on_input(&self, msg: Message, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let query = WeatherQuery::from_message(&msg)
            .or_else(|| self.query.clone())
            .ok_or_else(|| NodeError::config("No location specified"))?;
        let client = self.settings.client().await?;

        ctx.status(NodeStatus::busy("requesting"));
        let mut out = client.current(&query).await?;
        out.topic = msg.topic;
        ctx.status(NodeStatus::clear());
        ctx.send(out);
        Ok(())
    }
}

// ============================================================================
// WeatherWatch
// ============================================================================

/// Emits the weather once at start and again whenever it changes
pub struct WeatherWatch {
    settings: WeatherSettings,
    query: WeatherQuery,
    subscription: SubscriptionId,
    interval: Duration,
    latest: Option<Message>,
}

impl WeatherWatch {
    pub fn new(settings: WeatherSettings, query: WeatherQuery) -> Result<Self, NodeError> {
        let subscription = SubscriptionId::new(format!("weather:{}", query.key()))?;
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
impl WatchSource for WeatherWatch {
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
        let msg = client.current(&self.query).await?;
        let entry = ListingEntry::new(self.query.key(), msg.payload.clone());
        self.latest = Some(msg);
        Ok(FetchOutcome::snapshot(vec![entry]))
    }

    fn message_for(&self, event: &ChangeEvent) -> Message {
        match &self.latest {
            Some(latest) => latest.clone(),
            None => Message::new(event.payload.clone()).with_title(TITLE),
        }
    }
}
