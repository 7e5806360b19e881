//! Reverse geocoding and the adaptive backoff around it.

use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::utils::config::{GeocodeDefaults, PackagePaths};

/// Failure classes the retry loop cares about.
#[derive(Debug)]
pub enum GeocodeError {
    /// Timeouts, connection failures, rate limiting: worth retrying.
    Transient(String),
    /// Bad request or unparseable answer: retrying will not help.
    Permanent(String),
}

impl fmt::Display for GeocodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeError::Transient(m) => write!(f, "transient geocoding error: {m}"),
            GeocodeError::Permanent(m) => write!(f, "geocoding error: {m}"),
        }
    }
}

impl std::error::Error for GeocodeError {}

pub trait Geocoder: Send + Sync {
    /// Address for a position, or `None` when nothing is there.
    fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<String>, GeocodeError>;
}

/// OpenStreetMap Nominatim `/reverse`.
pub struct NominatimGeocoder {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct NominatimReply {
    display_name: Option<String>,
    #[serde(default)]
    address: BTreeMap<String, String>,
    error: Option<String>,
}

/// Address parts already in `display_name` or too coarse to be a point of interest.
const GENERIC_ADDRESS_KEYS: &[&str] = &[
    "country_code",
    "country",
    "state",
    "county",
    "city",
    "town",
    "village",
    "postcode",
    "road",
    "house_number",
];

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(GeocodeDefaults::REQUEST_TIMEOUT)
            .user_agent(PackagePaths::get().user_agent())
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new(GeocodeDefaults::NOMINATIM_URL)
    }
}

impl Geocoder for NominatimGeocoder {
    fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<String>, GeocodeError> {
        let resp = self
            .agent
            .get(&format!("{}/reverse", self.base_url))
            .query("format", "jsonv2")
            .query("lat", &lat.to_string())
            .query("lon", &lon.to_string())
            .query("zoom", "18")
            .query("addressdetails", "1")
            .query("accept-language", "en")
            .call();
        let resp = match resp {
            Ok(r) => r,
            Err(ureq::Error::Status(code, _)) if code == 429 || code >= 500 => {
                return Err(GeocodeError::Transient(format!("HTTP {code}")));
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(GeocodeError::Permanent(format!("HTTP {code}")));
            }
            Err(e) => return Err(GeocodeError::Transient(e.to_string())),
        };
        let reply: NominatimReply = resp
            .into_json()
            .map_err(|e| GeocodeError::Permanent(format!("bad response: {e}")))?;
        if let Some(err) = reply.error {
            debug!("nominatim: {err} at {lat},{lon}");
            return Ok(None);
        }
        let Some(address) = reply.display_name else {
            return Ok(None);
        };
        let poi: Vec<String> = reply
            .address
            .iter()
            .filter(|(k, v)| !GENERIC_ADDRESS_KEYS.contains(&k.as_str()) && !v.is_empty())
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        if poi.is_empty() {
            Ok(Some(address))
        } else {
            Ok(Some(format!("{address} | {}", poi.join(", "))))
        }
    }
}

/// Wait between geocoder calls shared by all workers of a stage: doubles after a transient
/// failure, halves (never below the initial wait) after a success.
pub struct Backoff {
    initial: Duration,
    max_retries: u32,
    current: Mutex<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max_retries: max_retries.max(1),
            current: Mutex::new(initial),
        }
    }

    pub fn current(&self) -> Duration {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_success(&self) {
        let mut cur = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *cur = (*cur / 2).max(self.initial);
    }

    fn on_failure(&self) -> Duration {
        let mut cur = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *cur = cur.saturating_mul(2);
        *cur
    }

    /// Run `op` up to `max_retries` times, sleeping the doubled wait after each transient
    /// failure. Permanent failures and the last transient one are returned as-is.
    pub fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, GeocodeError>,
    ) -> Result<T, GeocodeError> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => {
                    self.on_success();
                    return Ok(v);
                }
                Err(GeocodeError::Transient(msg)) if attempt < self.max_retries => {
                    let wait = self.on_failure();
                    warn!(
                        "Network error for {label} (attempt {attempt}/{}): {msg}. Waiting {:.1}s before retry...",
                        self.max_retries,
                        wait.as_secs_f64()
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(GeocodeError::Transient(msg)) => {
                    return Err(GeocodeError::Transient(format!(
                        "gave up after {} attempts: {msg}",
                        self.max_retries
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
