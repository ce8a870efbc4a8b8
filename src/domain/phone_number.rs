/// Phone number domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provisioning lifecycle of a phone number
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhoneNumberState {
    Provisioning,
    Failed,
    Complete,
    Deprovisioned,
    #[serde(other)]
    Unknown,
}

/// Progress of an available-number search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchState {
    Searching,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

/// A phone number owned by the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneNumber {
    pub id: String,
    /// E.164 formatted number
    pub phone_number: String,
    pub state: PhoneNumberState,
    pub version: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl PhoneNumber {
    pub fn is_active(&self) -> bool {
        self.state == PhoneNumberState::Complete
    }
}

/// Geographic point used to search numbers near a location
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Result of an available phone number search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneNumberSearchResult {
    pub id: String,
    pub numbers: Vec<String>,
    pub country_code: String,
    pub gps: Option<GeoPoint>,
    pub prefix: Option<String>,
    pub state: SearchState,
}

/// ISO 3166-1 alpha-2 codes of countries where numbers can be provisioned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportedCountriesResult {
    pub countries: Vec<String>,
}

impl SupportedCountriesResult {
    pub fn supports(&self, country_code: &str) -> bool {
        self.countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country_code))
    }
}
