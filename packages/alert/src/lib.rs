#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Issued dengue alerts.
//!
//! An [`AlertDocument`] stamps a forecast's [`AlertPayload`] with an
//! identifier and issue time, and renders it as JSON for machines or as a
//! Dublin Core XML record for catalogue systems.

use chrono::{DateTime, SecondsFormat, Utc};
use dengue_watch_forecast_models::{AlertPayload, ModelKind, Severity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Event name carried by every alert.
pub const EVENT: &str = "Dengue";

/// Name recorded as creator and publisher of rendered records.
pub const PUBLISHER: &str = "dengue_watch";

const DUBLIN_CORE_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Errors that can occur while rendering an alert.
#[derive(Debug, Error)]
pub enum AlertError {
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A forecast issued as an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDocument {
    /// Unique alert identifier.
    pub identifier: Uuid,
    /// When the alert was issued.
    pub issued_at: DateTime<Utc>,
    /// Always [`EVENT`].
    pub event: String,
    /// Severity tier of the forecast.
    pub severity: Severity,
    /// Predicted case count.
    pub predicted_cases: u64,
    /// Forecast month as `YYYY-MM`.
    pub target_period: String,
    /// IBGE municipality code.
    pub municipality_code: String,
    /// Municipality display name.
    pub municipality_name: String,
    /// Two-letter state code.
    pub state: String,
    /// Municipality latitude.
    pub latitude: f64,
    /// Municipality longitude.
    pub longitude: f64,
    /// Validation summary of the model behind the forecast.
    pub confidence_note: String,
    /// How that model was obtained.
    pub model: ModelKind,
}

impl AlertDocument {
    /// Issues `payload` now, with a fresh random identifier.
    #[must_use]
    pub fn issue(payload: &AlertPayload) -> Self {
        let document = Self::new(payload, Uuid::new_v4(), Utc::now());
        log::debug!(
            "Issued alert {} for {} {}",
            document.identifier,
            document.municipality_code,
            document.target_period
        );
        document
    }

    /// Builds a document with an explicit identifier and issue time.
    #[must_use]
    pub fn new(payload: &AlertPayload, identifier: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            identifier,
            issued_at,
            event: EVENT.to_string(),
            severity: payload.severity,
            predicted_cases: payload.predicted_cases,
            target_period: payload.target.to_string(),
            municipality_code: payload.municipality.code.clone(),
            municipality_name: payload.municipality.name.clone(),
            state: payload.municipality.state.clone(),
            latitude: payload.municipality.latitude,
            longitude: payload.municipality.longitude,
            confidence_note: payload.confidence_note.clone(),
            model: payload.model,
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, AlertError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Dublin Core XML record.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let place = format!("{} ({})", self.municipality_name, self.state);
        let fields = [
            (
                "title",
                format!("{EVENT} alert: {place}, {}", self.target_period),
            ),
            ("creator", PUBLISHER.to_string()),
            ("subject", format!("{EVENT} fever; arbovirus surveillance")),
            ("description", self.description()),
            ("publisher", PUBLISHER.to_string()),
            (
                "date",
                self.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("type", "Alert".to_string()),
            ("format", "application/xml".to_string()),
            ("identifier", format!("urn:uuid:{}", self.identifier)),
            (
                "source",
                "Monthly notified dengue cases, climate readings, and population estimates"
                    .to_string(),
            ),
            ("language", "en".to_string()),
            (
                "coverage",
                format!(
                    "{place}, Brazil; IBGE {}; {:.4}, {:.4}; {}",
                    self.municipality_code, self.latitude, self.longitude, self.target_period
                ),
            ),
            (
                "rights",
                "Forecast for public health planning; not a clinical diagnosis".to_string(),
            ),
        ];

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!("<record xmlns:dc=\"{DUBLIN_CORE_NS}\">\n"));
        for (element, value) in fields {
            xml.push_str(&format!(
                "    <dc:{element}>{}</dc:{element}>\n",
                escape_xml(&value)
            ));
        }
        xml.push_str("</record>\n");
        xml
    }

    /// One-paragraph human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "{} severity: {} {} case(s) predicted in {} ({}) for {}. {}",
            self.severity,
            self.predicted_cases,
            EVENT.to_lowercase(),
            self.municipality_name,
            self.state,
            self.target_period,
            self.confidence_note
        )
    }

    /// Multi-line terminal summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} {} ({}) {}\n  Predicted cases: {}\n  Severity:        {}\n  Model:           {}\n  Confidence:      {}\n  Alert:           {}",
            EVENT,
            self.municipality_name,
            self.state,
            self.target_period,
            self.predicted_cases,
            self.severity,
            self.model,
            self.confidence_note,
            self.identifier
        )
    }
}

/// Escapes the five XML special characters.
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
