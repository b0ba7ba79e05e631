//! Event types shared across the gateway

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::errors::{GatewayError, Result};

/// Downstream advertising platform identifier
///
/// Platforms are open-ended: the set in use comes from configuration,
/// so this is a normalized (lowercase) string rather than an enum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PlatformId(String);

impl PlatformId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlatformId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<PlatformId> for String {
    fn from(id: PlatformId) -> Self {
        id.0
    }
}

/// Standard conversion event names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventName {
    PageView,
    ViewContent,
    AddToCart,
    InitiateCheckout,
    AddPaymentInfo,
    Purchase,
    Lead,
    CompleteRegistration,
    Search,
    Subscribe,
    /// Any site-specific event name
    Custom(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::PageView => "PageView",
            EventName::ViewContent => "ViewContent",
            EventName::AddToCart => "AddToCart",
            EventName::InitiateCheckout => "InitiateCheckout",
            EventName::AddPaymentInfo => "AddPaymentInfo",
            EventName::Purchase => "Purchase",
            EventName::Lead => "Lead",
            EventName::CompleteRegistration => "CompleteRegistration",
            EventName::Search => "Search",
            EventName::Subscribe => "Subscribe",
            EventName::Custom(name) => name,
        }
    }

    /// Whether the event represents a conversion (as opposed to browsing)
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            EventName::Purchase
                | EventName::Lead
                | EventName::CompleteRegistration
                | EventName::Subscribe
        )
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        // Accept both "AddToCart" and "add_to_cart" spellings
        let key: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "pageview" => EventName::PageView,
            "viewcontent" => EventName::ViewContent,
            "addtocart" => EventName::AddToCart,
            "initiatecheckout" => EventName::InitiateCheckout,
            "addpaymentinfo" => EventName::AddPaymentInfo,
            "purchase" => EventName::Purchase,
            "lead" => EventName::Lead,
            "completeregistration" => EventName::CompleteRegistration,
            "search" => EventName::Search,
            "subscribe" => EventName::Subscribe,
            _ => EventName::Custom(name.trim().to_string()),
        }
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.as_str().to_string()
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-page behavioral metrics collected by the edge client
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    /// Maximum scroll depth reached, in percent (0-100)
    #[serde(default)]
    pub scroll_depth: f64,
    /// Time spent on the page in milliseconds
    #[serde(default, rename = "time_on_page")]
    pub time_on_page_ms: u64,
    /// Number of clicks recorded on the page
    #[serde(default)]
    pub clicks: u32,
}

impl BehaviorMetrics {
    pub fn new(scroll_depth: f64, time_on_page_ms: u64, clicks: u32) -> Self {
        Self {
            scroll_depth,
            time_on_page_ms,
            clicks,
        }
    }

    /// True when at least one metric carries a non-zero reading
    pub fn has_activity(&self) -> bool {
        (self.scroll_depth.is_finite() && self.scroll_depth > 0.0)
            || self.time_on_page_ms > 0
            || self.clicks > 0
    }
}

/// Borrowed view of everything the trust scorer may look at
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub headers: &'a BTreeMap<String, String>,
    pub behavior: &'a BehaviorMetrics,
    /// Set when the subject/IP exceeded the configured event rate
    pub rate_limited: bool,
}

impl<'a> RequestContext<'a> {
    /// Look up a header by its lowercase name
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn user_agent(&self) -> Option<&'a str> {
        self.header("user-agent")
    }
}

/// Immutable tracking event accepted by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Globally unique id; the idempotency key end-to-end
    pub event_id: String,
    /// Pseudonymous visitor id from the identity process
    pub subject_id: Option<String>,
    pub event_name: EventName,
    pub occurred_at: DateTime<Utc>,
    pub value: Option<Decimal>,
    pub currency: Option<String>,
    /// Platform click identifiers (gclid, fbclid, ttclid, ...)
    pub click_ids: BTreeMap<String, String>,
    /// Request headers with lowercase names
    pub headers: BTreeMap<String, String>,
    pub behavior: BehaviorMetrics,
}

impl TrackingEvent {
    /// Validate an inbound payload and freeze it into a tracking event
    ///
    /// `received_at` fills in a missing `occurred_at`.
    pub fn from_inbound(inbound: InboundEvent, received_at: DateTime<Utc>) -> Result<Self> {
        let event_name = inbound
            .event_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| GatewayError::Validation("missing event_name".to_string()))?;

        let event_id = inbound
            .event_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Validation("missing event_id".to_string()))?;

        if let Some(value) = inbound.value {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(GatewayError::Validation(format!(
                    "event {} has negative value {}",
                    event_id, value
                )));
            }
        }

        // A bad currency code never costs the event; it is dropped instead
        let currency = inbound.currency.and_then(|raw| {
            let code = raw.trim().to_uppercase();
            if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                Some(code)
            } else {
                warn!(event_id = %event_id, currency = %raw, "Ignoring malformed currency code");
                None
            }
        });

        let headers = inbound
            .headers
            .into_iter()
            .map(|(name, value)| (name.trim().to_lowercase(), value))
            .collect();

        Ok(Self {
            event_id,
            subject_id: inbound
                .subject_id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            event_name: EventName::from(event_name),
            occurred_at: inbound.occurred_at.unwrap_or(received_at),
            value: inbound.value,
            currency,
            click_ids: inbound.click_ids,
            headers,
            behavior: inbound.behavior.unwrap_or_default(),
        })
    }

    /// Build the scorer's view of this event
    pub fn request_context(&self, rate_limited: bool) -> RequestContext<'_> {
        RequestContext {
            headers: &self.headers,
            behavior: &self.behavior,
            rate_limited,
        }
    }

    /// Client IP as reported by the edge (first `x-forwarded-for` hop)
    pub fn client_ip(&self) -> Option<&str> {
        self.headers
            .get("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .or_else(|| self.headers.get("x-real-ip").map(|v| v.as_str()))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Raw inbound payload; every field is optional on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub click_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub behavior: Option<BehaviorMetrics>,
}
