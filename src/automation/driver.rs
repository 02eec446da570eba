//! # automation::driver
//!
//! [`MarketUiDriver`] — the narrow seam between the trading core and the live
//! brokerage page. Order execution only ever talks to the page through this
//! trait, so decision logic can be exercised against a scripted page and only
//! the WebDriver implementation touches a real browser.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::wait::{self, WaitPolicy};

// ─── Selector ─────────────────────────────────────────────────────────────────

/// A CSS selector, optionally narrowed by a vendor `:has-text("…")` suffix.
///
/// The selector engine behind the driver resolves it; this type only splits
/// the text filter off so drivers without native support can apply it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    raw: String,
}

impl Selector {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// `base` narrowed to elements whose text contains the tokens of `text`
    /// (see [`text_matches`]).
    pub fn with_text(base: &str, text: &str) -> Self {
        Self::new(format!("{base}:has-text(\"{text}\")"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `(css, text filter)`. A selector without `:has-text` has no filter.
    pub fn split_text(&self) -> (&str, Option<&str>) {
        match self.raw.find(":has-text(") {
            Some(start) => {
                let css = self.raw[..start].trim_end();
                let inner = &self.raw[start + ":has-text(".len()..];
                let inner = inner.strip_suffix(')').unwrap_or(inner);
                let text = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                (css, Some(text))
            }
            None => (self.raw.as_str(), None),
        }
    }
}

/// Whether an element's `rendered` text satisfies a `:has-text` filter.
///
/// Both sides are split into whitespace tokens and every filter token must
/// appear in `rendered`, in order. Numeric tokens compare by value and the
/// rest case-insensitively, so a `450` strike matches `450.00` but never a
/// `1450` volume or a `4500` open interest.
pub fn text_matches(rendered: &str, filter: &str) -> bool {
    let mut tokens = rendered.split_whitespace().map(bare_token);
    filter
        .split_whitespace()
        .map(bare_token)
        .all(|wanted| tokens.any(|token| token_eq(token, wanted)))
}

/// Strip surrounding punctuation (`$450.00,` → `450.00`).
fn bare_token(token: &str) -> &str {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '.')
        .trim_end_matches('.')
}

fn token_eq(token: &str, wanted: &str) -> bool {
    match (token.parse::<f64>(), wanted.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => token.eq_ignore_ascii_case(wanted),
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Opaque reference to an element the driver found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Failure talking to the page itself (transport, protocol, stale element).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver transport error: {0}")]
    Transport(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),

    #[error("stale element reference: {0}")]
    Stale(String),
}

/// Failure of one automation step.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("timed out after {waited:?} waiting for {selector}")]
    Timeout { selector: String, waited: Duration },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

// ─── Driver trait ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait MarketUiDriver: Send + Sync {
    /// First element matching `selector`, if any.
    async fn find_element(&self, selector: &Selector) -> Result<Option<ElementHandle>, DriverError>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// Whether a toggle / radio / checkbox control is currently selected.
    async fn is_selected(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Replace the value of an input so the host page's own framework
    /// observes the change (input event dispatched).
    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    async fn read_text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Find `selector` or fail with [`AutomationError::NotFound`].
    async fn require(&self, selector: &Selector) -> Result<ElementHandle, AutomationError> {
        self.find_element(selector)
            .await?
            .ok_or_else(|| AutomationError::NotFound(selector.to_string()))
    }

    /// Bounded poll until `selector` is present and visible.
    async fn wait_for_visible(
        &self,
        selector: &Selector,
        policy: WaitPolicy,
    ) -> Result<ElementHandle, AutomationError> {
        wait::wait_for_visible(self, selector, policy).await
    }
}
