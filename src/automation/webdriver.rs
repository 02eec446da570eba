//! # automation::webdriver
//!
//! [`WebDriverUi`] — drives the brokerage tab through an already-open W3C
//! WebDriver session (chromedriver / geckodriver) over HTTP.
//!
//! ## Endpoints used
//! ```text
//! POST /session/{sid}/elements                 find by CSS selector
//! GET  /session/{sid}/element/{id}/displayed   visibility
//! GET  /session/{sid}/element/{id}/selected    toggle state
//! GET  /session/{sid}/element/{id}/text        rendered text
//! POST /session/{sid}/element/{id}/click
//! POST /session/{sid}/element/{id}/clear       + /value (fires input events)
//! POST /session/{sid}/execute/sync             scrollIntoView
//! ```
//!
//! `:has-text("…")` is not CSS, so the base selector is matched first and the
//! candidates are filtered by their rendered text, token by token.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::driver::{text_matches, DriverError, ElementHandle, MarketUiDriver, Selector};

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Per-request timeout. Bounded waits poll on top of this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

pub struct WebDriverUi {
    client:      reqwest::Client,
    session_url: String,   // {base}/session/{sid}
}

impl WebDriverUi {
    pub fn new(client: reqwest::Client, base_url: &str, session_id: &str) -> Self {
        Self {
            client,
            session_url: format!("{}/session/{}", base_url.trim_end_matches('/'), session_id),
        }
    }

    fn element_url(&self, element: &ElementHandle, command: &str) -> String {
        format!("{}/element/{}/{}", self.session_url, element.0, command)
    }

    async fn get(&self, url: &str) -> Result<Value, DriverError> {
        let request = self.client.get(url);
        self.send(request, url).await
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value, DriverError> {
        let request = self.client.post(url).json(&body);
        self.send(request, url).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value, DriverError> {
        let response = request
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, url, "WebDriver unreachable");
                DriverError::Transport(format!("WebDriver unreachable: {e}"))
            })?;

        let status = response.status();
        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(format!("WebDriver response parse error: {e}")))?;

        if status.is_success() {
            return Ok(body.value);
        }

        let code = body.value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = body.value.get("message").and_then(Value::as_str).unwrap_or_default();
        match code {
            "stale element reference" | "no such element" => Err(DriverError::Stale(message.to_string())),
            _ => Err(DriverError::Protocol(format!("HTTP {status} {code}: {message}"))),
        }
    }

    async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let url = format!("{}/elements", self.session_url);
        let value = self.post(&url, json!({ "using": "css selector", "value": css })).await?;
        Ok(parse_element_list(&value))
    }

    fn element_arg(element: &ElementHandle) -> Value {
        json!({ ELEMENT_KEY: element.0 })
    }
}

fn parse_element_list(value: &Value) -> Vec<ElementHandle> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(|id| ElementHandle(id.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl MarketUiDriver for WebDriverUi {
    async fn find_element(&self, selector: &Selector) -> Result<Option<ElementHandle>, DriverError> {
        let (css, text) = selector.split_text();
        let candidates = self.find_all(css).await?;

        let Some(text) = text else {
            return Ok(candidates.into_iter().next());
        };

        for element in candidates {
            match self.read_text(&element).await {
                Ok(rendered) if text_matches(&rendered, text) => return Ok(Some(element)),
                Ok(_) | Err(DriverError::Stale(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        debug!(%selector, "No candidate matched text filter");
        Ok(None)
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self.get(&self.element_url(element, "displayed")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_selected(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self.get(&self.element_url(element, "selected")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.post(&self.element_url(element, "click"), json!({})).await?;
        Ok(())
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.post(&self.element_url(element, "clear"), json!({})).await?;
        self.post(&self.element_url(element, "value"), json!({ "text": value })).await?;
        Ok(())
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self.get(&self.element_url(element, "text")).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let url = format!("{}/execute/sync", self.session_url);
        self.post(
            &url,
            json!({
                "script": "arguments[0].scrollIntoView({ block: 'center' });",
                "args": [Self::element_arg(element)],
            }),
        )
        .await?;
        Ok(())
    }
}
