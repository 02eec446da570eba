//! # automation::scripted
//!
//! [`ScriptedDriver`] — an in-process stand-in for the brokerage page.
//!
//! Every selector exists and is visible unless scripted otherwise, which makes
//! it the paper-trading driver (`WEBDRIVER_URL=mock`) as well as the page used
//! by tests to inject missing elements, slow renders and failing clicks.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::driver::{DriverError, ElementHandle, MarketUiDriver, Selector};

/// One interaction recorded by the scripted page, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    Click(String),
    SetValue(String, String),
    Scroll(String),
}

#[derive(Debug, Default)]
struct Page {
    removed: HashSet<String>,
    hidden: HashSet<String>,
    visible_after: HashMap<String, u32>,
    selected: HashSet<String>,
    failing_clicks: HashSet<String>,
    texts: HashMap<String, String>,
    polls: HashMap<String, u32>,
    actions: Vec<PageAction>,
}

#[derive(Debug, Default)]
pub struct ScriptedDriver {
    page: Mutex<Page>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_page<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        let mut page = self.page.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut page)
    }

    // ── Scripting ────────────────────────────────────────────────────────────

    /// `selector` no longer matches anything.
    pub fn remove(&self, selector: &str) {
        self.with_page(|p| p.removed.insert(selector.to_string()));
    }

    /// `selector` matches but never becomes visible.
    pub fn hide(&self, selector: &str) {
        self.with_page(|p| p.hidden.insert(selector.to_string()));
    }

    /// `selector` becomes visible after `polls` lookups.
    pub fn visible_after(&self, selector: &str, polls: u32) {
        self.with_page(|p| p.visible_after.insert(selector.to_string(), polls));
    }

    pub fn select(&self, selector: &str) {
        self.with_page(|p| p.selected.insert(selector.to_string()));
    }

    pub fn fail_clicks_on(&self, selector: &str) {
        self.with_page(|p| p.failing_clicks.insert(selector.to_string()));
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.with_page(|p| p.texts.insert(selector.to_string(), text.to_string()));
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn actions(&self) -> Vec<PageAction> {
        self.with_page(|p| p.actions.clone())
    }

    pub fn clicks(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::Click(sel) => Some(sel),
                _ => None,
            })
            .collect()
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.actions().into_iter().rev().find_map(|a| match a {
            PageAction::SetValue(sel, v) if sel == selector => Some(v),
            _ => None,
        })
    }

    pub fn poll_count(&self, selector: &str) -> u32 {
        self.with_page(|p| p.polls.get(selector).copied().unwrap_or(0))
    }
}

#[async_trait]
impl MarketUiDriver for ScriptedDriver {
    async fn find_element(&self, selector: &Selector) -> Result<Option<ElementHandle>, DriverError> {
        let key = selector.as_str().to_string();
        Ok(self.with_page(|p| {
            *p.polls.entry(key.clone()).or_insert(0) += 1;
            (!p.removed.contains(&key)).then(|| ElementHandle(key))
        }))
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.with_page(|p| {
            if p.hidden.contains(&element.0) {
                return false;
            }
            match p.visible_after.get(&element.0) {
                Some(&after) => p.polls.get(&element.0).copied().unwrap_or(0) > after,
                None => true,
            }
        }))
    }

    async fn is_selected(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.with_page(|p| p.selected.contains(&element.0)))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.with_page(|p| {
            if p.failing_clicks.contains(&element.0) {
                return Err(DriverError::Transport(format!("click on {} was not delivered", element.0)));
            }
            p.actions.push(PageAction::Click(element.0.clone()));
            p.selected.insert(element.0.clone());
            Ok(())
        })
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.with_page(|p| p.actions.push(PageAction::SetValue(element.0.clone(), value.to_string())));
        Ok(())
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        Ok(self.with_page(|p| p.texts.get(&element.0).cloned().unwrap_or_default()))
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.with_page(|p| p.actions.push(PageAction::Scroll(element.0.clone())));
        Ok(())
    }
}

