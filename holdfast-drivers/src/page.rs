//! Page abstraction: a URL plus the title it is expected to carry.
//!
//! Page objects in test suites subclass nothing here — they hold a [`Page`]
//! and add their own locators on top.

use crate::retry::retry_until;
use crate::session::{texts_match, Browser};
use anyhow::Result;
use holdfast_common::HoldfastError;
use tracing::info;

/// A navigable page with optional load-time title verification.
pub struct Page {
    browser: Browser,
    url: String,
    /// Expected title before the first load; replaced by the live title once
    /// the page has loaded.
    title: Option<String>,
}

impl Page {
    pub fn new(browser: Browser, url: impl Into<String>) -> Self {
        Self {
            browser,
            url: url.into(),
            title: None,
        }
    }

    /// Set the title [`Self::load`] verifies against.
    pub fn with_expected_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Expected title before the first load, live title after it.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Shared access to the underlying browser for element interactions.
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Navigate to the page URL. With `verify_title` set, the live title must
    /// match the expected one (case-insensitive) before this returns; either
    /// way the stored title is refreshed from the browser afterwards.
    pub async fn load(&mut self, verify_title: bool) -> Result<()> {
        info!(target: "holdfast.page", url = %self.url, "loading page");
        self.browser.goto(&self.url).await?;

        if verify_title {
            self.verify_title().await?;
        }

        self.title = Some(self.browser.title().await?);
        Ok(())
    }

    /// Assert that the live title matches the expected one, case-insensitive.
    ///
    /// Retry-wrapped with the browser's policy: a page that is still
    /// rendering gets the same grace period as an element lookup.
    pub async fn verify_title(&self) -> Result<()> {
        let expected = match self.title.as_deref() {
            Some(t) => t,
            // No expected title was recorded for this page, so there is
            // nothing to compare; treat the check as a no-op.
            None => return Ok(()),
        };

        retry_until(self.browser.retry_policy(), || async move {
            let actual = self.browser.title().await?;
            if texts_match(expected, &actual) {
                Ok(())
            } else {
                Err(HoldfastError::TitleMismatch {
                    expected: expected.to_string(),
                    actual,
                }
                .into())
            }
        })
        .await
    }

    /// Close the browser window this page lives in.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await
    }
}
