//! Retry-hardened wrapper around a `fantoccini` WebDriver session.
//!
//! Every element interaction re-resolves its target on each attempt, so a
//! page that is still rendering — or that re-renders between lookup and
//! action — gets the full retry budget instead of a stale-element error.

use crate::retry::{retry_until, RetryPolicy};
use anyhow::{anyhow, Result};
use fantoccini::{elements::Element, Client, Locator};
use holdfast_common::UserAction;
use std::time::Duration;
use tracing::{debug, info};

/// WebDriver client wrapper applying a [`RetryPolicy`] to element
/// interactions.
///
/// Cloning is cheap; clones share the underlying WebDriver session.
#[derive(Clone)]
pub struct Browser {
    client: Client,
    retry: RetryPolicy,
}

impl Browser {
    /// Wrap an already-connected client with the given retry budget.
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Connect to a running WebDriver endpoint (chromedriver defaults to
    /// `http://localhost:9515`) and wrap the session.
    pub async fn attach(
        endpoint: &str,
        kind: holdfast_common::BrowserKind,
        headless: bool,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = crate::service::DriverService::connect(endpoint, kind, headless).await?;
        Ok(Self::new(client, retry))
    }

    /// The underlying client, for operations this wrapper does not cover.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The retry budget applied to element interactions.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Navigate to `url`. A blank URL is a no-op so a caller can construct a
    /// browser first and decide where to point it later.
    pub async fn goto(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Ok(());
        }
        info!(target: "holdfast.session", %url, "navigating");
        self.client.goto(url).await.map_err(anyhow::Error::from)
    }

    /// Find a single element, retrying until the budget is spent.
    pub async fn find(&self, locator: Locator<'_>) -> Result<Element> {
        retry_until(self.retry, || async move {
            self.client.find(locator).await.map_err(anyhow::Error::from)
        })
        .await
    }

    /// Find and click an element; the whole find-then-click is retried as a
    /// unit. Returns the clicked element.
    pub async fn click(&self, locator: Locator<'_>) -> Result<Element> {
        retry_until(self.retry, || async move {
            let element = self.client.find(locator).await?;
            element.clone().click().await?;
            Ok(element)
        })
        .await
    }

    /// Find a text-holding element and clear it. Returns the cleared
    /// element.
    pub async fn clear(&self, locator: Locator<'_>) -> Result<Element> {
        retry_until(self.retry, || async move {
            let element = self.client.find(locator).await?;
            element.clear().await?;
            Ok(element)
        })
        .await
    }

    /// Find an element and type `text` into it. When `append_return` is set a
    /// newline is appended, which submits most forms.
    pub async fn send_keys(
        &self,
        locator: Locator<'_>,
        text: &str,
        append_return: bool,
    ) -> Result<Element> {
        let payload = compose_keys(text, append_return);
        let payload = payload.as_str();
        retry_until(self.retry, || async move {
            let element = self.client.find(locator).await?;
            element.send_keys(payload).await?;
            Ok(element)
        })
        .await
    }

    /// Dispatch a [`UserAction`] against the element at `locator`.
    ///
    /// `text` is required for [`UserAction::TypeText`] and ignored otherwise.
    pub async fn perform(
        &self,
        locator: Locator<'_>,
        action: UserAction,
        text: Option<&str>,
    ) -> Result<Element> {
        match action {
            UserAction::Click => self.click(locator).await,
            UserAction::Clear => self.clear(locator).await,
            UserAction::TypeText => {
                let text =
                    text.ok_or_else(|| anyhow!("TypeText requires text to send"))?;
                self.send_keys(locator, text, false).await
            }
        }
    }

    /// True when the element is found within the retry budget and is
    /// displayed. Lookup errors map to `false`.
    pub async fn is_visible(&self, locator: Locator<'_>) -> bool {
        self.is_visible_within(locator, self.retry.timeout).await
    }

    /// [`Self::is_visible`] with an override budget. Negative checks ("this
    /// must NOT be on the page") pass a short timeout here so they do not
    /// stall for the full default.
    pub async fn is_visible_within(&self, locator: Locator<'_>, timeout: Duration) -> bool {
        let policy = self.retry.with_timeout(timeout);
        let shown = retry_until(policy, || async move {
            let element = self.client.find(locator).await?;
            element.is_displayed().await.map_err(anyhow::Error::from)
        })
        .await;

        match shown {
            Ok(displayed) => displayed,
            Err(err) => {
                debug!(target: "holdfast.session", error = %err, "visibility check failed");
                false
            }
        }
    }

    /// True when the element's text equals `expected`, ignoring case, within
    /// the retry budget.
    pub async fn text_is_visible(&self, locator: Locator<'_>, expected: &str) -> bool {
        self.text_is_visible_within(locator, expected, self.retry.timeout)
            .await
    }

    /// [`Self::text_is_visible`] with an override budget. The element is
    /// re-read on every attempt so late-arriving text is picked up.
    pub async fn text_is_visible_within(
        &self,
        locator: Locator<'_>,
        expected: &str,
        timeout: Duration,
    ) -> bool {
        let policy = self.retry.with_timeout(timeout);
        retry_until(policy, || async move {
            let element = self.client.find(locator).await?;
            let actual = element.text().await?;
            if texts_match(expected, &actual) {
                Ok(())
            } else {
                Err(anyhow!("expected text '{expected}', saw '{actual}'"))
            }
        })
        .await
        .is_ok()
    }

    /// Current page title.
    pub async fn title(&self) -> Result<String> {
        self.client.title().await.map_err(anyhow::Error::from)
    }

    /// Full page HTML source.
    pub async fn source(&self) -> Result<String> {
        self.client.source().await.map_err(anyhow::Error::from)
    }

    /// Current page URL.
    pub async fn current_url(&self) -> Result<String> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(anyhow::Error::from)
    }

    /// End the WebDriver session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await.map_err(anyhow::Error::from)
    }
}

fn compose_keys(text: &str, append_return: bool) -> String {
    if append_return {
        format!("{text}\n")
    } else {
        text.to_string()
    }
}

/// Case-insensitive text equality, the comparison both the text-visibility
/// check and page-title verification use.
pub(crate) fn texts_match(expected: &str, actual: &str) -> bool {
    expected.to_lowercase() == actual.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_keys_appends_a_single_return() {
        assert_eq!(compose_keys("hello", false), "hello");
        assert_eq!(compose_keys("hello", true), "hello\n");
        assert_eq!(compose_keys("", true), "\n");
    }

    #[test]
    fn texts_match_ignores_case() {
        assert!(texts_match("Welcome Back", "welcome back"));
        assert!(texts_match("ÜBER UNS", "über uns"));
        assert!(!texts_match("Welcome", "Welcome!"));
    }
}
