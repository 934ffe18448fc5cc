//! Browser automation backend.
//!
//! `BrowserClient` abstracts a single operation: load a page and extract
//! elements by CSS selector. `MockBrowserClient` serves per-URL fixtures
//! for tests; `ChromiumBrowserClient` (behind the `browser` feature)
//! drives a real Chrome/Chromium via chromiumoxide.

use crate::error::BrowserError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One element matched by a selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedElement {
    pub text: String,
    /// Set when the element carries an href (anchor tags).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl ExtractedElement {
    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: Some(href.into()),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: None,
        }
    }
}

/// Everything extracted from one page load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageExtract {
    pub url: String,
    pub title: String,
    /// Selector -> matched elements, in document order.
    pub elements: HashMap<String, Vec<ExtractedElement>>,
}

/// Trait abstracting the browser backend.
///
/// Implementors include `MockBrowserClient` (for tests) and
/// `ChromiumBrowserClient` (chromiumoxide, behind the `browser` feature).
#[async_trait]
pub trait BrowserClient: Send + Sync {
    /// Navigate to `url`, optionally wait for `wait_for` to appear, then
    /// extract all elements matching each selector.
    async fn fetch_and_extract(
        &self,
        url: &str,
        selectors: &[String],
        wait_for: Option<&str>,
    ) -> Result<PageExtract, BrowserError>;
}

/// A mock browser client for testing. Serves configurable per-URL fixtures
/// and records all calls.
pub struct MockBrowserClient {
    /// URL -> fixture returned by fetch_and_extract.
    pub fixtures: Mutex<HashMap<String, PageExtract>>,
    /// URL -> error returned instead of a fixture.
    pub scripted_errors: Mutex<HashMap<String, BrowserError>>,
    /// Record of (url, selectors) for assertion.
    pub call_log: Mutex<Vec<(String, Vec<String>)>>,
    /// Error returned for URLs with no fixture, defaults to NavigationFailed.
    pub default_error_message: Mutex<String>,
}

impl MockBrowserClient {
    pub fn new() -> Self {
        Self {
            fixtures: Mutex::new(HashMap::new()),
            scripted_errors: Mutex::new(HashMap::new()),
            call_log: Mutex::new(Vec::new()),
            default_error_message: Mutex::new("no fixture for URL".to_string()),
        }
    }

    /// Register the extract returned when `url` is fetched.
    pub fn add_fixture(&self, url: impl Into<String>, extract: PageExtract) {
        self.fixtures.lock().unwrap().insert(url.into(), extract);
    }

    /// Register a fixture whose single selector yields the given links.
    pub fn add_link_fixture(
        &self,
        url: impl Into<String>,
        selector: impl Into<String>,
        links: Vec<(&str, &str)>,
    ) {
        let url = url.into();
        let mut elements = HashMap::new();
        elements.insert(
            selector.into(),
            links
                .into_iter()
                .map(|(text, href)| ExtractedElement::link(text, href))
                .collect(),
        );
        self.add_fixture(
            url.clone(),
            PageExtract {
                url,
                title: "results".to_string(),
                elements,
            },
        );
    }

    /// Make fetching `url` fail with the given error.
    pub fn add_error(&self, url: impl Into<String>, err: BrowserError) {
        self.scripted_errors.lock().unwrap().insert(url.into(), err);
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

impl Default for MockBrowserClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserClient for MockBrowserClient {
    async fn fetch_and_extract(
        &self,
        url: &str,
        selectors: &[String],
        _wait_for: Option<&str>,
    ) -> Result<PageExtract, BrowserError> {
        self.call_log
            .lock()
            .unwrap()
            .push((url.to_string(), selectors.to_vec()));

        if let Some(err) = self.scripted_errors.lock().unwrap().get(url) {
            return Err(clone_error(err));
        }

        match self.fixtures.lock().unwrap().get(url) {
            Some(extract) => Ok(extract.clone()),
            None => Err(BrowserError::NavigationFailed {
                message: format!(
                    "{}: {url}",
                    self.default_error_message.lock().unwrap()
                ),
            }),
        }
    }
}

fn clone_error(e: &BrowserError) -> BrowserError {
    match e {
        BrowserError::NavigationFailed { message } => BrowserError::NavigationFailed {
            message: message.clone(),
        },
        BrowserError::ExtractionFailed { selector, message } => BrowserError::ExtractionFailed {
            selector: selector.clone(),
            message: message.clone(),
        },
        BrowserError::SessionError { message } => BrowserError::SessionError {
            message: message.clone(),
        },
        BrowserError::Timeout { timeout_secs } => BrowserError::Timeout {
            timeout_secs: *timeout_secs,
        },
    }
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumBrowserClient;

#[cfg(feature = "browser")]
mod chromium {
    //! Real browser client backed by chromiumoxide.

    use super::{BrowserClient, ExtractedElement, PageExtract};
    use crate::config::BrowserConfig;
    use crate::error::BrowserError;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// A real browser client driving Chrome/Chromium over CDP.
    ///
    /// One browser process, one page, serialized behind a lock.
    pub struct ChromiumBrowserClient {
        page: Arc<Mutex<chromiumoxide::Page>>,
        _browser: Arc<Mutex<chromiumoxide::Browser>>,
        _handler: tokio::task::JoinHandle<()>,
        navigation_timeout: Duration,
    }

    impl ChromiumBrowserClient {
        /// Launch a browser process and return a connected client.
        pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
            let mut builder = chromiumoxide::BrowserConfig::builder();
            if config.headless {
                builder = builder.arg("--headless=new");
            }
            builder = builder
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage");

            let browser_config = builder.build().map_err(|e| BrowserError::SessionError {
                message: format!("Failed to build browser config: {e}"),
            })?;

            let (browser, mut handler) = chromiumoxide::Browser::launch(browser_config)
                .await
                .map_err(|e| BrowserError::SessionError {
                    message: format!("Failed to launch Chrome: {e}"),
                })?;

            let handler_task = tokio::spawn(async move {
                while let Some(_event) = handler.next().await {}
            });

            let page = browser.new_page("about:blank").await.map_err(|e| {
                BrowserError::SessionError {
                    message: format!("Failed to create page: {e}"),
                }
            })?;

            Ok(Self {
                page: Arc::new(Mutex::new(page)),
                _browser: Arc::new(Mutex::new(browser)),
                _handler: handler_task,
                navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            })
        }

        /// JS that collects text and href for every node matching a selector.
        fn extraction_script(selector: &str) -> String {
            format!(
                "Array.from(document.querySelectorAll({selector:?})).map(el => \
                 ({{ text: el.textContent.trim(), href: el.href || null }}))"
            )
        }
    }

    #[async_trait]
    impl BrowserClient for ChromiumBrowserClient {
        async fn fetch_and_extract(
            &self,
            url: &str,
            selectors: &[String],
            wait_for: Option<&str>,
        ) -> Result<PageExtract, BrowserError> {
            let page = self.page.lock().await;

            let navigation = async {
                page.goto(url)
                    .await
                    .map_err(|e| BrowserError::NavigationFailed {
                        message: format!("{e}"),
                    })?;
                page.wait_for_navigation().await.map_err(|e| {
                    BrowserError::NavigationFailed {
                        message: format!("{e}"),
                    }
                })?;
                Ok::<(), BrowserError>(())
            };
            tokio::time::timeout(self.navigation_timeout, navigation)
                .await
                .map_err(|_| BrowserError::Timeout {
                    timeout_secs: self.navigation_timeout.as_secs(),
                })??;

            if let Some(selector) = wait_for {
                page.find_element(selector).await.map_err(|e| {
                    BrowserError::ExtractionFailed {
                        selector: selector.to_string(),
                        message: format!("{e}"),
                    }
                })?;
            }

            let title = page
                .get_title()
                .await
                .map_err(|e| BrowserError::SessionError {
                    message: format!("{e}"),
                })?
                .unwrap_or_default();

            let mut elements = HashMap::new();
            for selector in selectors {
                let script = Self::extraction_script(selector);
                let result: Value = page
                    .evaluate(script)
                    .await
                    .map_err(|e| BrowserError::ExtractionFailed {
                        selector: selector.clone(),
                        message: format!("{e}"),
                    })?
                    .into_value()
                    .map_err(|e| BrowserError::ExtractionFailed {
                        selector: selector.clone(),
                        message: format!("{e}"),
                    })?;

                let matched = result
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| ExtractedElement {
                                text: item["text"].as_str().unwrap_or_default().to_string(),
                                href: item["href"].as_str().map(str::to_string),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                elements.insert(selector.clone(), matched);
            }

            Ok(PageExtract {
                url: url.to_string(),
                title,
                elements,
            })
        }
    }
}
