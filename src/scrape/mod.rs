//! Stateful headless-browser session against the external provider search.
//!
//! One session owns one browser and one page for the lifetime of a batch
//! run. The two search filters are applied once at open; every `query_one`
//! then reuses the same form, so the name input must be cleared and retyped
//! per call. A failed query leaves the session open and usable for the next
//! name; only `close()` tears the browser down.

pub mod selectors;

use std::time::{Duration, Instant};

use anyhow::Context;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::error::{QueryFailure, QueryStage};

/// One scraped results-table row, exactly as rendered by the external site.
/// No normalization happens here; `state` is left for the caller to inject
/// since the search surface never renders it.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedRecord {
    pub provider_name: String,
    pub address: String,
    pub city: String,
    pub county: String,
    pub zipcode: String,
    pub state: Option<String>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct AutomationSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    wait_timeout: Duration,
}

impl AutomationSession {
    /// Launch the browser, navigate to the search surface and apply the
    /// one-time filter selections. Called once per batch run.
    pub async fn open(cfg: &ScrapeConfig) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        if !cfg.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &cfg.chrome_executable {
            builder = builder.chrome_executable(path.clone());
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching headless browser")?;
        // The CDP event loop must be driven for the session's whole lifetime;
        // it ends on its own once the browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        // Past this point the browser process exists; every failure path must
        // release it explicitly rather than leaning on drop-kill.
        let page = match browser.new_page(cfg.search_url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                let _ = shutdown_browser(browser, handler_task).await;
                return Err(anyhow::Error::new(e).context("opening search page"));
            }
        };
        if let Err(e) = page.wait_for_navigation().await {
            let _ = shutdown_browser(browser, handler_task).await;
            return Err(anyhow::Error::new(e).context("waiting for search page to load"));
        }
        info!(url = %cfg.search_url, "automation session opened");

        let session = Self {
            browser,
            handler_task,
            page,
            wait_timeout: cfg.wait_timeout,
        };
        if let Err(e) = session.apply_fixed_filters().await {
            // Setup failure is fatal for the run; release the browser here
            // since the caller never gets a session handle back.
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// The two filter comboboxes are invariant across all queries in a run
    /// and must be selected exactly once, not per entity.
    async fn apply_fixed_filters(&self) -> anyhow::Result<()> {
        for (toggle, option) in [
            (selectors::TYPE_FILTER_TOGGLE, selectors::TYPE_FILTER_OPTION),
            (selectors::COUNTY_FILTER_TOGGLE, selectors::COUNTY_FILTER_OPTION),
        ] {
            self.wait_visible(toggle)
                .await
                .with_context(|| format!("filter toggle {toggle:?}"))?
                .click()
                .await
                .with_context(|| format!("opening filter {toggle:?}"))?;
            self.wait_visible(option)
                .await
                .with_context(|| format!("filter option {option:?}"))?
                .click()
                .await
                .with_context(|| format!("selecting filter option {option:?}"))?;
        }
        debug!("fixed search filters applied");
        Ok(())
    }

    /// Run the full interaction sequence for one facility name and read the
    /// first results row. On any failure the session remains open; the error
    /// carries the entity name and the stage that gave up.
    pub async fn query_one(&self, name: &str) -> Result<ScrapedRecord, QueryFailure> {
        let fail =
            |stage: QueryStage, cause: anyhow::Error| QueryFailure::new(name, stage, cause);

        // The input keeps the previous query's text; select-all + retype
        // overwrites it in place.
        let input = self
            .wait_visible(selectors::NAME_INPUT)
            .await
            .map_err(|e| fail(QueryStage::TypeName, e))?;
        input
            .focus()
            .await
            .map_err(|e| fail(QueryStage::TypeName, e.into()))?;
        input
            .call_js_fn("function() { this.select(); }", false)
            .await
            .map_err(|e| fail(QueryStage::TypeName, e.into()))?;
        input
            .type_str(name)
            .await
            .map_err(|e| fail(QueryStage::TypeName, e.into()))?;

        self.wait_visible(selectors::SEARCH_BUTTON)
            .await
            .map_err(|e| fail(QueryStage::Submit, e))?
            .click()
            .await
            .map_err(|e| fail(QueryStage::Submit, e.into()))?;

        self.wait_visible(selectors::RESULTS_CONTAINER)
            .await
            .map_err(|e| fail(QueryStage::AwaitTable, e))?;
        self.wait_visible(selectors::FIRST_RESULT_ROW)
            .await
            .map_err(|e| fail(QueryStage::AwaitRows, e))?;

        // Only the first row is read; additional matches for an ambiguous
        // name are silently ignored (long-standing upstream behavior, kept
        // as-is rather than guessing a best match).
        let record = self
            .read_first_row()
            .await
            .map_err(|e| fail(QueryStage::ReadRow, e))?;
        debug!(entity = name, provider = %record.provider_name, "scraped one row");
        Ok(record)
    }

    async fn read_first_row(&self) -> anyhow::Result<ScrapedRecord> {
        Ok(ScrapedRecord {
            provider_name: self.read_cell(&selectors::name_cell()).await?,
            address: self.read_cell(&selectors::data_cell(selectors::COL_ADDRESS)).await?,
            city: self.read_cell(&selectors::data_cell(selectors::COL_CITY)).await?,
            county: self.read_cell(&selectors::data_cell(selectors::COL_COUNTY)).await?,
            zipcode: self.read_cell(&selectors::data_cell(selectors::COL_ZIPCODE)).await?,
            state: None,
        })
    }

    async fn read_cell(&self, selector: &str) -> anyhow::Result<String> {
        let cell = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("result cell {selector:?} missing"))?;
        let text = cell
            .inner_text()
            .await
            .with_context(|| format!("reading result cell {selector:?}"))?;
        Ok(text.unwrap_or_default())
    }

    /// Poll for a selector until it is present and hit-testable or the
    /// bounded wait elapses. Hidden nodes have no clickable point, which is
    /// the closest CDP equivalent of "visible".
    async fn wait_visible(&self, selector: &str) -> anyhow::Result<Element> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                if element.clickable_point().await.is_ok() {
                    return Ok(element);
                }
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "selector {selector:?} not visible within {:?}",
                    self.wait_timeout
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Tear the browser down unconditionally. The batch driver calls this on
    /// every exit path once its loop terminates.
    pub async fn close(self) -> anyhow::Result<()> {
        shutdown_browser(self.browser, self.handler_task).await?;
        info!("automation session closed");
        Ok(())
    }
}

/// Close the browser process and stop the CDP handler loop. Shared by
/// `close()` and the failure paths inside `open()` that fire after launch.
async fn shutdown_browser(mut browser: Browser, handler_task: JoinHandle<()>) -> anyhow::Result<()> {
    let closed = browser.close().await;
    if let Err(e) = browser.wait().await {
        warn!(error = %e, "browser did not exit cleanly");
    }
    handler_task.abort();
    closed.context("closing browser")?;
    Ok(())
}
