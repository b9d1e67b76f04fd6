pub mod aggregator;
pub mod change_detector;
pub mod csv_source;
pub mod extractor;
pub mod models;
pub mod publish;
pub mod rendered_table;
pub mod source;
pub mod week;

pub use aggregator::{RankingsAggregator, ScrapeTrigger};
pub use change_detector::{extract_freshness_token, ChangeDetector, FreshnessCheck};
pub use csv_source::CsvSource;
pub use extractor::{extract, HeaderMap, RawRow, RowLayout};
pub use models::{PositionRankingSet, RankingEntry, RankingsSnapshot};
pub use publish::{ArtifactPaths, PublishOutcome, PublishPipeline, PublishReason, TokenRecord};
pub use rendered_table::{BrowserlessRenderer, PageRenderer, RenderedTableSource};
pub use source::{HttpFetcher, PageFetcher, PositionFetch, RowSource, SourceChain};
pub use week::week_number;

use std::sync::Arc;

use browserless_client::{BrowserlessClient, RenderOptions};
use common::{CrawlerResult, ScrapeConfig};
use tracing::info;

/// Builds the adapter chain for `config`: CSV always, then the rendered-table
/// adapter when a browser service is configured.
pub fn source_chain(config: &ScrapeConfig) -> CrawlerResult<SourceChain> {
    let client = common::http::build_client(config.http_timeout)?;
    let mut sources: Vec<Arc<dyn RowSource>> =
        vec![Arc::new(CsvSource::new(Arc::new(HttpFetcher::new(client))))];

    if let Some(base_url) = &config.browserless_url {
        let options = RenderOptions::default();
        // The render budget runs on the browser side; leave headroom for it.
        let render_timeout = config.http_timeout
            + std::time::Duration::from_millis(
                options.navigation_timeout_ms + options.selector_timeout_ms + options.settle_ms,
            );
        let browser = BrowserlessClient::new(
            common::http::build_client(render_timeout)?,
            base_url,
            config.browserless_token.as_deref(),
        );
        sources.push(Arc::new(RenderedTableSource::new(Arc::new(
            BrowserlessRenderer::new(browser, options),
        ))));
    }

    let chain = SourceChain::new(sources);
    info!(method = %chain.method_label(), "Source chain ready");
    Ok(chain)
}
