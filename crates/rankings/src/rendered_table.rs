use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, RenderOptions};
use common::{CrawlerError, CrawlerResult};
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use crate::extractor::{HeaderMap, RawRow};
use crate::source::{log_source_failure, RowSource};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("thead th").unwrap());
static BODY_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody tr").unwrap());
static ANY_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Produces the fully rendered markup of a page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> CrawlerResult<String>;
}

pub struct BrowserlessRenderer {
    client: BrowserlessClient,
    options: RenderOptions,
}

impl BrowserlessRenderer {
    pub fn new(client: BrowserlessClient, options: RenderOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, url: &str) -> CrawlerResult<String> {
        self.client
            .content(url, &self.options)
            .await
            .map_err(|e| CrawlerError::SourceUnavailable(format!("{}: {}", url, e)))
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Rows of the first table in `html` that has any. Each row is its first
/// `th` (the rank column on chart pages) followed by its `td` cells.
pub fn parse_table_rows(html: &str) -> Vec<RawRow> {
    let document = Html::parse_document(html);

    for table in document.select(&TABLE) {
        let headers: Vec<String> = table.select(&HEADER_CELL).map(cell_text).collect();
        let header = HeaderMap::from_headers(&headers).map(Arc::new);

        let mut body_rows: Vec<ElementRef<'_>> = table.select(&BODY_ROW).collect();
        if body_rows.is_empty() {
            body_rows = table
                .select(&ANY_ROW)
                .filter(|row| row.select(&TD).next().is_some())
                .collect();
        }

        let rows: Vec<RawRow> = body_rows
            .into_iter()
            .map(|row| {
                let cells: Vec<String> = row
                    .select(&TH)
                    .next()
                    .into_iter()
                    .chain(row.select(&TD))
                    .map(cell_text)
                    .collect();
                match &header {
                    Some(map) => RawRow::mapped(cells, map.clone()),
                    None => RawRow::positional(cells),
                }
            })
            .filter(|row| !row.cells.is_empty())
            .collect();

        if !rows.is_empty() {
            return rows;
        }
    }
    Vec::new()
}

/// Loads chart pages in a headless browser and reads their table.
pub struct RenderedTableSource {
    renderer: Arc<dyn PageRenderer>,
}

impl RenderedTableSource {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl RowSource for RenderedTableSource {
    fn label(&self) -> &'static str {
        "Rendered-Table"
    }

    async fn fetch_rows(&self, url: &str) -> Vec<RawRow> {
        match self.renderer.render(url).await {
            Ok(html) => {
                let rows = parse_table_rows(&html);
                info!(url, rows = rows.len(), "Rendered table parsed");
                rows
            }
            Err(e) => {
                log_source_failure(self.label(), url, e);
                Vec::new()
            }
        }
    }
}
