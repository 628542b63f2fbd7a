//! Baidu realtime hot-search board.

use std::sync::{Arc, LazyLock};

use headless_chrome::Tab;
use scraper::{ElementRef, Html, Selector};

use super::puppeteer::{navigate_to, page_source, wait_for_async};
use crate::{
    model::HotSearch,
    util::{element_text, parse_count},
};

pub const BOARD_URL: &str = "https://top.baidu.com/board?tab=realtime";
pub const DEFAULT_LIMIT: usize = 10;

const KEYWORD: &str = ".c-single-text-ellipsis";

#[allow(clippy::unwrap_used)]
static SEL_KEYWORD: LazyLock<Selector> = LazyLock::new(|| Selector::parse(KEYWORD).unwrap());
#[allow(clippy::unwrap_used)]
static SEL_HEAT: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".hot-index_1Bl1a").unwrap());

/// The heat shown next to `item`: the first heat element in the closest
/// ancestor that still holds only this one keyword.
fn heat_of(item: ElementRef) -> Option<ElementRef> {
    for node in item.ancestors() {
        let Some(ancestor) = ElementRef::wrap(node) else {
            break;
        };
        if ancestor.select(&SEL_KEYWORD).nth(1).is_some() {
            break;
        }
        if let Some(heat) = ancestor.select(&SEL_HEAT).next() {
            return Some(heat);
        }
    }
    None
}

/// Extracts the first `limit` entries, ranked from 1.
///
/// An entry without a heat element gets heat 0; one whose heat is not a
/// number keeps `heat: None` and is later skipped by the persister.
#[must_use]
pub fn parse_board(html: &str, limit: usize) -> Vec<HotSearch> {
    let document = Html::parse_document(html);

    document
        .select(&SEL_KEYWORD)
        .take(limit)
        .zip(1..)
        .map(|(item, rank)| {
            let keyword = element_text(item);
            let heat = match heat_of(item) {
                Some(heat) => {
                    let text = heat.text().collect::<String>();
                    let heat = parse_count(&text);
                    if heat.is_none() {
                        tracing::warn!(target: "collect", "[#{rank}] unreadable heat {text:?}");
                    }
                    heat
                }
                None => Some(0),
            };
            HotSearch {
                rank,
                keyword,
                heat,
            }
        })
        .collect()
}

pub async fn crawl(tab: &Arc<Tab>, limit: usize) -> anyhow::Result<Vec<HotSearch>> {
    tracing::info!(target: "collect", "fetching {BOARD_URL} ...");
    navigate_to(tab, BOARD_URL.into()).await?;
    wait_for_async(tab, KEYWORD.into()).await?;

    let html = page_source(tab).await?;
    tracing::info!(target: "collect", "fetching finished: {} bytes", html.len());

    Ok(parse_board(&html, limit))
}
