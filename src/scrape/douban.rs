//! Douban movie Top 250.

use std::sync::{Arc, LazyLock};

use compact_str::CompactString;
use headless_chrome::Tab;
use regex::Regex;
use scraper::{Html, Selector};

use super::puppeteer::{navigate_to, page_source, wait_for_async};
use crate::{
    model::Movie,
    util::{clean, digits_only, element_text},
};

pub const LIST_URL: &str = "https://movie.douban.com/top250";
pub const PAGE_SIZE: usize = 25;
/// Entries on the whole list; pages past it are empty.
pub const LIST_SIZE: usize = 250;
pub const DEFAULT_LIMIT: usize = 100;

const ITEM: &str = ".item";

#[allow(clippy::unwrap_used)]
mod sel {
    use super::{ITEM, LazyLock, Regex, Selector};

    pub static ITEMS: LazyLock<Selector> = LazyLock::new(|| Selector::parse(ITEM).unwrap());
    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".title").unwrap());
    pub static INFO: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(".info .bd p:first-child").unwrap());
    pub static RATING: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".rating_num").unwrap());
    pub static REVIEWS: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(".star span:last-child").unwrap());
    pub static QUOTE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".quote .inq").unwrap());
    pub static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());
}

#[must_use]
pub fn page_url(start: usize) -> String {
    format!("{LIST_URL}?start={start}")
}

/// Offsets of the pages holding the first `limit` entries, never past the
/// end of the list.
pub fn page_starts(limit: usize) -> impl Iterator<Item = usize> {
    (0..limit.min(LIST_SIZE)).step_by(PAGE_SIZE)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Info {
    director: Option<CompactString>,
    year: Option<i32>,
    country: Option<CompactString>,
    genre: Option<CompactString>,
}

fn non_empty(s: &str) -> Option<CompactString> {
    let s = clean(s);
    (!s.is_empty()).then(|| s.into())
}

/// Splits the credits paragraph:
///
/// ```text
/// 导演: 陈凯歌 Kaige Chen   主演: 张国荣 Leslie Cheung / 张丰毅 ...
/// 1993 / 中国大陆 中国香港 / 剧情 爱情 同性
/// ```
fn parse_info(text: &str) -> Info {
    let mut lines = text.lines().map(clean).filter(|l| !l.is_empty());
    let credits = lines.next().unwrap_or_default();
    let facts = lines.last().unwrap_or_default();

    let director = credits.split_once("导演:").and_then(|(_, rest)| {
        let end = rest.find("主演").unwrap_or(rest.len());
        non_empty(&rest[..end])
    });

    let parts = facts.split('/').collect::<Vec<_>>();
    let (year, country, genre) = if parts.len() > 2 {
        (
            sel::YEAR
                .find(parts[0])
                .and_then(|m| m.as_str().parse().ok()),
            non_empty(parts[parts.len() - 2]),
            non_empty(parts[parts.len() - 1]),
        )
    } else {
        (None, None, None)
    };

    Info {
        director,
        year,
        country,
        genre,
    }
}

/// Extracts the movies of one list page; `start` is the page offset.
#[must_use]
pub fn parse_page(html: &str, start: usize) -> Vec<Movie> {
    let document = Html::parse_document(html);

    document
        .select(&sel::ITEMS)
        .enumerate()
        .map(|(idx, item)| {
            let rank = i32::try_from(start + idx + 1).ok();
            let title = item.select(&sel::TITLE).next().and_then(element_text);
            let info = item
                .select(&sel::INFO)
                .next()
                .map(|p| parse_info(&p.text().collect::<String>()))
                .unwrap_or_default();
            let rating = item
                .select(&sel::RATING)
                .next()
                .and_then(element_text)
                .and_then(|s| s.parse().ok());
            let reviews_count = item
                .select(&sel::REVIEWS)
                .next()
                .and_then(element_text)
                .filter(|s| s.contains("人评价"))
                .and_then(|s| digits_only(&s));
            let description = item.select(&sel::QUOTE).next().and_then(element_text);

            if title.is_none() {
                tracing::warn!(target: "collect", "[#{}] no title", start + idx + 1);
            }

            Movie {
                rank,
                title,
                director: info.director,
                year: info.year,
                rating,
                reviews_count,
                genre: info.genre,
                country: info.country,
                description,
            }
        })
        .collect()
}

/// Walks the list pages until `limit` movies are collected.
///
/// A page after the first that never shows a movie ends the walk; the
/// movies collected so far are kept.
pub async fn crawl(tab: &Arc<Tab>, limit: usize) -> anyhow::Result<Vec<Movie>> {
    const PAGE_DELAY: core::time::Duration = core::time::Duration::from_secs(2);

    if limit > LIST_SIZE {
        tracing::warn!(target: "collect", "only {LIST_SIZE} movies are listed, not {limit}");
    }

    let mut movies = Vec::with_capacity(limit.min(LIST_SIZE));
    for start in page_starts(limit) {
        let page_no = start / PAGE_SIZE + 1;
        let url = page_url(start);
        tracing::info!(target: "collect", "[Page #{page_no}] {url}");

        navigate_to(tab, url.into()).await?;
        tokio::time::sleep(PAGE_DELAY).await;
        if let Err(e) = wait_for_async(tab, ITEM.into()).await {
            if movies.is_empty() {
                return Err(e);
            }
            tracing::warn!(target: "collect", "[Page #{page_no}] {e}, stopping");
            break;
        }

        let html = page_source(tab).await?;
        let mut page = parse_page(&html, start);
        if page.is_empty() {
            tracing::warn!(target: "collect", "[Page #{page_no}] no movies, stopping");
            break;
        }
        movies.append(&mut page);
    }

    movies.truncate(limit);
    tracing::info!(target: "collect", "collected {} movies", movies.len());
    Ok(movies)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
<html><body><ol class="grid_view">
<li><div class="item">
  <div class="pic"><em>1</em></div>
  <div class="info">
    <div class="hd"><a href="#"><span class="title">肖申克的救赎</span><span class="title">&nbsp;/&nbsp;The Shawshank Redemption</span></a></div>
    <div class="bd">
      <p class="">
        导演: 弗兰克·德拉邦特 Frank Darabont&nbsp;&nbsp;&nbsp;主演: 蒂姆·罗宾斯 Tim Robbins /...<br>
        1994&nbsp;/&nbsp;美国&nbsp;/&nbsp;犯罪 剧情
      </p>
      <div class="star">
        <span class="rating5-t"></span>
        <span class="rating_num" property="v:average">9.7</span>
        <span property="v:best" content="10.0"></span>
        <span>3143548人评价</span>
      </div>
      <p class="quote"><span class="inq">希望让人自由。</span></p>
    </div>
  </div>
</div></li>
<li><div class="item">
  <div class="info">
    <div class="hd"><a href="#"><span class="title">无名之作</span></a></div>
    <div class="bd">
      <p class="">导演: 佚名</p>
      <div class="star"><span>暂无评价</span></div>
    </div>
  </div>
</div></li>
</ol></body></html>
"##;

    #[test]
    fn reads_a_complete_entry() {
        let movies = parse_page(PAGE, 25);

        assert_eq!(movies.len(), 2);
        assert_eq!(
            movies[0],
            Movie {
                rank: Some(26),
                title: Some("肖申克的救赎".into()),
                director: Some("弗兰克·德拉邦特 Frank Darabont".into()),
                year: Some(1994),
                rating: Some(9.7),
                reviews_count: Some(3_143_548),
                genre: Some("犯罪 剧情".into()),
                country: Some("美国".into()),
                description: Some("希望让人自由。".into()),
            }
        );
    }

    #[test]
    fn missing_parts_stay_empty() {
        let movies = parse_page(PAGE, 0);
        let sparse = &movies[1];

        assert_eq!(sparse.rank, Some(2));
        assert_eq!(sparse.title.as_deref(), Some("无名之作"));
        assert_eq!(sparse.director.as_deref(), Some("佚名"));
        assert_eq!(sparse.year, None);
        assert_eq!(sparse.rating, None);
        assert_eq!(sparse.reviews_count, None);
        assert_eq!(sparse.description, None);
    }

    #[test]
    fn info_with_several_countries() {
        let info = parse_info("导演: 陈凯歌 Kaige Chen\u{a0}\u{a0}\u{a0}主演: 张国荣\n1993\u{a0}/\u{a0}中国大陆 中国香港\u{a0}/\u{a0}剧情 爱情 同性");
        assert_eq!(
            info,
            Info {
                director: Some("陈凯歌 Kaige Chen".into()),
                year: Some(1993),
                country: Some("中国大陆 中国香港".into()),
                genre: Some("剧情 爱情 同性".into()),
            }
        );
    }

    #[test]
    fn info_year_with_region_suffix() {
        let info = parse_info("导演: 宫崎骏\n2001(日本)\u{a0}/\u{a0}日本\u{a0}/\u{a0}剧情 动画 奇幻");
        assert_eq!(info.year, Some(2001));
        assert_eq!(info.country.as_deref(), Some("日本"));
    }

    #[test]
    fn pages_stop_at_the_end_of_the_list() {
        assert_eq!(page_starts(100).collect::<Vec<_>>(), [0, 25, 50, 75]);
        assert_eq!(page_starts(30).collect::<Vec<_>>(), [0, 25]);
        assert_eq!(page_starts(300).last(), Some(225));
        assert_eq!(page_starts(300).count(), LIST_SIZE / PAGE_SIZE);
        assert_eq!(page_starts(0).count(), 0);
    }

    #[test]
    fn page_urls() {
        assert_eq!(page_url(0), "https://movie.douban.com/top250?start=0");
        assert_eq!(page_url(75), "https://movie.douban.com/top250?start=75");
    }
}
