use compact_str::CompactString;
use scraper::ElementRef;

/// Trims ASCII and Unicode whitespace, `&nbsp;` included.
#[inline]
#[must_use]
pub fn clean(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\u{a0}')
}

/// All text below `element`, trimmed; `None` if nothing is left.
#[must_use]
pub fn element_text(element: ElementRef) -> Option<CompactString> {
    let text = element.text().collect::<String>();
    let text = clean(&text);
    (!text.is_empty()).then(|| text.into())
}

/// `"1,234,567"` -> `1234567`.
#[must_use]
pub fn parse_count(s: &str) -> Option<i64> {
    clean(s).replace(',', "").parse().ok()
}

/// Keeps only the ASCII digits: `"2954347人评价"` -> `2954347`.
#[must_use]
pub fn digits_only(s: &str) -> Option<i64> {
    let digits = s.chars().filter(char::is_ascii_digit).collect::<String>();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use scraper::{Html, Selector};

    use super::*;

    #[test]
    fn cleans_nbsp() {
        assert_eq!(clean("\u{a0} 美国\u{a0}\n"), "美国");
        assert_eq!(clean("   "), "");
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count(" 4,912,345 "), Some(4_912_345));
        assert_eq!(parse_count("12万"), None);
        assert_eq!(digits_only("2954347人评价"), Some(2_954_347));
        assert_eq!(digits_only("人评价"), None);
    }

    #[test]
    fn text_of_element() {
        let html = Html::parse_fragment("<div><span> a<b>b</b> </span><i>  </i></div>");
        let span = html.select(&Selector::parse("span").unwrap()).next().unwrap();
        let i = html.select(&Selector::parse("i").unwrap()).next().unwrap();
        assert_eq!(element_text(span).as_deref(), Some("ab"));
        assert_eq!(element_text(i), None);
    }
}
