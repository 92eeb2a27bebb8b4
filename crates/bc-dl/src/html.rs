//! Small query layer over `scraper`.
//!
//! Every helper reports failures as plain strings naming the selector, so the
//! metadata parser can attach the field name and accumulate them.

use scraper::{ElementRef, Html, Selector};

use crate::normalize::clean_html;

pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|err| format!("Invalid selector {css}: {err:?}"))
}

/// The single element under `scope` matching `css`.
pub fn query_unique<'a>(scope: ElementRef<'a>, css: &str) -> Result<ElementRef<'a>, String> {
    let selector = selector(css)?;
    let mut matches = scope.select(&selector);
    let first = matches
        .next()
        .ok_or_else(|| format!("No element matches selector: {css}"))?;
    if matches.next().is_some() {
        return Err(format!("More than one element matches selector: {css}"));
    }
    Ok(first)
}

/// Every element under `scope` matching `css`, failing when there is none.
pub fn query_all_non_empty<'a>(
    scope: ElementRef<'a>,
    css: &str,
) -> Result<Vec<ElementRef<'a>>, String> {
    let selector = selector(css)?;
    let matches: Vec<_> = scope.select(&selector).collect();
    if matches.is_empty() {
        return Err(format!("No element matches selector: {css}"));
    }
    Ok(matches)
}

/// Cleaned text content of an element.
pub fn text_content(element: ElementRef<'_>, css: &str) -> Result<String, String> {
    let raw: String = element.text().collect();
    let text = clean_html(&raw);
    if text.is_empty() {
        return Err(format!("Empty text for element: {css}"));
    }
    if looks_like_html_tag(&text) {
        return Err(format!(
            "Text looks like an HTML tag and this might be a problem: {text}"
        ));
    }
    Ok(text)
}

pub fn attribute(element: ElementRef<'_>, name: &str, css: &str) -> Result<String, String> {
    element
        .value()
        .attr(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("No {name} for element: {css}"))
}

/// Text of the unique element matching `css`.
pub fn unique_text(scope: ElementRef<'_>, css: &str) -> Result<String, String> {
    query_unique(scope, css).and_then(|element| text_content(element, css))
}

fn looks_like_html_tag(text: &str) -> bool {
    text.starts_with('<') && text.ends_with("/>")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="name-section">
            <h2 class="trackTitle">  Stella&#8203; Splendens </h2>
            <h3><span><a href="/">Inlustris</a></span></h3>
          </div>
          <ul><li>one</li><li>two</li><li>  </li><li>&lt;br/&gt;</li></ul>
          <img class="cover" src=" https://f4.bcbits.com/img/a1_16.jpg ">
        </body></html>
    "#;

    #[test]
    fn unique_text_is_cleaned() {
        let doc = parse_document(PAGE);
        let text = unique_text(doc.root_element(), "#name-section > h2.trackTitle").unwrap();
        assert_eq!(text, "Stella Splendens");
    }

    #[test]
    fn query_unique_rejects_missing_and_multiple() {
        let doc = parse_document(PAGE);
        assert_eq!(
            query_unique(doc.root_element(), "table").unwrap_err(),
            "No element matches selector: table"
        );
        assert_eq!(
            query_unique(doc.root_element(), "li").unwrap_err(),
            "More than one element matches selector: li"
        );
    }

    #[test]
    fn query_all_non_empty_keeps_document_order() {
        let doc = parse_document(PAGE);
        let items = query_all_non_empty(doc.root_element(), "li").unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(text_content(items[0], "li").unwrap(), "one");
        assert_eq!(text_content(items[1], "li").unwrap(), "two");
        assert!(query_all_non_empty(doc.root_element(), "tr").is_err());
    }

    #[test]
    fn text_content_rejects_blank_and_tag_like_text() {
        let doc = parse_document(PAGE);
        let items = query_all_non_empty(doc.root_element(), "li").unwrap();
        assert_eq!(text_content(items[2], "li").unwrap_err(), "Empty text for element: li");
        assert!(text_content(items[3], "li").unwrap_err().contains("looks like an HTML tag"));
    }

    #[test]
    fn attribute_is_trimmed() {
        let doc = parse_document(PAGE);
        let img = query_unique(doc.root_element(), "img.cover").unwrap();
        assert_eq!(
            attribute(img, "src", "img.cover").unwrap(),
            "https://f4.bcbits.com/img/a1_16.jpg"
        );
        assert_eq!(
            attribute(img, "alt", "img.cover").unwrap_err(),
            "No alt for element: img.cover"
        );
    }
}
