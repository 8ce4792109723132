//! Sitemap resolution
//!
//! Fetches a sitemap document and expands it into the flat, ordered list of
//! page URLs it (transitively) lists. Sitemap indexes are followed recursively;
//! a child that fails is logged and skipped so one broken sitemap does not hide
//! the pages listed by its siblings.

use crate::ScreenshotError;
use futures::future::{BoxFuture, FutureExt};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One fetched sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapNode {
    /// A `<sitemapindex>` listing child sitemap URLs, in document order.
    Index(Vec<String>),
    /// A `<urlset>` listing page URLs, in document order, empty entries removed.
    Leaf(Vec<String>),
}

/// Parses a sitemap body.
///
/// A `sitemapindex` root with at least one `<sitemap><loc>` entry is an index.
/// Anything else must be a well-formed `urlset`, otherwise the document is
/// rejected with [`ScreenshotError::Parse`]. Elements are matched by local
/// name, so namespace prefixes are ignored.
pub fn parse_sitemap(url: &str, body: &str) -> Result<SitemapNode, ScreenshotError> {
    let parse_error = |reason: String| ScreenshotError::Parse {
        url: url.to_string(),
        reason,
    };

    let mut reader = Reader::from_str(body);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut root: Option<Vec<u8>> = None;
    let mut entries: Vec<String> = Vec::new();
    let mut current_loc: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = element.local_name().as_ref().to_vec();
                if stack.is_empty() {
                    if root.is_some() {
                        return Err(parse_error("multiple root elements".to_string()));
                    }
                    root = Some(name.clone());
                }
                stack.push(name);
                if is_entry_loc(&stack) {
                    current_loc = Some(String::new());
                }
            }
            Ok(Event::Empty(element)) => {
                let name = element.local_name().as_ref().to_vec();
                if stack.is_empty() {
                    if root.is_some() {
                        return Err(parse_error("multiple root elements".to_string()));
                    }
                    root = Some(name);
                    continue;
                }
                stack.push(name);
                if is_entry_loc(&stack) {
                    entries.push(String::new());
                }
                stack.pop();
            }
            Ok(Event::End(_)) => {
                if is_entry_loc(&stack) {
                    if let Some(loc) = current_loc.take() {
                        entries.push(loc.trim().to_string());
                    }
                }
                stack.pop();
            }
            Ok(Event::Text(text)) => {
                if let Some(loc) = current_loc.as_mut() {
                    let text = text.unescape().map_err(|e| parse_error(e.to_string()))?;
                    loc.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(loc) = current_loc.as_mut() {
                    loc.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(parse_error(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }

    if !stack.is_empty() {
        return Err(parse_error("document ended inside an open element".to_string()));
    }

    match root.as_deref() {
        Some(b"sitemapindex") if !entries.is_empty() => Ok(SitemapNode::Index(entries)),
        Some(b"sitemapindex") => Err(parse_error(
            "sitemap index lists no sitemaps and is not a urlset".to_string(),
        )),
        Some(b"urlset") => Ok(SitemapNode::Leaf(
            entries.into_iter().filter(|loc| !loc.is_empty()).collect(),
        )),
        Some(other) => Err(parse_error(format!(
            "unexpected root element <{}>",
            String::from_utf8_lossy(other)
        ))),
        None => Err(parse_error("document has no root element".to_string())),
    }
}

/// `<sitemapindex><sitemap><loc>` or `<urlset><url><loc>`.
fn is_entry_loc(stack: &[Vec<u8>]) -> bool {
    match stack {
        [root, entry, loc] if loc.as_slice() == b"loc" => matches!(
            (root.as_slice(), entry.as_slice()),
            (b"sitemapindex", b"sitemap") | (b"urlset", b"url")
        ),
        _ => false,
    }
}

/// Fetches sitemaps over HTTP and expands indexes into page URLs.
#[derive(Debug, Clone, Default)]
pub struct SitemapResolver {
    client: reqwest::Client,
}

impl SitemapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolves `sitemap_url` into page URLs in document order.
    ///
    /// Errors on the root document are returned. Errors on index children are
    /// logged and the child contributes nothing. Duplicate page URLs are kept.
    /// A sitemap URL seen earlier in the same resolution is not fetched again,
    /// which also stops indexes that reference themselves.
    pub async fn resolve(&self, sitemap_url: &str) -> Result<Vec<String>, ScreenshotError> {
        let mut visited = HashSet::new();
        let urls = self.resolve_node(sitemap_url, &mut visited).await?;
        info!(
            "Resolved {} page URLs from {} sitemap(s)",
            urls.len(),
            visited.len()
        );
        Ok(urls)
    }

    fn resolve_node<'a>(
        &'a self,
        sitemap_url: &'a str,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<Vec<String>, ScreenshotError>> {
        async move {
            if !visited.insert(sitemap_url.to_string()) {
                return Err(ScreenshotError::Revisited(sitemap_url.to_string()));
            }

            let body = self.fetch(sitemap_url).await?;

            match parse_sitemap(sitemap_url, &body)? {
                SitemapNode::Index(children) => {
                    debug!("{} is a sitemap index with {} entries", sitemap_url, children.len());
                    let mut urls = Vec::new();
                    for child in children {
                        if child.is_empty() {
                            warn!("Skipping empty sitemap entry in {}", sitemap_url);
                            continue;
                        }
                        match self.resolve_node(&child, visited).await {
                            Ok(child_urls) => urls.extend(child_urls),
                            Err(e) => warn!("Skipping sitemap {}: {}", child, e),
                        }
                    }
                    Ok(urls)
                }
                SitemapNode::Leaf(urls) => {
                    debug!("{} lists {} pages", sitemap_url, urls.len());
                    Ok(urls)
                }
            }
        }
        .boxed()
    }

    async fn fetch(&self, sitemap_url: &str) -> Result<String, ScreenshotError> {
        let fetch_error = |reason: String| ScreenshotError::Fetch {
            url: sitemap_url.to_string(),
            reason,
        };

        debug!("Fetching sitemap {}", sitemap_url);
        let response = self
            .client
            .get(sitemap_url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        crate::metrics::record_sitemap_fetch();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/page1</loc></url>
  <url><loc>
    https://example.com/page2
  </loc></url>
</urlset>"#;

    fn index_of(children: &[String]) -> String {
        let entries: String = children
            .iter()
            .map(|c| format!("<sitemap><loc>{c}</loc></sitemap>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{entries}</sitemapindex>"#
        )
    }

    fn urlset_of(pages: &[&str]) -> String {
        let entries: String = pages
            .iter()
            .map(|p| format!("<url><loc>{p}</loc></url>"))
            .collect();
        format!("<urlset>{entries}</urlset>")
    }

    async fn serve(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_urlset() {
        let node = parse_sitemap("mem://sitemap", URLSET).unwrap();
        assert_eq!(
            node,
            SitemapNode::Leaf(vec![
                "https://example.com/page1".to_string(),
                "https://example.com/page2".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_urlset_drops_empty_locs() {
        let body = "<urlset><url><loc>https://a/1</loc></url><url><loc></loc></url>\
                    <url><loc/></url><url><loc>   </loc></url><url><loc>https://a/2</loc></url></urlset>";
        let node = parse_sitemap("mem://sitemap", body).unwrap();
        assert_eq!(
            node,
            SitemapNode::Leaf(vec!["https://a/1".to_string(), "https://a/2".to_string()])
        );
    }

    #[test]
    fn test_parse_urlset_unescapes_entities() {
        let body = "<urlset><url><loc>https://a/?x=1&amp;y=2</loc></url>\
                    <url><loc><![CDATA[https://a/?z=3&w=4]]></loc></url></urlset>";
        let node = parse_sitemap("mem://sitemap", body).unwrap();
        assert_eq!(
            node,
            SitemapNode::Leaf(vec![
                "https://a/?x=1&y=2".to_string(),
                "https://a/?z=3&w=4".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_prefixed_namespace() {
        let body = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9"><sm:url><sm:loc>https://a/1</sm:loc></sm:url></sm:urlset>"#;
        let node = parse_sitemap("mem://sitemap", body).unwrap();
        assert_eq!(node, SitemapNode::Leaf(vec!["https://a/1".to_string()]));
    }

    #[test]
    fn test_parse_index() {
        let body = index_of(&["https://a/s1.xml".to_string(), "https://a/s2.xml".to_string()]);
        let node = parse_sitemap("mem://index", &body).unwrap();
        assert_eq!(
            node,
            SitemapNode::Index(vec!["https://a/s1.xml".to_string(), "https://a/s2.xml".to_string()])
        );
    }

    #[test]
    fn test_parse_ignores_other_loc_elements() {
        let body = "<urlset><url><loc>https://a/1</loc><image><loc>https://a/img.png</loc></image></url></urlset>";
        let node = parse_sitemap("mem://sitemap", body).unwrap();
        assert_eq!(node, SitemapNode::Leaf(vec!["https://a/1".to_string()]));
    }

    #[test]
    fn test_parse_empty_index_is_error() {
        let err = parse_sitemap("mem://index", "<sitemapindex></sitemapindex>").unwrap_err();
        assert!(matches!(err, ScreenshotError::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for body in [
            "",
            "not xml at all",
            "<html><body>hi</body></html>",
            "<urlset><url><loc>https://a/1</loc></url>",
            "<urlset><url></urlset>",
        ] {
            let err = parse_sitemap("mem://bad", body).unwrap_err();
            assert!(
                matches!(err, ScreenshotError::Parse { ref url, .. } if url == "mem://bad"),
                "{body:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_empty_urlset_is_ok() {
        assert_eq!(
            parse_sitemap("mem://sitemap", "<urlset/>").unwrap(),
            SitemapNode::Leaf(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_resolve_leaf() {
        let server = MockServer::start().await;
        serve(&server, "/sitemap.xml", URLSET.to_string()).await;

        let urls = SitemapResolver::new()
            .resolve(&format!("{}/sitemap.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://example.com/page1", "https://example.com/page2"]);
    }

    #[tokio::test]
    async fn test_resolve_index_concatenates_in_order() {
        let server = MockServer::start().await;
        let children = vec![
            format!("{}/a.xml", server.uri()),
            format!("{}/b.xml", server.uri()),
        ];
        serve(&server, "/index.xml", index_of(&children)).await;
        serve(&server, "/a.xml", urlset_of(&["https://x/a1", "https://x/a2"])).await;
        serve(&server, "/b.xml", urlset_of(&["https://x/b1", "https://x/a1"])).await;

        let urls = SitemapResolver::new()
            .resolve(&format!("{}/index.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://x/a1", "https://x/a2", "https://x/b1", "https://x/a1"]);
    }

    #[tokio::test]
    async fn test_resolve_skips_failing_child() {
        let server = MockServer::start().await;
        let children = vec![
            format!("{}/a.xml", server.uri()),
            format!("{}/missing.xml", server.uri()),
            format!("{}/broken.xml", server.uri()),
            format!("{}/c.xml", server.uri()),
        ];
        serve(&server, "/index.xml", index_of(&children)).await;
        serve(&server, "/a.xml", urlset_of(&["https://x/a"])).await;
        serve(&server, "/broken.xml", "<urlset><url>".to_string()).await;
        serve(&server, "/c.xml", urlset_of(&["https://x/c"])).await;
        Mock::given(method("GET"))
            .and(path("/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let urls = SitemapResolver::new()
            .resolve(&format!("{}/index.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://x/a", "https://x/c"]);
    }

    #[tokio::test]
    async fn test_resolve_nested_index() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/root.xml",
            index_of(&[format!("{}/mid.xml", server.uri())]),
        )
        .await;
        serve(
            &server,
            "/mid.xml",
            index_of(&[format!("{}/leaf.xml", server.uri())]),
        )
        .await;
        serve(&server, "/leaf.xml", urlset_of(&["https://x/deep"])).await;

        let urls = SitemapResolver::new()
            .resolve(&format!("{}/root.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://x/deep"]);
    }

    #[tokio::test]
    async fn test_resolve_self_referencing_index_terminates() {
        let server = MockServer::start().await;
        let root = format!("{}/root.xml", server.uri());
        serve(
            &server,
            "/root.xml",
            index_of(&[root.clone(), format!("{}/leaf.xml", server.uri())]),
        )
        .await;
        serve(&server, "/leaf.xml", urlset_of(&["https://x/1"])).await;

        let urls = SitemapResolver::new().resolve(&root).await.unwrap();
        assert_eq!(urls, vec!["https://x/1"]);
    }

    #[tokio::test]
    async fn test_resolve_shared_child_is_fetched_once() {
        let server = MockServer::start().await;
        let shared = format!("{}/shared.xml", server.uri());
        serve(
            &server,
            "/root.xml",
            index_of(&[shared.clone(), format!("{}/other.xml", server.uri()), shared]),
        )
        .await;
        serve(&server, "/other.xml", urlset_of(&["https://x/other"])).await;
        Mock::given(method("GET"))
            .and(path("/shared.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset_of(&["https://x/shared"])))
            .expect(1)
            .mount(&server)
            .await;

        let urls = SitemapResolver::new()
            .resolve(&format!("{}/root.xml", server.uri()))
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://x/shared", "https://x/other"]);
    }

    #[test]
    fn test_revisited_error_wording() {
        let err = ScreenshotError::Revisited("https://x/shared.xml".to_string());
        assert!(err.is_resolution_error());
        assert_eq!(err.kind(), "revisited");
        assert!(err.to_string().contains("already resolved"));
    }

    #[tokio::test]
    async fn test_resolve_root_404_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = SitemapResolver::new()
            .resolve(&format!("{}/sitemap.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenshotError::Fetch { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_resolve_unreachable_root() {
        let err = SitemapResolver::new()
            .resolve("invalid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenshotError::Fetch { ref url, .. } if url == "invalid-url"));
    }
}
