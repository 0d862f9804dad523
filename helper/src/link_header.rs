use lazy_regex::regex;
use std::collections::HashMap;

/// One entry of a `Link` header (RFC 8288), e.g.
/// `<https://hub.example/>; rel="hub"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub uri:    String,
    pub params: HashMap<String, String>,
}

impl Link {
    pub fn new(uri: impl Into<String>, rel: &str) -> Self {
        let mut params = HashMap::new();
        params.insert("rel".to_string(), rel.to_string());
        Self { uri: uri.into(), params }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn rel(&self) -> Option<&str> {
        self.params.get("rel").map(String::as_str)
    }

    /// `rel` may hold several space separated relation types.
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel()
            .map(|rels| rels.split_whitespace().any(|r| r == rel))
            .unwrap_or(false)
    }

    pub fn to_header_value(&self) -> String {
        let mut params: Vec<_> = self.params.iter().collect();
        // rel first, then stable order
        params.sort_by(|(a, _), (b, _)| {
            (a.as_str() != "rel", a.as_str())
                .cmp(&(b.as_str() != "rel", b.as_str()))
        });
        let mut value = format!("<{}>", self.uri);
        for (key, val) in params {
            value.push_str(&format!("; {}=\"{}\"", key, val));
        }
        value
    }
}

/// Parse every link found in the given header values. Unparseable fragments
/// are skipped.
pub fn parse<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Link> {
    let link_re = regex!(r#"<([^>]*)>((?:\s*;\s*[^;,]+)*)"#);
    let param_re = regex!(r#";\s*([A-Za-z0-9_\-\.\*]+)\s*=\s*"?([^";,]*)"?"#);

    let mut links = Vec::new();
    for value in values {
        for caps in link_re.captures_iter(value) {
            let uri = caps[1].trim().to_string();
            let raw_params = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let params = param_re
                .captures_iter(raw_params)
                .map(|p| (p[1].to_ascii_lowercase(), p[2].trim().to_string()))
                .collect();
            links.push(Link { uri, params });
        }
    }
    links
}

/// First link carrying the relation type `rel`.
pub fn find_rel<'a>(links: &'a [Link], rel: &str) -> Option<&'a Link> {
    links.iter().find(|link| link.has_rel(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    const HUB: &str = r#"<https://hub.example/>; rel="hub""#;
    const UNQUOTED: &str = "<https://a.example/auctions/>; rel=self";
    const COMBINED: &str =
        r#"<https://h/>; rel="hub", <https://s/>; rel="self""#;
    const MULTI_REL: &str = r#"<https://n/>; rel="next relation"; type="ODD""#;

    #[parameterized(
        hub = {HUB, "hub", "https://hub.example/"},
        unquoted = {UNQUOTED, "self", "https://a.example/auctions/"},
        combined = {COMBINED, "self", "https://s/"},
        multi_rel = {MULTI_REL, "relation", "https://n/"},
    )]
    fn test_parse_rel(header: &str, rel: &str, expected: &str) {
        let links = parse([header]);
        let link = find_rel(&links, rel).expect("link not found");
        assert_eq!(link.uri, expected);
    }

    #[test]
    fn test_parse_extra_params() {
        let links =
            parse([r#"<https://n.example/>; rel="relation"; type="EVEN""#]);
        assert_eq!(links.len(), 1);
        let ring_type = links[0].params.get("type").map(String::as_str);
        assert_eq!(ring_type, Some("EVEN"));
    }

    #[test]
    fn test_round_trip_header_value() {
        let link = Link::new("https://n.example/", "relation")
            .with_param("type", "ODD");
        assert_eq!(
            link.to_header_value(),
            r#"<https://n.example/>; rel="relation"; type="ODD""#
        );
        assert_eq!(parse([link.to_header_value().as_str()]), vec![link]);
    }

    #[test]
    fn test_garbage_is_skipped() {
        assert!(parse(["not a link at all"]).is_empty());
    }
}
