//! Parsing of the deploy-list endpoint's `Link` pagination header.

/// Page links extracted from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    pub next: Option<String>,
    pub last: Option<String>,
}

/// Parse a `Link`-style header into its `next`/`last` page URLs.
///
/// The header is a comma-separated list of `<url>; rel="name"` entries.
/// Entries with other relations, and malformed entries, are ignored.
pub fn parse_link_header(header: &str) -> PaginationLinks {
    let mut links = PaginationLinks::default();

    for entry in header.split(',') {
        let mut segments = entry.split(';');

        let Some(url) = segments.next() else {
            continue;
        };
        let url = url.trim();
        if !url.starts_with('<') || !url.ends_with('>') {
            continue;
        }
        let url = &url[1..url.len() - 1];

        for param in segments {
            let param = param.trim();
            let Some(rel) = param.strip_prefix("rel=") else {
                continue;
            };
            match rel.trim_matches('"') {
                "next" => links.next = Some(url.to_string()),
                "last" => links.last = Some(url.to_string()),
                _ => {}
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_next_and_last() {
        let header = "<https://api.example.com/deploys?page=2>; rel=\"next\", \
                      <https://api.example.com/deploys?page=9>; rel=\"last\"";
        let links = parse_link_header(header);
        assert_eq!(
            links.next.as_deref(),
            Some("https://api.example.com/deploys?page=2")
        );
        assert_eq!(
            links.last.as_deref(),
            Some("https://api.example.com/deploys?page=9")
        );
    }

    #[test]
    fn test_parse_ignores_other_relations() {
        let header = "<https://api.example.com/deploys?page=1>; rel=\"prev\", \
                      <https://api.example.com/deploys?page=9>; rel=\"last\"";
        let links = parse_link_header(header);
        assert!(links.next.is_none());
        assert_eq!(
            links.last.as_deref(),
            Some("https://api.example.com/deploys?page=9")
        );
    }

    #[test]
    fn test_parse_unquoted_relation() {
        let links = parse_link_header("<https://api.example.com/deploys?page=3>; rel=next");
        assert_eq!(
            links.next.as_deref(),
            Some("https://api.example.com/deploys?page=3")
        );
    }

    #[test]
    fn test_parse_malformed_header() {
        assert_eq!(parse_link_header(""), PaginationLinks::default());
        assert_eq!(parse_link_header("garbage"), PaginationLinks::default());
        assert_eq!(
            parse_link_header("https://no-brackets.example.com; rel=\"next\""),
            PaginationLinks::default()
        );
    }
}
