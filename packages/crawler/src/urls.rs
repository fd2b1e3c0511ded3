//! URL canonicalization, domain scoping, skip rules and seed generation.

use url::Url;

/// Paths that are never fetched, regardless of budget.
///
/// Auth, commerce and account areas plus asset/feed paths that cannot
/// contain contact information.
const SKIP_PATTERNS: &[&str] = &[
    "/wp-admin",
    "/wp-login",
    "/wp-content/uploads",
    "/admin",
    "/login",
    "/logout",
    "/signin",
    "/signout",
    "/signup",
    "/register",
    "/auth",
    "/cart",
    "/checkout",
    "/basket",
    "/account",
    "/my-account",
    "/api/",
    "/cdn-cgi/",
    "/feed",
    "/rss",
    "/sitemap",
    ".pdf",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".svg",
    ".webp",
    ".css",
    ".js",
    ".xml",
    ".json",
    ".zip",
];

/// Likely contact/about/privacy/team paths probed as crawl seeds, including
/// Greek-language variants (transliterated and accented).
const SEED_PATHS: &[&str] = &[
    "/contact",
    "/contact-us",
    "/contacts",
    "/about",
    "/about-us",
    "/privacy",
    "/privacy-policy",
    "/epikoinonia",
    "/etaireia",
    "/sxetika-me",
    "/επικοινωνία",
    "/εταιρεία",
    "/σχετικά",
];

/// Prepend `https://` when no scheme is present.
fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Normalize a URL to a single comparable form.
///
/// Strips the fragment, lower-cases the host, drops a leading `www.`, and
/// removes the trailing slash except on the root path. Two URLs that
/// canonicalize identically are treated as the same page.
pub fn canonicalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(&ensure_scheme(raw.trim())).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);

    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host)).ok()?;

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// The canonical host of a URL (lower-cased, `www.`-stripped).
pub fn canonical_host(raw: &str) -> Option<String> {
    let url = Url::parse(&ensure_scheme(raw.trim())).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// True when both URLs resolve to the same canonical host.
pub fn is_same_domain(a: &str, b: &str) -> bool {
    match (canonical_host(a), canonical_host(b)) {
        (Some(ha), Some(hb)) => ha == hb,
        _ => false,
    }
}

/// True for paths that must never be fetched.
pub fn should_skip_path(path: &str) -> bool {
    let path_lower = path.to_lowercase();
    SKIP_PATTERNS
        .iter()
        .any(|pattern| path_lower.contains(pattern))
}

/// Seed URLs for one crawl: the site root, the submitted URL, and the fixed
/// list of likely contact pages, deduplicated by canonical form.
pub fn generate_seed_urls(base_url: &str) -> Vec<String> {
    let Some(canonical_base) = canonicalize(base_url) else {
        return Vec::new();
    };
    let Ok(parsed) = Url::parse(&canonical_base) else {
        return Vec::new();
    };

    let root = format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default()
    );

    let mut seeds = Vec::new();
    let mut push = |candidate: Option<String>, seeds: &mut Vec<String>| {
        if let Some(url) = candidate {
            if !seeds.contains(&url) {
                seeds.push(url);
            }
        }
    };

    push(canonicalize(&root), &mut seeds);
    push(Some(canonical_base.clone()), &mut seeds);
    for path in SEED_PATHS {
        let joined = Url::parse(&root).ok().and_then(|r| r.join(path).ok());
        push(joined.and_then(|u| canonicalize(u.as_str())), &mut seeds);
    }

    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_fragment_and_www() {
        assert_eq!(
            canonicalize("https://WWW.Example.com/About#team"),
            Some("https://example.com/About".to_string())
        );
    }

    #[test]
    fn test_canonicalize_trailing_slash() {
        assert_eq!(
            canonicalize("https://example.com/contact/"),
            Some("https://example.com/contact".to_string())
        );
        // Root keeps its slash
        assert_eq!(
            canonicalize("https://example.com"),
            Some("https://example.com/".to_string())
        );
    }

    #[test]
    fn test_canonicalize_adds_scheme() {
        assert_eq!(
            canonicalize("example.com/contact"),
            Some("https://example.com/contact".to_string())
        );
    }

    #[test]
    fn test_canonicalize_rejects_non_http() {
        assert_eq!(canonicalize("ftp://example.com/files"), None);
        assert_eq!(canonicalize("mailto:info@example.com"), None);
    }

    #[test]
    fn test_same_domain_ignores_www_and_case() {
        assert!(is_same_domain(
            "https://www.example.com/a",
            "https://EXAMPLE.com/b"
        ));
        assert!(!is_same_domain(
            "https://example.com",
            "https://other.example.org"
        ));
    }

    #[test]
    fn test_subdomain_is_a_different_host() {
        assert!(!is_same_domain(
            "https://a.example.com",
            "https://example.com"
        ));
    }

    #[test]
    fn test_should_skip_path() {
        assert!(should_skip_path("/wp-admin/options.php"));
        assert!(should_skip_path("/cart"));
        assert!(should_skip_path("/my-account/orders"));
        assert!(should_skip_path("/logo.png"));
        assert!(!should_skip_path("/about"));
        assert!(!should_skip_path("/contact-us"));
    }

    #[test]
    fn test_generate_seed_urls_dedups_and_includes_greek() {
        let seeds = generate_seed_urls("https://www.example.com/");
        assert_eq!(seeds[0], "https://example.com/");
        assert!(seeds.contains(&"https://example.com/contact".to_string()));
        assert!(seeds.contains(&"https://example.com/epikoinonia".to_string()));
        // Accented paths survive (percent-encoded by the URL parser)
        assert!(seeds
            .iter()
            .any(|s| s.contains("%CE%B5%CF%80%CE%B9%CE%BA%CE%BF%CE%B9%CE%BD%CF%89%CE%BD")));
        // Root and submitted URL canonicalize identically here - no duplicate
        let unique: std::collections::HashSet<_> = seeds.iter().collect();
        assert_eq!(unique.len(), seeds.len());
    }

    #[test]
    fn test_generate_seed_urls_keeps_submitted_path() {
        let seeds = generate_seed_urls("https://example.com/el/home");
        assert!(seeds.contains(&"https://example.com/el/home".to_string()));
    }

    #[test]
    fn test_generate_seed_urls_invalid_base() {
        assert!(generate_seed_urls("not a url at all \u{7f}").is_empty());
    }
}
