//! Heuristic contact extraction from fetched pages.
//!
//! Pattern matching over visible text plus `href`/`mailto:`/`tel:`
//! attributes. Values are deduplicated within one page; the same value found
//! on different pages is kept per page so provenance survives into the
//! stored result.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::types::{ContactHit, SocialLinks};

/// Characters of surrounding text captured as context for each hit.
const CONTEXT_RANGE: usize = 50;

/// Contact-related keywords checked against paths and titles (English and
/// Greek, accented and transliterated).
const CONTACT_KEYWORDS: &[&str] = &[
    "contact",
    "get-in-touch",
    "get in touch",
    "reach us",
    "epikoinonia",
    "επικοινων",
];

lazy_static! {
    static ref SCRIPT_RE: Regex = Regex::new(r"(?s)<script[^>]*>.*?</script>").unwrap();
    static ref STYLE_RE: Regex = Regex::new(r"(?s)<style[^>]*>.*?</style>").unwrap();
}

/// Everything extracted from a single page.
#[derive(Debug, Clone, Default)]
pub struct PageContacts {
    pub emails: Vec<ContactHit>,
    pub phones: Vec<ContactHit>,
    pub social: SocialLinks,
    pub is_contact_page: bool,
    pub page_type: String,
    pub title: Option<String>,
}

pub struct ContactExtractor {
    email_re: Regex,
    obfuscated_email_re: Regex,
    phone_re: Regex,
    facebook_re: Regex,
    instagram_re: Regex,
    linkedin_re: Regex,
    twitter_re: Regex,
    youtube_re: Regex,
}

impl Default for ContactExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactExtractor {
    pub fn new() -> Self {
        Self {
            email_re: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            obfuscated_email_re: Regex::new(
                r"\b([A-Za-z0-9._%+-]+)\s*[\[(]\s*at\s*[\])]\s*([A-Za-z0-9.-]+)\s*[\[(]\s*dot\s*[\])]\s*([A-Za-z]{2,})\b",
            )
            .unwrap(),
            phone_re: Regex::new(
                r"(?:\+\d{1,3}[\s.\-]?)?(?:\(\d{1,4}\)[\s.\-]?)?\d{2,4}(?:[\s.\-]?\d{2,4}){2,4}",
            )
            .unwrap(),
            facebook_re: Regex::new(r"(?:https?://)?(?:www\.)?facebook\.com/([A-Za-z0-9_.\-]+)")
                .unwrap(),
            instagram_re: Regex::new(r"(?:https?://)?(?:www\.)?instagram\.com/([A-Za-z0-9_.]+)")
                .unwrap(),
            linkedin_re: Regex::new(
                r"(?:https?://)?(?:[a-z]{2}\.)?linkedin\.com/(in|company)/([A-Za-z0-9\-_%]+)",
            )
            .unwrap(),
            twitter_re: Regex::new(r"(?:https?://)?(?:www\.)?\b(?:twitter|x)\.com/([A-Za-z0-9_]+)")
                .unwrap(),
            youtube_re: Regex::new(
                r"(?:https?://)?(?:www\.)?youtube\.com/(channel/|user/|c/|@)?([A-Za-z0-9_\-]+)",
            )
            .unwrap(),
        }
    }

    /// Extract contacts, social links and page classification from one page.
    pub fn extract(&self, url: &str, html: &str) -> PageContacts {
        let script_stripped = SCRIPT_RE.replace_all(html, " ");
        let stripped = STYLE_RE.replace_all(&script_stripped, " ");
        let document = Html::parse_document(&stripped);
        let text = visible_text(&document);
        let title = extract_title(&document);

        let mut emails = Vec::new();
        let mut phones = Vec::new();
        let mut seen_emails = HashSet::new();
        let mut seen_phones = HashSet::new();

        self.collect_text_emails(&text, url, &mut emails, &mut seen_emails);
        self.collect_text_phones(&text, url, &mut phones, &mut seen_phones);
        self.collect_anchor_contacts(
            &document,
            url,
            &mut emails,
            &mut phones,
            &mut seen_emails,
            &mut seen_phones,
        );

        let social = self.extract_social(&stripped);
        let path = Url::parse(url).map(|u| u.path().to_string()).unwrap_or_default();
        // Greek paths arrive percent-encoded
        let path = urlencoding::decode(&path)
            .map(|decoded| decoded.into_owned())
            .unwrap_or(path);
        let is_contact_page = classify_contact_page(&path, title.as_deref());
        let page_type = determine_page_type(&path, title.as_deref());

        debug!(
            url = %url,
            emails = emails.len(),
            phones = phones.len(),
            is_contact_page,
            page_type = %page_type,
            "Page extraction finished"
        );

        PageContacts {
            emails,
            phones,
            social,
            is_contact_page,
            page_type,
            title,
        }
    }

    fn collect_text_emails(
        &self,
        text: &str,
        url: &str,
        out: &mut Vec<ContactHit>,
        seen: &mut HashSet<String>,
    ) {
        for m in self.email_re.find_iter(text) {
            let email = m.as_str().to_lowercase();
            if is_plausible_email(&email) && seen.insert(email.clone()) {
                out.push(
                    ContactHit::new(email, url)
                        .with_context(context_window(text, m.start(), m.end())),
                );
            }
        }
        // name [at] domain [dot] tld spelled out to dodge harvesters
        for cap in self.obfuscated_email_re.captures_iter(text) {
            let email = format!("{}@{}.{}", &cap[1], &cap[2], &cap[3]).to_lowercase();
            let m = cap.get(0).unwrap();
            if is_plausible_email(&email) && seen.insert(email.clone()) {
                out.push(
                    ContactHit::new(email, url)
                        .with_context(context_window(text, m.start(), m.end())),
                );
            }
        }
    }

    fn collect_text_phones(
        &self,
        text: &str,
        url: &str,
        out: &mut Vec<ContactHit>,
        seen: &mut HashSet<String>,
    ) {
        for m in self.phone_re.find_iter(text) {
            let normalized = normalize_phone(m.as_str());
            if is_plausible_phone(&normalized) && seen.insert(normalized.clone()) {
                out.push(
                    ContactHit::new(normalized, url)
                        .with_context(context_window(text, m.start(), m.end())),
                );
            }
        }
    }

    /// `mailto:` and `tel:` anchors are explicit declarations - they bypass
    /// the plausibility checks applied to free text.
    fn collect_anchor_contacts(
        &self,
        document: &Html,
        url: &str,
        emails: &mut Vec<ContactHit>,
        phones: &mut Vec<ContactHit>,
        seen_emails: &mut HashSet<String>,
        seen_phones: &mut HashSet<String>,
    ) {
        let selector = Selector::parse("a[href]").unwrap();
        for anchor in document.select(&selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if let Some(rest) = href.strip_prefix("mailto:") {
                let email = rest.split('?').next().unwrap_or("").trim().to_lowercase();
                if email.contains('@') && seen_emails.insert(email.clone()) {
                    emails.push(ContactHit::new(email, url));
                }
            } else if let Some(rest) = href.strip_prefix("tel:") {
                let normalized = normalize_phone(rest);
                let digits = normalized.trim_start_matches('+').len();
                if digits >= 8 && seen_phones.insert(normalized.clone()) {
                    phones.push(ContactHit::new(normalized, url));
                }
            }
        }
    }

    fn extract_social(&self, html: &str) -> SocialLinks {
        let mut social = SocialLinks::default();

        for cap in self.facebook_re.captures_iter(html) {
            let handle = &cap[1];
            if !is_social_noise(handle) {
                social.facebook = Some(format!("https://facebook.com/{}", handle));
                break;
            }
        }
        for cap in self.instagram_re.captures_iter(html) {
            let handle = &cap[1];
            if !is_social_noise(handle) {
                social.instagram = Some(format!("https://instagram.com/{}", handle));
                break;
            }
        }
        for cap in self.linkedin_re.captures_iter(html) {
            social.linkedin = Some(format!("https://linkedin.com/{}/{}", &cap[1], &cap[2]));
            break;
        }
        for cap in self.twitter_re.captures_iter(html) {
            let handle = &cap[1];
            if !is_social_noise(handle) {
                social.twitter = Some(format!("https://twitter.com/{}", handle));
                break;
            }
        }
        for cap in self.youtube_re.captures_iter(html) {
            let prefix = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let handle = &cap[2];
            if !is_social_noise(handle) {
                social.youtube = Some(format!("https://youtube.com/{}{}", prefix, handle));
                break;
            }
        }

        social
    }
}

/// Resolve every same-document anchor into an absolute URL.
///
/// No filtering beyond scheme and obvious non-navigational hrefs - the
/// engine applies domain scoping, skip rules and canonical dedup.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").unwrap();

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| {
            !href.starts_with('#')
                && !href.starts_with("javascript:")
                && !href.starts_with("mailto:")
                && !href.starts_with("tel:")
        })
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| url.to_string())
        .collect()
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Visible page text, whitespace-collapsed.
fn visible_text(document: &Html) -> String {
    let selector = Selector::parse("body").unwrap();
    document
        .select(&selector)
        .next()
        .map(|body| {
            body.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Filter out machine artifacts the email regex happily matches.
fn is_plausible_email(email: &str) -> bool {
    const JUNK: &[&str] = &[
        "noreply",
        "no-reply",
        "donotreply",
        "example.com",
        "sentry.io",
        "@2x.",
    ];
    const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".css"];

    !JUNK.iter().any(|junk| email.contains(junk))
        && !ASSET_SUFFIXES.iter().any(|ext| email.ends_with(ext))
}

/// Keep digits and a leading `+` only.
fn normalize_phone(raw: &str) -> String {
    let mut out = String::new();
    for (i, c) in raw.trim().chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    out
}

/// Accept international numbers with an explicit `+`, and bare ten-digit
/// Greek numbers (landlines start with 2, mobiles with 69).
fn is_plausible_phone(normalized: &str) -> bool {
    if let Some(digits) = normalized.strip_prefix('+') {
        return (10..=14).contains(&digits.len());
    }
    normalized.len() == 10 && (normalized.starts_with('2') || normalized.starts_with("69"))
}

fn is_social_noise(handle: &str) -> bool {
    const NOISE: &[&str] = &[
        "sharer", "share", "intent", "plugins", "dialog", "home", "login", "signup", "embed",
        "watch", "hashtag", "search",
    ];
    NOISE.contains(&handle.to_lowercase().as_str())
}

fn classify_contact_page(path: &str, title: Option<&str>) -> bool {
    let path_lower = path.to_lowercase();
    let title_lower = title.unwrap_or("").to_lowercase();
    CONTACT_KEYWORDS
        .iter()
        .any(|kw| path_lower.contains(kw) || title_lower.contains(kw))
}

/// Coarse page classification used downstream for export confidence.
fn determine_page_type(path: &str, title: Option<&str>) -> String {
    let path_lower = path.to_lowercase();
    let title_lower = title.unwrap_or("").to_lowercase();
    let matches = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|kw| path_lower.contains(kw) || title_lower.contains(kw))
    };

    if matches(&["contact", "epikoinonia", "επικοινων"]) {
        "contact"
    } else if matches(&["about", "sxetika", "σχετικά", "etaireia", "εταιρεία"]) {
        "about"
    } else if matches(&["team", "staff", "ομάδα"]) {
        "team"
    } else if matches(&["privacy", "terms", "όροι"]) {
        "legal"
    } else if matches(&["blog", "news", "νέα"]) {
        "blog"
    } else {
        "general"
    }
    .to_string()
}

/// A window of surrounding text, clamped to char boundaries.
fn context_window(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_RANGE);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_RANGE).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}
