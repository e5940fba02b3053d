use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, Url, header::CONTENT_TYPE};

use crate::{
    courier_err,
    utils::errors::{CourierError, CourierErrorKind},
};

/// `rel` values advertising a site icon, best first.
pub const REL_PRIORITY: &[&str] = &[
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
    "icon",
    "shortcut icon",
];

pub const FALLBACK_FAVICON: &str = "/favicon.ico";

/// A `<link>` element found in the page head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconLink {
    pub rel: String,
    pub href: String,
    pub sizes: Option<String>,
}
impl IconLink {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            sizes: None,
        }
    }
    pub fn with_sizes(mut self, sizes: impl Into<String>) -> Self {
        self.sizes = Some(sizes.into());
        self
    }

    fn normalized_rel(&self) -> String {
        self.rel
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Largest edge declared in `sizes`. `any` (scalable) beats everything,
    /// a missing attribute loses to everything.
    fn declared_size(&self) -> u32 {
        let Some(sizes) = self.sizes.as_deref() else {
            return 0;
        };
        sizes
            .split_whitespace()
            .filter_map(|token| {
                if token.eq_ignore_ascii_case("any") {
                    return Some(u32::MAX);
                }
                let (w, h) = token.to_ascii_lowercase().split_once('x').map(|(w, h)| {
                    (w.parse::<u32>().ok(), h.parse::<u32>().ok())
                })?;
                Some(w?.max(h?))
            })
            .max()
            .unwrap_or(0)
    }
}

/// Picks the icon URL for a page: the highest priority `rel` wins, then the
/// largest declared size, then document order. Without any usable link the
/// conventional `/favicon.ico` of the page is used.
pub fn best_icon_url(links: &[IconLink], page_url: &Url) -> Option<Url> {
    for rel in REL_PRIORITY {
        let mut best: Option<(u32, Url)> = None;
        for link in links.iter().filter(|l| l.normalized_rel() == *rel) {
            let Ok(url) = page_url.join(link.href.trim()) else {
                continue;
            };
            let size = link.declared_size();
            if best.as_ref().is_none_or(|(current, _)| size > *current) {
                best = Some((size, url));
            }
        }
        if let Some((_, url)) = best {
            return Some(url);
        }
    }
    page_url.join(FALLBACK_FAVICON).ok()
}

pub fn is_inline(icon: &str) -> bool {
    icon.starts_with("data:")
}

#[derive(Debug, Clone)]
pub struct FetchedIcon {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedIcon, CourierError>;
}

pub struct HttpFetcher {
    client: Client,
}
impl HttpFetcher {
    pub fn new() -> Result<Self, CourierError> {
        let client = Client::builder()
            .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| courier_err!(CourierErrorKind::HttpGetRequest, e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl IconFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedIcon, CourierError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| courier_err!(CourierErrorKind::HttpGetRequest, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(courier_err!(
                CourierErrorKind::HttpStatus,
                "{} answered {}",
                url,
                resp.status()
            ));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase());

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| courier_err!(CourierErrorKind::HttpGetRequest, e.to_string()))?;

        Ok(FetchedIcon {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Recognizes the image formats browsers serve as favicons.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [0x00, 0x00, 0x01, 0x00, ..] => Some("image/x-icon"),
        [b'B', b'M', ..] => Some("image/bmp"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => {
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
            let head = head.trim_start();
            if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
                Some("image/svg+xml")
            } else {
                None
            }
        }
    }
}

impl FetchedIcon {
    /// Mime type of the payload. Magic bytes win over the declared header;
    /// anything that is not recognizably an image is rejected.
    pub fn mime(&self) -> Result<String, CourierError> {
        if self.bytes.is_empty() {
            return Err(courier_err!(CourierErrorKind::ImageDecode, "empty icon body"));
        }
        if let Some(mime) = sniff_mime(&self.bytes) {
            return Ok(mime.into());
        }
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => Ok(ct.into()),
            other => Err(courier_err!(
                CourierErrorKind::ImageDecode,
                "not an image (content type {:?})",
                other
            )),
        }
    }

    pub fn into_data_url(self) -> Result<String, CourierError> {
        let mime = self.mime()?;
        Ok(encode_data_url(&mime, &self.bytes))
    }
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Splits a `data:` URL into its mime type and raw bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), CourierError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| courier_err!(CourierErrorKind::InvalidUrl, "not a data url"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| courier_err!(CourierErrorKind::InvalidUrl, "data url without payload"))?;

    match meta.strip_suffix(";base64") {
        Some(mime) => {
            let bytes = STANDARD
                .decode(payload.trim())
                .map_err(|e| courier_err!(CourierErrorKind::Base64Decode, e.to_string()))?;
            Ok((mime.to_string(), bytes))
        }
        None => Ok((meta.to_string(), payload.as_bytes().to_vec())),
    }
}

/// Fetches `url` and re-encodes it as a `data:` URL.
pub async fn inline_icon(fetcher: &dyn IconFetcher, url: &Url) -> Result<String, CourierError> {
    if url.scheme() == "data" {
        return Ok(url.to_string());
    }
    fetcher.fetch(url).await?.into_data_url()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIcon {
    Inline(String),
    Default,
}

/// Turns whatever icon a request carries into something displayable.
///
/// This is the last resolution step: every failure ends in
/// [`ResolvedIcon::Default`] and nothing is propagated.
pub async fn finalize_icon(
    fetcher: &dyn IconFetcher,
    icon: Option<&str>,
    page_url: &str,
) -> ResolvedIcon {
    if let Some(icon) = icon.filter(|i| is_inline(i)) {
        return match decode_data_url(icon) {
            Ok(_) => ResolvedIcon::Inline(icon.to_string()),
            Err(e) => {
                tracing::warn!("Dropping malformed inline icon: {}", e);
                ResolvedIcon::Default
            }
        };
    }

    let page = Url::parse(page_url).ok();
    let target = match (icon.filter(|i| !i.trim().is_empty()), page.as_ref()) {
        (Some(icon), Some(page)) => page.join(icon.trim()).ok(),
        (Some(icon), None) => Url::parse(icon.trim()).ok(),
        (None, Some(page)) => page.join(FALLBACK_FAVICON).ok(),
        (None, None) => None,
    };
    let Some(target) = target else {
        tracing::debug!("No icon candidate for {}", page_url);
        return ResolvedIcon::Default;
    };

    match inline_icon(fetcher, &target).await {
        Ok(data) => ResolvedIcon::Inline(data),
        Err(e) => {
            tracing::warn!("Icon {} unavailable, using default: {}", target, e);
            ResolvedIcon::Default
        }
    }
}
