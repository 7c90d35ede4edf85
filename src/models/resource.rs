//! Resource descriptors and cache keys

/// What a remote resource decodes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageKind {
    /// Single still frame
    #[default]
    Static,
    /// Animated GIF
    Animated,
}

impl ImageKind {
    /// Get the display name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Animated => "animated",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "static" | "still" => Some(Self::Static),
            "animated" | "gif" => Some(Self::Animated),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A remote image and the kind it should be decoded as.
///
/// Two descriptors are equal when both url and kind match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    url: String,
    kind: ImageKind,
}

impl ResourceDescriptor {
    /// Create a descriptor
    pub fn new(url: impl Into<String>, kind: ImageKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// Descriptor for a still image
    pub fn still(url: impl Into<String>) -> Self {
        Self::new(url, ImageKind::Static)
    }

    /// Descriptor for an animated image
    pub fn animated(url: impl Into<String>) -> Self {
        Self::new(url, ImageKind::Animated)
    }

    /// Image URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requested kind
    pub const fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Cache key for this resource at the given bounds, `None` if the url is empty
    pub fn cache_key(&self, max_width: u32, max_height: u32) -> Option<CacheKey> {
        CacheKey::new(&self.url, max_width, max_height)
    }
}

/// Identifies one decoded variant of a url: `#W<width>#H<height><url>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key; empty urls are never cached.
    pub fn new(url: &str, max_width: u32, max_height: u32) -> Option<Self> {
        if url.is_empty() {
            return None;
        }
        let mut key = String::with_capacity(url.len() + 12);
        key.push_str("#W");
        key.push_str(&max_width.to_string());
        key.push_str("#H");
        key.push_str(&max_height.to_string());
        key.push_str(url);
        Some(Self(key))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
