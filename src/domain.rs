//! Supported source domains.
//!
//! The registry is an ordered list; order is the tie-break when a URL could
//! match more than one entry. Queue names are derived from entries.

use crate::error::{Error, Result};

/// Domains supported out of the box, in classification order.
pub const DEFAULT_DOMAINS: &[&str] = &["bol.com", "ebay.nl", "coolblue.nl"];

/// Ordered registry of supported domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRegistry {
    domains: Vec<String>,
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAINS.iter().copied())
    }
}

impl DomainRegistry {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    /// All entries, in registry order.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Exact membership test.
    pub fn is_supported(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d == domain)
    }

    /// First entry that occurs within `url`.
    pub fn classify(&self, url: &str) -> Result<&str> {
        self.domains
            .iter()
            .find(|d| url.contains(d.as_str()))
            .map(String::as_str)
            .ok_or_else(|| Error::NotFound(format!("no supported domain found in url '{url}'")))
    }

    /// Pick the domain for a new watcher: the explicit one when given,
    /// otherwise whatever [`classify`](Self::classify) finds.
    pub fn resolve(&self, url: &str, explicit: Option<&str>) -> Result<String> {
        let domain = match explicit.map(str::trim).filter(|d| !d.is_empty()) {
            Some(domain) => domain.to_string(),
            None => self
                .classify(url)
                .map_err(|_| Error::Validation(format!("no supported domain found in url '{url}'")))?
                .to_string(),
        };

        if !self.is_supported(&domain) {
            return Err(Error::Validation(format!("domain '{domain}' is not supported")));
        }
        Ok(domain)
    }

    /// Queue names for every entry, in registry order.
    pub fn queue_names(&self) -> Vec<String> {
        self.domains.iter().map(|d| queue_name_for(d)).collect()
    }
}

/// Queue name for a domain: `queue_` followed by the domain with dots as underscores.
pub fn queue_name_for(domain: &str) -> String {
    format!("queue_{}", domain.replace('.', "_"))
}
