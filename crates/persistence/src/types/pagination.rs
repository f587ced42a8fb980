//! Paging for search queries.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, StorageResult};

/// Hard upper bound on a page size, whatever the configuration says.
pub const MAX_PAGE_SIZE: u32 = 1000;

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    MAX_PAGE_SIZE
}

/// Search limits applied by the query generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when a query does not set one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Largest page size a query may ask for, capped at [`MAX_PAGE_SIZE`].
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl SearchConfig {
    /// The effective page size limit.
    pub fn page_size_limit(&self) -> u32 {
        self.max_page_size.min(MAX_PAGE_SIZE)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// A 1-based page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number, starting at 1.
    pub number: u32,
    /// Rows per page.
    pub size: u32,
}

impl Page {
    /// Creates a page.
    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.number.saturating_sub(1)) * u64::from(self.size)
    }

    /// Checks the page against the configured limits.
    pub fn validate(&self, config: &SearchConfig) -> StorageResult<()> {
        if self.number < 1 {
            return Err(ConfigurationError::InvalidPaging {
                message: format!("page must be at least 1, got {}", self.number),
            }
            .into());
        }
        let limit = config.page_size_limit();
        if self.size < 1 || self.size > limit {
            return Err(ConfigurationError::InvalidPaging {
                message: format!("page size must be between 1 and {}, got {}", limit, self.size),
            }
            .into());
        }
        Ok(())
    }
}

/// How many rows a query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Paging {
    /// First page with the configured default size.
    #[default]
    Default,
    /// An explicit page.
    Page(Page),
    /// No LIMIT clause; used for streaming.
    Unlimited,
}

impl Paging {
    /// Resolves to a concrete page, or `None` when unlimited.
    pub fn resolve(&self, config: &SearchConfig) -> StorageResult<Option<Page>> {
        match self {
            Paging::Default => {
                let page = Page::new(1, config.default_page_size);
                page.validate(config)?;
                Ok(Some(page))
            }
            Paging::Page(page) => {
                page.validate(config)?;
                Ok(Some(*page))
            }
            Paging::Unlimited => Ok(None),
        }
    }
}
