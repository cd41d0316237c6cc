//! Picks the next device's access point out of the visible networks.

use regex::{Regex, RegexBuilder};

use crate::error::{ProvisionError, ProvisionResult};
use crate::job::{MatchMode, SsidMatchSpec};

/// Compiled form of an [`SsidMatchSpec`]. All comparisons ignore case.
#[derive(Debug, Clone)]
pub enum SsidMatcher {
    Exact(String),
    Prefix(String),
    Pattern(Regex),
    /// Empty match value. Never selects anything.
    Nothing,
}

impl SsidMatcher {
    /// Compile a match spec. An invalid pattern is a configuration error.
    pub fn new(spec: &SsidMatchSpec) -> ProvisionResult<Self> {
        let value = spec.value.as_str();
        if value.trim().is_empty() {
            return Ok(SsidMatcher::Nothing);
        }

        Ok(match spec.mode {
            MatchMode::Exact => SsidMatcher::Exact(value.to_lowercase()),
            MatchMode::Prefix => SsidMatcher::Prefix(value.to_lowercase()),
            MatchMode::Pattern => {
                let regex = RegexBuilder::new(value)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ProvisionError::Config(format!("Invalid network pattern '{}': {}", value, e))
                    })?;
                SsidMatcher::Pattern(regex)
            }
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            SsidMatcher::Exact(value) => name.to_lowercase() == *value,
            SsidMatcher::Prefix(value) => name.to_lowercase().starts_with(value.as_str()),
            SsidMatcher::Pattern(regex) => regex.is_match(name),
            SsidMatcher::Nothing => false,
        }
    }

    /// First visible name that matches, in listing order.
    pub fn pick(&self, visible: &[String]) -> Option<String> {
        visible.iter().find(|name| self.matches(name)).cloned()
    }

    /// Short description for "still looking" log lines.
    pub fn describe(&self) -> String {
        match self {
            SsidMatcher::Exact(value) => format!("SSID '{}'", value),
            SsidMatcher::Prefix(value) => format!("prefix '{}'", value),
            SsidMatcher::Pattern(regex) => format!("pattern '{}'", regex.as_str()),
            SsidMatcher::Nothing => "nothing".to_string(),
        }
    }
}
