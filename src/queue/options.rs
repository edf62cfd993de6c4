//! Per-request scheduling modifiers.

use serde::{Deserialize, Serialize};

/// Query parameter that carries [`Source`] to the processing endpoint.
pub const SOURCE_PARAM: &str = "source";
/// Query parameter that disables proxy fetching at the processing endpoint.
pub const DISABLE_PROXY_FETCH_PARAM: &str = "proxyfetch";
/// Value paired with [`DISABLE_PROXY_FETCH_PARAM`].
pub const DISABLE_PROXY_FETCH_VALUE: &str = "off";

/// Who asked for the fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// System-triggered admission (the default).
    #[default]
    Worker,
    /// Human-triggered through the web frontend.
    Frontend,
}

impl Source {
    /// Wire value, or `None` for the default source which is never sent.
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            Self::Worker => None,
            Self::Frontend => Some("frontend"),
        }
    }
}

/// Scheduling modifiers for a single `schedule_fetch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Forwarded to the processing endpoint as `proxyfetch=off`.
    pub disable_proxy_fetch: bool,
    /// Appended to the task name to force reprocessing inside a dedup window.
    pub suffix: String,
    pub source: Source,
}

impl Options {
    pub fn frontend() -> Self {
        Self {
            source: Source::Frontend,
            ..Default::default()
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn without_proxy_fetch(mut self) -> Self {
        self.disable_proxy_fetch = true;
        self
    }

    /// Query string for the processing endpoint, without the leading `?`.
    pub fn query(&self) -> Option<String> {
        let mut params = Vec::with_capacity(2);
        if self.disable_proxy_fetch {
            params.push(format!(
                "{DISABLE_PROXY_FETCH_PARAM}={DISABLE_PROXY_FETCH_VALUE}"
            ));
        }
        if let Some(source) = self.source.as_param() {
            params.push(format!("{SOURCE_PARAM}={source}"));
        }
        if params.is_empty() {
            None
        } else {
            Some(params.join("&"))
        }
    }
}

/// Relative path of the processing endpoint for a module version.
pub fn fetch_path(module_path: &str, version: &str, opts: &Options) -> String {
    let mut path = format!("/fetch/{module_path}/@v/{version}");
    if let Some(query) = opts.query() {
        path.push('?');
        path.push_str(&query);
    }
    path
}
