use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::ConfigError;

/// A compiled list of glob patterns matched against `/`-separated storage keys.
///
/// `*` stays within one path segment and `**` spans segments. An empty list matches
/// nothing.
#[derive(Debug, Clone)]
pub struct GlobList {
    set: GlobSet,
    empty: bool,
}

impl GlobList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| ConfigError::InvalidGlob {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ConfigError::InvalidGlob {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(","),
            source,
        })?;
        Ok(Self {
            set,
            empty: patterns.is_empty(),
        })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            empty: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_match(&self, key: &str) -> bool {
        !self.empty && self.set.is_match(key)
    }
}
