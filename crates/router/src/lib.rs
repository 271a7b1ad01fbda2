use common::CacheConfig;
use std::path::Path;


/// Routing outcome for one backing path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Direct I/O against the backing handle; no cache state is touched.
    Bypass,
    /// Serve through the shard at this position in the declaration order.
    Shard(usize),
}

/// Path rule attached to one shard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchRule {
    Wildcard,
    Substring(String),
}

impl MatchRule {
    pub fn parse(rule: &str) -> Self {
        if rule == "*" {
            MatchRule::Wildcard
        } else {
            MatchRule::Substring(rule.to_string())
        }
    }
}

/// Routes a backing path to at most one shard.
///
/// The ignore list wins over everything. Among the rules, the first wildcard
/// is a default that loses to any substring match, and a later substring
/// match overrides an earlier one, so operators express precedence by
/// ordering shards.
#[derive(Clone, Debug)]
pub struct Router {
    rules: Vec<MatchRule>,
    ignore: Vec<String>,
}

impl Router {
    pub fn new(rules: Vec<MatchRule>, ignore: Vec<String>) -> Self {
        Self { rules, ignore }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let rules = config
            .caches
            .iter()
            .map(|shard| MatchRule::parse(&shard.dir))
            .collect();
        Self::new(rules, config.ignore_dir.clone())
    }

    pub fn route(&self, path: &Path) -> Route {
        let path = path.to_string_lossy();
        if self.ignore.iter().any(|needle| path.contains(needle.as_str())) {
            return Route::Bypass;
        }
        let mut chosen = None;
        for (idx, rule) in self.rules.iter().enumerate() {
            match rule {
                MatchRule::Wildcard if chosen.is_none() => chosen = Some(idx),
                MatchRule::Substring(needle) if path.contains(needle.as_str()) => {
                    chosen = Some(idx)
                }
                _ => {}
            }
        }
        match chosen {
            Some(idx) => Route::Shard(idx),
            None => Route::Bypass,
        }
    }
}
