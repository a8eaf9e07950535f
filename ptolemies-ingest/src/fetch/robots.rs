//! Minimal robots.txt parsing and a per-host cache with a 1 hour TTL.
//!
//! Not a full RFC 9309 parser: only `User-agent`/`Disallow`/`Allow` groups
//! with literal prefix matching and longest-match-wins, which is the subset
//! the spec requires.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const ROBOTS_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    // (prefix, allowed)
    rules: Vec<(String, bool)>,
}

impl RobotsRules {
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let mut groups: Vec<(Vec<String>, Vec<(String, bool)>)> = Vec::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules: Vec<(String, bool)> = Vec::new();
        let mut in_group = false;

        for raw_line in body.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_group && !current_rules.is_empty() {
                        groups.push((current_agents.clone(), current_rules.clone()));
                        current_agents.clear();
                        current_rules.clear();
                    } else if !in_group {
                        current_agents.clear();
                    }
                    current_agents.push(value.to_ascii_lowercase());
                    in_group = true;
                }
                "disallow" => {
                    if !value.is_empty() {
                        current_rules.push((value.to_string(), false));
                    } else {
                        // empty Disallow means "allow everything"
                        current_rules.push((String::new(), true));
                    }
                }
                "allow" => {
                    current_rules.push((value.to_string(), true));
                }
                _ => {}
            }
        }
        if !current_agents.is_empty() {
            groups.push((current_agents, current_rules));
        }

        let agent_lower = user_agent.to_ascii_lowercase();
        let mut rules = groups
            .iter()
            .find(|(agents, _)| agents.iter().any(|a| agent_lower.contains(a.as_str())))
            .map(|(_, r)| r.clone());
        if rules.is_none() {
            rules = groups
                .iter()
                .find(|(agents, _)| agents.iter().any(|a| a == "*"))
                .map(|(_, r)| r.clone());
        }

        Self {
            rules: rules.unwrap_or_default(),
        }
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for (prefix, allowed) in &self.rules {
            if path.starts_with(prefix.as_str()) {
                let len = prefix.len();
                if best.map(|(best_len, _)| len > best_len).unwrap_or(true) {
                    best = Some((len, *allowed));
                }
            }
        }
        best.map(|(_, allowed)| allowed).unwrap_or(true)
    }
}

struct CachedRobots {
    rules: RobotsRules,
    fetched_at: Instant,
}

#[derive(Default)]
pub struct RobotsCache {
    entries: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<RobotsRules> {
        let guard = self.entries.read();
        guard.get(host).and_then(|entry| {
            if entry.fetched_at.elapsed() < ROBOTS_TTL {
                Some(entry.rules.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, host: &str, rules: RobotsRules) {
        self.entries.write().insert(
            host.to_string(),
            CachedRobots {
                rules,
                fetched_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_all_blocks_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /\n", "ptolemies-bot");
        assert!(!rules.is_allowed("/docs/page"));
    }

    #[test]
    fn allow_overrides_shorter_disallow() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /private\nAllow: /private/public\n",
            "ptolemies-bot",
        );
        assert!(!rules.is_allowed("/private/secret"));
        assert!(rules.is_allowed("/private/public/page"));
    }

    #[test]
    fn no_matching_group_allows_everything() {
        let rules = RobotsRules::parse("User-agent: googlebot\nDisallow: /\n", "ptolemies-bot");
        assert!(rules.is_allowed("/anything"));
    }

    #[test]
    fn cache_respects_ttl() {
        let cache = RobotsCache::new();
        assert!(cache.get("example.com").is_none());
        cache.insert("example.com", RobotsRules::default());
        assert!(cache.get("example.com").is_some());
    }
}
