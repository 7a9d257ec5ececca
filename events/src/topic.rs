//! Topic strings and the wildcard patterns used to subscribe to them.
//!
//! A topic is `kind:scope`, for example `activity:42`. A pattern is a topic
//! string in which `*` matches any run of characters, so `activity:*` observes
//! every activity and `*` observes everything.

use std::fmt;

use crate::event::TopicKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub kind: TopicKind,
    pub scope_id: String,
}

impl Topic {
    pub fn new(kind: TopicKind, scope_id: impl Into<String>) -> Self {
        Self {
            kind,
            scope_id: scope_id.into(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Matches every topic.
    pub fn all() -> Self {
        Self("*".to_string())
    }

    /// Matches every scope of one topic kind.
    pub fn family(kind: TopicKind) -> Self {
        Self(format!("{kind}:*"))
    }

    pub fn exact(topic: &Topic) -> Self {
        Self(topic.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glob match where only `*` is special.
    pub fn matches(&self, topic: &str) -> bool {
        let pattern = self.0.as_bytes();
        let topic = topic.as_bytes();
        let (mut p, mut t) = (0, 0);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < topic.len() {
            if p < pattern.len() && pattern[p] == b'*' {
                backtrack = Some((p, t));
                p += 1;
            } else if p < pattern.len() && pattern[p] == topic[t] {
                p += 1;
                t += 1;
            } else if let Some((star, matched)) = backtrack {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            } else {
                return false;
            }
        }

        pattern[p..].iter().all(|&c| c == b'*')
    }

    /// The pattern in Redis PSUBSCRIBE syntax, with `prefix` prepended and
    /// Redis' other glob metacharacters escaped so they match literally.
    pub fn to_redis_glob(&self, prefix: &str) -> String {
        let mut glob = String::with_capacity(prefix.len() + self.0.len());
        for c in prefix.chars().chain(self.0.chars()) {
            if matches!(c, '?' | '[' | ']' | '\\') {
                glob.push('\\');
            }
            glob.push(c);
        }
        glob
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_pattern_matches_all_scopes_of_kind() {
        let pattern = Pattern::family(TopicKind::Activity);
        assert!(pattern.matches("activity:1"));
        assert!(pattern.matches("activity:"));
        assert!(!pattern.matches("faculty:1"));
    }

    #[test]
    fn test_all_pattern_matches_everything() {
        assert!(Pattern::all().matches("system:global"));
        assert!(Pattern::all().matches(""));
    }

    #[test]
    fn test_exact_pattern_matches_only_its_topic() {
        let topic = Topic::new(TopicKind::Faculty, "eng");
        let pattern = Pattern::exact(&topic);
        assert!(pattern.matches("faculty:eng"));
        assert!(!pattern.matches("faculty:engineering"));
    }

    #[test]
    fn test_inner_wildcards_backtrack() {
        let pattern = Pattern::new("*:a*b");
        assert!(pattern.matches("activity:axxb"));
        assert!(pattern.matches("x:ab"));
        assert!(!pattern.matches("x:ba"));
    }

    #[test]
    fn test_redis_glob_escapes_other_metacharacters() {
        assert_eq!(
            Pattern::new("activity:[x]?*").to_redis_glob("events:"),
            "events:activity:\\[x\\]\\?*"
        );
    }
}
