//! Transitive role expansion.
//!
//! A role hierarchy is a static map from a role to the roles it directly
//! implies. [`RoleHierarchy::reachable_roles`] expands a set of granted roles
//! into everything they imply, following the map transitively.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use warden_auth::RoleHierarchy;
//!
//! let hierarchy = RoleHierarchy::new(HashMap::from([
//!     ("ROLE_ADMIN".to_string(), vec!["ROLE_EDITOR".to_string()]),
//!     ("ROLE_EDITOR".to_string(), vec!["ROLE_USER".to_string()]),
//! ]));
//!
//! let roles = hierarchy.reachable_roles(&["ROLE_ADMIN"]);
//! assert!(roles.contains("ROLE_USER"));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::RoleHierarchyConfig;
use crate::token::Token;

/// Default number of memoized role sets.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Static role inheritance graph with a per-instance memoization cache.
#[derive(Debug)]
pub struct RoleHierarchy {
    /// Role name to directly implied role names.
    map: HashMap<String, Vec<String>>,

    /// Expanded sets keyed by the sorted, deduplicated input roles.
    cache: DashMap<Vec<String>, Arc<HashSet<String>>>,

    /// Entries are no longer added once the cache holds this many.
    cache_capacity: usize,
}

impl RoleHierarchy {
    /// Creates a hierarchy from a role inheritance map.
    #[must_use]
    pub fn new(map: HashMap<String, Vec<String>>) -> Self {
        Self {
            map,
            cache: DashMap::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Creates a hierarchy from configuration.
    #[must_use]
    pub fn from_config(config: &RoleHierarchyConfig) -> Self {
        Self::new(config.roles.clone()).with_cache_capacity(config.cache_capacity)
    }

    /// Sets the maximum number of memoized role sets. Zero disables caching.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Expands `roles` into the set of every role they grant, including
    /// themselves.
    ///
    /// Terminates on cyclic maps: each role is expanded at most once.
    pub fn reachable_roles<S: AsRef<str>>(&self, roles: &[S]) -> HashSet<String> {
        let mut key: Vec<String> = roles.iter().map(|r| r.as_ref().to_string()).collect();
        key.sort_unstable();
        key.dedup();

        if let Some(cached) = self.cache.get(&key) {
            return cached.as_ref().clone();
        }

        let reachable = self.expand(&key);

        if self.cache.len() < self.cache_capacity {
            self.cache.insert(key, Arc::new(reachable.clone()));
        }

        reachable
    }

    /// Expands the role names of an authenticated token.
    ///
    /// Tokens that are not authenticated (including pending two-factor
    /// logins) grant nothing.
    pub fn reachable_roles_for(&self, token: &Token) -> HashSet<String> {
        if !token.is_authenticated() {
            return HashSet::new();
        }
        self.reachable_roles(token.role_names())
    }

    /// Returns `true` if the token grants `role`, directly or transitively.
    pub fn is_granted(&self, token: &Token, role: &str) -> bool {
        self.reachable_roles_for(token).contains(role)
    }

    /// Number of memoized role sets.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn expand(&self, roles: &[String]) -> HashSet<String> {
        let mut visited: HashSet<String> = roles.iter().cloned().collect();
        let mut pending: Vec<&str> = roles.iter().map(String::as_str).collect();

        while let Some(role) = pending.pop() {
            let Some(implied) = self.map.get(role) else {
                continue;
            };
            for next in implied {
                if visited.insert(next.clone()) {
                    pending.push(next);
                }
            }
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{PENDING_TOKEN_LIFETIME, Principal};
    use time::OffsetDateTime;

    fn hierarchy() -> RoleHierarchy {
        RoleHierarchy::new(HashMap::from([
            (
                "ROLE_SUPER_ADMIN".to_string(),
                vec!["ROLE_ADMIN".to_string(), "ROLE_ALLOWED_TO_SWITCH".to_string()],
            ),
            (
                "ROLE_ADMIN".to_string(),
                vec!["ROLE_EDITOR".to_string(), "ROLE_AUDITOR".to_string()],
            ),
            ("ROLE_EDITOR".to_string(), vec!["ROLE_USER".to_string()]),
            ("ROLE_AUDITOR".to_string(), vec!["ROLE_USER".to_string()]),
        ]))
    }

    fn set(roles: &[&str]) -> HashSet<String> {
        roles.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_transitive_expansion() {
        let roles = hierarchy().reachable_roles(&["ROLE_SUPER_ADMIN"]);
        assert_eq!(
            roles,
            set(&[
                "ROLE_SUPER_ADMIN",
                "ROLE_ADMIN",
                "ROLE_ALLOWED_TO_SWITCH",
                "ROLE_EDITOR",
                "ROLE_AUDITOR",
                "ROLE_USER",
            ])
        );
    }

    #[test]
    fn test_unknown_roles_are_kept() {
        let roles = hierarchy().reachable_roles(&["ROLE_EDITOR", "ROLE_BETA"]);
        assert_eq!(roles, set(&["ROLE_EDITOR", "ROLE_USER", "ROLE_BETA"]));
    }

    #[test]
    fn test_empty_input() {
        let roles: HashSet<String> = hierarchy().reachable_roles::<&str>(&[]);
        assert!(roles.is_empty());
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let roles = hierarchy().reachable_roles(&["ROLE_EDITOR", "ROLE_EDITOR"]);
        assert_eq!(roles, set(&["ROLE_EDITOR", "ROLE_USER"]));
    }

    #[test]
    fn test_cycles_terminate() {
        let hierarchy = RoleHierarchy::new(HashMap::from([
            ("A".to_string(), vec!["B".to_string()]),
            ("B".to_string(), vec!["A".to_string(), "C".to_string()]),
            ("C".to_string(), vec!["C".to_string()]),
        ]));

        assert_eq!(hierarchy.reachable_roles(&["A"]), set(&["A", "B", "C"]));
        assert_eq!(hierarchy.reachable_roles(&["C"]), set(&["C"]));
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let hierarchies = [
            hierarchy(),
            RoleHierarchy::new(HashMap::from([
                ("A".to_string(), vec!["B".to_string()]),
                ("B".to_string(), vec!["A".to_string()]),
            ])),
            RoleHierarchy::new(HashMap::new()),
        ];
        let inputs: [&[&str]; 4] = [
            &["ROLE_SUPER_ADMIN"],
            &["ROLE_AUDITOR", "X"],
            &["A"],
            &[],
        ];

        for hierarchy in &hierarchies {
            for input in inputs {
                let once = hierarchy.reachable_roles(input);
                let once_list: Vec<String> = once.iter().cloned().collect();
                let twice = hierarchy.reachable_roles(&once_list);
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn test_cache_is_keyed_by_role_set() {
        let hierarchy = hierarchy();
        hierarchy.reachable_roles(&["ROLE_ADMIN", "ROLE_USER"]);
        hierarchy.reachable_roles(&["ROLE_USER", "ROLE_ADMIN"]);
        hierarchy.reachable_roles(&["ROLE_USER", "ROLE_ADMIN", "ROLE_USER"]);
        assert_eq!(hierarchy.cached_entries(), 1);

        hierarchy.reachable_roles(&["ROLE_EDITOR"]);
        assert_eq!(hierarchy.cached_entries(), 2);
    }

    #[test]
    fn test_separator_characters_do_not_collide() {
        let hierarchy = RoleHierarchy::new(HashMap::from([(
            "A".to_string(),
            vec!["IMPLIED".to_string()],
        )]));

        assert_eq!(hierarchy.reachable_roles(&["A,B"]), set(&["A,B"]));
        assert_eq!(
            hierarchy.reachable_roles(&["A", "B"]),
            set(&["A", "B", "IMPLIED"])
        );
    }

    #[test]
    fn test_cache_capacity_bounds_entries() {
        let hierarchy = hierarchy().with_cache_capacity(2);
        hierarchy.reachable_roles(&["A"]);
        hierarchy.reachable_roles(&["B"]);
        hierarchy.reachable_roles(&["C"]);
        assert_eq!(hierarchy.cached_entries(), 2);

        // Uncached lookups still compute the right answer.
        assert_eq!(
            hierarchy.reachable_roles(&["ROLE_EDITOR"]),
            set(&["ROLE_EDITOR", "ROLE_USER"])
        );

        let uncached = RoleHierarchy::new(HashMap::new()).with_cache_capacity(0);
        uncached.reachable_roles(&["A"]);
        assert_eq!(uncached.cached_entries(), 0);
    }

    #[test]
    fn test_pending_tokens_grant_nothing() {
        let hierarchy = hierarchy();
        let principal = Principal::new("alice", ["ROLE_ADMIN"]);

        let token =
            Token::username_password(principal.clone(), "main", vec!["ROLE_ADMIN".to_string()])
                .unwrap();
        assert!(hierarchy.is_granted(&token, "ROLE_USER"));
        assert!(!hierarchy.is_granted(&token, "ROLE_SUPER_ADMIN"));

        let pending = Token::two_factor_pending(
            principal,
            "main",
            OffsetDateTime::now_utc(),
            PENDING_TOKEN_LIFETIME,
        )
        .unwrap();
        assert!(hierarchy.reachable_roles_for(&pending).is_empty());
        assert!(!hierarchy.is_granted(&pending, "ROLE_USER"));
    }

    #[test]
    fn test_from_config() {
        let config = RoleHierarchyConfig {
            roles: HashMap::from([("ROLE_ADMIN".to_string(), vec!["ROLE_USER".to_string()])]),
            cache_capacity: 1,
        };
        let hierarchy = RoleHierarchy::from_config(&config);
        assert_eq!(
            hierarchy.reachable_roles(&["ROLE_ADMIN"]),
            set(&["ROLE_ADMIN", "ROLE_USER"])
        );
        hierarchy.reachable_roles(&["ROLE_USER"]);
        assert_eq!(hierarchy.cached_entries(), 1);
    }
}
