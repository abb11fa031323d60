//! Path pattern matching for route resolution.
//!
//! Patterns are anchored at both ends and support three wildcard forms:
//!
//! - `*` matches any characters within one segment
//! - `**` matches any characters across segments; a trailing `/**` also
//!   matches the bare prefix (empty tail)
//! - `{name}` matches one non-empty segment
//!
//! Compiled regexes are cached per pattern so matching stays cheap on the
//! request path even though route collections are replaced wholesale on
//! every refresh.

use crate::models::route::Route;
use ahash::HashMap as AHashMap;
use regex::Regex;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised while compiling a route pattern.
#[derive(Error, Debug, PartialEq)]
pub enum RouteMatchError {
    /// The route pattern contains invalid syntax, e.g. an unclosed or empty
    /// `{param}`.
    #[error("Invalid route pattern: {pattern}")]
    InvalidPattern {
        /// The invalid route pattern that caused the error
        pattern: String,
    },

    /// The generated regex failed to compile. Indicates a bug in the
    /// pattern conversion rather than bad user input.
    #[error("Regex compilation failed: {0}")]
    RegexError(String),
}

/// Route matcher with a per-pattern compiled-regex cache.
///
/// The matcher itself holds no routes; callers pass the current snapshot of
/// the route table, which is already ordered by priority descending. The
/// first enabled route whose pattern and method both match wins.
///
/// # Thread Safety
///
/// The cache is guarded by an `RwLock`; compiled regexes are shared via
/// `Arc` so concurrent requests never re-compile a known pattern.
#[derive(Debug, Default)]
pub struct RouteMatcher {
    cache: RwLock<AHashMap<String, Arc<Regex>>>,
}

impl RouteMatcher {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(AHashMap::default()),
        }
    }

    /// Finds the first matching route for the given method and path.
    ///
    /// Routes are scanned in the order given; the table guarantees priority
    /// descending with local routes ahead of same-priority remote ones.
    /// Disabled routes are skipped.
    pub fn find_match(
        &self,
        routes: &[Arc<Route>],
        method: &str,
        path: &str,
    ) -> Option<Arc<Route>> {
        for route in routes {
            if !route.enabled {
                continue;
            }

            if !self.match_path(&route.path_pattern, path) {
                continue;
            }

            if !match_method(&route.methods, method) {
                continue;
            }

            return Some(Arc::clone(route));
        }

        None
    }

    /// Tests a single pattern against a path.
    ///
    /// Invalid patterns are logged once per occurrence and never match.
    pub fn match_path(&self, pattern: &str, path: &str) -> bool {
        match self.compile(pattern) {
            Ok(regex) => regex.is_match(path),
            Err(e) => {
                log::warn!("Skipping unmatchable route pattern: {}", e);
                false
            }
        }
    }

    /// Returns the compiled regex for a pattern, compiling on first use.
    pub fn compile(&self, pattern: &str) -> Result<Arc<Regex>, RouteMatchError> {
        if let Some(regex) = self.cache.read().unwrap().get(pattern) {
            return Ok(Arc::clone(regex));
        }

        let source = pattern_to_regex(pattern)?;
        let regex = Arc::new(
            Regex::new(&source).map_err(|e| RouteMatchError::RegexError(e.to_string()))?,
        );

        self.cache
            .write()
            .unwrap()
            .insert(pattern.to_string(), Arc::clone(&regex));

        Ok(regex)
    }
}

/// Tests an HTTP method against a route's method list.
///
/// The list is either `*` (accept everything) or comma-separated uppercase
/// tokens; comparison is case-insensitive on the request side.
pub fn match_method(allowed_methods: &str, method: &str) -> bool {
    if allowed_methods == "*" {
        return true;
    }

    let method = method.to_uppercase();
    allowed_methods
        .split(',')
        .any(|m| m.trim().to_uppercase() == method)
}

/// Converts a route pattern into an anchored regex source string.
///
/// A trailing `/**` becomes an optional tail `(/.*)?` so the bare prefix
/// matches too; interior `**` becomes `.*`. The double star is handled
/// before the single star so it cannot be consumed by the `*` rule.
fn pattern_to_regex(pattern: &str) -> Result<String, RouteMatchError> {
    let (body, trailing_globstar) = match pattern.strip_suffix("/**") {
        Some(prefix) => (prefix, true),
        None => (pattern, false),
    };

    let mut regex = String::with_capacity(pattern.len() * 2);
    regex.push('^');

    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                let mut param_name = String::new();
                let mut found_closing = false;

                for inner in chars.by_ref() {
                    if inner == '}' {
                        found_closing = true;
                        break;
                    }
                    if inner.is_alphanumeric() || inner == '_' {
                        param_name.push(inner);
                    } else {
                        return Err(RouteMatchError::InvalidPattern {
                            pattern: pattern.to_string(),
                        });
                    }
                }

                if !found_closing || param_name.is_empty() {
                    return Err(RouteMatchError::InvalidPattern {
                        pattern: pattern.to_string(),
                    });
                }

                regex.push_str("[^/]+");
            }
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            // Escape regex metacharacters
            '.' | '?' | '+' | '^' | '$' | '[' | ']' | '(' | ')' | '|' | '\\' => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }

    if trailing_globstar {
        regex.push_str("(/.*)?");
    }

    regex.push('$');
    Ok(regex)
}
