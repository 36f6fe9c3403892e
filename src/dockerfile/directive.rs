//! `# anchor ...` control comments
//!
//! Two forms are recognized:
//!
//! ```dockerfile
//! # anchor ignore=curl, wget
//! # anchor ignore
//! ```
//!
//! The first lists image or package names the node must leave unpinned. The
//! bare form leaves everything in the node unpinned. Any other comment, and
//! any malformed directive, is inert.

use std::collections::HashSet;

use super::{Entry, EntryKind};

const DIRECTIVE_PREFIX: &str = "anchor";
const IGNORE_KEY: &str = "ignore";

/// Result of interpreting a single comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    /// Names listed by `ignore=`, in the order written.
    pub ignored: Vec<String>,
    /// Set by a bare `ignore`.
    pub ignore_all: bool,
}

impl Directive {
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.ignored.is_empty() && !self.ignore_all
    }
}

/// Interpret a comment entry as an `anchor` directive.
///
/// Non-comment entries and comments that are not well-formed directives yield
/// an inert [`Directive`].
#[must_use]
pub fn parse_directive(entry: &Entry) -> Directive {
    if entry.kind != EntryKind::Comment {
        return Directive::default();
    }

    let body = entry.value.trim().trim_start_matches('#').trim_start();
    let Some((prefix, rest)) = body.split_once(char::is_whitespace) else {
        return Directive::default();
    };
    if prefix != DIRECTIVE_PREFIX {
        return Directive::default();
    }

    let rest = rest.trim();
    if rest == IGNORE_KEY {
        return Directive {
            ignored: Vec::new(),
            ignore_all: true,
        };
    }

    let Some((key, value)) = rest.split_once('=') else {
        return Directive::default();
    };
    if key.trim() != IGNORE_KEY {
        return Directive::default();
    }

    Directive {
        ignored: value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect(),
        ignore_all: false,
    }
}

/// Names a node must not pin, gathered from all of its directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    names: HashSet<String>,
    all: bool,
}

impl IgnoreSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, directive: Directive) {
        self.all |= directive.ignore_all;
        self.names.extend(directive.ignored);
    }

    /// Whether `name` must be left as written.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.all || self.names.contains(name)
    }

    #[must_use]
    pub const fn ignores_all(&self) -> bool {
        self.all
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.all && self.names.is_empty()
    }
}

impl FromIterator<Directive> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = Directive>>(iter: I) -> Self {
        let mut set = Self::new();
        for directive in iter {
            set.add(directive);
        }
        set
    }
}
