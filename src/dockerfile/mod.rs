//! Format-preserving Dockerfile model
//!
//! A Dockerfile is split into [`Nodes`]: one [`Node`] per instruction, each
//! owning the physical lines ([`Entry`] values) that make it up together with
//! the comments and blank lines that precede or interleave with it.
//!
//! The model is built for mutation rather than validation:
//!
//! - Every entry stores its line verbatim, terminator included, so writing the
//!   nodes back out reproduces the input byte for byte.
//! - Only `FROM` and `RUN` instructions are classified; everything else is
//!   [`CommandType::Other`] and is never touched by the rewrite engine.
//! - Parsing cannot fail. Malformed or truncated input still produces a node
//!   sequence that covers every line exactly once.
//!
//! # Example
//!
//! ```rust
//! use anchor_cli::dockerfile::{self, CommandType};
//!
//! let text = "# base\nFROM debian:bookworm\nRUN apt-get install -y \\\n    curl\n";
//! let nodes = dockerfile::parse(text);
//!
//! assert_eq!(nodes.len(), 2);
//! assert_eq!(nodes[0].command_type, CommandType::From);
//! assert_eq!(nodes[1].command, "apt-get install -y curl");
//! assert_eq!(nodes.to_string(), text);
//! ```

pub mod directive;

pub use directive::{Directive, IgnoreSet, parse_directive};

use std::fmt;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

/// Kind of a physical Dockerfile line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Part of an instruction, possibly a continuation line.
    Command,
    /// A line whose first non-whitespace character is `#`.
    Comment,
    /// A line containing only whitespace.
    Empty,
}

/// One physical line of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    /// Verbatim line text including its line terminator, if it had one.
    pub value: String,
    /// Whether this is the first physical line of its instruction.
    pub beginning: bool,
}

impl Entry {
    fn new(kind: EntryKind, value: &str, beginning: bool) -> Self {
        Self {
            kind,
            value: value.to_string(),
            beginning,
        }
    }

    #[must_use]
    pub fn is_command(&self) -> bool {
        self.kind == EntryKind::Command
    }

    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.kind == EntryKind::Comment
    }
}

/// Classification of an instruction by its keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    From,
    Run,
    #[default]
    Other,
}

impl CommandType {
    fn classify(line: &str) -> Self {
        if starts_with_keyword(line, "FROM") {
            Self::From
        } else if starts_with_keyword(line, "RUN") {
            Self::Run
        } else {
            Self::Other
        }
    }
}

/// `line` begins with `keyword` as a whole word: followed by whitespace, a
/// continuation backslash or nothing.
fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.strip_prefix(keyword)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| c.is_whitespace() || c == '\\'))
}

/// One logical instruction plus its attached comments and blank lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Lines in source order.
    pub entries: Vec<Entry>,
    pub command_type: CommandType,
    /// Instruction text with continuations folded onto one line. Used for
    /// matching only; never written out. `RUN` nodes have the keyword removed.
    pub command: String,
}

impl Node {
    fn push(&mut self, kind: EntryKind, line: &str, beginning: bool) {
        if kind == EntryKind::Command {
            self.fold_command(line, beginning);
        }
        self.entries.push(Entry::new(kind, line, beginning));
    }

    fn fold_command(&mut self, line: &str, beginning: bool) {
        let mut text = line.trim();
        if beginning && self.command_type == CommandType::Run {
            text = text.strip_prefix("RUN").unwrap_or(text).trim_start();
        }
        let text = text.strip_suffix('\\').unwrap_or(text).trim_end();
        if text.is_empty() {
            return;
        }
        if !self.command.is_empty() {
            self.command.push(' ');
        }
        self.command.push_str(text);
    }

    /// Iterator over the comment entries attached to this node.
    pub fn comments(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|entry| entry.is_comment())
    }

    /// Ignore set built from every directive comment attached to this node.
    #[must_use]
    pub fn ignore_set(&self) -> IgnoreSet {
        self.comments().map(parse_directive).collect()
    }

    /// Index of the first command entry, if the node has one.
    #[must_use]
    pub fn first_command_index(&self) -> Option<usize> {
        self.entries.iter().position(Entry::is_command)
    }

    /// Write every entry in order.
    ///
    /// # Errors
    ///
    /// Returns any error produced by the underlying writer.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for entry in &self.entries {
            w.write_all(entry.value.as_bytes())?;
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entries.iter().try_for_each(|entry| f.write_str(&entry.value))
    }
}

/// Ordered sequence of every node in a Dockerfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nodes(Vec<Node>);

impl Nodes {
    /// Serialize all nodes in document order.
    ///
    /// Each entry already carries its line terminator, so nothing is inserted
    /// between entries or nodes.
    ///
    /// # Errors
    ///
    /// Returns any error produced by the underlying writer.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for node in &self.0 {
            node.write(w)?;
        }
        Ok(())
    }
}

impl Deref for Nodes {
    type Target = Vec<Node>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Nodes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Node>> for Nodes {
    fn from(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }
}

impl fmt::Display for Nodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|node| write!(f, "{node}"))
    }
}

/// Parse Dockerfile text into nodes.
///
/// Comment and blank lines attach to the instruction that follows them. An
/// instruction extends across lines for as long as its command lines end in a
/// backslash; comments and blank lines inside a continuation are kept in place
/// without ending it. Lines after the final instruction, and an instruction cut
/// off by end of input, still end up in the result.
#[must_use]
pub fn parse(text: &str) -> Nodes {
    let mut nodes = Vec::new();
    let mut node = Node::default();
    let mut lines = text.split_inclusive('\n');

    while let Some(line) = lines.next() {
        if is_whitespace(line) {
            node.push(EntryKind::Empty, line, false);
            continue;
        }
        if is_comment(line) {
            node.push(EntryKind::Comment, line, false);
            continue;
        }

        node.command_type = CommandType::classify(line);
        node.push(EntryKind::Command, line, true);

        let mut closed = is_end_of_section(line);
        while !closed {
            let Some(next) = lines.next() else { break };
            if is_whitespace(next) {
                node.push(EntryKind::Empty, next, false);
            } else if is_comment(next) {
                node.push(EntryKind::Comment, next, false);
            } else {
                node.push(EntryKind::Command, next, false);
                closed = is_end_of_section(next);
            }
        }

        nodes.push(std::mem::take(&mut node));
    }

    if !node.entries.is_empty() {
        nodes.push(node);
    }

    Nodes(nodes)
}

fn is_whitespace(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// A command line closes its instruction unless it ends in a backslash.
fn is_end_of_section(line: &str) -> bool {
    let trimmed = line.trim_end();
    !trimmed.is_empty() && !trimmed.ends_with('\\')
}
