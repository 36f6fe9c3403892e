//! `apt-get install` extraction and in-place package pinning

use std::collections::HashMap;

use crate::dockerfile::Node;

/// How a resolved package is written back into the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PinFormat {
    /// `curl=7.88.1-10`
    #[default]
    Plain,
    /// `curl:amd64=7.88.1-10`
    ArchQualified,
}

impl PinFormat {
    #[must_use]
    pub fn pin(self, name: &str, architecture: &str, version: &str) -> String {
        match self {
            Self::Plain => format!("{name}={version}"),
            Self::ArchQualified => format!("{name}:{architecture}={version}"),
        }
    }
}

/// Package names installed by the `apt-get install` sub-commands of a
/// flattened `RUN` command.
///
/// The command is split on `&&`. A sub-command counts when, after dropping
/// flags and lone backslashes, its first two words are `apt-get install` and
/// at least one word follows. Names keep their first-seen order and appear
/// once.
#[must_use]
pub fn parse_command(command: &str) -> Vec<String> {
    let mut packages: Vec<String> = Vec::new();

    for segment in command.split("&&") {
        let words: Vec<&str> = segment
            .split_whitespace()
            .filter(|word| *word != "\\" && !word.starts_with('-'))
            .collect();

        let [first, second, rest @ ..] = words.as_slice() else {
            continue;
        };
        if *first != "apt-get" || *second != "install" || rest.is_empty() {
            continue;
        }

        for name in rest {
            if !packages.iter().any(|p| p == name) {
                packages.push((*name).to_string());
            }
        }
    }

    packages
}

/// Tracks whether the current position sits inside an `apt-get install`
/// sub-command. State carries across continuation lines and resets at `&&`.
#[derive(Default)]
struct InstallSegment {
    apt_get: bool,
    install: bool,
}

impl InstallSegment {
    /// Feed one token; returns whether the token is an install argument.
    fn advance(&mut self, token: &str) -> bool {
        if token == "apt-get" {
            self.apt_get = true;
        }
        if self.apt_get && token == "install" {
            self.install = true;
        }
        let inside = self.apt_get && self.install;
        if token == "&&" {
            *self = Self::default();
        }
        inside
    }
}

/// Rewrite every token naming a resolved package inside an `apt-get install`
/// segment of the node's command lines to its pinned form.
///
/// Tokens are matched whole and only the matched bytes change, so spacing,
/// continuations and interleaved comments stay as written. When anything was
/// rewritten, the first command line also gets the multi-arch bootstrap
/// (`dpkg --add-architecture <arch> && apt-get update &&`).
///
/// Returns the `(name, version)` pairs that were pinned, in first-seen order.
pub fn append_package_versions(
    node: &mut Node,
    versions: &HashMap<String, String>,
    architecture: &str,
    pin_format: PinFormat,
) -> Vec<(String, String)> {
    let mut segment = InstallSegment::default();
    let mut pinned: Vec<(String, String)> = Vec::new();

    for entry in node.entries.iter_mut().filter(|entry| entry.is_command()) {
        let mut rewritten = String::with_capacity(entry.value.len());
        let mut last = 0;

        for (start, token) in token_spans(&entry.value) {
            // A continuation backslash glued to a word is not part of it.
            let word = token.strip_suffix('\\').unwrap_or(token);
            if !segment.advance(word) {
                continue;
            }
            let Some(version) = versions.get(word) else {
                continue;
            };
            rewritten.push_str(&entry.value[last..start]);
            rewritten.push_str(&pin_format.pin(word, architecture, version));
            last = start + word.len();
            if !pinned.iter().any(|(name, _)| name == word) {
                pinned.push((word.to_string(), version.clone()));
            }
        }

        if last > 0 {
            rewritten.push_str(&entry.value[last..]);
            entry.value = rewritten;
        }
    }

    if !pinned.is_empty() {
        inject_bootstrap(node, architecture);
    }
    pinned
}

fn inject_bootstrap(node: &mut Node, architecture: &str) {
    let Some(index) = node.first_command_index() else {
        return;
    };
    let entry = &mut node.entries[index];
    if entry.beginning {
        entry.value = entry.value.replacen(
            "RUN",
            &format!("RUN dpkg --add-architecture {architecture} && apt-get update &&"),
            1,
        );
    } else {
        entry.value = format!(
            " dpkg --add-architecture {architecture} && apt-get update \\\n &&{}",
            entry.value
        );
    }
}

/// Byte offset and text of every whitespace-delimited token in `line`.
fn token_spans(line: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, &line[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, &line[s..]));
    }
    spans
}
