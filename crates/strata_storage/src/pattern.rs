//! Glob patterns for locating task outputs inside a work folder.
//!
//! Supported syntax: `*` and `?` (never cross `/`), `**` (any depth),
//! `[abc]` / `[!abc]` classes and `{a,b}` alternatives. Patterns are
//! compiled to an anchored regex over `/`-separated relative paths.
//!
//! Hidden entries (leading `.`) are skipped unless a component of the
//! pattern itself starts with `.`.

use crate::error::{StorageError, StorageResult};
use regex::Regex;
use std::path::{Path, PathBuf};

/// A compiled output pattern
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
    literal: bool,
    hidden: bool,
    recursive: bool,
    depth: usize,
}

impl GlobPattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is empty, absolute, escapes the folder
    /// or is syntactically invalid
    pub fn new(pattern: &str) -> StorageResult<Self> {
        let invalid = |reason: &str| StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }
        if pattern.starts_with('/') {
            return Err(invalid("must be relative to the work folder"));
        }
        if pattern.split('/').any(|c| c == "..") {
            return Err(invalid("must not leave the work folder"));
        }

        let translated = translate(pattern).map_err(invalid)?;
        let regex = Regex::new(&translated).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            literal: !pattern.contains(['*', '?', '[', '{']),
            hidden: pattern.split('/').any(|c| c.starts_with('.')),
            recursive: pattern.contains("**"),
            depth: pattern.split('/').count(),
        })
    }

    /// Pattern as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern contains no wildcards
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        self.literal
    }

    /// Match a `/`-separated path relative to the folder root
    #[must_use]
    pub fn matches(&self, relative: &str) -> bool {
        self.regex.is_match(relative)
    }

    /// All entries under `root` matching this pattern, sorted.
    ///
    /// Symlinked directories are matched but not descended into.
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be read
    pub fn find(&self, root: &Path) -> StorageResult<Vec<PathBuf>> {
        if self.literal {
            let path = root.join(&self.source);
            return Ok(if std::fs::symlink_metadata(&path).is_ok() {
                vec![path]
            } else {
                Vec::new()
            });
        }

        let mut found = Vec::new();
        self.walk(root, "", 1, &mut found)?;
        found.sort();
        Ok(found)
    }

    fn walk(&self, dir: &Path, prefix: &str, depth: usize, found: &mut Vec<PathBuf>) -> StorageResult<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(dir, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') && !self.hidden {
                continue;
            }

            let relative = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix, name)
            };
            let path = entry.path();
            if self.regex.is_match(&relative) {
                found.push(path.clone());
            }

            let file_type = entry.file_type().map_err(|e| StorageError::io(&path, e))?;
            if file_type.is_dir() && (self.recursive || depth < self.depth) {
                self.walk(&path, &relative, depth + 1, found)?;
            }
        }
        Ok(())
    }
}

fn translate(pattern: &str) -> Result<String, &'static str> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut braces = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    i += 1;
                    if chars.get(i + 1) == Some(&'/') {
                        i += 1;
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut k = i + 1;
                    if matches!(chars[k], '!' | '^') {
                        out.push('^');
                        k += 1;
                    }
                    while k < end {
                        let c = chars[k];
                        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(c);
                        k += 1;
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            '{' => {
                braces += 1;
                out.push_str("(?:");
            }
            ',' if braces > 0 => out.push('|'),
            '}' if braces > 0 => {
                braces -= 1;
                out.push(')');
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    if braces > 0 {
        return Err("unclosed brace");
    }
    out.push('$');
    Ok(out)
}

/// Index of the `]` closing the class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!' | '^')) {
        j += 1;
    }
    // A leading `]` is a literal member of the class.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}
