//! Redis-style glob matching for key scans, compiled with `globset`.
//!
//! `SCAN ... MATCH` understands `*`, `?`, character classes (`[abc]`, `[^a]`,
//! `[a-z]`) and `\` escapes. Keys are not paths, so `*` and `?` cross `/`,
//! and braces are plain characters rather than alternations.

use globset::{GlobBuilder, GlobMatcher};

const GLOB_META: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Escape glob metacharacters so `s` matches only itself.
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if GLOB_META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A compiled key pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    matcher: Option<GlobMatcher>,
}

impl KeyPattern {
    /// Compile `pattern`. A pattern globset rejects (an unclosed `[`, say)
    /// matches only its own text, as Redis treats such input literally.
    pub fn new(pattern: &str) -> Self {
        let matcher = GlobBuilder::new(&to_globset_syntax(pattern))
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .ok()
            .map(|glob| glob.compile_matcher());
        Self {
            raw: pattern.to_string(),
            matcher,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.is_match(text),
            None => self.raw == text,
        }
    }
}

/// Returns true if `text` matches `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    KeyPattern::new(pattern).is_match(text)
}

/// Rewrite the Redis dialect into globset's: `[^` negation becomes `[!`,
/// braces are escaped, and runs of `*` collapse to one (globset reserves `**`
/// for path components).
fn to_globset_syntax(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ if in_class => {
                if c == ']' {
                    in_class = false;
                }
                out.push(c);
            }
            '[' => {
                in_class = true;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('!');
                }
                // A leading `]` is a member, not the end of the class.
                if chars.peek() == Some(&']') {
                    chars.next();
                    out.push(']');
                }
            }
            '*' => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push('*');
            }
            '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
