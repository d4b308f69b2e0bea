//! Structured editor for dotenv-style `KEY=value` files.
//!
//! The file is parsed into an ordered list of lines. Comments, blank lines and
//! entries that are not touched by an override are serialized back verbatim,
//! so applying the same overrides twice yields byte-identical output.

use std::sync::LazyLock;

use regex::Regex;

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_.]*)\s*=(.*)$").expect("entry regex")
});

static COMMENTED_ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*([A-Za-z_][A-Za-z0-9_.]*)\s*=(.*)$").expect("commented entry regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Active `KEY=value` assignment.
    Entry { key: String, raw: String },
    /// Assignment disabled with a leading `#` (e.g. `# DB_HOST=127.0.0.1`).
    Commented { key: String, raw: String },
    /// Comment, blank line, or anything unparseable.
    Other(String),
}

/// Parsed dotenv file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl EnvFile {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| {
                if let Some(caps) = ENTRY_RE.captures(raw) {
                    Line::Entry {
                        key: caps[1].to_string(),
                        raw: raw.to_string(),
                    }
                } else if let Some(caps) = COMMENTED_ENTRY_RE.captures(raw) {
                    Line::Commented {
                        key: caps[1].to_string(),
                        raw: raw.to_string(),
                    }
                } else {
                    Line::Other(raw.to_string())
                }
            })
            .collect();
        Self {
            lines,
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        }
    }

    /// Value of the first active entry for `key`, with surrounding quotes removed.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, raw } if k == key => ENTRY_RE
                .captures(raw)
                .map(|caps| unquote(caps[2].trim()).to_string()),
            _ => None,
        })
    }

    /// Apply `overrides` in order and report whether any line changed.
    ///
    /// Every active entry for a key is replaced wholesale. A key that only
    /// exists commented out is uncommented in place; a missing key is
    /// appended.
    pub fn apply<K, V>(&mut self, overrides: &[(K, V)]) -> bool
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let before = self.lines.clone();
        for (key, value) in overrides {
            self.set(key.as_ref(), value.as_ref());
        }
        before != self.lines
    }

    fn set(&mut self, key: &str, value: &str) {
        let rendered = format_entry(key, value);
        let mut replaced = false;
        for line in &mut self.lines {
            if let Line::Entry { key: k, raw } = line
                && k == key
            {
                *raw = rendered.clone();
                replaced = true;
            }
        }
        if replaced {
            return;
        }

        let commented = self
            .lines
            .iter()
            .position(|line| matches!(line, Line::Commented { key: k, .. } if k == key));
        let entry = Line::Entry {
            key: key.to_string(),
            raw: rendered,
        };
        match commented {
            Some(index) => self.lines[index] = entry,
            None => self.lines.push(entry),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Entry { raw, .. } | Line::Commented { raw, .. } | Line::Other(raw) => {
                    raw.as_str()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn format_entry(key: &str, value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\'));
    if needs_quotes {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{key}=\"{escaped}\"")
    } else {
        format!("{key}={value}")
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "APP_NAME=Laravel\n\
# database\n\
DB_CONNECTION=sqlite\n\
# DB_HOST=127.0.0.1\n\
# DB_PORT=3306\n\
\n\
MAIL_HOST=127.0.0.1\n";

    #[test]
    fn untouched_file_renders_verbatim() {
        let env = EnvFile::parse(SAMPLE);
        assert_eq!(env.render(), SAMPLE);

        let no_newline = "A=1\n#comment";
        assert_eq!(EnvFile::parse(no_newline).render(), no_newline);
    }

    #[test]
    fn replaces_active_entries_wholesale() {
        let mut env = EnvFile::parse(SAMPLE);
        let changed = env.apply(&[("DB_CONNECTION", "mysql"), ("MAIL_HOST", "mailpit")]);
        assert!(changed);
        let out = env.render();
        assert!(out.contains("\nDB_CONNECTION=mysql\n"));
        assert!(out.contains("\nMAIL_HOST=mailpit\n"));
        assert!(!out.contains("sqlite"));
        assert_eq!(env.get("DB_CONNECTION").as_deref(), Some("mysql"));
    }

    #[test]
    fn uncomments_disabled_entries_in_place() {
        let mut env = EnvFile::parse(SAMPLE);
        env.apply(&[("DB_HOST", "mysql")]);
        let out = env.render();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[3], "DB_HOST=mysql");
        assert_eq!(lines[4], "# DB_PORT=3306");
    }

    #[test]
    fn appends_missing_keys() {
        let mut env = EnvFile::parse(SAMPLE);
        env.apply(&[("MAIL_PORT", "1025")]);
        assert!(env.render().ends_with("MAIL_HOST=127.0.0.1\nMAIL_PORT=1025\n"));
    }

    #[test]
    fn repeated_application_is_idempotent() {
        let overrides = [
            ("DB_CONNECTION", "mongodb"),
            ("DB_HOST", "mongodb"),
            ("DB_PORT", "27017"),
            ("DB_PASSWORD", "secret"),
            ("MAIL_PORT", "1025"),
        ];
        let mut once = EnvFile::parse(SAMPLE);
        once.apply(&overrides);
        let first = once.render();

        let mut again = EnvFile::parse(&first);
        for _ in 0..3 {
            assert!(!again.apply(&overrides));
        }
        assert_eq!(again.render(), first);
    }

    #[test]
    fn duplicate_active_entries_all_take_the_new_value() {
        let mut env = EnvFile::parse("DB_HOST=a\nDB_HOST=b\n");
        env.apply(&[("DB_HOST", "mysql")]);
        assert_eq!(env.render(), "DB_HOST=mysql\nDB_HOST=mysql\n");
    }

    #[test]
    fn quotes_values_that_need_it() {
        let mut env = EnvFile::parse("");
        env.apply(&[("APP_NAME", "My App"), ("EMPTY", "")]);
        assert_eq!(env.render(), "APP_NAME=\"My App\"\nEMPTY=\n");
        assert_eq!(env.get("APP_NAME").as_deref(), Some("My App"));
    }
}
