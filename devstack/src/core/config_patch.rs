//! Line-oriented patch for Laravel's `config/database.php`.
//!
//! Registers a named connection profile inside the `'connections' => [`
//! array and switches the default connection. The patch is idempotent and
//! refuses to guess: if the expected lines are missing it reports an error
//! instead of leaving the file half-edited.

use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

static CONNECTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)'connections'\s*=>\s*\[\s*$").expect("connections regex")
});

static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)'default'\s*=>\s*env\(\s*'DB_CONNECTION'\s*,\s*'([^']*)'\s*\)\s*,\s*$")
        .expect("default regex")
});

const INDENT: &str = "    ";

/// What the patch did to the profile and the default connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReport {
    pub profile_inserted: bool,
    pub default_switched: bool,
}

impl PatchReport {
    pub fn changed(&self) -> bool {
        self.profile_inserted || self.default_switched
    }
}

/// Insert `profile` (named `name`) and make it the default connection.
///
/// `profile` lines are relative to the profile key and get indented one level
/// deeper than the `'connections'` key.
pub fn register_connection(
    source: &str,
    name: &str,
    profile: &[&str],
) -> Result<(String, PatchReport)> {
    let profile_re = Regex::new(&format!(r"^\s*'{}'\s*=>\s*\[", regex::escape(name)))?;
    let already_present = source.lines().any(|line| profile_re.is_match(line));

    let mut out = Vec::new();
    let mut saw_connections = false;
    let mut saw_default = false;
    let mut report = PatchReport {
        profile_inserted: false,
        default_switched: false,
    };

    for line in source.lines() {
        if let Some(caps) = DEFAULT_RE.captures(line)
            && !saw_default
        {
            saw_default = true;
            if &caps[2] != name {
                out.push(format!("{}'default' => env('DB_CONNECTION', '{name}'),", &caps[1]));
                report.default_switched = true;
                continue;
            }
        }

        out.push(line.to_string());

        if let Some(caps) = CONNECTIONS_RE.captures(line)
            && !saw_connections
        {
            saw_connections = true;
            if !already_present {
                let indent = format!("{}{INDENT}", &caps[1]);
                for profile_line in profile {
                    out.push(format!("{indent}{profile_line}"));
                }
                out.push(String::new());
                report.profile_inserted = true;
            }
        }
    }

    if !saw_connections && !already_present {
        bail!("no `'connections' => [` line found; cannot register the '{name}' connection");
    }
    if !saw_default {
        bail!(
            "no `'default' => env('DB_CONNECTION', ...)` line found; \
             cannot switch the default connection"
        );
    }

    let mut patched = out.join("\n");
    if source.ends_with('\n') {
        patched.push('\n');
    }
    Ok((patched, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::mongodb_connection_profile;

    const DATABASE_PHP: &str = "<?php

return [

    'default' => env('DB_CONNECTION', 'sqlite'),

    'connections' => [

        'sqlite' => [
            'driver' => 'sqlite',
        ],

    ],

    'redis' => [
        'default' => [
            'host' => env('REDIS_HOST', '127.0.0.1'),
        ],
    ],
];
";

    #[test]
    fn inserts_profile_and_switches_default() {
        let profile = mongodb_connection_profile();
        let (patched, report) =
            register_connection(DATABASE_PHP, "mongodb", &profile).expect("patch");
        assert!(report.profile_inserted);
        assert!(report.default_switched);
        assert!(patched.contains("    'default' => env('DB_CONNECTION', 'mongodb'),\n"));
        assert!(patched.contains(
            "    'connections' => [\n        'mongodb' => [\n            'driver' => 'mongodb',\n"
        ));
        assert!(patched.contains("        'sqlite' => ["));
        assert!(patched.contains("        'default' => [\n"), "redis default untouched");
    }

    #[test]
    fn second_application_changes_nothing() {
        let profile = mongodb_connection_profile();
        let (once, _) = register_connection(DATABASE_PHP, "mongodb", &profile).expect("patch");
        let (twice, report) = register_connection(&once, "mongodb", &profile).expect("repatch");
        assert!(!report.changed());
        assert_eq!(twice, once);
        assert_eq!(twice.matches("'mongodb' => [").count(), 1);
    }

    #[test]
    fn missing_connections_anchor_is_an_error() {
        let source = "<?php\nreturn [\n    'default' => env('DB_CONNECTION', 'sqlite'),\n];\n";
        let profile = mongodb_connection_profile();
        let err = register_connection(source, "mongodb", &profile).unwrap_err();
        assert!(err.to_string().contains("'connections' => ["));
    }

    #[test]
    fn missing_default_line_is_an_error() {
        let source = "<?php\nreturn [\n    'connections' => [\n    ],\n];\n";
        let profile = mongodb_connection_profile();
        let err = register_connection(source, "mongodb", &profile).unwrap_err();
        assert!(err.to_string().contains("default connection"));
    }
}
