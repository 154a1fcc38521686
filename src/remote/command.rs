//! Remote shell command construction.
//!
//! Every command the orchestrator sends is built here. Paths are passed as
//! single-quoted words and file bodies travel base64-encoded, so nothing the
//! back office supplies is ever interpreted by the remote shell.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// A shell command for the remote host, with a log-safe rendering.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    script: String,
    display: Option<String>,
}

impl RemoteCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            display: None,
        }
    }

    /// The exact text handed to the remote shell.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// The text that is safe to log.
    pub fn display(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.script)
    }

    pub fn mkdir_p(path: &str) -> Self {
        Self::new(format!("mkdir -p {}", quote(path)))
    }

    pub fn test_dir(path: &str) -> Self {
        Self::new(format!(
            "test -d {} && echo exists || echo 'not found'",
            quote(path)
        ))
    }

    pub fn test_file(path: &str) -> Self {
        Self::new(format!(
            "test -f {} && echo exists || echo 'not found'",
            quote(path)
        ))
    }

    pub fn write_file(path: &str, content: &str) -> Self {
        let payload = STANDARD.encode(content.as_bytes());
        Self {
            display: Some(format!(
                "printf '%s' <{} bytes> | base64 -d > {}",
                content.len(),
                quote(path)
            )),
            script: format!("printf '%s' '{}' | base64 -d > {}", payload, quote(path)),
        }
    }

    pub fn cat(path: &str) -> Self {
        Self::new(format!("cat {}", quote(path)))
    }

    pub fn rm_rf(path: &str) -> Self {
        Self::new(format!("rm -rf {}", quote(path)))
    }

    pub fn cp_r(from: &str, to: &str) -> Self {
        Self::new(format!("cp -r {} {}", quote(from), quote(to)))
    }

    /// One entry per line; `-b` escapes newlines and other nongraphic bytes
    /// so a single name can never span two lines.
    pub fn ls(path: &str) -> Self {
        Self::new(format!("ls -1b {}", quote(path)))
    }

    pub fn chown_r(owner: &str, paths: &[&str]) -> Self {
        Self::new(format!("chown -R {} {}", quote(owner), quote_all(paths)))
    }

    pub fn chmod_r(mode: &str, paths: &[&str]) -> Self {
        Self::new(format!("chmod -R {} {}", quote(mode), quote_all(paths)))
    }

    pub fn systemctl(verb: &str, unit: &str) -> Self {
        Self::new(format!("systemctl {} {}", verb, quote(unit)))
    }

    /// `systemctl is-active` exits non-zero for every state but `active`;
    /// the state string is what callers want, not the exit status.
    pub fn is_active(unit: &str) -> Self {
        Self::new(format!("systemctl is-active {} || true", quote(unit)))
    }

    pub fn engine_version(startup_script: &str) -> Self {
        Self::new(format!(
            "{} -version 2>/dev/null | head -1",
            quote(startup_script)
        ))
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteCommand").field(&self.display()).finish()
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

/// Quotes a word for a POSIX shell.
pub fn quote(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 2);
    out.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

fn quote_all(words: &[&str]) -> String {
    words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" ")
}

/// Splits a command line the way a POSIX shell splits single-quoted words.
/// Only the quoting this module produces is understood.
#[cfg(test)]
pub(crate) fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_word = true;
                for inner in chars.by_ref() {
                    if inner == '\'' {
                        break;
                    }
                    current.push(inner);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
