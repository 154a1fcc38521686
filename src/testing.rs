//! In-memory media server for tests.
//!
//! Interprets the command vocabulary of [`RemoteCommand`] against a tiny
//! filesystem and a fake systemd unit, and records every call.

use crate::audit::{AuditEntry, AuditSink};
use crate::config::{Config, RestartConfig};
use crate::error::{OrchestratorError, Result};
use crate::models::{ServerRecord, ServerStatus};
use crate::remote::command::split_words;
use crate::remote::{RemoteCommand, RemoteExecutor};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

pub const HOST: &str = "10.0.0.5";

/// Default layout under `/conf`, with restart polling shrunk to milliseconds.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.layout.config_root = "/conf".into();
    config.layout.storage_root = "/home/streaming".into();
    config.restart = RestartConfig {
        initial_delay_ms: 1,
        max_delay_ms: 1,
        max_wait_ms: 5,
    };
    config
}

#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit lock").clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().expect("audit lock").push(entry);
    }
}

#[derive(Default)]
struct HostState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, String>,
    owners: HashMap<String, String>,
    modes: HashMap<String, String>,
    service_state: String,
    restart_plan: Vec<String>,
    pending: VecDeque<String>,
    version: String,
    calls: Vec<String>,
    canned: Vec<(String, String)>,
    failures: Vec<String>,
}

pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        let mut state = HostState {
            service_state: "active".into(),
            version: "Wowza Streaming Engine 4.8.0 build20200402151045".into(),
            ..Default::default()
        };
        state.dirs.insert("/".into());
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn server(&self) -> ServerRecord {
        ServerRecord {
            host_address: HOST.into(),
            admin_secret: "root-secret".into(),
            control_port: 22,
            status: ServerStatus::Active,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().expect("fake host lock")
    }

    /// Every command whose script starts with `prefix` answers `output`.
    pub fn script_output(&self, prefix: &str, output: &str) {
        self.lock().canned.push((prefix.into(), output.into()));
    }

    /// Every command whose script contains `needle` fails.
    pub fn fail_on(&self, needle: &str) {
        self.lock().failures.push(needle.into());
    }

    /// States reported by successive `is-active` polls after each restart.
    pub fn after_restart(&self, states: &[&str]) {
        self.lock().restart_plan = states.iter().map(|s| s.to_string()).collect();
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.lock();
        mkdir_p(&mut state, path);
    }

    pub fn add_file(&self, path: &str, content: &str) {
        let mut state = self.lock();
        if let Some(parent) = parent_of(path) {
            mkdir_p(&mut state, &parent);
        }
        state.files.insert(path.into(), content.into());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    pub fn owner_of(&self, path: &str) -> Option<String> {
        self.lock().owners.get(path).cloned()
    }

    pub fn mode_of(&self, path: &str) -> Option<String> {
        self.lock().modes.get(path).cloned()
    }

    pub fn service_state(&self) -> String {
        self.lock().service_state.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn run(&self, script: &str) -> std::result::Result<String, String> {
        let mut state = self.lock();
        state.calls.push(script.to_string());

        if state.failures.iter().any(|f| script.contains(f.as_str())) {
            return Err("exit status: 1".into());
        }
        if let Some((_, out)) = state.canned.iter().find(|(p, _)| script.starts_with(p.as_str())) {
            return Ok(out.clone());
        }

        let words = split_words(script);
        let w: Vec<&str> = words.iter().map(String::as_str).collect();
        match w.as_slice() {
            ["mkdir", "-p", path] => {
                mkdir_p(&mut state, path);
                Ok(String::new())
            }
            ["test", flag, path, "&&", "echo", "exists", "||", "echo", "not found"] => {
                let found = match *flag {
                    "-d" => state.dirs.contains(*path),
                    "-f" => state.files.contains_key(*path),
                    _ => return Err(format!("unsupported test flag {flag}")),
                };
                Ok(if found { "exists\n" } else { "not found\n" }.into())
            }
            ["printf", "%s", payload, "|", "base64", "-d", ">", path] => {
                let bytes = STANDARD.decode(payload).map_err(|e| e.to_string())?;
                let content = String::from_utf8(bytes).map_err(|e| e.to_string())?;
                match parent_of(path) {
                    Some(parent) if state.dirs.contains(&parent) => {
                        state.files.insert(path.to_string(), content);
                        Ok(String::new())
                    }
                    _ => Err(format!("{path}: No such file or directory")),
                }
            }
            ["cat", path] => state
                .files
                .get(*path)
                .cloned()
                .ok_or_else(|| format!("cat: {path}: No such file or directory")),
            ["rm", "-rf", path] => {
                let prefix = format!("{path}/");
                state.dirs.retain(|d| d != path && !d.starts_with(&prefix));
                state.files.retain(|f, _| f != path && !f.starts_with(&prefix));
                Ok(String::new())
            }
            ["cp", "-r", from, to] => {
                if !state.dirs.contains(*from) {
                    return Err(format!("cp: cannot stat '{from}'"));
                }
                let prefix = format!("{from}/");
                let dirs: Vec<String> = state
                    .dirs
                    .iter()
                    .filter(|d| d.starts_with(&prefix))
                    .map(|d| format!("{to}/{}", &d[prefix.len()..]))
                    .collect();
                let files: Vec<(String, String)> = state
                    .files
                    .iter()
                    .filter(|(f, _)| f.starts_with(&prefix))
                    .map(|(f, c)| (format!("{to}/{}", &f[prefix.len()..]), c.clone()))
                    .collect();
                mkdir_p(&mut state, to);
                for d in dirs {
                    state.dirs.insert(d);
                }
                state.files.extend(files);
                Ok(String::new())
            }
            ["ls", "-1b", path] => {
                if !state.dirs.contains(*path) {
                    return Err(format!("ls: cannot access '{path}'"));
                }
                let mut names: BTreeSet<String> = BTreeSet::new();
                let children = state.dirs.iter().chain(state.files.keys());
                for entry in children {
                    if parent_of(entry).as_deref() == Some(*path) {
                        names.insert(entry.rsplit('/').next().unwrap_or_default().to_string());
                    }
                }
                Ok(names.into_iter().map(|n| n + "\n").collect())
            }
            ["chown", "-R", owner, paths @ ..] => {
                apply_recursive(&mut state, paths, owner, true);
                Ok(String::new())
            }
            ["chmod", "-R", mode, paths @ ..] => {
                apply_recursive(&mut state, paths, mode, false);
                Ok(String::new())
            }
            ["systemctl", "restart", _unit] => {
                state.pending = state.restart_plan.iter().cloned().collect();
                if state.pending.is_empty() {
                    state.service_state = "active".into();
                }
                Ok(String::new())
            }
            ["systemctl", "stop", _unit] => {
                state.service_state = "inactive".into();
                Ok(String::new())
            }
            ["systemctl", "is-active", _unit, "||", "true"] => {
                if let Some(next) = state.pending.pop_front() {
                    state.service_state = next;
                }
                Ok(format!("{}\n", state.service_state))
            }
            [_script, "-version", "2>/dev/null", "|", "head", "-1"] => Ok(format!("{}\n", state.version)),
            _ => Err(format!("fake host cannot run: {script}")),
        }
    }
}

#[async_trait]
impl RemoteExecutor for FakeHost {
    async fn execute(&self, command: &RemoteCommand, server: &ServerRecord) -> Result<String> {
        // Give concurrent operations a chance to interleave.
        tokio::task::yield_now().await;
        self.run(command.script())
            .map_err(|reason| OrchestratorError::transport(&server.host_address, reason))
    }
}

fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    Some(if idx == 0 { "/".into() } else { trimmed[..idx].to_string() })
}

fn mkdir_p(state: &mut HostState, path: &str) {
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        state.dirs.insert(current.clone());
    }
}

fn apply_recursive(state: &mut HostState, paths: &[&str], value: &str, owner: bool) {
    let mut targets = Vec::new();
    for path in paths {
        let prefix = format!("{path}/");
        targets.extend(
            state
                .dirs
                .iter()
                .chain(state.files.keys())
                .filter(|p| p.as_str() == *path || p.starts_with(&prefix))
                .cloned(),
        );
    }
    let map = if owner { &mut state.owners } else { &mut state.modes };
    for target in targets {
        map.insert(target, value.to_string());
    }
}
