use crate::error::OrchestratorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

pub const DEFAULT_BITRATE_KBPS: u32 = 4500;
pub const DEFAULT_MAX_VIEWERS: u32 = 999_999;
pub const DEFAULT_SSH_PORT: u16 = 22;

static ACCOUNT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,63}$").expect("valid pattern"));

// --- Domain models ---

/// Account identifier that doubles as the Wowza application name.
///
/// Only names that are safe as a single path segment and as a shell word are
/// accepted, so a value of this type can be spliced into remote commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, OrchestratorError> {
        let raw = raw.into();
        if ACCOUNT_NAME.is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(OrchestratorError::InvalidAccountName(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountName {
    type Error = OrchestratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

/// Media server host as known to the back office.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub host_address: String,
    pub admin_secret: String,
    #[serde(default = "default_ssh_port")]
    pub control_port: u16,
    #[serde(default)]
    pub status: ServerStatus,
}

impl ServerRecord {
    pub fn is_active(&self) -> bool {
        self.status == ServerStatus::Active
    }
}

// Keep the root password out of logs.
impl fmt::Debug for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRecord")
            .field("host_address", &self.host_address)
            .field("admin_secret", &"<redacted>")
            .field("control_port", &self.control_port)
            .field("status", &self.status)
            .finish()
    }
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Parameters for provisioning one account on one host.
#[derive(Clone)]
pub struct AccountConfig {
    pub name: AccountName,
    pub host: String,
    pub max_bitrate_kbps: u32,
    pub max_viewers: u32,
    pub publish_secret: String,
}

impl AccountConfig {
    pub fn new(name: AccountName, host: impl Into<String>, publish_secret: impl Into<String>) -> Self {
        Self {
            name,
            host: host.into(),
            max_bitrate_kbps: DEFAULT_BITRATE_KBPS,
            max_viewers: DEFAULT_MAX_VIEWERS,
            publish_secret: publish_secret.into(),
        }
    }

    pub fn with_limits(mut self, max_bitrate_kbps: u32, max_viewers: u32) -> Self {
        self.max_bitrate_kbps = max_bitrate_kbps;
        self.max_viewers = max_viewers;
        self
    }

    pub(crate) fn as_update(&self) -> AccountUpdate {
        AccountUpdate {
            max_bitrate_kbps: Some(self.max_bitrate_kbps),
            max_viewers: Some(self.max_viewers),
            publish_secret: Some(self.publish_secret.clone()),
        }
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("max_bitrate_kbps", &self.max_bitrate_kbps)
            .field("max_viewers", &self.max_viewers)
            .finish_non_exhaustive()
    }
}

/// Fields an update may change; `None` leaves the remote value alone.
#[derive(Clone, Default, Deserialize)]
pub struct AccountUpdate {
    pub max_bitrate_kbps: Option<u32>,
    pub max_viewers: Option<u32>,
    pub publish_secret: Option<String>,
}

impl fmt::Debug for AccountUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountUpdate")
            .field("max_bitrate_kbps", &self.max_bitrate_kbps)
            .field("max_viewers", &self.max_viewers)
            .field("publish_secret", &self.publish_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Rejects secrets that would break the line-oriented password file.
pub fn validate_secret(secret: &str) -> Result<(), OrchestratorError> {
    if secret.contains(['\n', '\r']) {
        Err(OrchestratorError::InvalidSecret)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    PasswordUpdated,
    Removed,
    Verified,
    Restored,
}

/// Result reported back to the CRUD layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
}

impl OperationOutcome {
    pub fn done(action: Action, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: Some(action),
            message: Some(message.into()),
            simulated: false,
        }
    }

    /// Provisioning skipped because the host is not usable.
    pub fn simulated(message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            message: Some(message.into()),
            simulated: true,
        }
    }
}

// --- Control API models ---

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub reseller_usernames: Vec<String>,
    #[serde(default)]
    pub streaming_logins: Vec<String>,
}

#[derive(Deserialize)]
pub struct ServerUpsert {
    pub admin_secret: String,
    #[serde(default = "default_ssh_port")]
    pub control_port: u16,
    #[serde(default)]
    pub status: ServerStatus,
}

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub host: String,
    #[serde(default = "default_bitrate")]
    pub max_bitrate_kbps: u32,
    #[serde(default = "default_viewers")]
    pub max_viewers: u32,
    pub publish_secret: String,
}

fn default_bitrate() -> u32 {
    DEFAULT_BITRATE_KBPS
}

fn default_viewers() -> u32 {
    DEFAULT_MAX_VIEWERS
}

#[derive(Deserialize)]
pub struct UpdateAccountRequest {
    pub host: String,
    #[serde(flatten)]
    pub update: AccountUpdate,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    pub host: String,
    pub publish_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct HostParams {
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub host: String,
    pub backup_path: String,
}

// --- Status API models ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub version: String,
    pub is_running: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub configs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub success: bool,
    pub backup_path: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigurationsResponse {
    pub host: String,
    pub configurations: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub active_servers: usize,
    pub valid_accounts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_names_are_shell_safe_tokens() {
        for ok in ["alice", "radio_fm", "tv-01", "a.b", "_x", "9"] {
            assert!(AccountName::parse(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in [
            "", ".", "..", "-rf", "a b", "a/b", "a;rm", "$(id)", "`id`", "a'b", "a\"b", "a\nb",
        ] {
            assert!(AccountName::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(AccountName::parse("a".repeat(64)).is_ok());
        assert!(AccountName::parse("a".repeat(65)).is_err());
    }

    #[test]
    fn account_name_deserializes_through_validation() {
        let ok: AccountName = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<AccountName>("\"../etc\"").is_err());
    }

    #[test]
    fn secrets_must_be_single_line() {
        assert!(validate_secret("p@ss$w`o\"rd\\").is_ok());
        assert!(validate_secret("a\nb").is_err());
        assert!(validate_secret("a\rb").is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let record = ServerRecord {
            host_address: "10.0.0.1".into(),
            admin_secret: "hunter2".into(),
            control_port: 22,
            status: ServerStatus::Active,
        };
        assert!(!format!("{record:?}").contains("hunter2"));

        let account = AccountConfig::new(AccountName::parse("alice").unwrap(), "10.0.0.1", "s3cret");
        assert!(!format!("{account:?}").contains("s3cret"));
    }

    #[test]
    fn server_record_defaults() {
        let record: ServerRecord =
            serde_json::from_str(r#"{"host_address":"10.0.0.1","admin_secret":"x"}"#).unwrap();
        assert_eq!(record.control_port, 22);
        assert!(record.is_active());

        let record: ServerRecord = serde_json::from_str(
            r#"{"host_address":"10.0.0.1","admin_secret":"x","control_port":2222,"status":"maintenance"}"#,
        )
        .unwrap();
        assert_eq!(record.control_port, 2222);
        assert!(!record.is_active());
    }

    #[test]
    fn outcome_serialization_omits_empty_fields() {
        let json = serde_json::to_value(OperationOutcome::done(Action::Created, "ok")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "action": "created", "message": "ok"}));

        let json = serde_json::to_value(OperationOutcome::simulated("no server")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "message": "no server", "simulated": true})
        );
    }

    #[test]
    fn create_request_defaults_limits() {
        let req: CreateAccountRequest =
            serde_json::from_str(r#"{"host":"10.0.0.1","publish_secret":"s"}"#).unwrap();
        assert_eq!(req.max_bitrate_kbps, 4500);
        assert_eq!(req.max_viewers, 999_999);
    }
}
