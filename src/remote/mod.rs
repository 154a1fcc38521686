//! Everything that touches a media server over ssh.

pub mod command;
pub mod executor;
pub mod fs;

pub use command::RemoteCommand;
pub use executor::{RemoteExecutor, SshExecutor};
pub use fs::RemoteFs;
