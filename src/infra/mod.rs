//! 基础设施层 - transport、凭证、单实例锁、归档

pub mod archive;
pub mod credentials;
pub mod lease;
pub mod transport;

pub use archive::PayloadArchive;
pub use credentials::{CookieFileCredentials, CredentialProvider, Credentials, StaticCredentials};
pub use lease::MonitorLease;
pub use transport::{Payload, PollConfig, PollTransport, PushTransport, Transport};
