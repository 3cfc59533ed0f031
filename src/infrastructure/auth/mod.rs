mod claims;
mod jwt;

pub use claims::{InstallationCaller, RelayClaims, PUSH_SCOPE};
pub use jwt::RelayTokenValidator;
