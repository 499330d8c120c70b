use datareg_core::CoreError;
use datareg_fetch::FetchError;

pub const NETWORK: u8 = 1;
pub const INTEGRITY: u8 = 2;
pub const LOCAL: u8 = 3;
/// Bad command-line input shares the local-environment code.
pub const USAGE: u8 = LOCAL;

/// Raised by `verify` when on-disk files no longer match the registry.
#[derive(Debug, thiserror::Error)]
#[error("{failed} of {checked} registered file(s) failed verification")]
pub struct IntegrityFailure {
    pub failed: usize,
    pub checked: usize,
}

/// Map an error chain to the process exit code.
pub fn code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<FetchError>() {
            return match e {
                FetchError::HashMismatch { .. } => INTEGRITY,
                FetchError::InvalidExpectedHash(_) | FetchError::Io(_) => LOCAL,
                FetchError::Network { .. }
                | FetchError::Download { .. }
                | FetchError::InvalidUrl { .. }
                | FetchError::Client(_) => NETWORK,
            };
        }
        if cause.downcast_ref::<CoreError>().is_some() {
            return LOCAL;
        }
        if cause.downcast_ref::<IntegrityFailure>().is_some() {
            return INTEGRITY;
        }
    }
    // Untyped errors come from local checks in the commands themselves.
    LOCAL
}
