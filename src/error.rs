use thiserror::Error;

/// Error kinds named in the engine's error-handling design (§7): producer-visible
/// calls collapse these into the numeric `{0, 1, -1}` contract at the API boundary,
/// the worker only ever logs and attempts recovery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("unsupported format: {rate} Hz / {channels} ch is not in the capability matrix")]
    UnsupportedFormat { rate: u32, channels: u8 },

    #[error("backend open failed: {0}")]
    BackendOpenFailed(String),

    #[error("backend write underrun")]
    BackendWriteUnderrun,

    #[error("backend fatal error: {0}")]
    BackendFatal(String),

    #[error("ring full: no free slot")]
    RingFull,

    #[error("bad argument: {0}")]
    BadArgument(&'static str),
}

/// The three producer-visible outcomes of a `Setup` call (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    Ok,
    Downgraded,
}

/// Maps the outcome of a fallible setup into the documented `{0 ok | 1 downgraded | -1 fail}`
/// wire contract. Kept as a single conversion point so no call site hand-rolls the mapping.
pub fn setup_status_code(result: &Result<SetupOutcome, AudioError>) -> i32 {
    match result {
        Ok(SetupOutcome::Ok) => 0,
        Ok(SetupOutcome::Downgraded) => 1,
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_wire_contract() {
        assert_eq!(setup_status_code(&Ok(SetupOutcome::Ok)), 0);
        assert_eq!(setup_status_code(&Ok(SetupOutcome::Downgraded)), 1);
        assert_eq!(
            setup_status_code(&Err(AudioError::RingFull)),
            -1
        );
    }
}
