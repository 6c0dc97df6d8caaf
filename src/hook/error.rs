//! Hook start failures

/// Reasons a `start()` attempt can fail
///
/// Every variant is fatal to that attempt only; the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("failed to allocate memory for the hook")]
    OutOfMemory,

    #[error("display server unavailable")]
    DisplayUnavailable,

    #[error("required input extension is missing")]
    ExtensionMissing,

    #[error("failed to allocate the hook context")]
    ContextAllocation,

    #[error("failed to register the input hook - check input permissions")]
    RegistrationFailed,

    #[error("failed to acquire the event run loop")]
    RunLoopUnavailable,

    #[error("an unknown hook error occurred")]
    Unknown,

    #[error("failed to create hook thread: {0}")]
    ThreadCreateFailed(String),

    #[error("hook did not report readiness before the start timeout")]
    StartTimeout,
}

impl HookError {
    /// Numeric status code, compatible with the status values layouts and
    /// logs from the native hook library used
    pub fn code(&self) -> i32 {
        match self {
            HookError::Unknown => 0x01,
            HookError::OutOfMemory => 0x02,
            HookError::DisplayUnavailable => 0x20,
            HookError::ExtensionMissing => 0x21,
            HookError::ContextAllocation => 0x23,
            HookError::RegistrationFailed => 0x30,
            HookError::RunLoopUnavailable => 0x43,
            HookError::ThreadCreateFailed(_) => -1,
            HookError::StartTimeout => -2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            HookError::OutOfMemory,
            HookError::DisplayUnavailable,
            HookError::ExtensionMissing,
            HookError::ContextAllocation,
            HookError::RegistrationFailed,
            HookError::RunLoopUnavailable,
            HookError::Unknown,
            HookError::ThreadCreateFailed("spawn".into()),
            HookError::StartTimeout,
        ];
        let mut codes: Vec<i32> = all.iter().map(HookError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_display_mentions_cause() {
        let err = HookError::ThreadCreateFailed("resource limit".into());
        assert!(err.to_string().contains("resource limit"));
    }
}
