//! Debug session state machine.

use crate::error::SdkError;

/// The VM's execution state as observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The VM is executing script.
    Running,
    /// The VM is paused; frames and per-suspend values are valid.
    Suspended,
    /// The connection is gone. Terminal.
    Detached,
}

/// Tracks running/suspended/detached transitions for one session.
///
/// Every entry into `Suspended` bumps the suspend epoch. Work started in an
/// earlier epoch (a backtrace, a continue) compares its epoch to decide
/// whether its result still applies.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    suspend_epoch: u64,
}

impl SessionMachine {
    /// Create a machine in the [`Running`](SessionState::Running) state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Running,
            suspend_epoch: 0,
        }
    }

    /// Return the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of times the session has entered `Suspended`.
    pub fn suspend_epoch(&self) -> u64 {
        self.suspend_epoch
    }

    /// Transition: Running | Suspended → Suspended.
    ///
    /// A suspend while already suspended starts a fresh context.
    pub fn handle_suspended(&mut self) -> Result<u64, SdkError> {
        self.require_attached("suspend")?;
        self.state = SessionState::Suspended;
        self.suspend_epoch += 1;
        Ok(self.suspend_epoch)
    }

    /// Transition: Suspended → Running.
    ///
    /// Returns `false` when the session was already running.
    pub fn handle_resumed(&mut self) -> Result<bool, SdkError> {
        self.require_attached("resume")?;
        let changed = self.state == SessionState::Suspended;
        self.state = SessionState::Running;
        Ok(changed)
    }

    /// Apply a successful `continue` reply.
    ///
    /// The transition happens only when no new suspend was observed since
    /// the command was issued at `issued_epoch` and the reply did not
    /// report `running: false`.
    pub fn confirm_continue(&mut self, issued_epoch: u64, running: Option<bool>) -> bool {
        if self.state != SessionState::Suspended
            || self.suspend_epoch != issued_epoch
            || running == Some(false)
        {
            return false;
        }
        self.state = SessionState::Running;
        true
    }

    /// Transition: any → Detached. Returns `true` on the first call only.
    pub fn detach(&mut self) -> bool {
        if self.state == SessionState::Detached {
            return false;
        }
        self.state = SessionState::Detached;
        true
    }

    /// Check that the session is not detached.
    pub fn require_attached(&self, operation: &'static str) -> Result<(), SdkError> {
        if self.state == SessionState::Detached {
            return Err(SdkError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Check that the VM is suspended.
    pub fn require_suspended(&self, operation: &'static str) -> Result<(), SdkError> {
        if self.state != SessionState::Suspended {
            return Err(SdkError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Check that the VM is running.
    pub fn require_running(&self, operation: &'static str) -> Result<(), SdkError> {
        if self.state != SessionState::Running {
            return Err(SdkError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle_happy_path() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.state(), SessionState::Running);

        let epoch = machine.handle_suspended().unwrap();
        assert_eq!(epoch, 1);
        assert_eq!(machine.state(), SessionState::Suspended);

        assert!(machine.handle_resumed().unwrap());
        assert_eq!(machine.state(), SessionState::Running);

        assert!(machine.detach());
        assert_eq!(machine.state(), SessionState::Detached);
    }

    #[test]
    fn resumed_while_running_is_not_a_change() {
        let mut machine = SessionMachine::new();
        assert!(!machine.handle_resumed().unwrap());
    }

    #[test]
    fn nested_suspend_bumps_epoch() {
        let mut machine = SessionMachine::new();
        machine.handle_suspended().unwrap();
        let second = machine.handle_suspended().unwrap();
        assert_eq!(second, 2);
        assert_eq!(machine.state(), SessionState::Suspended);
    }

    #[test]
    fn continue_reply_transitions_to_running() {
        let mut machine = SessionMachine::new();
        let epoch = machine.handle_suspended().unwrap();
        assert!(machine.confirm_continue(epoch, Some(true)));
        assert_eq!(machine.state(), SessionState::Running);
    }

    #[test]
    fn continue_reply_without_running_flag_transitions() {
        let mut machine = SessionMachine::new();
        let epoch = machine.handle_suspended().unwrap();
        assert!(machine.confirm_continue(epoch, None));
    }

    #[test]
    fn continue_reply_after_new_suspend_is_ignored() {
        let mut machine = SessionMachine::new();
        let issued = machine.handle_suspended().unwrap();
        // A step finished and the VM broke again before the reply arrived.
        machine.handle_suspended().unwrap();
        assert!(!machine.confirm_continue(issued, Some(true)));
        assert_eq!(machine.state(), SessionState::Suspended);
    }

    #[test]
    fn continue_reply_reporting_not_running_is_ignored() {
        let mut machine = SessionMachine::new();
        let epoch = machine.handle_suspended().unwrap();
        assert!(!machine.confirm_continue(epoch, Some(false)));
        assert_eq!(machine.state(), SessionState::Suspended);
    }

    #[test]
    fn detached_rejects_transitions() {
        let mut machine = SessionMachine::new();
        machine.detach();
        assert!(!machine.detach());
        let err = machine.handle_suspended().unwrap_err();
        assert!(matches!(
            err,
            SdkError::InvalidState {
                operation: "suspend",
                state: SessionState::Detached
            }
        ));
        assert!(machine.handle_resumed().is_err());
    }

    #[test]
    fn require_helpers() {
        let mut machine = SessionMachine::new();
        assert!(machine.require_running("suspend").is_ok());
        assert!(machine.require_suspended("continue").is_err());
        machine.handle_suspended().unwrap();
        assert!(machine.require_suspended("continue").is_ok());
        assert!(machine.require_running("suspend").is_err());
        assert!(machine.require_attached("evaluate").is_ok());
    }
}
