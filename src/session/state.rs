//! Shell session state machine.

/// Lifecycle state of a shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellState {
    /// The process is being spawned.
    #[default]
    Starting,
    /// Process and PTY are attached.
    Running,
    /// The process terminated or could not be started. Final.
    Exited,
}

impl ShellState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Starting -> Running
    /// - Starting -> Exited (spawn failure)
    /// - Running -> Exited
    pub fn can_transition_to(&self, target: ShellState) -> bool {
        use ShellState::*;
        matches!(
            (*self, target),
            (Starting, Running) | (Starting, Exited) | (Running, Exited)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Leaves the state unchanged and returns an error when the
    /// transition is not allowed.
    pub fn transition_to(&mut self, target: ShellState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ShellBotError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShellState::Exited)
    }

    /// Check if the process accepts input and signals.
    pub fn is_running(&self) -> bool {
        matches!(self, ShellState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_lifecycle() {
        let mut state = ShellState::default();
        assert_eq!(state, ShellState::Starting);

        state.transition_to(ShellState::Running).unwrap();
        assert!(state.is_running());

        state.transition_to(ShellState::Exited).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_spawn_failure_goes_to_exited() {
        let mut state = ShellState::Starting;
        assert!(state.transition_to(ShellState::Exited).is_ok());
    }

    #[test]
    fn test_nothing_leaves_exited() {
        let mut state = ShellState::Exited;
        assert!(state.transition_to(ShellState::Running).is_err());
        assert!(state.transition_to(ShellState::Starting).is_err());
        assert!(state.transition_to(ShellState::Exited).is_err());
        assert_eq!(state, ShellState::Exited);
    }

    #[test]
    fn test_no_restart() {
        let mut state = ShellState::Running;
        assert!(state.transition_to(ShellState::Starting).is_err());
        assert_eq!(state, ShellState::Running);
    }
}
