// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Production build.
//!
//! A build runs the client bundle, then the server bundle, then the
//! optional service worker. [`BuildState`] enforces that order.

/// External bundler command.
pub mod command;
/// Phase orchestration.
pub mod orchestrator;

pub use command::CommandBundler;
pub use orchestrator::{BuildOrchestrator, BuildReport};

use kiln::{KilnError, Result};

/// Where a build currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildPhase {
    /// Nothing bundled yet.
    #[default]
    AwaitingClient,
    /// Client bundle written.
    AwaitingServer,
    /// Both bundles written.
    Done,
}

impl BuildPhase {
    /// The phase that legally follows this one.
    pub fn next(self) -> Option<BuildPhase> {
        match self {
            BuildPhase::AwaitingClient => Some(BuildPhase::AwaitingServer),
            BuildPhase::AwaitingServer => Some(BuildPhase::Done),
            BuildPhase::Done => None,
        }
    }
}

/// Guarded phase transitions.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    phase: BuildPhase,
}

impl BuildState {
    /// Current phase.
    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Moves from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::BuildState`] if the build is not in `from` or
    /// `to` does not directly follow it.
    pub fn advance(&mut self, from: BuildPhase, to: BuildPhase) -> Result<()> {
        if self.phase != from {
            return Err(KilnError::BuildState(format!(
                "expected phase {:?} but the build is in {:?}",
                from, self.phase
            )));
        }
        if from.next() != Some(to) {
            return Err(KilnError::BuildState(format!(
                "cannot move from {:?} to {:?}",
                from, to
            )));
        }
        self.phase = to;
        Ok(())
    }

    /// Returns to [`BuildPhase::AwaitingClient`] for a fresh build.
    pub fn reset(&mut self) {
        self.phase = BuildPhase::AwaitingClient;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_advance_in_order() {
        let mut state = BuildState::default();
        state
            .advance(BuildPhase::AwaitingClient, BuildPhase::AwaitingServer)
            .unwrap();
        state.advance(BuildPhase::AwaitingServer, BuildPhase::Done).unwrap();
        assert_eq!(state.phase(), BuildPhase::Done);
    }

    #[test]
    fn test_server_before_client_is_rejected() {
        let mut state = BuildState::default();
        let err = state
            .advance(BuildPhase::AwaitingServer, BuildPhase::Done)
            .unwrap_err();
        assert!(matches!(err, KilnError::BuildState(_)));
        assert_eq!(state.phase(), BuildPhase::AwaitingClient);
    }

    #[test]
    fn test_skipping_a_phase_is_rejected() {
        let mut state = BuildState::default();
        assert!(state
            .advance(BuildPhase::AwaitingClient, BuildPhase::Done)
            .is_err());
    }

    #[test]
    fn test_done_is_terminal() {
        let mut state = BuildState::default();
        state
            .advance(BuildPhase::AwaitingClient, BuildPhase::AwaitingServer)
            .unwrap();
        state.advance(BuildPhase::AwaitingServer, BuildPhase::Done).unwrap();
        assert!(state
            .advance(BuildPhase::Done, BuildPhase::AwaitingClient)
            .is_err());

        state.reset();
        assert_eq!(state.phase(), BuildPhase::AwaitingClient);
    }
}
