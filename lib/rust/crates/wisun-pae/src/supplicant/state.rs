// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

/// Supplicant states. A state is suspended exactly while its countdown is non-zero.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppState {
    Idle,
    /// Initial EAPOL-key send pending, counted in fast ticks.
    AuthRequested { jitter_ticks: u16 },
    WaitingForAuthenticator { remaining: u32 },
    /// Re-requesting keys after a GTK hash mismatch; timed by the trickle timer.
    GtkUpdateTrickle,
    RetryBackoff { remaining: u32 },
    /// Waiting for the answer to the last retransmission.
    FinalWait { remaining: u32 },
}

impl Default for SuppState {
    fn default() -> Self {
        SuppState::Idle
    }
}

fn count(remaining: u32, seconds: u32) -> (u32, bool) {
    let left = remaining.saturating_sub(seconds);
    (left, left == 0)
}

impl SuppState {
    /// Counts down the second-based timers. Returns the next state and whether its countdown
    /// ran out.
    pub fn countdown(self, seconds: u32) -> (SuppState, bool) {
        match self {
            SuppState::WaitingForAuthenticator { remaining } => {
                let (remaining, expired) = count(remaining, seconds);
                (SuppState::WaitingForAuthenticator { remaining }, expired)
            }
            SuppState::RetryBackoff { remaining } => {
                let (remaining, expired) = count(remaining, seconds);
                (SuppState::RetryBackoff { remaining }, expired)
            }
            SuppState::FinalWait { remaining } => {
                let (remaining, expired) = count(remaining, seconds);
                (SuppState::FinalWait { remaining }, expired)
            }
            other => (other, false),
        }
    }

    /// Counts down the initial send jitter. Returns true when the send is due.
    pub fn fast_countdown(self, ticks: u16) -> (SuppState, bool) {
        match self {
            SuppState::AuthRequested { jitter_ticks } if jitter_ticks > ticks => {
                (SuppState::AuthRequested { jitter_ticks: jitter_ticks - ticks }, false)
            }
            SuppState::AuthRequested { .. } => (SuppState::AuthRequested { jitter_ticks: 0 }, true),
            other => (other, false),
        }
    }

    pub fn is_authenticating(&self) -> bool {
        match self {
            SuppState::Idle | SuppState::GtkUpdateTrickle => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_expires_once_reaching_zero() {
        let (state, expired) = SuppState::WaitingForAuthenticator { remaining: 3 }.countdown(2);
        assert_eq!(state, SuppState::WaitingForAuthenticator { remaining: 1 });
        assert!(!expired);
        let (state, expired) = state.countdown(5);
        assert_eq!(state, SuppState::WaitingForAuthenticator { remaining: 0 });
        assert!(expired);
    }

    #[test]
    fn idle_and_trickle_have_no_countdown() {
        assert_eq!(SuppState::Idle.countdown(100), (SuppState::Idle, false));
        assert_eq!(SuppState::GtkUpdateTrickle.countdown(100), (SuppState::GtkUpdateTrickle, false));
        assert_eq!(SuppState::Idle.fast_countdown(100), (SuppState::Idle, false));
    }

    #[test]
    fn jitter_counts_fast_ticks() {
        let (state, due) = SuppState::AuthRequested { jitter_ticks: 3 }.fast_countdown(2);
        assert!(!due);
        let (state, due) = state.fast_countdown(1);
        assert!(due);
        assert!(state.is_authenticating());
    }
}
