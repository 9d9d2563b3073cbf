// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

/// Holds a by-value state so transitions can consume the previous state.
#[derive(Debug, Default, PartialEq)]
pub struct StateMachine<S: Default> {
    state: S,
}

impl<S: Default> StateMachine<S> {
    pub fn new(state: S) -> Self {
        StateMachine { state }
    }

    pub fn replace_state<F>(&mut self, map: F)
    where
        F: FnOnce(S) -> S,
    {
        let state = std::mem::take(&mut self.state);
        self.state = map(state);
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn mut_state(&mut self) -> &mut S {
        &mut self.state
    }
}
