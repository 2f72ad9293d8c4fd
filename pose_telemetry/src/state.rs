//! Broker connection state machine.
//!
//! ```text
//!            Enable                ConnAck
//! Disabled ─────────▶ Connecting ─────────▶ Connected
//!    ▲                    │                   │   ▲
//!    │ Disable            │ Lost         Lost │   │ ConnAck
//!    └──── (any) ◀────────┴────────▶ Lost ◀───┘   │
//!                                     └───────────┘
//! ```
//!
//! `Lost` keeps the session enabled; the transport's own reconnect may
//! bring it back to `Connected`.  Only `Connected` is ready to publish.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disabled,
    Connecting,
    Connected,
    Lost,
}

impl LinkState {
    pub fn is_ready(self) -> bool { self == LinkState::Connected }
    pub fn is_enabled(self) -> bool { self != LinkState::Disabled }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Enable,
    Disable,
    ConnAck,
    ConnectionLost,
}

/// Side effect the owner must perform for a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    /// Just became ready: (re)subscribe if diagnostics are on.
    Ready,
}

/// The transition table.
pub fn transition(state: LinkState, trigger: Trigger) -> (LinkState, Option<Action>) {
    use LinkState::*;
    use Trigger::*;

    match (state, trigger) {
        (Disabled, Enable)                 => (Connecting, Some(Action::Connect)),
        (Disabled, _)                      => (Disabled, None),
        (_, Disable)                       => (Disabled, Some(Action::Disconnect)),
        (Connecting | Lost, ConnAck)       => (Connected, Some(Action::Ready)),
        (Connecting | Connected | Lost, ConnectionLost) => (Lost, None),
        (s, _)                             => (s, None),
    }
}
