// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Account-linking flow state machine.
//!
//! Google sign-in can collide with an existing account in two ways: a
//! business account that merely needs marketplace access (solved by an
//! invite email), or an unlinked password account (solved by the
//! reauth-proof-link handshake). Each step of the handshake is an
//! explicit state; transitions not listed here are rejected rather than
//! silently coerced, so a UI bug cannot skip the reauth step.
//!
//! The `tx_id` issued with the collision is the thread through the whole
//! handshake. Losing it is fatal for the flow; a step failure keeps it
//! and drops back to the linking modal with the error attached.

use std::fmt;

use parking_lot::RwLock;
use tracing::debug;

use crate::api::InviteDetails;

/// Where the collision was detected; decides where cancel lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOrigin {
    Login,
    Register,
}

/// Where the UI should navigate after a cancelled flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDestination {
    Login,
    Register,
}

/// One step of the linking flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    /// Business account exists without marketplace access; the invite
    /// modal is showing.
    InviteOffered { details: InviteDetails },
    /// The invite email went out; terminal for this visit.
    InviteSent,
    /// Unlinked password account found; the linking modal is showing.
    LinkingModalOpen {
        tx_id: String,
        suggested_next: Option<String>,
    },
    /// The user submitted their password; reauth call in flight.
    ReauthPending { tx_id: String },
    /// Reauth succeeded and returned a link proof.
    ProofObtained { tx_id: String, proof: String },
    /// The link call is in flight.
    LinkPending { tx_id: String, proof: String },
    /// The accounts are linked.
    Linked,
}

impl LinkState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InviteOffered { .. } => "invite_offered",
            Self::InviteSent => "invite_sent",
            Self::LinkingModalOpen { .. } => "linking_modal_open",
            Self::ReauthPending { .. } => "reauth_pending",
            Self::ProofObtained { .. } => "proof_obtained",
            Self::LinkPending { .. } => "link_pending",
            Self::Linked => "linked",
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: &'static str,
    pub action: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot {} from state {}", self.action, self.from)
    }
}

impl std::error::Error for InvalidTransition {}

struct Inner {
    state: LinkState,
    origin: Option<LinkOrigin>,
    error: Option<String>,
}

/// The linking flow. Synchronous interior mutability: every transition
/// is a short critical section with no awaits inside.
pub struct LinkFlow {
    inner: RwLock<Inner>,
}

impl Default for LinkFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkFlow {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: LinkState::Idle,
                origin: None,
                error: None,
            }),
        }
    }

    pub fn state(&self) -> LinkState {
        self.inner.read().state.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    pub fn origin(&self) -> Option<LinkOrigin> {
        self.inner.read().origin
    }

    /// Needs-marketplace-access collision: offer the invite.
    pub fn open_invite(
        &self,
        origin: LinkOrigin,
        details: InviteDetails,
    ) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        match inner.state {
            LinkState::Idle | LinkState::InviteOffered { .. } => {
                inner.state = LinkState::InviteOffered { details };
                inner.origin = Some(origin);
                inner.error = None;
                Ok(())
            }
            ref s => Err(InvalidTransition {
                from: s.name(),
                action: "open invite",
            }),
        }
    }

    /// The invite email was sent.
    pub fn invite_sent(&self) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        match inner.state {
            LinkState::InviteOffered { .. } => {
                inner.state = LinkState::InviteSent;
                Ok(())
            }
            ref s => Err(InvalidTransition {
                from: s.name(),
                action: "mark invite sent",
            }),
        }
    }

    /// Unlinked-Google collision: open the linking modal with the
    /// transaction issued by the server.
    pub fn open_linking(
        &self,
        origin: LinkOrigin,
        tx_id: String,
        suggested_next: Option<String>,
    ) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        match inner.state {
            LinkState::Idle | LinkState::LinkingModalOpen { .. } => {
                debug!(tx_id, "link collision, opening linking modal");
                inner.state = LinkState::LinkingModalOpen {
                    tx_id,
                    suggested_next,
                };
                inner.origin = Some(origin);
                inner.error = None;
                Ok(())
            }
            ref s => Err(InvalidTransition {
                from: s.name(),
                action: "open linking modal",
            }),
        }
    }

    /// The user submitted their password; returns the transaction in play.
    pub fn begin_reauth(&self) -> Result<String, InvalidTransition> {
        let mut inner = self.inner.write();
        match &inner.state {
            LinkState::LinkingModalOpen { tx_id, .. } => {
                let tx_id = tx_id.clone();
                inner.state = LinkState::ReauthPending {
                    tx_id: tx_id.clone(),
                };
                inner.error = None;
                Ok(tx_id)
            }
            s => Err(InvalidTransition {
                from: s.name(),
                action: "begin reauth",
            }),
        }
    }

    /// Reauth succeeded with a proof.
    pub fn proof_obtained(&self, proof: String) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        match &inner.state {
            LinkState::ReauthPending { tx_id } => {
                inner.state = LinkState::ProofObtained {
                    tx_id: tx_id.clone(),
                    proof,
                };
                Ok(())
            }
            s => Err(InvalidTransition {
                from: s.name(),
                action: "record proof",
            }),
        }
    }

    /// Start the link call; returns the (tx_id, proof) pair to send.
    pub fn begin_link(&self) -> Result<(String, String), InvalidTransition> {
        let mut inner = self.inner.write();
        match &inner.state {
            LinkState::ProofObtained { tx_id, proof } => {
                let pair = (tx_id.clone(), proof.clone());
                inner.state = LinkState::LinkPending {
                    tx_id: pair.0.clone(),
                    proof: pair.1.clone(),
                };
                Ok(pair)
            }
            s => Err(InvalidTransition {
                from: s.name(),
                action: "begin link",
            }),
        }
    }

    /// A reauth or link call failed without invalidating the
    /// transaction: drop back to the modal, keep the tx_id, surface the
    /// error for another attempt.
    pub fn step_failed(&self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        let tx_id = match &inner.state {
            LinkState::ReauthPending { tx_id }
            | LinkState::ProofObtained { tx_id, .. }
            | LinkState::LinkPending { tx_id, .. } => tx_id.clone(),
            s => {
                return Err(InvalidTransition {
                    from: s.name(),
                    action: "record step failure",
                })
            }
        };
        inner.state = LinkState::LinkingModalOpen {
            tx_id,
            suggested_next: None,
        };
        inner.error = Some(error.into());
        Ok(())
    }

    /// The link call succeeded.
    pub fn linked(&self) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        match inner.state {
            LinkState::LinkPending { .. } => {
                inner.state = LinkState::Linked;
                inner.error = None;
                Ok(())
            }
            ref s => Err(InvalidTransition {
                from: s.name(),
                action: "mark linked",
            }),
        }
    }

    /// The server reported the transaction expired or unknown: the flow
    /// cannot continue and must restart from sign-in.
    pub fn session_expired(&self, error: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.state = LinkState::Idle;
        inner.origin = None;
        inner.error = Some(error.into());
    }

    /// Abandon the flow. Returns where the UI should land, based on
    /// where the collision was detected.
    pub fn cancel(&self) -> CancelDestination {
        let mut inner = self.inner.write();
        let dest = match inner.origin {
            Some(LinkOrigin::Register) => CancelDestination::Register,
            _ => CancelDestination::Login,
        };
        inner.state = LinkState::Idle;
        inner.origin = None;
        inner.error = None;
        dest
    }

    /// Clear everything (logout, navigation away).
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = LinkState::Idle;
        inner.origin = None;
        inner.error = None;
    }
}

#[cfg(test)]
#[path = "linking_tests.rs"]
mod tests;
