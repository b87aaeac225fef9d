use serde::{Deserialize, Serialize};

use warehub_core::{DomainError, DomainResult, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    InTransit,
    Completed,
    Rejected,
    ReturnRequested,
    ReturnApproved,
    ReturnShipped,
    Returned,
    Disposed,
}

/// Which side of a transfer must act to reach a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    SourceManager,
    DestinationManager,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 10] = [
        TransferStatus::Pending,
        TransferStatus::Approved,
        TransferStatus::InTransit,
        TransferStatus::Completed,
        TransferStatus::Rejected,
        TransferStatus::ReturnRequested,
        TransferStatus::ReturnApproved,
        TransferStatus::ReturnShipped,
        TransferStatus::Returned,
        TransferStatus::Disposed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
            TransferStatus::ReturnRequested => "return_requested",
            TransferStatus::ReturnApproved => "return_approved",
            TransferStatus::ReturnShipped => "return_shipped",
            TransferStatus::Returned => "returned",
            TransferStatus::Disposed => "disposed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown transfer status '{s}'")))
    }

    /// The transition table.
    pub fn can_transition_to(self, to: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, InTransit)
                | (InTransit, Completed)
                | (InTransit, ReturnRequested)
                | (ReturnRequested, ReturnApproved)
                | (ReturnRequested, Disposed)
                | (ReturnApproved, ReturnShipped)
                | (ReturnShipped, Returned)
        )
    }

    pub fn next_states(self) -> Vec<TransferStatus> {
        Self::ALL
            .into_iter()
            .filter(|to| self.can_transition_to(*to))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    /// Who may move a transfer into this status (admins always may).
    pub fn required_authority(self) -> Option<Authority> {
        use TransferStatus::*;
        match self {
            Pending => None,
            Approved | Rejected | InTransit | ReturnApproved | Disposed | Returned => {
                Some(Authority::SourceManager)
            }
            Completed | ReturnRequested | ReturnShipped => Some(Authority::DestinationManager),
        }
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's standing relative to one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferActor {
    pub user_id: UserId,
    pub is_admin: bool,
    pub manages_source: bool,
    pub manages_destination: bool,
}

impl TransferActor {
    pub fn has(&self, authority: Authority) -> bool {
        self.is_admin
            || match authority {
                Authority::SourceManager => self.manages_source,
                Authority::DestinationManager => self.manages_destination,
            }
    }

    pub fn may_enter(&self, status: TransferStatus) -> bool {
        status.required_authority().is_some_and(|a| self.has(a))
    }
}
