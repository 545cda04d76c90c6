use crate::params::ContractIdx;
use crate::state::ContractStatus;

/// Events emitted by the contract store on every committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
    /// A contract was created locally or from a received offer.
    Created {
        idx: ContractIdx,
        status: ContractStatus,
    },
    /// A status transition was committed.
    StatusChanged {
        idx: ContractIdx,
        old: ContractStatus,
        new: ContractStatus,
    },
    /// A draft was discarded.
    Discarded { idx: ContractIdx },
}

impl ContractEvent {
    pub fn idx(&self) -> ContractIdx {
        match self {
            ContractEvent::Created { idx, .. }
            | ContractEvent::StatusChanged { idx, .. }
            | ContractEvent::Discarded { idx } => *idx,
        }
    }

    /// The status the contract is in after this event, if it still exists.
    pub fn status(&self) -> Option<ContractStatus> {
        match self {
            ContractEvent::Created { status, .. } => Some(*status),
            ContractEvent::StatusChanged { new, .. } => Some(*new),
            ContractEvent::Discarded { .. } => None,
        }
    }
}
