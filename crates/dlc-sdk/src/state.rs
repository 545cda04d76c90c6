use serde::{Deserialize, Serialize};

/// Lifecycle of a contract on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum ContractStatus {
    /// Created locally, fields still being configured.
    Draft = 0,
    /// Offer sent to the counterparty, awaiting accept or reject.
    OfferedByMe = 1,
    /// Offer received from the counterparty, awaiting a local decision.
    OfferedToMe = 2,
    /// Both sides agreed. Awaiting funding confirmation.
    Accepted = 3,
    /// Funding observed on-chain. Awaiting oracle attestation.
    Active = 4,
    /// Settlement transaction built and exchanged.
    Settled = 5,
    /// Declined by the receiving side.
    Rejected = 6,
    /// Aborted by a validation failure or timeout.
    Error = 7,
}

impl ContractStatus {
    pub fn from_u64(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Draft),
            1 => Some(Self::OfferedByMe),
            2 => Some(Self::OfferedToMe),
            3 => Some(Self::Accepted),
            4 => Some(Self::Active),
            5 => Some(Self::Settled),
            6 => Some(Self::Rejected),
            7 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_u64(self) -> u64 {
        self as u64
    }

    /// Settled, Rejected and Error have no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Settled | Self::Rejected | Self::Error)
    }

    /// Whether `self -> to` is an edge of the lifecycle.
    ///
    /// `OfferedToMe` has no incoming edge: contracts enter it only at
    /// creation, when an offer is received.
    pub fn can_transition_to(self, to: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, to),
            (Draft, OfferedByMe)
                | (OfferedByMe, Accepted)
                | (OfferedByMe, Rejected)
                | (OfferedToMe, Accepted)
                | (OfferedToMe, Rejected)
                | (Accepted, Active)
                | (Active, Settled)
                | (Draft, Error)
                | (OfferedByMe, Error)
                | (OfferedToMe, Error)
                | (Accepted, Error)
        )
    }

    /// Whether the contract has progressed to or beyond `other` along the
    /// happy path. Used to recognise duplicate deliveries.
    pub fn has_reached(self, other: ContractStatus) -> bool {
        fn rank(s: ContractStatus) -> u8 {
            match s {
                ContractStatus::Draft => 0,
                ContractStatus::OfferedByMe | ContractStatus::OfferedToMe => 1,
                ContractStatus::Accepted => 2,
                ContractStatus::Active => 3,
                ContractStatus::Settled => 4,
                ContractStatus::Rejected | ContractStatus::Error => u8::MAX,
            }
        }
        match (self, other) {
            (a, b) if a == b => true,
            (ContractStatus::Rejected | ContractStatus::Error, _) => false,
            (_, ContractStatus::Rejected | ContractStatus::Error) => false,
            (a, b) => rank(a) >= rank(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ContractStatus; 8] = [
        ContractStatus::Draft,
        ContractStatus::OfferedByMe,
        ContractStatus::OfferedToMe,
        ContractStatus::Accepted,
        ContractStatus::Active,
        ContractStatus::Settled,
        ContractStatus::Rejected,
        ContractStatus::Error,
    ];

    #[test]
    fn roundtrip() {
        for v in 0..=7 {
            let status = ContractStatus::from_u64(v).unwrap();
            assert_eq!(status.as_u64(), v);
        }
        assert!(ContractStatus::from_u64(8).is_none());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn nothing_enters_offered_to_me() {
        for from in ALL {
            assert!(!from.can_transition_to(ContractStatus::OfferedToMe));
        }
    }

    #[test]
    fn active_cannot_abort() {
        assert!(!ContractStatus::Active.can_transition_to(ContractStatus::Error));
        assert!(!ContractStatus::Active.can_transition_to(ContractStatus::Rejected));
        assert!(ContractStatus::Active.can_transition_to(ContractStatus::Settled));
    }

    #[test]
    fn has_reached_orders_happy_path() {
        assert!(ContractStatus::Active.has_reached(ContractStatus::Accepted));
        assert!(ContractStatus::Settled.has_reached(ContractStatus::Active));
        assert!(!ContractStatus::Accepted.has_reached(ContractStatus::Active));
        assert!(!ContractStatus::Rejected.has_reached(ContractStatus::Accepted));
        assert!(ContractStatus::Rejected.has_reached(ContractStatus::Rejected));
    }
}
