use serde::{Deserialize, Serialize};

use crate::division::{DivisionTable, PayoutSplit};
use crate::error::{Error, Result};
use crate::params::{ContractFingerprint, ContractIdx, Funding, OracleIdx, PeerIdx, Point};
use crate::state::ContractStatus;

/// Recorded once a contract settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub oracle_value: u64,
    pub payout: PayoutSplit,
    /// Our half of the settlement transaction as produced by the wallet.
    pub settlement_tx: Vec<u8>,
}

/// A discreet log contract as seen by this node.
///
/// Amounts and payouts are always from the local side's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub idx: ContractIdx,
    pub oracle_idx: Option<OracleIdx>,
    pub r_point: Option<Point>,
    /// Unix seconds after which settlement is allowed.
    pub settlement_time: Option<u64>,
    pub coin_type: Option<u32>,
    pub funding: Option<Funding>,
    pub division: Option<DivisionTable>,
    pub status: ContractStatus,
    pub peer_idx: Option<PeerIdx>,
    pub fingerprint: Option<ContractFingerprint>,
    /// The counterparty's index for the same contract, when known.
    pub remote_idx: Option<ContractIdx>,
    pub funding_txid: Option<[u8; 32]>,
    pub settlement: Option<SettlementRecord>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// The negotiated terms of a complete contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTerms {
    pub oracle_idx: OracleIdx,
    pub r_point: Point,
    pub settlement_time: u64,
    pub coin_type: u32,
    pub funding: Funding,
    pub division: DivisionTable,
}

/// A settable contract field. Only accepted while the contract is a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractField {
    Oracle(OracleIdx),
    RPoint(Point),
    SettlementTime(u64),
    CoinType(u32),
    Funding(Funding),
    Division(DivisionTable),
}

impl ContractField {
    pub fn name(&self) -> &'static str {
        match self {
            ContractField::Oracle(_) => "oracle",
            ContractField::RPoint(_) => "r_point",
            ContractField::SettlementTime(_) => "settlement_time",
            ContractField::CoinType(_) => "coin_type",
            ContractField::Funding(_) => "funding",
            ContractField::Division(_) => "division",
        }
    }
}

/// Filter for listing contracts. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContractFilter {
    pub status: Option<ContractStatus>,
    pub peer_idx: Option<PeerIdx>,
    pub fingerprint: Option<ContractFingerprint>,
    pub limit: Option<usize>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.status.is_none_or(|s| contract.status == s)
            && self.peer_idx.is_none_or(|p| contract.peer_idx == Some(p))
            && self
                .fingerprint
                .is_none_or(|f| contract.fingerprint == Some(f))
    }
}

impl Contract {
    /// An empty contract in the given status. The backend assigns `idx`.
    pub fn empty(status: ContractStatus, now: u64) -> Self {
        Self {
            idx: ContractIdx(0),
            oracle_idx: None,
            r_point: None,
            settlement_time: None,
            coin_type: None,
            funding: None,
            division: None,
            status,
            peer_idx: None,
            fingerprint: None,
            remote_idx: None,
            funding_txid: None,
            settlement: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The first required field that is still unset, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.oracle_idx.is_none() {
            Some("oracle")
        } else if self.r_point.is_none() {
            Some("r_point")
        } else if self.settlement_time.is_none() {
            Some("settlement_time")
        } else if self.coin_type.is_none() {
            Some("coin_type")
        } else if self.funding.is_none() {
            Some("funding")
        } else if self.division.is_none() {
            Some("division")
        } else {
            None
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }

    /// All required fields, or `IncompleteContract` naming the first unset one.
    pub fn terms(&self) -> Result<ContractTerms> {
        match (
            self.oracle_idx,
            self.r_point,
            self.settlement_time,
            self.coin_type,
            self.funding,
            self.division.clone(),
        ) {
            (
                Some(oracle_idx),
                Some(r_point),
                Some(settlement_time),
                Some(coin_type),
                Some(funding),
                Some(division),
            ) => Ok(ContractTerms {
                oracle_idx,
                r_point,
                settlement_time,
                coin_type,
                funding,
                division,
            }),
            _ => Err(Error::IncompleteContract(
                self.missing_field().unwrap_or("unknown"),
            )),
        }
    }

    pub(crate) fn apply(&mut self, field: ContractField) {
        match field {
            ContractField::Oracle(idx) => self.oracle_idx = Some(idx),
            ContractField::RPoint(p) => self.r_point = Some(p),
            ContractField::SettlementTime(t) => self.settlement_time = Some(t),
            ContractField::CoinType(c) => self.coin_type = Some(c),
            ContractField::Funding(f) => self.funding = Some(f),
            ContractField::Division(d) => self.division = Some(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_reported_in_order() {
        let mut c = Contract::empty(ContractStatus::Draft, 0);
        assert_eq!(c.missing_field(), Some("oracle"));
        c.apply(ContractField::Oracle(OracleIdx(1)));
        c.apply(ContractField::RPoint([2; 33]));
        c.apply(ContractField::SettlementTime(1));
        c.apply(ContractField::CoinType(257));
        assert_eq!(c.missing_field(), Some("funding"));
        c.apply(ContractField::Funding(Funding::new(1, 1).unwrap()));
        c.apply(ContractField::Division(
            DivisionTable::linear(2, 1, 2).unwrap(),
        ));
        assert!(c.is_complete());
        let terms = c.terms().unwrap();
        assert_eq!(terms.coin_type, 257);
        assert_eq!(terms.funding.total(), 2);
    }

    #[test]
    fn terms_name_the_missing_field() {
        let mut c = Contract::empty(ContractStatus::Draft, 0);
        c.apply(ContractField::Oracle(OracleIdx(1)));
        assert!(matches!(c.terms(), Err(Error::IncompleteContract("r_point"))));
    }

    #[test]
    fn filter_matches_status_and_peer() {
        let mut c = Contract::empty(ContractStatus::OfferedToMe, 0);
        c.peer_idx = Some(PeerIdx(1));
        assert!(ContractFilter::default().matches(&c));
        assert!(
            ContractFilter {
                status: Some(ContractStatus::OfferedToMe),
                peer_idx: Some(PeerIdx(1)),
                ..Default::default()
            }
            .matches(&c)
        );
        assert!(
            !ContractFilter {
                peer_idx: Some(PeerIdx(2)),
                ..Default::default()
            }
            .matches(&c)
        );

        c.fingerprint = Some(ContractFingerprint([1; 32]));
        assert!(
            ContractFilter {
                fingerprint: Some(ContractFingerprint([1; 32])),
                ..Default::default()
            }
            .matches(&c)
        );
        assert!(
            !ContractFilter {
                fingerprint: Some(ContractFingerprint([2; 32])),
                ..Default::default()
            }
            .matches(&c)
        );
    }
}
