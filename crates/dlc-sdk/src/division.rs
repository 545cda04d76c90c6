use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::Funding;

/// One breakpoint of a division table: at `oracle_value` the local side
/// receives `payout`, the counterparty receives the rest of the funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionPoint {
    pub oracle_value: u64,
    pub payout: u64,
}

/// How the total funding splits as a function of the attested value.
///
/// Points are kept sorted by `oracle_value` with distinct values, and the
/// payouts are monotonic. Values between two points are interpolated
/// linearly; values outside the table clamp to the nearest end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DivisionPoint>", into = "Vec<DivisionPoint>")]
pub struct DivisionTable {
    points: Vec<DivisionPoint>,
}

/// Outcome of a settlement: what each side is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSplit {
    pub ours: u64,
    pub theirs: u64,
}

impl PayoutSplit {
    pub fn total(&self) -> u64 {
        self.ours + self.theirs
    }

    pub fn mirrored(&self) -> Self {
        Self {
            ours: self.theirs,
            theirs: self.ours,
        }
    }
}

impl DivisionTable {
    pub fn new(mut points: Vec<DivisionPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidField(
                "division needs at least one point".into(),
            ));
        }
        points.sort_by_key(|p| p.oracle_value);

        if points
            .windows(2)
            .any(|w| w[0].oracle_value == w[1].oracle_value)
        {
            return Err(Error::InvalidField(
                "division oracle values must be distinct".into(),
            ));
        }

        let non_decreasing = points.windows(2).all(|w| w[0].payout <= w[1].payout);
        let non_increasing = points.windows(2).all(|w| w[0].payout >= w[1].payout);
        if !non_decreasing && !non_increasing {
            return Err(Error::InvalidField("division payouts must be monotonic".into()));
        }

        Ok(Self { points })
    }

    /// Two-point table: all funds go to us at `value_all_ours` and to the
    /// counterparty at `value_all_theirs`.
    pub fn linear(value_all_ours: u64, value_all_theirs: u64, total: u64) -> Result<Self> {
        if value_all_ours == value_all_theirs {
            return Err(Error::InvalidField(
                "division endpoints must differ".into(),
            ));
        }
        Self::new(vec![
            DivisionPoint {
                oracle_value: value_all_ours,
                payout: total,
            },
            DivisionPoint {
                oracle_value: value_all_theirs,
                payout: 0,
            },
        ])
    }

    pub fn points(&self) -> &[DivisionPoint] {
        &self.points
    }

    /// Every payout must fit inside the total funding.
    pub fn check_bounds(&self, total: u64) -> Result<()> {
        match self.points.iter().find(|p| p.payout > total) {
            Some(p) => Err(Error::InvalidField(format!(
                "division payout {} at value {} exceeds total funding {total}",
                p.payout, p.oracle_value
            ))),
            None => Ok(()),
        }
    }

    /// Local payout at `value`, before bounding against funding.
    pub fn payout_at(&self, value: u64) -> u64 {
        let pos = self.points.partition_point(|p| p.oracle_value <= value);
        if pos == 0 {
            return self.points[0].payout;
        }
        if pos == self.points.len() {
            return self.points[pos - 1].payout;
        }

        let lo = self.points[pos - 1];
        let hi = self.points[pos];
        let span = (hi.oracle_value - lo.oracle_value) as u128;
        let offset = (value - lo.oracle_value) as u128;

        if hi.payout >= lo.payout {
            let delta = (hi.payout - lo.payout) as u128 * offset / span;
            lo.payout + delta as u64
        } else {
            let delta = (lo.payout - hi.payout) as u128 * offset / span;
            lo.payout - delta as u64
        }
    }

    /// Split the funding at `value`. The two halves always sum to the total.
    pub fn split(&self, value: u64, funding: &Funding) -> Result<PayoutSplit> {
        let total = funding.total();
        self.check_bounds(total)?;
        let ours = self.payout_at(value);
        Ok(PayoutSplit {
            ours,
            theirs: total - ours,
        })
    }

    /// The same table seen from the counterparty.
    pub fn mirrored(&self, total: u64) -> Result<Self> {
        self.check_bounds(total)?;
        Self::new(
            self.points
                .iter()
                .map(|p| DivisionPoint {
                    oracle_value: p.oracle_value,
                    payout: total - p.payout,
                })
                .collect(),
        )
    }
}

impl TryFrom<Vec<DivisionPoint>> for DivisionTable {
    type Error = Error;

    fn try_from(points: Vec<DivisionPoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<DivisionTable> for Vec<DivisionPoint> {
    fn from(table: DivisionTable) -> Self {
        table.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_BTC: u64 = 100_000_000;

    fn tutorial_funding() -> Funding {
        Funding::new(ONE_BTC, ONE_BTC).unwrap()
    }

    fn tutorial_table() -> DivisionTable {
        DivisionTable::linear(20_000, 10_000, 2 * ONE_BTC).unwrap()
    }

    #[test]
    fn exact_breakpoints() {
        let table = tutorial_table();
        let funding = tutorial_funding();
        assert_eq!(
            table.split(20_000, &funding).unwrap(),
            PayoutSplit {
                ours: 2 * ONE_BTC,
                theirs: 0
            }
        );
        assert_eq!(
            table.split(10_000, &funding).unwrap(),
            PayoutSplit {
                ours: 0,
                theirs: 2 * ONE_BTC
            }
        );
    }

    #[test]
    fn midpoint_interpolates_to_half() {
        let split = tutorial_table().split(15_000, &tutorial_funding()).unwrap();
        assert_eq!(split.ours, ONE_BTC);
        assert_eq!(split.theirs, ONE_BTC);
    }

    #[test]
    fn tutorial_value() {
        let split = tutorial_table().split(15_161, &tutorial_funding()).unwrap();
        assert_eq!(split.ours, 103_220_000);
        assert_eq!(split.theirs, 96_780_000);
    }

    #[test]
    fn clamps_outside_the_table() {
        let table = tutorial_table();
        let funding = tutorial_funding();
        assert_eq!(table.split(0, &funding).unwrap().ours, 0);
        assert_eq!(table.split(u64::MAX, &funding).unwrap().ours, 2 * ONE_BTC);
    }

    #[test]
    fn split_always_sums_to_total() {
        let funding = Funding::new(123_456_789, 987_654_321).unwrap();
        let total = funding.total();
        let table = DivisionTable::new(vec![
            DivisionPoint {
                oracle_value: 100,
                payout: total,
            },
            DivisionPoint {
                oracle_value: 333,
                payout: total / 3,
            },
            DivisionPoint {
                oracle_value: 1_000,
                payout: 7,
            },
        ])
        .unwrap();
        for value in (0..1_200).step_by(7) {
            let split = table.split(value, &funding).unwrap();
            assert_eq!(split.total(), total, "value {value}");
        }
    }

    #[test]
    fn decreasing_segments_floor_towards_lower_point() {
        let table = DivisionTable::new(vec![
            DivisionPoint {
                oracle_value: 0,
                payout: 10,
            },
            DivisionPoint {
                oracle_value: 3,
                payout: 0,
            },
        ])
        .unwrap();
        // 10 - floor(10 * 1 / 3) = 7
        assert_eq!(table.payout_at(1), 7);
        assert_eq!(table.payout_at(2), 4);
    }

    #[test]
    fn rejects_non_monotonic() {
        let err = DivisionTable::new(vec![
            DivisionPoint {
                oracle_value: 1,
                payout: 5,
            },
            DivisionPoint {
                oracle_value: 2,
                payout: 10,
            },
            DivisionPoint {
                oracle_value: 3,
                payout: 1,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidField(_)));
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        assert!(DivisionTable::new(vec![]).is_err());
        assert!(DivisionTable::linear(5, 5, 10).is_err());
    }

    #[test]
    fn bounds_are_checked_against_funding() {
        let table = DivisionTable::linear(20_000, 10_000, 3 * ONE_BTC).unwrap();
        assert!(matches!(
            table.split(15_000, &tutorial_funding()),
            Err(Error::InvalidField(_))
        ));
    }

    #[test]
    fn mirrored_table_complements_payouts() {
        let total = 2 * ONE_BTC;
        let mirrored = tutorial_table().mirrored(total).unwrap();
        let funding = tutorial_funding();
        let ours = tutorial_table().split(15_161, &funding).unwrap();
        let theirs = mirrored.split(15_161, &funding.mirrored()).unwrap();
        assert_eq!(ours.mirrored(), theirs);
    }

    #[test]
    fn serde_validates_on_the_way_in() {
        let json = serde_json::to_string(&tutorial_table()).unwrap();
        let back: DivisionTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tutorial_table());

        let bad = r#"[{"oracle_value":1,"payout":1},{"oracle_value":1,"payout":2}]"#;
        assert!(serde_json::from_str::<DivisionTable>(bad).is_err());
    }
}
