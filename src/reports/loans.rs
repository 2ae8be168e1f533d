//! Hand loan summary

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandLoanSummary {
    pub loan_count: usize,
    pub total_issued: BigDecimal,
    /// Every recovery entry, including any over-recovery
    pub total_recovered: BigDecimal,
    /// Per-loan outstanding floored at zero, then summed
    pub total_pending: BigDecimal,
    pub pending_count: usize,
    pub partially_recovered_count: usize,
    pub recovered_count: usize,
}

/// Summarize loans, trusting recomputed outstanding over the stored status
pub fn hand_loan_summary(loans: &[HandLoan]) -> HandLoanSummary {
    let mut summary = HandLoanSummary::default();
    for loan in loans {
        summary.loan_count += 1;
        summary.total_issued += &loan.amount;
        summary.total_recovered += loan.recovered();
        summary.total_pending += loan.outstanding();

        match loan.derived_status() {
            HandLoanStatus::Pending => summary.pending_count += 1,
            HandLoanStatus::PartiallyRecovered => summary.partially_recovered_count += 1,
            HandLoanStatus::Recovered => summary.recovered_count += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn loan(id: &str, amount: i64, recoveries: &[i64]) -> HandLoan {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut loan = HandLoan::new(
            id.into(),
            "org1".into(),
            "d1".into(),
            BigDecimal::from(amount),
            date,
            None,
        );
        for r in recoveries {
            loan.apply_recovery(BigDecimal::from(*r), date);
        }
        loan
    }

    #[test]
    fn test_over_recovery_does_not_offset_other_loans() {
        let loans = vec![loan("hl1", 2000, &[1500, 1000]), loan("hl2", 3000, &[500])];
        let summary = hand_loan_summary(&loans);

        assert_eq!(summary.total_issued, BigDecimal::from(5000));
        assert_eq!(summary.total_recovered, BigDecimal::from(3000));
        // 0 on the over-recovered loan, 2500 on the other
        assert_eq!(summary.total_pending, BigDecimal::from(2500));
        assert_eq!(summary.recovered_count, 1);
        assert_eq!(summary.partially_recovered_count, 1);
    }

    #[test]
    fn test_drifted_status_is_ignored() {
        let mut drifted = loan("hl1", 1000, &[]);
        drifted.status = HandLoanStatus::Recovered;
        let summary = hand_loan_summary(&[drifted]);
        assert_eq!(summary.total_pending, BigDecimal::from(1000));
        assert_eq!(summary.pending_count, 1);
    }
}
