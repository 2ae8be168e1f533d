//! Receivable aging

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AgingConfig;
use crate::reports::billable;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingBucket {
    Current,
    Middle,
    Overdue,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 3] = [AgingBucket::Current, AgingBucket::Middle, AgingBucket::Overdue];

    /// Bucket for a receivable of the given age; future-dated trips count as current
    pub fn for_age(days: i64, config: &AgingConfig) -> Self {
        if days <= config.current_max_days {
            AgingBucket::Current
        } else if days <= config.middle_max_days {
            AgingBucket::Middle
        } else {
            AgingBucket::Overdue
        }
    }

    /// Display label such as `0-30`, `31-45` or `45+`
    pub fn label(&self, config: &AgingConfig) -> String {
        match self {
            AgingBucket::Current => format!("0-{}", config.current_max_days),
            AgingBucket::Middle => format!(
                "{}-{}",
                config.current_max_days + 1,
                config.middle_max_days
            ),
            AgingBucket::Overdue => format!("{}+", config.middle_max_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingEntry {
    pub trip_id: String,
    pub consignor_id: Option<String>,
    pub consignor_name: Option<String>,
    pub trip_date: NaiveDate,
    pub age_days: i64,
    pub balance_receivable: BigDecimal,
    pub bucket: AgingBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingBucketTotal {
    pub bucket: AgingBucket,
    pub label: String,
    pub trip_count: usize,
    pub amount: BigDecimal,
}

/// Receivables bucketed by age as of one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub buckets: Vec<AgingBucketTotal>,
    pub entries: Vec<AgingEntry>,
    pub total: BigDecimal,
}

impl AgingReport {
    pub fn bucket(&self, bucket: AgingBucket) -> Option<&AgingBucketTotal> {
        self.buckets.iter().find(|b| b.bucket == bucket)
    }
}

/// Bucket every trip still owing money by its age at `as_of`.
///
/// Nothing is persisted: a trip moves between buckets purely because
/// `as_of` moves.
pub fn aging_report(trips: &[Trip], as_of: NaiveDate, config: &AgingConfig) -> AgingReport {
    let zero = BigDecimal::from(0);

    let entries: Vec<AgingEntry> = billable(trips)
        .filter(|t| t.balances.balance_receivable > zero)
        .map(|t| {
            let age_days = (as_of - t.trip_date).num_days();
            AgingEntry {
                trip_id: t.id.clone(),
                consignor_id: t.consignor_id.clone(),
                consignor_name: t.consignor_name.clone(),
                trip_date: t.trip_date,
                age_days,
                balance_receivable: t.balances.balance_receivable.clone(),
                bucket: AgingBucket::for_age(age_days, config),
            }
        })
        .collect();

    let buckets = AgingBucket::ALL
        .iter()
        .map(|bucket| {
            let members = entries.iter().filter(|e| e.bucket == *bucket);
            AgingBucketTotal {
                bucket: *bucket,
                label: bucket.label(config),
                trip_count: members.clone().count(),
                amount: members.map(|e| &e.balance_receivable).sum(),
            }
        })
        .collect();

    let total = entries.iter().map(|e| &e.balance_receivable).sum();

    AgingReport {
        as_of,
        buckets,
        entries,
        total,
    }
}
