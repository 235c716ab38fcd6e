//! Trial balance over booked journal entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use agencyhub_core::CurrencyCode;

use crate::account::AccountKind;
use crate::journal::JournalEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub debit: i64,
    pub credit: i64,
    /// Balance in the account kind's normal direction.
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub currency: CurrencyCode,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: i64,
    pub total_credit: i64,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

/// Sum posted and reversed entries in `currency`, one row per account code.
///
/// Drafts are skipped, as are lines in other currencies.
pub fn trial_balance<'a>(
    entries: impl IntoIterator<Item = &'a JournalEntry>,
    currency: CurrencyCode,
) -> TrialBalance {
    let mut rows: BTreeMap<String, TrialBalanceRow> = BTreeMap::new();

    for entry in entries {
        if !entry.status().is_booked() {
            continue;
        }
        for line in entry.lines() {
            if line.amount.currency != currency {
                continue;
            }
            let row = rows
                .entry(line.account.code.clone())
                .or_insert_with(|| TrialBalanceRow {
                    code: line.account.code.clone(),
                    name: line.account.name.clone(),
                    kind: line.account.kind,
                    debit: 0,
                    credit: 0,
                    balance: 0,
                });
            if line.is_debit {
                row.debit = row.debit.saturating_add(line.amount.amount);
            } else {
                row.credit = row.credit.saturating_add(line.amount.amount);
            }
        }
    }

    let mut total_debit = 0i64;
    let mut total_credit = 0i64;
    let rows: Vec<TrialBalanceRow> = rows
        .into_values()
        .map(|mut row| {
            row.balance = row.kind.signed_balance(row.debit, row.credit);
            total_debit = total_debit.saturating_add(row.debit);
            total_credit = total_credit.saturating_add(row.credit);
            row
        })
        .collect();

    TrialBalance {
        currency,
        rows,
        total_debit,
        total_credit,
    }
}
