use serde::{Deserialize, Serialize};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Revenue => "revenue",
            AccountKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asset" => Some(AccountKind::Asset),
            "liability" => Some(AccountKind::Liability),
            "equity" => Some(AccountKind::Equity),
            "revenue" => Some(AccountKind::Revenue),
            "expense" => Some(AccountKind::Expense),
            _ => None,
        }
    }

    /// Assets and expenses grow on the debit side; everything else on credit.
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }

    /// Balance in this kind's normal direction.
    pub fn signed_balance(&self, debit: i64, credit: i64) -> i64 {
        if self.is_debit_normal() {
            debit.saturating_sub(credit)
        } else {
            credit.saturating_sub(debit)
        }
    }
}

/// Account reference carried on journal lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1200"
    pub name: String, // e.g. "Bank Accounts"
    pub kind: AccountKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_sides() {
        assert!(AccountKind::Asset.is_debit_normal());
        assert!(AccountKind::Expense.is_debit_normal());
        assert!(!AccountKind::Revenue.is_debit_normal());
        assert_eq!(AccountKind::Liability.signed_balance(10, 50), 40);
        assert_eq!(AccountKind::Asset.signed_balance(10, 50), -40);
    }
}
