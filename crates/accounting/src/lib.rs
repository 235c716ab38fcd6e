//! Accounting module: chart of accounts, double-entry journal, trial balance.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod chart;
pub mod journal;
pub mod trial_balance;

pub use account::{Account, AccountKind};
pub use chart::{
    seed_default_accounts, AddAccount, ChartAccount, ChartCommand, ChartEvent, ChartId,
    ChartOfAccounts, DeactivateAccount,
};
pub use journal::{
    DraftJournalEntry, JournalCommand, JournalEntry, JournalEntryId, JournalEvent, JournalLine,
    JournalStatus, PostJournalEntry, ReverseJournalEntry,
};
pub use trial_balance::{trial_balance, TrialBalance, TrialBalanceRow};
