use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{AgencyId, Aggregate, AggregateRoot, CurrencyCode, DomainError, Money, RecordId};
use agencyhub_events::Event;

use crate::account::Account;

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: Account,
    /// Positive amount in minor units.
    pub amount: Money,
    /// true = debit, false = credit.
    pub is_debit: bool,
    pub memo: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalEntryId(pub RecordId);

impl JournalEntryId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for JournalEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Draft,
    Posted,
    Reversed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Draft => "draft",
            JournalStatus::Posted => "posted",
            JournalStatus::Reversed => "reversed",
        }
    }

    /// Posted and reversed entries both affect balances.
    pub fn is_booked(&self) -> bool {
        !matches!(self, JournalStatus::Draft)
    }
}

/// Aggregate root: JournalEntry (double-entry voucher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    id: JournalEntryId,
    agency_id: Option<AgencyId>,
    number: String,
    date: Option<NaiveDate>,
    narration: Option<String>,
    lines: Vec<JournalLine>,
    status: JournalStatus,
    reversal_of: Option<JournalEntryId>,
    reversed_by: Option<JournalEntryId>,
    posted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl JournalEntry {
    /// Empty aggregate for rehydration.
    pub fn empty(id: JournalEntryId) -> Self {
        Self {
            id,
            agency_id: None,
            number: String::new(),
            date: None,
            narration: None,
            lines: Vec::new(),
            status: JournalStatus::Draft,
            reversal_of: None,
            reversed_by: None,
            posted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> JournalEntryId {
        self.id
    }

    pub fn agency_id(&self) -> Option<AgencyId> {
        self.agency_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn narration(&self) -> Option<&str> {
        self.narration.as_deref()
    }

    pub fn lines(&self) -> &[JournalLine] {
        &self.lines
    }

    pub fn status(&self) -> JournalStatus {
        self.status
    }

    pub fn reversal_of(&self) -> Option<JournalEntryId> {
        self.reversal_of
    }

    pub fn reversed_by(&self) -> Option<JournalEntryId> {
        self.reversed_by
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Currency of the entry (taken from the first line).
    pub fn currency(&self) -> Option<CurrencyCode> {
        self.lines.first().map(|l| l.amount.currency)
    }

    pub fn total_debit(&self) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.is_debit)
            .map(|l| l.amount.amount)
            .fold(0i64, i64::saturating_add)
    }

    /// Draft for the mirrored entry that cancels this one.
    pub fn reversal_draft(
        &self,
        reversal_id: JournalEntryId,
        number: impl Into<String>,
        date: NaiveDate,
        reason: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<DraftJournalEntry, DomainError> {
        let agency_id = self.agency_id.ok_or_else(DomainError::not_found)?;
        Ok(DraftJournalEntry {
            agency_id,
            entry_id: reversal_id,
            number: number.into(),
            date,
            narration: Some(format!("Reversal of {}: {}", self.number, reason)),
            lines: self
                .lines
                .iter()
                .map(|l| JournalLine {
                    is_debit: !l.is_debit,
                    ..l.clone()
                })
                .collect(),
            reversal_of: Some(self.id),
            occurred_at,
        })
    }
}

impl AggregateRoot for JournalEntry {
    type Id = JournalEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: record a draft voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftJournalEntry {
    pub agency_id: AgencyId,
    pub entry_id: JournalEntryId,
    pub number: String,
    pub date: NaiveDate,
    pub narration: Option<String>,
    pub lines: Vec<JournalLine>,
    pub reversal_of: Option<JournalEntryId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub agency_id: AgencyId,
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: mark a posted entry as reversed by `reversal_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseJournalEntry {
    pub agency_id: AgencyId,
    pub entry_id: JournalEntryId,
    pub reversal_id: JournalEntryId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    Draft(DraftJournalEntry),
    Post(PostJournalEntry),
    Reverse(ReverseJournalEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    Drafted(DraftJournalEntry),
    Posted(PostJournalEntry),
    Reversed(ReverseJournalEntry),
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::Drafted(_) => "accounting.journal.drafted",
            JournalEvent::Posted(_) => "accounting.journal.posted",
            JournalEvent::Reversed(_) => "accounting.journal.reversed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::Drafted(e) => e.occurred_at,
            JournalEvent::Posted(e) => e.occurred_at,
            JournalEvent::Reversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::Drafted(e) => {
                self.id = e.entry_id;
                self.agency_id = Some(e.agency_id);
                self.number = e.number.clone();
                self.date = Some(e.date);
                self.narration = e.narration.clone();
                self.lines = e.lines.clone();
                self.reversal_of = e.reversal_of;
                self.status = JournalStatus::Draft;
                self.created = true;
            }
            JournalEvent::Posted(e) => {
                self.status = JournalStatus::Posted;
                self.posted_at = Some(e.occurred_at);
            }
            JournalEvent::Reversed(e) => {
                self.status = JournalStatus::Reversed;
                self.reversed_by = Some(e.reversal_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::Draft(cmd) => self.handle_draft(cmd),
            JournalCommand::Post(cmd) => self.handle_post(cmd),
            JournalCommand::Reverse(cmd) => self.handle_reverse(cmd),
        }
    }
}

/// Checks every posted voucher must pass.
fn validate_postable(lines: &[JournalLine]) -> Result<(), DomainError> {
    if lines.len() < 2 {
        return Err(DomainError::validation(
            "journal entry needs at least two lines",
        ));
    }

    let currency = lines[0].amount.currency;
    let mut debit_total: i128 = 0;
    let mut credit_total: i128 = 0;

    for line in lines {
        if line.amount.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if line.amount.currency != currency {
            return Err(DomainError::validation(
                "all lines of an entry must share one currency",
            ));
        }
        if line.is_debit {
            debit_total += line.amount.amount as i128;
        } else {
            credit_total += line.amount.amount as i128;
        }
    }

    if debit_total != credit_total {
        return Err(DomainError::invariant("debits must equal credits"));
    }
    Ok(())
}

impl JournalEntry {
    fn ensure_existing(&self, agency_id: AgencyId, id: JournalEntryId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        if self.id != id {
            return Err(DomainError::invariant("entry_id mismatch"));
        }
        Ok(())
    }

    fn handle_draft(&self, cmd: &DraftJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("journal entry already exists"));
        }
        DomainError::require_text("voucher number", &cmd.number)?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }
        if cmd.lines.iter().any(|l| l.amount.amount <= 0) {
            return Err(DomainError::validation("amount must be positive"));
        }

        Ok(vec![JournalEvent::Drafted(cmd.clone())])
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.entry_id)?;
        if self.status != JournalStatus::Draft {
            return Err(DomainError::invariant(format!(
                "entry is already {}",
                self.status.as_str()
            )));
        }
        validate_postable(&self.lines)?;

        Ok(vec![JournalEvent::Posted(cmd.clone())])
    }

    fn handle_reverse(&self, cmd: &ReverseJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.entry_id)?;
        match self.status {
            JournalStatus::Posted => {}
            JournalStatus::Draft => {
                return Err(DomainError::invariant("only posted entries can be reversed"));
            }
            JournalStatus::Reversed => {
                return Err(DomainError::conflict("entry has already been reversed"));
            }
        }
        DomainError::require_text("reversal reason", &cmd.reason)?;
        if cmd.reversal_id == self.id {
            return Err(DomainError::validation("an entry cannot reverse itself"));
        }

        Ok(vec![JournalEvent::Reversed(cmd.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKind;
    use proptest::prelude::*;

    fn account(code: &str, kind: AccountKind) -> Account {
        Account {
            code: code.to_string(),
            name: code.to_string(),
            kind,
        }
    }

    fn line(code: &str, kind: AccountKind, amount: i64, is_debit: bool) -> JournalLine {
        JournalLine {
            account: account(code, kind),
            amount: Money::new(amount, CurrencyCode::INR),
            is_debit,
            memo: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
    }

    fn run(entry: &mut JournalEntry, cmd: JournalCommand) -> Result<Vec<JournalEvent>, DomainError> {
        entry.execute(&cmd)
    }

    fn drafted(agency: AgencyId, lines: Vec<JournalLine>) -> JournalEntry {
        let id = JournalEntryId::new(RecordId::new());
        let mut entry = JournalEntry::empty(id);
        run(
            &mut entry,
            JournalCommand::Draft(DraftJournalEntry {
                agency_id: agency,
                entry_id: id,
                number: "JV-0001".into(),
                date: date(),
                narration: Some("Office rent".into()),
                lines,
                reversal_of: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        entry
    }

    fn post(entry: &mut JournalEntry, agency: AgencyId) -> Result<Vec<JournalEvent>, DomainError> {
        let id = entry.id_typed();
        run(
            entry,
            JournalCommand::Post(PostJournalEntry {
                agency_id: agency,
                entry_id: id,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn balanced_entry_posts() {
        let agency = AgencyId::new();
        let mut entry = drafted(
            agency,
            vec![
                line("5200", AccountKind::Expense, 25_000_00, true),
                line("1200", AccountKind::Asset, 25_000_00, false),
            ],
        );
        post(&mut entry, agency).unwrap();
        assert_eq!(entry.status(), JournalStatus::Posted);
        assert!(entry.posted_at().is_some());
        assert_eq!(entry.total_debit(), 25_000_00);
        assert_eq!(entry.version(), 2);
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let agency = AgencyId::new();
        let mut entry = drafted(
            agency,
            vec![
                line("1000", AccountKind::Asset, 100, true),
                line("2000", AccountKind::Liability, 90, false),
            ],
        );
        let err = post(&mut entry, agency).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits") => {}
            other => panic!("expected invariant violation, got {other:?}"),
        }
        assert_eq!(entry.status(), JournalStatus::Draft);
    }

    #[test]
    fn single_line_and_mixed_currency_are_rejected() {
        let agency = AgencyId::new();
        let mut single = drafted(agency, vec![line("1000", AccountKind::Asset, 100, true)]);
        assert!(post(&mut single, agency).is_err());

        let mut usd = line("2000", AccountKind::Liability, 100, false);
        usd.amount = Money::new(100, CurrencyCode::USD);
        let mut mixed = drafted(agency, vec![line("1000", AccountKind::Asset, 100, true), usd]);
        assert!(matches!(post(&mut mixed, agency), Err(DomainError::Validation(_))));
    }

    #[test]
    fn posted_entry_is_immutable_and_reversible_once() {
        let agency = AgencyId::new();
        let mut entry = drafted(
            agency,
            vec![
                line("1300", AccountKind::Asset, 500, true),
                line("4100", AccountKind::Revenue, 500, false),
            ],
        );
        let id = entry.id_typed();
        let reverse = |reversal: JournalEntryId| {
            JournalCommand::Reverse(ReverseJournalEntry {
                agency_id: agency,
                entry_id: id,
                reversal_id: reversal,
                reason: "duplicate".into(),
                occurred_at: Utc::now(),
            })
        };

        let early = run(&mut entry, reverse(JournalEntryId::new(RecordId::new())));
        assert!(matches!(early, Err(DomainError::InvariantViolation(_))));

        post(&mut entry, agency).unwrap();
        assert!(post(&mut entry, agency).is_err());

        let reversal_id = JournalEntryId::new(RecordId::new());
        run(&mut entry, reverse(reversal_id)).unwrap();
        assert_eq!(entry.status(), JournalStatus::Reversed);
        assert_eq!(entry.reversed_by(), Some(reversal_id));

        let again = run(&mut entry, reverse(JournalEntryId::new(RecordId::new())));
        assert!(matches!(again, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn reversal_draft_mirrors_lines() {
        let agency = AgencyId::new();
        let entry = drafted(
            agency,
            vec![
                line("5100", AccountKind::Expense, 900, true),
                line("2400", AccountKind::Liability, 900, false),
            ],
        );
        let reversal_id = JournalEntryId::new(RecordId::new());
        let draft = entry
            .reversal_draft(reversal_id, "JV-0002", date(), "wrong month", Utc::now())
            .unwrap();

        assert_eq!(draft.reversal_of, Some(entry.id_typed()));
        assert_eq!(draft.lines.len(), 2);
        assert!(!draft.lines[0].is_debit);
        assert!(draft.lines[1].is_debit);
        assert!(validate_postable(&draft.lines).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: splitting a debit across many credit lines always posts,
        /// and dropping any one credit line always fails.
        #[test]
        fn postability_tracks_balance(
            credits in prop::collection::vec(1i64..1_000_000i64, 1..10)
        ) {
            let agency = AgencyId::new();
            let total: i64 = credits.iter().sum();
            let mut lines = vec![line("1200", AccountKind::Asset, total, true)];
            lines.extend(credits.iter().map(|c| line("4100", AccountKind::Revenue, *c, false)));

            prop_assert!(validate_postable(&lines).is_ok());

            let mut entry = drafted(agency, lines.clone());
            prop_assert!(post(&mut entry, agency).is_ok());

            lines.pop();
            if lines.len() >= 2 {
                prop_assert!(validate_postable(&lines).is_err());
            }
        }
    }
}
