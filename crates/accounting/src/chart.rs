use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{AgencyId, Aggregate, AggregateRoot, DomainError, RecordId};
use agencyhub_events::Event;

use crate::account::{Account, AccountKind};

/// Chart identifier. Each agency has exactly one chart, see [`ChartId::for_agency`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartId(pub RecordId);

impl ChartId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }

    /// The agency's chart lives under the agency's own id.
    pub fn for_agency(agency_id: AgencyId) -> Self {
        Self(RecordId::from_uuid(*agency_id.as_uuid()))
    }
}

/// An account as it appears in the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartAccount {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub parent_code: Option<String>,
    pub is_active: bool,
}

impl ChartAccount {
    pub fn as_account(&self) -> Account {
        Account {
            code: self.code.clone(),
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

/// Aggregate root: ChartOfAccounts.
///
/// Created implicitly by the first `AddAccount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    id: ChartId,
    agency_id: Option<AgencyId>,
    accounts: BTreeMap<String, ChartAccount>,
    version: u64,
    created: bool,
}

impl ChartOfAccounts {
    pub fn empty(id: ChartId) -> Self {
        Self {
            id,
            agency_id: None,
            accounts: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ChartId {
        self.id
    }

    pub fn agency_id(&self) -> Option<AgencyId> {
        self.agency_id
    }

    pub fn account(&self, code: &str) -> Option<&ChartAccount> {
        self.accounts.get(code)
    }

    /// Accounts ordered by code.
    pub fn accounts(&self) -> impl Iterator<Item = &ChartAccount> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Resolve a code to an account usable on a journal line.
    pub fn resolve(&self, code: &str) -> Result<Account, DomainError> {
        let account = self
            .accounts
            .get(code)
            .ok_or_else(|| DomainError::validation(format!("unknown account {code}")))?;
        if !account.is_active {
            return Err(DomainError::validation(format!("account {code} is inactive")));
        }
        Ok(account.as_account())
    }
}

impl AggregateRoot for ChartOfAccounts {
    type Id = ChartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAccount {
    pub agency_id: AgencyId,
    pub chart_id: ChartId,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub parent_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateAccount {
    pub agency_id: AgencyId,
    pub chart_id: ChartId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartCommand {
    AddAccount(AddAccount),
    DeactivateAccount(DeactivateAccount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartEvent {
    AccountAdded(AddAccount),
    AccountDeactivated(DeactivateAccount),
}

impl Event for ChartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChartEvent::AccountAdded(_) => "accounting.chart.account_added",
            ChartEvent::AccountDeactivated(_) => "accounting.chart.account_deactivated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ChartEvent::AccountAdded(e) => e.occurred_at,
            ChartEvent::AccountDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ChartOfAccounts {
    type Command = ChartCommand;
    type Event = ChartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ChartEvent::AccountAdded(e) => {
                self.id = e.chart_id;
                if self.agency_id.is_none() {
                    self.agency_id = Some(e.agency_id);
                    self.created = true;
                }
                self.accounts.insert(
                    e.code.clone(),
                    ChartAccount {
                        code: e.code.clone(),
                        name: e.name.clone(),
                        kind: e.kind,
                        parent_code: e.parent_code.clone(),
                        is_active: true,
                    },
                );
            }
            ChartEvent::AccountDeactivated(e) => {
                if let Some(account) = self.accounts.get_mut(&e.code) {
                    account.is_active = false;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ChartCommand::AddAccount(cmd) => self.handle_add(cmd),
            ChartCommand::DeactivateAccount(cmd) => self.handle_deactivate(cmd),
        }
    }
}

fn validate_code(code: &str) -> Result<(), DomainError> {
    let ok = !code.is_empty()
        && code.len() <= 20
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !ok {
        return Err(DomainError::validation(format!(
            "account code '{code}' must be 1-20 letters, digits, '-' or '.'"
        )));
    }
    Ok(())
}

impl ChartOfAccounts {
    fn ensure_agency(&self, agency_id: AgencyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        Ok(())
    }

    fn handle_add(&self, cmd: &AddAccount) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_agency(cmd.agency_id)?;
        validate_code(&cmd.code)?;

        DomainError::require_text("account name", &cmd.name)?;
        if self.accounts.contains_key(&cmd.code) {
            return Err(DomainError::conflict(format!(
                "account {} already exists",
                cmd.code
            )));
        }
        if let Some(parent_code) = &cmd.parent_code {
            let parent = self.accounts.get(parent_code).ok_or_else(|| {
                DomainError::validation(format!("parent account {parent_code} does not exist"))
            })?;
            if parent.kind != cmd.kind {
                return Err(DomainError::invariant(format!(
                    "parent account {parent_code} is {}, not {}",
                    parent.kind.as_str(),
                    cmd.kind.as_str()
                )));
            }
        }

        Ok(vec![ChartEvent::AccountAdded(cmd.clone())])
    }

    fn handle_deactivate(&self, cmd: &DeactivateAccount) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_agency(cmd.agency_id)?;
        let account = self.accounts.get(&cmd.code).ok_or_else(DomainError::not_found)?;
        if !account.is_active {
            return Ok(vec![]);
        }
        Ok(vec![ChartEvent::AccountDeactivated(cmd.clone())])
    }
}

/// A conventional chart for an Indian services business, parents first.
pub fn seed_default_accounts() -> Vec<ChartAccount> {
    use AccountKind::*;

    const SEED: &[(&str, &str, AccountKind, Option<&str>)] = &[
        ("1000", "Assets", Asset, None),
        ("1100", "Cash in Hand", Asset, Some("1000")),
        ("1200", "Bank Accounts", Asset, Some("1000")),
        ("1300", "Accounts Receivable", Asset, Some("1000")),
        ("1400", "GST Input Credit", Asset, Some("1000")),
        ("1410", "CGST Input", Asset, Some("1400")),
        ("1420", "SGST Input", Asset, Some("1400")),
        ("1430", "IGST Input", Asset, Some("1400")),
        ("1500", "Fixed Assets", Asset, Some("1000")),
        ("2000", "Liabilities", Liability, None),
        ("2100", "Accounts Payable", Liability, Some("2000")),
        ("2200", "GST Output Liability", Liability, Some("2000")),
        ("2210", "CGST Output", Liability, Some("2200")),
        ("2220", "SGST Output", Liability, Some("2200")),
        ("2230", "IGST Output", Liability, Some("2200")),
        ("2300", "TDS Payable", Liability, Some("2000")),
        ("2400", "Salaries Payable", Liability, Some("2000")),
        ("3000", "Equity", Equity, None),
        ("3100", "Owner's Capital", Equity, Some("3000")),
        ("3200", "Retained Earnings", Equity, Some("3000")),
        ("4000", "Revenue", Revenue, None),
        ("4100", "Service Revenue", Revenue, Some("4000")),
        ("4200", "Other Income", Revenue, Some("4000")),
        ("5000", "Expenses", Expense, None),
        ("5100", "Salaries and Wages", Expense, Some("5000")),
        ("5200", "Rent", Expense, Some("5000")),
        ("5300", "Software Subscriptions", Expense, Some("5000")),
        ("5400", "Marketing", Expense, Some("5000")),
        ("5500", "Office Expenses", Expense, Some("5000")),
        ("5600", "Professional Fees", Expense, Some("5000")),
        ("5700", "Bank Charges", Expense, Some("5000")),
    ];

    SEED.iter()
        .map(|(code, name, kind, parent)| ChartAccount {
            code: (*code).to_string(),
            name: (*name).to_string(),
            kind: *kind,
            parent_code: parent.map(str::to_string),
            is_active: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(chart: &mut ChartOfAccounts, agency: AgencyId, code: &str, kind: AccountKind, parent: Option<&str>) -> Result<(), DomainError> {
        let cmd = ChartCommand::AddAccount(AddAccount {
            agency_id: agency,
            chart_id: chart.id_typed(),
            code: code.to_string(),
            name: format!("Account {code}"),
            kind,
            parent_code: parent.map(str::to_string),
            occurred_at: Utc::now(),
        });
        chart.execute(&cmd)?;
        Ok(())
    }

    #[test]
    fn codes_are_unique() {
        let agency = AgencyId::new();
        let mut chart = ChartOfAccounts::empty(ChartId::for_agency(agency));
        add(&mut chart, agency, "1000", AccountKind::Asset, None).unwrap();
        let err = add(&mut chart, agency, "1000", AccountKind::Asset, None).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn parent_must_exist_and_share_kind() {
        let agency = AgencyId::new();
        let mut chart = ChartOfAccounts::empty(ChartId::for_agency(agency));
        assert!(add(&mut chart, agency, "1100", AccountKind::Asset, Some("1000")).is_err());

        add(&mut chart, agency, "1000", AccountKind::Asset, None).unwrap();
        let err = add(&mut chart, agency, "2100", AccountKind::Liability, Some("1000")).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        add(&mut chart, agency, "1100", AccountKind::Asset, Some("1000")).unwrap();
    }

    #[test]
    fn inactive_accounts_do_not_resolve() {
        let agency = AgencyId::new();
        let mut chart = ChartOfAccounts::empty(ChartId::for_agency(agency));
        add(&mut chart, agency, "5200", AccountKind::Expense, None).unwrap();
        assert_eq!(chart.resolve("5200").unwrap().kind, AccountKind::Expense);

        let cmd = ChartCommand::DeactivateAccount(DeactivateAccount {
            agency_id: agency,
            chart_id: chart.id_typed(),
            code: "5200".into(),
            occurred_at: Utc::now(),
        });
        chart.execute(&cmd).unwrap();
        assert!(chart.resolve("5200").is_err());
        assert!(chart.resolve("9999").is_err());
        assert!(chart.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn default_seed_is_self_consistent() {
        let agency = AgencyId::new();
        let mut chart = ChartOfAccounts::empty(ChartId::for_agency(agency));
        for account in seed_default_accounts() {
            add(
                &mut chart,
                agency,
                &account.code,
                account.kind,
                account.parent_code.as_deref(),
            )
            .unwrap();
        }
        assert_eq!(chart.len(), seed_default_accounts().len());
        assert_eq!(chart.resolve("2210").unwrap().kind, AccountKind::Liability);
        assert_eq!(chart.resolve("1430").unwrap().kind, AccountKind::Asset);
    }

    #[test]
    fn chart_is_bound_to_its_agency() {
        let agency = AgencyId::new();
        let mut chart = ChartOfAccounts::empty(ChartId::for_agency(agency));
        add(&mut chart, agency, "1000", AccountKind::Asset, None).unwrap();
        assert!(add(&mut chart, AgencyId::new(), "1001", AccountKind::Asset, None).is_err());
    }
}
