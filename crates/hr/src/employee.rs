use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{AgencyId, Aggregate, AggregateRoot, DomainError, Money, RecordId, UserId};
use agencyhub_events::Event;

use crate::department::DepartmentId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub RecordId);

impl EmployeeId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    OnLeave,
    Terminated,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::OnLeave => "on_leave",
            EmployeeStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EmployeeStatus::Active),
            "on_leave" => Some(EmployeeStatus::OnLeave),
            "terminated" => Some(EmployeeStatus::Terminated),
            _ => None,
        }
    }
}

/// Personal and job details that can be edited after hiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub designation: String,
}

impl EmployeeProfile {
    fn validate(&self) -> Result<(), DomainError> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(DomainError::validation("first and last name are required"));
        }
        if !self.email.contains('@') {
            return Err(DomainError::validation("employee email is invalid"));
        }
        DomainError::require_text("designation", &self.designation)?;
        Ok(())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Aggregate root: Employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    id: EmployeeId,
    agency_id: Option<AgencyId>,
    employee_code: String,
    profile: Option<EmployeeProfile>,
    user_id: Option<UserId>,
    department_id: Option<DepartmentId>,
    monthly_salary: Option<Money>,
    status: EmployeeStatus,
    hire_date: Option<NaiveDate>,
    exit_date: Option<NaiveDate>,
    exit_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Employee {
    pub fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            agency_id: None,
            employee_code: String::new(),
            profile: None,
            user_id: None,
            department_id: None,
            monthly_salary: None,
            status: EmployeeStatus::Active,
            hire_date: None,
            exit_date: None,
            exit_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> EmployeeId {
        self.id
    }

    pub fn agency_id(&self) -> Option<AgencyId> {
        self.agency_id
    }

    pub fn employee_code(&self) -> &str {
        &self.employee_code
    }

    pub fn profile(&self) -> Option<&EmployeeProfile> {
        self.profile.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn monthly_salary(&self) -> Option<Money> {
        self.monthly_salary
    }

    pub fn status(&self) -> EmployeeStatus {
        self.status
    }

    pub fn hire_date(&self) -> Option<NaiveDate> {
        self.hire_date
    }

    pub fn exit_date(&self) -> Option<NaiveDate> {
        self.exit_date
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireEmployee {
    pub agency_id: AgencyId,
    pub employee_id: EmployeeId,
    pub employee_code: String,
    pub profile: EmployeeProfile,
    pub user_id: Option<UserId>,
    pub department_id: Option<DepartmentId>,
    pub monthly_salary: Money,
    pub hire_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmployeeProfile {
    pub agency_id: AgencyId,
    pub employee_id: EmployeeId,
    pub profile: EmployeeProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEmployee {
    pub agency_id: AgencyId,
    pub employee_id: EmployeeId,
    pub department_id: Option<DepartmentId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSalary {
    pub agency_id: AgencyId,
    pub employee_id: EmployeeId,
    pub monthly_salary: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEmployeeStatus {
    pub agency_id: AgencyId,
    pub employee_id: EmployeeId,
    pub status: EmployeeStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateEmployee {
    pub agency_id: AgencyId,
    pub employee_id: EmployeeId,
    pub exit_date: NaiveDate,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeCommand {
    Hire(HireEmployee),
    UpdateProfile(UpdateEmployeeProfile),
    Transfer(TransferEmployee),
    ChangeSalary(ChangeSalary),
    SetStatus(SetEmployeeStatus),
    Terminate(TerminateEmployee),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeEvent {
    Hired(HireEmployee),
    ProfileUpdated {
        profile: EmployeeProfile,
        occurred_at: DateTime<Utc>,
    },
    Transferred {
        from: Option<DepartmentId>,
        to: Option<DepartmentId>,
        occurred_at: DateTime<Utc>,
    },
    SalaryChanged {
        from: Money,
        to: Money,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        status: EmployeeStatus,
        occurred_at: DateTime<Utc>,
    },
    Terminated {
        exit_date: NaiveDate,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for EmployeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::Hired(_) => "hr.employee.hired",
            EmployeeEvent::ProfileUpdated { .. } => "hr.employee.profile_updated",
            EmployeeEvent::Transferred { .. } => "hr.employee.transferred",
            EmployeeEvent::SalaryChanged { .. } => "hr.employee.salary_changed",
            EmployeeEvent::StatusChanged { .. } => "hr.employee.status_changed",
            EmployeeEvent::Terminated { .. } => "hr.employee.terminated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::Hired(e) => e.occurred_at,
            EmployeeEvent::ProfileUpdated { occurred_at, .. }
            | EmployeeEvent::Transferred { occurred_at, .. }
            | EmployeeEvent::SalaryChanged { occurred_at, .. }
            | EmployeeEvent::StatusChanged { occurred_at, .. }
            | EmployeeEvent::Terminated { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Employee {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EmployeeEvent::Hired(e) => {
                self.id = e.employee_id;
                self.agency_id = Some(e.agency_id);
                self.employee_code = e.employee_code.clone();
                self.profile = Some(e.profile.clone());
                self.user_id = e.user_id;
                self.department_id = e.department_id;
                self.monthly_salary = Some(e.monthly_salary);
                self.hire_date = Some(e.hire_date);
                self.status = EmployeeStatus::Active;
                self.created = true;
            }
            EmployeeEvent::ProfileUpdated { profile, .. } => {
                self.profile = Some(profile.clone());
            }
            EmployeeEvent::Transferred { to, .. } => self.department_id = *to,
            EmployeeEvent::SalaryChanged { to, .. } => self.monthly_salary = Some(*to),
            EmployeeEvent::StatusChanged { status, .. } => self.status = *status,
            EmployeeEvent::Terminated {
                exit_date, reason, ..
            } => {
                self.status = EmployeeStatus::Terminated;
                self.exit_date = Some(*exit_date);
                self.exit_reason = reason.clone();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EmployeeCommand::Hire(cmd) => self.handle_hire(cmd),
            EmployeeCommand::UpdateProfile(cmd) => {
                self.ensure_employed(cmd.agency_id, cmd.employee_id)?;
                cmd.profile.validate()?;
                if self.profile.as_ref() == Some(&cmd.profile) {
                    return Ok(vec![]);
                }
                Ok(vec![EmployeeEvent::ProfileUpdated {
                    profile: cmd.profile.clone(),
                    occurred_at: cmd.occurred_at,
                }])
            }
            EmployeeCommand::Transfer(cmd) => {
                self.ensure_employed(cmd.agency_id, cmd.employee_id)?;
                if cmd.department_id == self.department_id {
                    return Ok(vec![]);
                }
                Ok(vec![EmployeeEvent::Transferred {
                    from: self.department_id,
                    to: cmd.department_id,
                    occurred_at: cmd.occurred_at,
                }])
            }
            EmployeeCommand::ChangeSalary(cmd) => {
                self.ensure_employed(cmd.agency_id, cmd.employee_id)?;
                let current = self
                    .monthly_salary
                    .ok_or_else(|| DomainError::invariant("employee has no salary"))?;
                if cmd.monthly_salary.amount <= 0 {
                    return Err(DomainError::validation("salary must be positive"));
                }
                if cmd.monthly_salary.currency != current.currency {
                    return Err(DomainError::validation("salary currency cannot change"));
                }
                Ok(vec![EmployeeEvent::SalaryChanged {
                    from: current,
                    to: cmd.monthly_salary,
                    occurred_at: cmd.occurred_at,
                }])
            }
            EmployeeCommand::SetStatus(cmd) => {
                self.ensure_employed(cmd.agency_id, cmd.employee_id)?;
                if cmd.status == EmployeeStatus::Terminated {
                    return Err(DomainError::validation(
                        "use termination to end employment",
                    ));
                }
                if cmd.status == self.status {
                    return Ok(vec![]);
                }
                Ok(vec![EmployeeEvent::StatusChanged {
                    status: cmd.status,
                    occurred_at: cmd.occurred_at,
                }])
            }
            EmployeeCommand::Terminate(cmd) => {
                self.ensure_employed(cmd.agency_id, cmd.employee_id)?;
                if let Some(hired) = self.hire_date {
                    if cmd.exit_date < hired {
                        return Err(DomainError::validation("exit date precedes hire date"));
                    }
                }
                Ok(vec![EmployeeEvent::Terminated {
                    exit_date: cmd.exit_date,
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                }])
            }
        }
    }
}

impl Employee {
    fn ensure_employed(&self, agency_id: AgencyId, id: EmployeeId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        if self.id != id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        if self.status == EmployeeStatus::Terminated {
            return Err(DomainError::invariant("employee has been terminated"));
        }
        Ok(())
    }

    fn handle_hire(&self, cmd: &HireEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("employee already exists"));
        }
        DomainError::require_text("employee code", &cmd.employee_code)?;
        cmd.profile.validate()?;
        if cmd.monthly_salary.amount <= 0 {
            return Err(DomainError::validation("salary must be positive"));
        }
        Ok(vec![EmployeeEvent::Hired(cmd.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyhub_core::CurrencyCode;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn profile() -> EmployeeProfile {
        EmployeeProfile {
            first_name: "Anil".into(),
            last_name: "Kumar".into(),
            email: "anil@agency.test".into(),
            phone: None,
            designation: "Designer".into(),
        }
    }

    fn run(e: &mut Employee, cmd: EmployeeCommand) -> Result<Vec<EmployeeEvent>, DomainError> {
        e.execute(&cmd)
    }

    fn hired(agency: AgencyId) -> Employee {
        let id = EmployeeId::new(RecordId::new());
        let mut e = Employee::empty(id);
        run(
            &mut e,
            EmployeeCommand::Hire(HireEmployee {
                agency_id: agency,
                employee_id: id,
                employee_code: "EMP-001".into(),
                profile: profile(),
                user_id: None,
                department_id: None,
                monthly_salary: Money::new(60_000_00, CurrencyCode::INR),
                hire_date: date(2025, 4, 1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        e
    }

    #[test]
    fn hire_validates_salary_and_profile() {
        let id = EmployeeId::new(RecordId::new());
        let e = Employee::empty(id);
        let mut cmd = HireEmployee {
            agency_id: AgencyId::new(),
            employee_id: id,
            employee_code: "EMP-9".into(),
            profile: profile(),
            user_id: None,
            department_id: None,
            monthly_salary: Money::new(0, CurrencyCode::INR),
            hire_date: date(2025, 1, 1),
            occurred_at: Utc::now(),
        };
        assert!(e.handle(&EmployeeCommand::Hire(cmd.clone())).is_err());

        cmd.monthly_salary = Money::new(1, CurrencyCode::INR);
        cmd.profile.email = "nope".into();
        assert!(e.handle(&EmployeeCommand::Hire(cmd)).is_err());
    }

    #[test]
    fn salary_changes_must_be_positive() {
        let agency = AgencyId::new();
        let mut e = hired(agency);
        let id = e.id_typed();
        let change = |amount| {
            EmployeeCommand::ChangeSalary(ChangeSalary {
                agency_id: agency,
                employee_id: id,
                monthly_salary: Money::new(amount, CurrencyCode::INR),
                occurred_at: Utc::now(),
            })
        };
        assert!(run(&mut e, change(-5)).is_err());
        run(&mut e, change(75_000_00)).unwrap();
        assert_eq!(e.monthly_salary().map(|m| m.amount), Some(75_000_00));
    }

    #[test]
    fn leave_and_return() {
        let agency = AgencyId::new();
        let mut e = hired(agency);
        let id = e.id_typed();
        let set = |status| {
            EmployeeCommand::SetStatus(SetEmployeeStatus {
                agency_id: agency,
                employee_id: id,
                status,
                occurred_at: Utc::now(),
            })
        };
        run(&mut e, set(EmployeeStatus::OnLeave)).unwrap();
        assert_eq!(e.status(), EmployeeStatus::OnLeave);
        run(&mut e, set(EmployeeStatus::Active)).unwrap();
        assert_eq!(e.status(), EmployeeStatus::Active);
        assert!(run(&mut e, set(EmployeeStatus::Terminated)).is_err());
    }

    #[test]
    fn termination_is_final_and_dated_after_hire() {
        let agency = AgencyId::new();
        let mut e = hired(agency);
        let id = e.id_typed();
        let terminate = |exit| {
            EmployeeCommand::Terminate(TerminateEmployee {
                agency_id: agency,
                employee_id: id,
                exit_date: exit,
                reason: Some("resigned".into()),
                occurred_at: Utc::now(),
            })
        };

        assert!(run(&mut e, terminate(date(2025, 3, 31))).is_err());
        run(&mut e, terminate(date(2026, 6, 30))).unwrap();
        assert_eq!(e.status(), EmployeeStatus::Terminated);
        assert_eq!(e.exit_date(), Some(date(2026, 6, 30)));

        let err = run(
            &mut e,
            EmployeeCommand::Transfer(TransferEmployee {
                agency_id: agency,
                employee_id: id,
                department_id: Some(DepartmentId::new(RecordId::new())),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn transfer_records_previous_department() {
        let agency = AgencyId::new();
        let mut e = hired(agency);
        let id = e.id_typed();
        let dept = DepartmentId::new(RecordId::new());
        let events = run(
            &mut e,
            EmployeeCommand::Transfer(TransferEmployee {
                agency_id: agency,
                employee_id: id,
                department_id: Some(dept),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(matches!(
            events.as_slice(),
            [EmployeeEvent::Transferred { from: None, to: Some(_), .. }]
        ));
        assert_eq!(e.department_id(), Some(dept));
    }
}
