use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{AgencyId, Aggregate, AggregateRoot, DomainError, RecordId};
use agencyhub_events::Event;

use crate::employee::EmployeeId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(pub RecordId);

impl DepartmentId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Department.
///
/// Name uniqueness spans all departments of an agency, so it is checked by
/// the caller before `CreateDepartment`/`RenameDepartment` is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    id: DepartmentId,
    agency_id: Option<AgencyId>,
    name: String,
    description: Option<String>,
    manager: Option<EmployeeId>,
    version: u64,
    created: bool,
}

impl Department {
    pub fn empty(id: DepartmentId) -> Self {
        Self {
            id,
            agency_id: None,
            name: String::new(),
            description: None,
            manager: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DepartmentId {
        self.id
    }

    pub fn agency_id(&self) -> Option<AgencyId> {
        self.agency_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn manager(&self) -> Option<EmployeeId> {
        self.manager
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Department {
    type Id = DepartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDepartment {
    pub agency_id: AgencyId,
    pub department_id: DepartmentId,
    pub name: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameDepartment {
    pub agency_id: AgencyId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDepartmentManager {
    pub agency_id: AgencyId,
    pub department_id: DepartmentId,
    pub manager: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartmentCommand {
    Create(CreateDepartment),
    Rename(RenameDepartment),
    SetManager(SetDepartmentManager),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartmentEvent {
    Created(CreateDepartment),
    Renamed {
        name: String,
        occurred_at: DateTime<Utc>,
    },
    ManagerChanged {
        manager: Option<EmployeeId>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for DepartmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepartmentEvent::Created(_) => "hr.department.created",
            DepartmentEvent::Renamed { .. } => "hr.department.renamed",
            DepartmentEvent::ManagerChanged { .. } => "hr.department.manager_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DepartmentEvent::Created(e) => e.occurred_at,
            DepartmentEvent::Renamed { occurred_at, .. }
            | DepartmentEvent::ManagerChanged { occurred_at, .. } => *occurred_at,
        }
    }
}

fn normalise_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("department name is required"));
    }
    Ok(name.to_string())
}

impl Aggregate for Department {
    type Command = DepartmentCommand;
    type Event = DepartmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DepartmentEvent::Created(e) => {
                self.id = e.department_id;
                self.agency_id = Some(e.agency_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.created = true;
            }
            DepartmentEvent::Renamed { name, .. } => self.name = name.clone(),
            DepartmentEvent::ManagerChanged { manager, .. } => self.manager = *manager,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DepartmentCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("department already exists"));
                }
                let mut cmd = cmd.clone();
                cmd.name = normalise_name(&cmd.name)?;
                Ok(vec![DepartmentEvent::Created(cmd)])
            }
            DepartmentCommand::Rename(cmd) => {
                self.ensure_existing(cmd.agency_id, cmd.department_id)?;
                let name = normalise_name(&cmd.name)?;
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![DepartmentEvent::Renamed {
                    name,
                    occurred_at: cmd.occurred_at,
                }])
            }
            DepartmentCommand::SetManager(cmd) => {
                self.ensure_existing(cmd.agency_id, cmd.department_id)?;
                if cmd.manager == self.manager {
                    return Ok(vec![]);
                }
                Ok(vec![DepartmentEvent::ManagerChanged {
                    manager: cmd.manager,
                    occurred_at: cmd.occurred_at,
                }])
            }
        }
    }
}

impl Department {
    fn ensure_existing(&self, agency_id: AgencyId, id: DepartmentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        if self.id != id {
            return Err(DomainError::invariant("department_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(agency: AgencyId) -> Department {
        let id = DepartmentId::new(RecordId::new());
        let mut d = Department::empty(id);
        let cmd = DepartmentCommand::Create(CreateDepartment {
            agency_id: agency,
            department_id: id,
            name: "  Design ".into(),
            description: None,
            occurred_at: Utc::now(),
        });
        d.execute(&cmd).unwrap();
        d
    }

    #[test]
    fn names_are_trimmed_and_required() {
        let agency = AgencyId::new();
        let d = created(agency);
        assert_eq!(d.name(), "Design");

        let err = d
            .handle(&DepartmentCommand::Rename(RenameDepartment {
                agency_id: agency,
                department_id: d.id_typed(),
                name: "   ".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn manager_change_is_idempotent() {
        let agency = AgencyId::new();
        let mut d = created(agency);
        let manager = Some(EmployeeId::new(RecordId::new()));
        let cmd = DepartmentCommand::SetManager(SetDepartmentManager {
            agency_id: agency,
            department_id: d.id_typed(),
            manager,
            occurred_at: Utc::now(),
        });
        d.execute(&cmd).unwrap();
        assert_eq!(d.manager(), manager);
        assert!(d.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn rename_of_missing_department_is_not_found() {
        let id = DepartmentId::new(RecordId::new());
        let err = Department::empty(id)
            .handle(&DepartmentCommand::Rename(RenameDepartment {
                agency_id: AgencyId::new(),
                department_id: id,
                name: "Ops".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
