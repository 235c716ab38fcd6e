use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{
    money::div_round_half_up, AgencyId, Aggregate, AggregateRoot, DomainError, Money, RecordId,
    UserId,
};
use agencyhub_crm::ClientId;
use agencyhub_events::Event;

use crate::task::{Task, TaskId, TaskStatus};

/// Project identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub RecordId);

impl ProjectId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Planning,
        ProjectStatus::InProgress,
        ProjectStatus::OnHold,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Planning, InProgress)
                | (Planning, Cancelled)
                | (InProgress, OnHold)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (OnHold, InProgress)
                | (OnHold, Cancelled)
        )
    }
}

/// Aggregate root: Project (owns its tasks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    id: ProjectId,
    agency_id: Option<AgencyId>,
    name: String,
    description: Option<String>,
    client_id: Option<ClientId>,
    manager: Option<UserId>,
    status: ProjectStatus,
    budget: Option<Money>,
    actual_cost: Option<Money>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    tasks: Vec<Task>,
    version: u64,
    created: bool,
}

impl Project {
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            agency_id: None,
            name: String::new(),
            description: None,
            client_id: None,
            manager: None,
            status: ProjectStatus::Planning,
            budget: None,
            actual_cost: None,
            start_date: None,
            end_date: None,
            tasks: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProjectId {
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

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn manager(&self) -> Option<UserId> {
        self.manager
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn budget(&self) -> Option<Money> {
        self.budget
    }

    pub fn actual_cost(&self) -> Option<Money> {
        self.actual_cost
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Share of non-cancelled tasks that are done, 0..=100 (0 without tasks).
    pub fn progress_percent(&self) -> u8 {
        let counted = self
            .tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Cancelled)
            .count();
        if counted == 0 {
            return 0;
        }
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .count();
        ((done * 100) / counted) as u8
    }

    /// Actual cost as a percentage of budget, rounded half-up.
    /// `None` when the budget is zero.
    pub fn budget_utilisation_percent(&self) -> Option<u32> {
        let budget = self.budget?;
        let cost = self.actual_cost?;
        if budget.amount <= 0 {
            return None;
        }
        let pct = div_round_half_up(cost.amount as i128 * 100, budget.amount as i128);
        u32::try_from(pct).ok()
    }
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub agency_id: AgencyId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<ClientId>,
    pub manager: Option<UserId>,
    pub budget: Money,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProjectStatus {
    pub agency_id: AgencyId,
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTask {
    pub agency_id: AgencyId,
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTaskStatus {
    pub agency_id: AgencyId,
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignTask {
    pub agency_id: AgencyId,
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub assignee: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCost {
    pub agency_id: AgencyId,
    pub project_id: ProjectId,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectCommand {
    Create(CreateProject),
    ChangeStatus(ChangeProjectStatus),
    AddTask(AddTask),
    ChangeTaskStatus(ChangeTaskStatus),
    AssignTask(AssignTask),
    LogCost(LogCost),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectEvent {
    Created(CreateProject),
    StatusChanged {
        from: ProjectStatus,
        to: ProjectStatus,
        occurred_at: DateTime<Utc>,
    },
    TaskAdded {
        task: Task,
        occurred_at: DateTime<Utc>,
    },
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        occurred_at: DateTime<Utc>,
    },
    TaskAssigned {
        task_id: TaskId,
        assignee: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    CostLogged {
        amount: Money,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::Created(_) => "projects.project.created",
            ProjectEvent::StatusChanged { .. } => "projects.project.status_changed",
            ProjectEvent::TaskAdded { .. } => "projects.task.added",
            ProjectEvent::TaskStatusChanged { .. } => "projects.task.status_changed",
            ProjectEvent::TaskAssigned { .. } => "projects.task.assigned",
            ProjectEvent::CostLogged { .. } => "projects.project.cost_logged",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectEvent::Created(e) => e.occurred_at,
            ProjectEvent::StatusChanged { occurred_at, .. }
            | ProjectEvent::TaskAdded { occurred_at, .. }
            | ProjectEvent::TaskStatusChanged { occurred_at, .. }
            | ProjectEvent::TaskAssigned { occurred_at, .. }
            | ProjectEvent::CostLogged { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProjectEvent::Created(e) => {
                self.id = e.project_id;
                self.agency_id = Some(e.agency_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.client_id = e.client_id;
                self.manager = e.manager;
                self.status = ProjectStatus::Planning;
                self.budget = Some(e.budget);
                self.actual_cost = Some(Money::zero(e.budget.currency));
                self.start_date = Some(e.start_date);
                self.end_date = e.end_date;
                self.created = true;
            }
            ProjectEvent::StatusChanged { to, .. } => {
                self.status = *to;
            }
            ProjectEvent::TaskAdded { task, .. } => {
                self.tasks.push(task.clone());
            }
            ProjectEvent::TaskStatusChanged { task_id, to, .. } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == *task_id) {
                    task.status = *to;
                }
            }
            ProjectEvent::TaskAssigned {
                task_id, assignee, ..
            } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == *task_id) {
                    task.assignee = *assignee;
                }
            }
            ProjectEvent::CostLogged { amount, .. } => {
                let current = self.actual_cost.unwrap_or(Money::zero(amount.currency));
                self.actual_cost = current.checked_add(amount).ok().or(Some(current));
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::Create(cmd) => self.handle_create(cmd),
            ProjectCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            ProjectCommand::AddTask(cmd) => self.handle_add_task(cmd),
            ProjectCommand::ChangeTaskStatus(cmd) => self.handle_task_status(cmd),
            ProjectCommand::AssignTask(cmd) => self.handle_assign(cmd),
            ProjectCommand::LogCost(cmd) => self.handle_log_cost(cmd),
        }
    }
}

impl Project {
    fn ensure_existing(&self, agency_id: AgencyId, project_id: ProjectId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        if self.id != project_id {
            return Err(DomainError::invariant("project_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "project is {}",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn existing_task(&self, task_id: TaskId) -> Result<&Task, DomainError> {
        self.task(task_id)
            .ok_or_else(|| DomainError::validation("unknown task"))
    }

    fn handle_create(&self, cmd: &CreateProject) -> Result<Vec<ProjectEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("project already exists"));
        }
        DomainError::require_text("project name", &cmd.name)?;
        if cmd.budget.is_negative() {
            return Err(DomainError::validation("budget cannot be negative"));
        }
        if let Some(end) = cmd.end_date {
            if end < cmd.start_date {
                return Err(DomainError::validation("end date is before start date"));
            }
        }

        Ok(vec![ProjectEvent::Created(cmd.clone())])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeProjectStatus,
    ) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.project_id)?;

        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot move project from {} to {}",
                self.status.as_str(),
                cmd.status.as_str()
            )));
        }
        if cmd.status == ProjectStatus::Completed {
            let open = self.tasks.iter().filter(|t| !t.status.is_closed()).count();
            if open > 0 {
                return Err(DomainError::invariant(format!(
                    "{open} task(s) still open"
                )));
            }
        }

        Ok(vec![ProjectEvent::StatusChanged {
            from: self.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_add_task(&self, cmd: &AddTask) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.project_id)?;
        self.ensure_active()?;

        DomainError::require_text("task title", &cmd.title)?;
        if self.task(cmd.task_id).is_some() {
            return Err(DomainError::conflict("task already exists"));
        }

        Ok(vec![ProjectEvent::TaskAdded {
            task: Task {
                id: cmd.task_id,
                title: cmd.title.clone(),
                description: cmd.description.clone(),
                status: TaskStatus::Todo,
                assignee: cmd.assignee,
                due_date: cmd.due_date,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_task_status(&self, cmd: &ChangeTaskStatus) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.project_id)?;
        self.ensure_active()?;
        let task = self.existing_task(cmd.task_id)?;

        if !task.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot move task from {} to {}",
                task.status.as_str(),
                cmd.status.as_str()
            )));
        }

        Ok(vec![ProjectEvent::TaskStatusChanged {
            task_id: cmd.task_id,
            from: task.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_assign(&self, cmd: &AssignTask) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.project_id)?;
        self.ensure_active()?;
        let task = self.existing_task(cmd.task_id)?;

        if task.assignee == cmd.assignee {
            return Ok(vec![]);
        }

        Ok(vec![ProjectEvent::TaskAssigned {
            task_id: cmd.task_id,
            assignee: cmd.assignee,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_log_cost(&self, cmd: &LogCost) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.project_id)?;
        self.ensure_active()?;

        if cmd.amount.amount <= 0 {
            return Err(DomainError::validation("cost must be positive"));
        }
        if let Some(current) = self.actual_cost {
            // Surfaces currency mismatch and overflow before anything is emitted.
            current.checked_add(&cmd.amount)?;
        }

        Ok(vec![ProjectEvent::CostLogged {
            amount: cmd.amount,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }
}
