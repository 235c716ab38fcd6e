use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use agencyhub_auth::Permission;
use agencyhub_core::{Money, RecordId};
use agencyhub_projects::{
    AddTask, AssignTask, ChangeProjectStatus, ChangeTaskStatus, CreateProject, LogCost, Project,
    ProjectCommand, ProjectId, TaskId,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson};
use crate::app::routes::crm::load_client;
use crate::app::services::AppServices;
use crate::authz::{self, Guarded};
use crate::context::{AgencyContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_project).get(list_projects))
        .route("/:id", get(get_project))
        .route("/:id/status", post(change_project_status))
        .route("/:id/tasks", post(add_task))
        .route("/:id/tasks/:task_id/status", post(change_task_status))
        .route("/:id/tasks/:task_id/assign", post(assign_task))
        .route("/:id/costs", post(log_cost))
}

fn write(command: ProjectCommand) -> Guarded<ProjectCommand> {
    Guarded::new(command, Permission::PROJECTS_WRITE)
}

async fn run(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    record_id: RecordId,
    command: ProjectCommand,
) -> Result<Project, ApiError> {
    let done = common::dispatch::<Project>(services, agency, principal, record_id, write(command)).await?;
    Ok(done.aggregate)
}

pub async fn create_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateProjectRequest>,
) -> Result<Response, ApiError> {
    if let Some(client_id) = body.client_id {
        if load_client(&services, &agency, client_id.0).await?.is_none() {
            return Err(ApiError::bad_request("unknown_client", "client does not exist"));
        }
    }

    let record_id = RecordId::new();
    let cmd = ProjectCommand::Create(CreateProject {
        agency_id: agency.agency_id(),
        project_id: ProjectId::new(record_id),
        name: body.name,
        description: body.description,
        client_id: body.client_id,
        manager: body.manager,
        budget: body
            .budget
            .unwrap_or_else(|| Money::zero(services.currency().base())),
        start_date: body.start_date,
        end_date: body.end_date,
        occurred_at: Utc::now(),
    });

    let project = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::created(dto::project_to_json(&project)))
}

pub async fn list_projects(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::PROJECTS_READ)?;
    let mut projects = services.dispatcher().list::<Project>(agency.agency_id()).await?;
    projects.sort_by(|a, b| a.start_date().cmp(&b.start_date()).then_with(|| a.name().cmp(b.name())));
    let items = projects.iter().map(dto::project_to_json).collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn get_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::PROJECTS_READ)?;
    let record_id = common::parse_id(&id, "project")?;
    let project = services
        .dispatcher()
        .load::<Project>(agency.agency_id(), record_id)
        .await?;
    Ok(common::ok(dto::project_to_json(&project)))
}

pub async fn change_project_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ProjectStatusRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "project")?;
    let cmd = ProjectCommand::ChangeStatus(ChangeProjectStatus {
        agency_id: agency.agency_id(),
        project_id: ProjectId::new(record_id),
        status: body.status,
        occurred_at: Utc::now(),
    });
    let project = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::project_to_json(&project)))
}

pub async fn add_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::AddTaskRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "project")?;
    let task_id = TaskId::new(RecordId::new());
    let cmd = ProjectCommand::AddTask(AddTask {
        agency_id: agency.agency_id(),
        project_id: ProjectId::new(record_id),
        task_id,
        title: body.title,
        description: body.description,
        assignee: body.assignee,
        due_date: body.due_date,
        occurred_at: Utc::now(),
    });
    let project = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::created(json!({
        "task_id": task_id.to_string(),
        "project": dto::project_to_json(&project),
    })))
}

pub async fn change_task_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, task_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<dto::TaskStatusRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "project")?;
    let cmd = ProjectCommand::ChangeTaskStatus(ChangeTaskStatus {
        agency_id: agency.agency_id(),
        project_id: ProjectId::new(record_id),
        task_id: TaskId::new(common::parse_id(&task_id, "task")?),
        status: body.status,
        occurred_at: Utc::now(),
    });
    let project = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::project_to_json(&project)))
}

pub async fn assign_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, task_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<dto::AssignTaskRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "project")?;
    let cmd = ProjectCommand::AssignTask(AssignTask {
        agency_id: agency.agency_id(),
        project_id: ProjectId::new(record_id),
        task_id: TaskId::new(common::parse_id(&task_id, "task")?),
        assignee: body.assignee,
        occurred_at: Utc::now(),
    });
    let project = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::project_to_json(&project)))
}

pub async fn log_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::LogCostRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "project")?;
    let cmd = ProjectCommand::LogCost(LogCost {
        agency_id: agency.agency_id(),
        project_id: ProjectId::new(record_id),
        amount: body.amount,
        note: body.note,
        occurred_at: Utc::now(),
    });
    let project = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::project_to_json(&project)))
}
