use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use agencyhub_auth::Permission;
use agencyhub_core::RecordId;
use agencyhub_hr::{
    ChangeSalary, CreateDepartment, Department, DepartmentCommand, DepartmentId, Employee,
    EmployeeCommand, EmployeeId, EmployeeProfile, HireEmployee, RenameDepartment,
    SetDepartmentManager, SetEmployeeStatus, TerminateEmployee, TransferEmployee,
    UpdateEmployeeProfile,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson};
use crate::app::services::AppServices;
use crate::authz::{self, Guarded};
use crate::context::{AgencyContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/departments", post(create_department).get(list_departments))
        .route("/departments/:id", get(get_department))
        .route("/departments/:id/rename", post(rename_department))
        .route("/departments/:id/manager", post(set_department_manager))
        .route("/employees", post(hire_employee).get(list_employees))
        .route("/employees/:id", get(get_employee).put(update_employee))
        .route("/employees/:id/transfer", post(transfer_employee))
        .route("/employees/:id/salary", post(change_salary))
        .route("/employees/:id/status", post(set_employee_status))
        .route("/employees/:id/terminate", post(terminate_employee))
}

/// Department names are unique per agency, ignoring case.
async fn ensure_department_name_free(
    services: &AppServices,
    agency: &AgencyContext,
    name: &str,
    except: Option<DepartmentId>,
) -> Result<(), ApiError> {
    let wanted = name.trim().to_lowercase();
    let taken = services
        .dispatcher()
        .list::<Department>(agency.agency_id())
        .await?
        .iter()
        .any(|d| Some(d.id_typed()) != except && d.name().to_lowercase() == wanted);
    if taken {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "conflict",
            format!("department '{}' already exists", name.trim()),
        ));
    }
    Ok(())
}

async fn ensure_department_exists(
    services: &AppServices,
    agency: &AgencyContext,
    department_id: Option<DepartmentId>,
) -> Result<(), ApiError> {
    if let Some(id) = department_id {
        services
            .dispatcher()
            .load::<Department>(agency.agency_id(), id.0)
            .await
            .map_err(|_| ApiError::bad_request("unknown_department", "department does not exist"))?;
    }
    Ok(())
}

async fn run_department(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    record_id: RecordId,
    command: DepartmentCommand,
) -> Result<Department, ApiError> {
    let guarded = Guarded::new(command, Permission::HR_WRITE);
    Ok(common::dispatch::<Department>(services, agency, principal, record_id, guarded)
        .await?
        .aggregate)
}

async fn run_employee(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    record_id: RecordId,
    command: EmployeeCommand,
) -> Result<Employee, ApiError> {
    let guarded = Guarded::new(command, Permission::HR_WRITE);
    Ok(common::dispatch::<Employee>(services, agency, principal, record_id, guarded)
        .await?
        .aggregate)
}

pub async fn create_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateDepartmentRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_WRITE)?;
    ensure_department_name_free(&services, &agency, &body.name, None).await?;

    let record_id = RecordId::new();
    let cmd = DepartmentCommand::Create(CreateDepartment {
        agency_id: agency.agency_id(),
        department_id: DepartmentId::new(record_id),
        name: body.name,
        description: body.description,
        occurred_at: Utc::now(),
    });
    let department = run_department(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::created(dto::department_to_json(&department)))
}

pub async fn list_departments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_READ)?;
    let mut departments = services.dispatcher().list::<Department>(agency.agency_id()).await?;
    departments.sort_by(|a, b| a.name().cmp(b.name()));
    let items = departments.iter().map(dto::department_to_json).collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn get_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_READ)?;
    let record_id = common::parse_id(&id, "department")?;
    let department = services
        .dispatcher()
        .load::<Department>(agency.agency_id(), record_id)
        .await?;
    Ok(common::ok(dto::department_to_json(&department)))
}

pub async fn rename_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::RenameDepartmentRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_WRITE)?;
    let record_id = common::parse_id(&id, "department")?;
    let department_id = DepartmentId::new(record_id);
    ensure_department_name_free(&services, &agency, &body.name, Some(department_id)).await?;

    let cmd = DepartmentCommand::Rename(RenameDepartment {
        agency_id: agency.agency_id(),
        department_id,
        name: body.name,
        occurred_at: Utc::now(),
    });
    let department = run_department(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::department_to_json(&department)))
}

pub async fn set_department_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::DepartmentManagerRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_WRITE)?;
    if let Some(manager) = body.manager {
        services
            .dispatcher()
            .load::<Employee>(agency.agency_id(), manager.0)
            .await
            .map_err(|_| ApiError::bad_request("unknown_employee", "manager is not an employee"))?;
    }

    let record_id = common::parse_id(&id, "department")?;
    let cmd = DepartmentCommand::SetManager(SetDepartmentManager {
        agency_id: agency.agency_id(),
        department_id: DepartmentId::new(record_id),
        manager: body.manager,
        occurred_at: Utc::now(),
    });
    let department = run_department(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::department_to_json(&department)))
}

pub async fn hire_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::HireEmployeeRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_WRITE)?;
    ensure_department_exists(&services, &agency, body.department_id).await?;

    let code = body.employee_code.trim().to_string();
    let code_taken = services
        .dispatcher()
        .list::<Employee>(agency.agency_id())
        .await?
        .iter()
        .any(|e| e.employee_code() == code);
    if code_taken {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "conflict",
            format!("employee code '{code}' is already in use"),
        ));
    }

    let record_id = RecordId::new();
    let cmd = EmployeeCommand::Hire(HireEmployee {
        agency_id: agency.agency_id(),
        employee_id: EmployeeId::new(record_id),
        employee_code: code,
        profile: body.profile,
        user_id: body.user_id,
        department_id: body.department_id,
        monthly_salary: body.monthly_salary,
        hire_date: body.hire_date,
        occurred_at: Utc::now(),
    });
    let employee = run_employee(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::created(dto::employee_to_json(&employee)))
}

pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_READ)?;
    let mut employees = services.dispatcher().list::<Employee>(agency.agency_id()).await?;
    employees.sort_by(|a, b| a.employee_code().cmp(b.employee_code()));
    let items = employees.iter().map(dto::employee_to_json).collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_READ)?;
    let record_id = common::parse_id(&id, "employee")?;
    let employee = services
        .dispatcher()
        .load::<Employee>(agency.agency_id(), record_id)
        .await?;
    Ok(common::ok(dto::employee_to_json(&employee)))
}

pub async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(profile): ApiJson<EmployeeProfile>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "employee")?;
    let cmd = EmployeeCommand::UpdateProfile(UpdateEmployeeProfile {
        agency_id: agency.agency_id(),
        employee_id: EmployeeId::new(record_id),
        profile,
        occurred_at: Utc::now(),
    });
    let employee = run_employee(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::employee_to_json(&employee)))
}

pub async fn transfer_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::TransferEmployeeRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::HR_WRITE)?;
    ensure_department_exists(&services, &agency, body.department_id).await?;

    let record_id = common::parse_id(&id, "employee")?;
    let cmd = EmployeeCommand::Transfer(TransferEmployee {
        agency_id: agency.agency_id(),
        employee_id: EmployeeId::new(record_id),
        department_id: body.department_id,
        occurred_at: Utc::now(),
    });
    let employee = run_employee(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::employee_to_json(&employee)))
}

pub async fn change_salary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::SalaryRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "employee")?;
    let cmd = EmployeeCommand::ChangeSalary(ChangeSalary {
        agency_id: agency.agency_id(),
        employee_id: EmployeeId::new(record_id),
        monthly_salary: body.monthly_salary,
        occurred_at: Utc::now(),
    });
    let employee = run_employee(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::employee_to_json(&employee)))
}

pub async fn set_employee_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::EmployeeStatusRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "employee")?;
    let cmd = EmployeeCommand::SetStatus(SetEmployeeStatus {
        agency_id: agency.agency_id(),
        employee_id: EmployeeId::new(record_id),
        status: body.status,
        occurred_at: Utc::now(),
    });
    let employee = run_employee(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::employee_to_json(&employee)))
}

pub async fn terminate_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::TerminateEmployeeRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "employee")?;
    let cmd = EmployeeCommand::Terminate(TerminateEmployee {
        agency_id: agency.agency_id(),
        employee_id: EmployeeId::new(record_id),
        exit_date: body.exit_date,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let employee = run_employee(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::employee_to_json(&employee)))
}
