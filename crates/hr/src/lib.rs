//! HR module: departments and employee records.

pub mod department;
pub mod employee;

pub use department::{
    CreateDepartment, Department, DepartmentCommand, DepartmentEvent, DepartmentId,
    RenameDepartment, SetDepartmentManager,
};
pub use employee::{
    ChangeSalary, Employee, EmployeeCommand, EmployeeEvent, EmployeeId, EmployeeProfile,
    EmployeeStatus, HireEmployee, SetEmployeeStatus, TerminateEmployee, TransferEmployee,
    UpdateEmployeeProfile,
};
