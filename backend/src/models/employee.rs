use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

/// Directory record for an employee, as far as the attendance and leave
/// engines need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub date_of_joining: time::Date,
    pub face_id: Option<String>,
    pub is_active: bool,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn face_registered(&self) -> bool {
        self.face_id.is_some()
    }
}

/// Subset returned to clients listing team members.
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&Employee> for EmployeeSummary {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id,
            employee_code: e.employee_code.clone(),
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
        }
    }
}
