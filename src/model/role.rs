#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    System = 4,
    ApiUser = 5,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::System),
            5 => Some(Role::ApiUser),
            _ => None,
        }
    }

    /// Roles allowed to read attendance of any employee.
    pub fn can_read_all_attendance(self) -> bool {
        matches!(self, Role::Admin | Role::Hr | Role::System)
    }

    /// Roles allowed to run administrative attendance jobs.
    pub fn can_manage_attendance(self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip_and_reject_unknown() {
        assert_eq!(Role::from_id(1), Some(Role::Admin));
        assert_eq!(Role::from_id(3), Some(Role::Employee));
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(6), None);
    }

    #[test]
    fn only_hr_and_admin_manage_attendance() {
        assert!(Role::Admin.can_manage_attendance());
        assert!(Role::Hr.can_manage_attendance());
        assert!(!Role::System.can_manage_attendance());
        assert!(!Role::Employee.can_manage_attendance());
        assert!(Role::System.can_read_all_attendance());
        assert!(!Role::ApiUser.can_read_all_attendance());
    }
}
