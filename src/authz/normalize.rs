use serde::Deserialize;

/// Canonical form role names are compared in.
///
/// Applied to both the subject's roles and the policy's roles, so `"admin"`,
/// `" Admin "` and `"ADMIN"` are the same role under `Upper` and `Lower`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleNormalization {
    #[default]
    Upper,
    Lower,
    /// Trim only; case-sensitive comparison.
    Exact,
}

impl RoleNormalization {
    pub fn apply(self, role: &str) -> String {
        let role = role.trim();
        match self {
            RoleNormalization::Upper => role.to_uppercase(),
            RoleNormalization::Lower => role.to_lowercase(),
            RoleNormalization::Exact => role.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        assert_eq!(RoleNormalization::Upper.apply(" hr_manager "), "HR_MANAGER");
        assert_eq!(RoleNormalization::Lower.apply("ADMIN"), "admin");
        assert_eq!(RoleNormalization::Exact.apply(" Admin"), "Admin");
    }
}
