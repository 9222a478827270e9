use std::fmt;

/// Operator context created at login and dropped at logout.
///
/// Every component that talks to the placement service receives the session explicitly;
/// nothing reads department or credential data from process-wide storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    department_id: String,
    token: String,
    display_name: String,
}

impl Session {
    pub fn new(
        department_id: impl Into<String>,
        token: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            department_id: department_id.into(),
            token: token.into(),
            display_name: display_name.into(),
        }
    }

    pub fn department_id(&self) -> &str {
        &self.department_id
    }

    pub fn bearer_token(&self) -> &str {
        &self.token
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("department_id", &self.department_id)
            .field("display_name", &self.display_name)
            .field("token", &"<redacted>")
            .finish()
    }
}
