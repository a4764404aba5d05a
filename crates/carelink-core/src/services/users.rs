use tracing::info;

use super::require_role;
use crate::api::{ApiClient, ApiError};
use crate::auth::Role;
use crate::models::{RoleAssignment, RoleInfo, User};

const USERS_PATH: &str = "/users";
const ROLES_PATH: &str = "/roles";

/// User and role administration.
#[derive(Clone)]
pub struct UserService {
    api: ApiClient,
}

impl UserService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        require_role(self.api.session(), Role::Admin)?;
        self.api.get(USERS_PATH).await
    }

    /// Doctors may look up individual patients.
    pub async fn get_user(&self, user_id: i64) -> Result<User, ApiError> {
        require_role(self.api.session(), Role::Doctor)?;
        self.api.get(&format!("{}/{}", USERS_PATH, user_id)).await
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleInfo>, ApiError> {
        require_role(self.api.session(), Role::Admin)?;
        self.api.get(ROLES_PATH).await
    }

    /// Change a user's role. Nobody can grant a role above their own.
    pub async fn assign_role(&self, user_id: i64, role: Role) -> Result<User, ApiError> {
        let own = require_role(self.api.session(), Role::Admin)?;
        if !own.has_access(role) {
            return Err(ApiError::AccessDenied(format!(
                "cannot grant {} as {}",
                role, own
            )));
        }
        let user: User = self
            .api
            .put(&format!("{}/{}/role", USERS_PATH, user_id), &RoleAssignment { role })
            .await?;
        info!(user_id, role = %role, "Role assigned");
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<(), ApiError> {
        require_role(self.api.session(), Role::SuperAdmin)?;
        self.api.delete(&format!("{}/{}", USERS_PATH, user_id)).await?;
        info!(user_id, "User deleted");
        Ok(())
    }
}
