// Impersonation kinds
// Each kind differs only in storage key, roles, endpoints and routes

use crate::auth::Role;
use crate::config::{Endpoints, Routes};

/// Parameters of one impersonation flow
pub trait ImpersonationKind: Send + Sync + 'static {
    /// Key of the record in tab-scoped storage
    const STORAGE_KEY: &'static str;

    /// Role installed with the substitute credentials
    const SUBSTITUTE_ROLE: Role;

    /// Roles allowed to start this impersonation
    const PARENT_ROLES: &'static [Role];

    /// Storage keys of impersonations that can be started on top of this one
    const NESTED_KEYS: &'static [&'static str] = &[];

    /// Route to reload into once the substitute is installed
    fn landing_route(routes: &Routes) -> String {
        routes.home(Self::SUBSTITUTE_ROLE).to_string()
    }

    /// Route to reload into once the parent is restored
    fn return_route(parent_role: Role, routes: &Routes) -> String;

    fn start_endpoint(endpoints: &Endpoints, substitute_id: &str) -> String;

    fn end_endpoint(endpoints: &Endpoints) -> String;
}

/// ADMIN or AMBASSADOR operating as a TRAINER
pub struct TrainerImpersonation;

impl ImpersonationKind for TrainerImpersonation {
    const STORAGE_KEY: &'static str = "impersonation:trainer";
    const SUBSTITUTE_ROLE: Role = Role::Trainer;
    const PARENT_ROLES: &'static [Role] = &[Role::Admin, Role::Ambassador];
    const NESTED_KEYS: &'static [&'static str] = &[TraineeImpersonation::STORAGE_KEY];

    fn return_route(parent_role: Role, routes: &Routes) -> String {
        match parent_role {
            Role::Admin => routes.admin_trainers.clone(),
            other => routes.home(other).to_string(),
        }
    }

    fn start_endpoint(endpoints: &Endpoints, substitute_id: &str) -> String {
        endpoints
            .trainer_impersonation_start
            .replace("{id}", substitute_id)
    }

    fn end_endpoint(endpoints: &Endpoints) -> String {
        endpoints.trainer_impersonation_end.clone()
    }
}

/// TRAINER operating as a TRAINEE
pub struct TraineeImpersonation;

impl ImpersonationKind for TraineeImpersonation {
    const STORAGE_KEY: &'static str = "impersonation:trainee";
    const SUBSTITUTE_ROLE: Role = Role::Trainee;
    const PARENT_ROLES: &'static [Role] = &[Role::Trainer];

    fn return_route(_parent_role: Role, routes: &Routes) -> String {
        routes.trainer_trainees.clone()
    }

    fn start_endpoint(endpoints: &Endpoints, substitute_id: &str) -> String {
        endpoints
            .trainee_impersonation_start
            .replace("{id}", substitute_id)
    }

    fn end_endpoint(endpoints: &Endpoints) -> String {
        endpoints.trainee_impersonation_end.clone()
    }
}
