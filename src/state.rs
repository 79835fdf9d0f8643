use std::sync::Arc;

use crate::db::users::UserRepository;
use crate::lifecycle::Readiness;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub readiness: Readiness,
}
