use serde::Serialize;

use crate::users::dto::PublicUser;

#[derive(Debug, Serialize)]
pub struct LivingResponse {
    pub total: usize,
    pub users: Vec<PublicUser>,
}
