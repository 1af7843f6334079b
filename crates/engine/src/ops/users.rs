use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, User, users, util::normalize_display};

use super::{Engine, map_integrity, with_tx};

impl Engine {
    /// Register a user; names are unique.
    pub async fn create_user(&self, name: &str) -> ResultEngine<Uuid> {
        let name = normalize_display(name, "user")?;
        with_tx!(self, |db_tx| {
            if users::Entity::find()
                .filter(users::Column::Name.eq(name.clone()))
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::Conflict("user already exists".to_string()));
            }
            let id = Uuid::new_v4();
            let active = users::ActiveModel {
                id: ActiveValue::Set(id),
                name: ActiveValue::Set(name),
                created: ActiveValue::Set(Utc::now()),
            };
            active
                .insert(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "user"))?;
            Ok(id)
        })
    }

    pub async fn user(&self, user_id: Uuid) -> ResultEngine<User> {
        let model = users::Entity::find_by_id(user_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("user not exists".to_string()))?;
        Ok(User {
            id: model.id,
            name: model.name,
            created: model.created,
        })
    }
}
