//! Account primitives.
//!
//! An `Account` holds a balance in integer minor units of its currency.
//! Names are unique per owner through the normalized `name_norm` key.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Money,
    Savings,
    Goal,
    Loan,
    Investment,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Money => "money",
            Self::Savings => "savings",
            Self::Goal => "goal",
            Self::Loan => "loan",
            Self::Investment => "investment",
        }
    }
}

impl TryFrom<&str> for AccountKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "money" => Ok(Self::Money),
            "savings" => Ok(Self::Savings),
            "goal" => Ok(Self::Goal),
            "loan" => Ok(Self::Loan),
            "investment" => Ok(Self::Investment),
            other => Err(EngineError::InvalidFilter(format!(
                "invalid account kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl TryFrom<&str> for AccountStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            other => Err(EngineError::InvalidFilter(format!(
                "invalid account status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: AccountKind,
    pub status: AccountStatus,
    pub currency: Currency,
    pub balance_minor: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub name_norm: String,
    pub description: Option<String>,
    pub kind: String,
    pub status: String,
    pub currency: String,
    pub balance_minor: i64,
    pub created: DateTimeUtc,
    pub updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            description: model.description,
            kind: AccountKind::try_from(model.kind.as_str())?,
            status: AccountStatus::try_from(model.status.as_str())?,
            currency: Currency::try_from(model.currency.as_str())?,
            balance_minor: model.balance_minor,
            created: model.created,
            updated: model.updated,
        })
    }
}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id),
            user_id: ActiveValue::Set(account.user_id),
            name: ActiveValue::Set(account.name.clone()),
            name_norm: ActiveValue::NotSet,
            description: ActiveValue::Set(account.description.clone()),
            kind: ActiveValue::Set(account.kind.as_str().to_string()),
            status: ActiveValue::Set(account.status.as_str().to_string()),
            currency: ActiveValue::Set(account.currency.code().to_string()),
            balance_minor: ActiveValue::Set(account.balance_minor),
            created: ActiveValue::Set(account.created),
            updated: ActiveValue::Set(account.updated),
        }
    }
}
