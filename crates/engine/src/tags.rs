//! Tag rows shared by accounts, categories and transactions.
//!
//! Each row is one `(owner_kind, owner_id, tag)` membership, so a tag set is
//! an unordered multiset per owner. Tag predicates compile to correlated
//! EXISTS sub-selects (see `query::tags_condition`), which keeps them
//! portable across sqlite and Postgres.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagOwner {
    Account,
    Category,
    Transaction,
}

impl TagOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Category => "category",
            Self::Transaction => "transaction",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_kind: String,
    pub owner_id: Uuid,
    pub tag: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
