use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait, Value,
};
use uuid::Uuid;

use crate::{
    Account, AccountKind, AccountStatus, Currency, EngineError, ResultEngine, accounts, cursor,
    query::{QueryPart, SortDirection, TagMatch, compose, in_condition, range_condition, tags_condition},
    repository::{FilterValue, KeyFilter, Repository, in_for_arrays},
    tags::TagOwner,
    util::{normalize_display, normalize_key, normalize_optional_text},
};

use super::{Engine, insert_tags, map_integrity, replace_tags, with_tx};

/// Typed filters accepted by the account listings.
#[derive(Clone, Debug)]
pub enum AccountFilter {
    Ids(Vec<Uuid>),
    Kinds(Vec<AccountKind>),
    Statuses(Vec<AccountStatus>),
    Tags { tags: Vec<String>, mode: TagMatch },
    BalanceRange {
        from_minor: Option<i64>,
        to_minor: Option<i64>,
    },
}

impl AccountFilter {
    fn into_part(self) -> ResultEngine<QueryPart<accounts::Entity>> {
        Ok(match self {
            Self::Ids(ids) => QueryPart::Predicate(in_condition(accounts::Column::Id, ids)),
            Self::Kinds(kinds) => QueryPart::Predicate(in_condition(
                accounts::Column::Kind,
                kinds.iter().map(|kind| kind.as_str()).collect(),
            )),
            Self::Statuses(statuses) => QueryPart::Predicate(in_condition(
                accounts::Column::Status,
                statuses.iter().map(|status| status.as_str()).collect(),
            )),
            Self::Tags { tags, mode } => QueryPart::Predicate(tags_condition(
                TagOwner::Account,
                (accounts::Entity, accounts::Column::Id),
                &tags,
                mode,
            )),
            Self::BalanceRange {
                from_minor,
                to_minor,
            } => QueryPart::Predicate(range_condition(
                accounts::Column::BalanceMinor,
                from_minor,
                to_minor,
            )),
        })
    }
}

/// Pagination order of account listings.
const ACCOUNT_ORDER: [(accounts::Column, SortDirection); 1] =
    [(accounts::Column::Id, SortDirection::Desc)];

/// Consumes a `name` filter into an exact match on the normalized key, so
/// lookups by name ignore case, accents and whitespace.
fn name_key_handler(filters: Vec<KeyFilter>) -> (Condition, Vec<KeyFilter>) {
    let mut consumed = Condition::all();
    let mut remaining = Vec::with_capacity(filters.len());
    for filter in filters {
        if filter.key == "name"
            && let FilterValue::One(Value::String(Some(name))) = &filter.value
        {
            let key = normalize_key(name, "account").unwrap_or_else(|_| (**name).clone());
            consumed = consumed.add(accounts::Column::NameNorm.eq(key));
        } else {
            remaining.push(filter);
        }
    }
    (consumed, remaining)
}

fn account_repo() -> Repository<accounts::Entity> {
    Repository::new([accounts::Column::Id])
        .with_handler(in_for_arrays::<accounts::Entity>)
        .with_handler(name_key_handler)
}

fn render_parts(filters: Vec<AccountFilter>) -> ResultEngine<Vec<QueryPart<accounts::Entity>>> {
    filters.into_iter().map(AccountFilter::into_part).collect()
}

impl Engine {
    pub async fn create_account(
        &self,
        user_id: Uuid,
        name: &str,
        kind: AccountKind,
        currency: Currency,
        description: Option<&str>,
        tag_names: &[String],
    ) -> ResultEngine<Account> {
        let display = normalize_display(name, "account")?;
        let name_norm = normalize_key(&display, "account")?;
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;

            let now = Utc::now();
            let account = Account {
                id: Uuid::new_v4(),
                user_id,
                name: display,
                description: normalize_optional_text(description),
                kind,
                status: AccountStatus::Active,
                currency,
                balance_minor: 0,
                created: now,
                updated: now,
            };
            let mut active = accounts::ActiveModel::from(&account);
            active.name_norm = ActiveValue::Set(name_norm);
            active
                .insert(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "account"))?;
            insert_tags(&db_tx, TagOwner::Account, account.id, tag_names).await?;
            Ok(account)
        })
    }

    pub async fn update_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        status: Option<AccountStatus>,
        tag_names: Option<&[String]>,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            self.require_account_write(&db_tx, user_id, account_id)
                .await?;

            let mut active = accounts::ActiveModel {
                id: ActiveValue::Set(account_id),
                updated: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            if let Some(name) = name {
                let display = normalize_display(name, "account")?;
                active.name_norm = ActiveValue::Set(normalize_key(&display, "account")?);
                active.name = ActiveValue::Set(display);
            }
            if let Some(description) = description {
                active.description = ActiveValue::Set(normalize_optional_text(Some(description)));
            }
            if let Some(status) = status {
                active.status = ActiveValue::Set(status.as_str().to_string());
            }
            let updated = active
                .update(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "account"))?;

            if let Some(tag_names) = tag_names {
                replace_tags(&db_tx, TagOwner::Account, account_id, tag_names).await?;
            }
            Account::try_from(updated)
        })
    }

    /// Set the denormalized balance directly (manual adjustment).
    pub async fn set_account_balance(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        balance_minor: i64,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = self
                .require_account_write(&db_tx, user_id, account_id)
                .await?;
            if model.balance_minor == balance_minor {
                return Account::try_from(model);
            }
            let active = accounts::ActiveModel {
                id: ActiveValue::Set(account_id),
                balance_minor: ActiveValue::Set(balance_minor),
                updated: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            let updated = active.update(&db_tx).await?;
            Account::try_from(updated)
        })
    }

    /// Move `amount_minor` between two accounts of the same owner.
    ///
    /// Both rows are locked for update before any validation and stay locked
    /// until commit, so concurrent transfers serialize per account pair.
    pub async fn transfer(
        &self,
        user_id: Uuid,
        src_account_id: Uuid,
        dst_account_id: Uuid,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        if amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must be > 0".to_string(),
            ));
        }
        if src_account_id == dst_account_id {
            return Err(EngineError::InvalidAmount(
                "source and destination accounts must differ".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            // Lock in id order so opposite transfers cannot deadlock.
            let (first, second) = if src_account_id < dst_account_id {
                (src_account_id, dst_account_id)
            } else {
                (dst_account_id, src_account_id)
            };
            let first_model = self.require_account_write(&db_tx, user_id, first).await?;
            let second_model = self.require_account_write(&db_tx, user_id, second).await?;
            let (src, dst) = if first == src_account_id {
                (first_model, second_model)
            } else {
                (second_model, first_model)
            };

            if src.currency != dst.currency {
                return Err(EngineError::CurrencyMismatch(format!(
                    "source is {}, destination is {}",
                    src.currency, dst.currency
                )));
            }
            if src.balance_minor < amount_minor {
                return Err(EngineError::InsufficientFunds(format!(
                    "account {} holds {} minor units, transfer needs {amount_minor}",
                    src.id, src.balance_minor
                )));
            }

            let now = Utc::now();
            let src_active = accounts::ActiveModel {
                id: ActiveValue::Set(src.id),
                balance_minor: ActiveValue::Set(src.balance_minor - amount_minor),
                updated: ActiveValue::Set(now),
                ..Default::default()
            };
            src_active.update(&db_tx).await?;
            let dst_active = accounts::ActiveModel {
                id: ActiveValue::Set(dst.id),
                balance_minor: ActiveValue::Set(dst.balance_minor + amount_minor),
                updated: ActiveValue::Set(now),
                ..Default::default()
            };
            dst_active.update(&db_tx).await?;
            Ok(())
        })
    }

    pub async fn account(&self, user_id: Uuid, account_id: Uuid) -> ResultEngine<Account> {
        let model = account_repo()
            .load_by(
                &self.database,
                vec![
                    KeyFilter::new("id", account_id),
                    KeyFilter::new("user_id", user_id),
                ],
            )
            .await?
            .ok_or_else(|| EngineError::NotFound("account not exists".to_string()))?;
        Account::try_from(model)
    }

    pub async fn account_exists(&self, user_id: Uuid, name: &str) -> ResultEngine<bool> {
        account_repo()
            .exists(
                &self.database,
                vec![
                    KeyFilter::new("user_id", user_id),
                    KeyFilter::new("name", name),
                ],
            )
            .await
    }

    /// Every account matching the filters; accounts per user are bounded.
    pub async fn list_accounts(
        &self,
        user_id: Uuid,
        filters: Vec<AccountFilter>,
    ) -> ResultEngine<Vec<Account>> {
        let select = compose(
            accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .order_by_desc(accounts::Column::Id),
            render_parts(filters)?,
        );
        let rows = account_repo().list_full(&self.database, select).await?;
        rows.into_iter().map(Account::try_from).collect()
    }

    pub async fn list_disabled_accounts(&self, user_id: Uuid) -> ResultEngine<Vec<Account>> {
        let select = accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .filter(accounts::Column::Status.eq(AccountStatus::Disabled.as_str()))
            .order_by_asc(accounts::Column::Id);
        let rows = account_repo().list_full(&self.database, select).await?;
        rows.into_iter().map(Account::try_from).collect()
    }

    /// Cursor-paginated account listing, newest id first.
    pub async fn list_accounts_page(
        &self,
        user_id: Uuid,
        filters: Vec<AccountFilter>,
        limit: Option<u64>,
        cursor: Option<&str>,
    ) -> ResultEngine<(Vec<Account>, Option<String>)> {
        let select = compose(
            accounts::Entity::find().filter(accounts::Column::UserId.eq(user_id)),
            render_parts(filters)?,
        );
        let (rows, next_cursor) = cursor::page(
            &self.database,
            select,
            &ACCOUNT_ORDER,
            self.page_size(limit),
            cursor,
        )
        .await?;
        let items = rows
            .into_iter()
            .map(Account::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok((items, next_cursor))
    }

    pub(super) async fn require_account_write(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
        account_id: Uuid,
    ) -> ResultEngine<accounts::Model> {
        accounts::Entity::find()
            .filter(accounts::Column::Id.eq(account_id))
            .filter(accounts::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("account not exists".to_string()))
    }
}
