//! Query composition primitives.
//!
//! A listing operation is described by an ordered list of [`QueryPart`]s.
//! Statement parts rewrite the whole select (joins, base-set changes) and are
//! applied immediately, in list order, so later predicates may reference
//! joined tables. Predicate parts accumulate and are ANDed into a single
//! WHERE clause once, at the end. An empty list leaves the base select
//! untouched.

use sea_orm::sea_query::{
    BinOper, ColumnRef, Expr, IntoColumnRef, Query as SeaQuery, SelectStatement,
};
use sea_orm::{ColumnTrait, Condition, EntityTrait, Order, QueryFilter, Select, Value};
use serde::{Deserialize, Serialize};

use crate::{EngineError, tags};

/// Sort direction of one ordered column, `"ASC"`/`"DESC"` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub(crate) fn order(self) -> Order {
        match self {
            Self::Asc => Order::Asc,
            Self::Desc => Order::Desc,
        }
    }
}

impl TryFrom<&str> for SortDirection {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(EngineError::InvalidCursor(format!(
                "invalid sort direction: {other}"
            ))),
        }
    }
}

/// Whole-statement rewrite applied while composing a query.
pub type StatementFn<E> = Box<dyn FnOnce(Select<E>) -> Select<E> + Send>;

/// One element of a composed query.
pub enum QueryPart<E: EntityTrait> {
    /// Boolean condition ANDed into the final WHERE clause.
    Predicate(Condition),
    /// Select rewrite (e.g. a join), applied in list order.
    Statement(StatementFn<E>),
}

impl<E: EntityTrait> QueryPart<E> {
    pub fn statement(transform: impl FnOnce(Select<E>) -> Select<E> + Send + 'static) -> Self {
        Self::Statement(Box::new(transform))
    }
}

/// Renders an ordered list of parts into one executable select.
pub fn compose<E: EntityTrait>(base: Select<E>, parts: Vec<QueryPart<E>>) -> Select<E> {
    let mut statement = base;
    let mut predicates = Condition::all();
    for part in parts {
        match part {
            QueryPart::Statement(transform) => statement = transform(statement),
            QueryPart::Predicate(condition) => predicates = predicates.add(condition),
        }
    }
    statement.filter(predicates)
}

/// How a tag-set predicate matches an owner's tag collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    /// The owner's tag set is a superset of the given tags.
    HaveAll,
    /// The intersection with the given tags is non-empty.
    #[default]
    HaveAny,
    /// The intersection with the given tags is empty.
    HaveNothing,
}

impl TryFrom<&str> for TagMatch {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "have_all" => Ok(Self::HaveAll),
            "have_any" => Ok(Self::HaveAny),
            "have_nothing" => Ok(Self::HaveNothing),
            other => Err(EngineError::InvalidFilter(format!(
                "invalid tag filter mode: {other}"
            ))),
        }
    }
}

fn tag_subselect(owner: tags::TagOwner, owner_col: &ColumnRef) -> SelectStatement {
    SeaQuery::select()
        .expr(Expr::val(1))
        .from(tags::Entity)
        .and_where(Expr::col((tags::Entity, tags::Column::OwnerKind)).eq(owner.as_str()))
        .and_where(
            Expr::col((tags::Entity, tags::Column::OwnerId))
                .binary(BinOper::Equal, Expr::col(owner_col.clone())),
        )
        .to_owned()
}

/// Tag-set predicate against the shared `tags` table.
///
/// `owner_col` is the outer entity's id column, e.g.
/// `(accounts::Entity, accounts::Column::Id)`. Degenerate inputs keep
/// Postgres array-operator semantics: a superset of the empty set is always
/// true, an overlap with the empty set is always false.
pub fn tags_condition(
    owner: tags::TagOwner,
    owner_col: impl IntoColumnRef,
    tag_names: &[String],
    mode: TagMatch,
) -> Condition {
    let owner_col = owner_col.into_column_ref();
    if tag_names.is_empty() {
        return match mode {
            TagMatch::HaveAll | TagMatch::HaveNothing => Condition::all().add(Expr::val(true).eq(true)),
            TagMatch::HaveAny => Condition::all().add(Expr::val(true).eq(false)),
        };
    }

    match mode {
        TagMatch::HaveAll => {
            let mut all = Condition::all();
            for tag in tag_names {
                let sub = tag_subselect(owner, &owner_col)
                    .and_where(Expr::col((tags::Entity, tags::Column::Tag)).eq(tag.as_str()))
                    .to_owned();
                all = all.add(Expr::exists(sub));
            }
            all
        }
        TagMatch::HaveAny => {
            let sub = tag_subselect(owner, &owner_col)
                .and_where(
                    Expr::col((tags::Entity, tags::Column::Tag))
                        .is_in(tag_names.iter().map(String::as_str)),
                )
                .to_owned();
            Condition::all().add(Expr::exists(sub))
        }
        TagMatch::HaveNothing => {
            let sub = tag_subselect(owner, &owner_col)
                .and_where(
                    Expr::col((tags::Entity, tags::Column::Tag))
                        .is_in(tag_names.iter().map(String::as_str)),
                )
                .to_owned();
            Condition::all().add(Expr::exists(sub)).not()
        }
    }
}

/// Inclusive range predicate; either bound may be omitted.
///
/// With neither bound the condition degenerates to always-true and still
/// joins the AND chain.
pub fn range_condition<C, V>(col: C, from: Option<V>, to: Option<V>) -> Condition
where
    C: ColumnTrait,
    V: Into<Value>,
{
    let mut cond = Condition::all();
    if let Some(from) = from {
        cond = cond.add(col.gte(from));
    }
    if let Some(to) = to {
        cond = cond.add(col.lte(to));
    }
    cond
}

/// Membership predicate: one value is equality, many become `IN`.
pub fn in_condition<C, V>(col: C, mut values: Vec<V>) -> Condition
where
    C: ColumnTrait,
    V: Into<Value>,
{
    if values.len() == 1 {
        let value = values.remove(0);
        Condition::all().add(col.eq(value))
    } else {
        Condition::all().add(col.is_in(values))
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QuerySelect, QueryTrait};

    use super::*;
    use crate::accounts;

    fn sql(select: Select<accounts::Entity>) -> String {
        select.build(DbBackend::Sqlite).to_string()
    }

    #[test]
    fn empty_composition_is_base_statement() {
        let base = accounts::Entity::find();
        assert_eq!(sql(compose(accounts::Entity::find(), vec![])), sql(base));
    }

    #[test]
    fn statement_parts_apply_before_predicates() {
        let composed = compose(
            accounts::Entity::find(),
            vec![
                QueryPart::Predicate(Condition::all().add(accounts::Column::BalanceMinor.gte(0))),
                QueryPart::statement(|s| s.distinct()),
            ],
        );
        let rendered = sql(composed);
        let where_at = rendered.find("WHERE").expect("no WHERE clause");
        let distinct_at = rendered.find("DISTINCT").expect("no DISTINCT");
        assert!(distinct_at < where_at);
    }

    #[test]
    fn duplicate_predicate_is_idempotent_in_sql() {
        let cond = || Condition::all().add(accounts::Column::BalanceMinor.gte(100));
        let once = sql(compose(
            accounts::Entity::find(),
            vec![QueryPart::Predicate(cond())],
        ));
        let twice = sql(compose(
            accounts::Entity::find(),
            vec![QueryPart::Predicate(cond()), QueryPart::Predicate(cond())],
        ));
        // Same predicate twice stays an AND of equal terms: same result set.
        assert!(twice.starts_with(&once));
    }

    #[test]
    fn tag_modes_render_exists_subqueries() {
        let tag_names = vec!["rent".to_string(), "bills".to_string()];
        let have_all = sql(compose(
            accounts::Entity::find(),
            vec![QueryPart::Predicate(tags_condition(
                tags::TagOwner::Account,
                (accounts::Entity, accounts::Column::Id),
                &tag_names,
                TagMatch::HaveAll,
            ))],
        ));
        // Superset check is one EXISTS per required tag.
        assert_eq!(have_all.matches("EXISTS").count(), 2);

        let have_nothing = sql(compose(
            accounts::Entity::find(),
            vec![QueryPart::Predicate(tags_condition(
                tags::TagOwner::Account,
                (accounts::Entity, accounts::Column::Id),
                &tag_names,
                TagMatch::HaveNothing,
            ))],
        ));
        assert!(have_nothing.contains("NOT"));
        assert_eq!(have_nothing.matches("EXISTS").count(), 1);
    }

    #[test]
    fn unknown_tag_mode_fails_fast() {
        assert!(matches!(
            TagMatch::try_from("has_some"),
            Err(EngineError::InvalidFilter(_))
        ));
    }

    #[test]
    fn unbounded_range_is_harmless() {
        let unbounded = sql(compose(
            accounts::Entity::find(),
            vec![QueryPart::Predicate(range_condition::<_, i64>(
                accounts::Column::BalanceMinor,
                None,
                None,
            ))],
        ));
        assert_eq!(unbounded, sql(accounts::Entity::find()));
    }
}
