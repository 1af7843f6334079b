//! Cursor-based pagination over an explicitly ordered select.
//!
//! A cursor is an ordered list of `(field, direction, value)` triples taken
//! from the last row of a page. On the wire it is URL-safe base64 over a
//! JSON array of `[field, "ASC"|"DESC", value]` triples; consumers treat it
//! as opaque. Resumption builds the keyset condition "strictly after this
//! composite sort position": for an ordering `(c1 ASC, c2 DESC)` and last
//! seen `(v1, v2)` that is `c1 > v1 OR (c1 = v1 AND c2 < v2)`.

use base64::Engine as _;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, ColumnType, Condition, ConnectionTrait, EntityTrait, IdenStatic, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Value,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::{EngineError, ResultEngine, SortDirection};

/// One `[field, direction, value]` triple of the wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CursorValue(pub String, pub SortDirection, pub Json);

/// Decoded pagination token.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cursor {
    pub values: Vec<CursorValue>,
}

impl Cursor {
    pub fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(&self.values)
            .map_err(|_| EngineError::InvalidCursor("unencodable cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid cursor encoding".to_string()))?;
        let values = serde_json::from_slice::<Vec<CursorValue>>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid cursor payload".to_string()))?;
        Ok(Self { values })
    }
}

/// Coerce a decoded JSON value back into the db value of its column.
fn decoded_value(column_type: &ColumnType, json: &Json) -> ResultEngine<Value> {
    let mismatch = || {
        EngineError::InvalidCursor(format!("cursor value {json} does not match its column type"))
    };
    match column_type {
        ColumnType::Char(_) | ColumnType::String(_) | ColumnType::Text => json
            .as_str()
            .map(|s| Value::from(s.to_string()))
            .ok_or_else(mismatch),
        ColumnType::TinyInteger | ColumnType::SmallInteger | ColumnType::Integer => json
            .as_i64()
            .map(|v| Value::Int(Some(v as i32)))
            .ok_or_else(mismatch),
        ColumnType::BigInteger => json
            .as_i64()
            .map(|v| Value::BigInt(Some(v)))
            .ok_or_else(mismatch),
        ColumnType::Boolean => json.as_bool().map(Value::from).ok_or_else(mismatch),
        ColumnType::Uuid => json
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Value::from)
            .ok_or_else(mismatch),
        ColumnType::Timestamp | ColumnType::TimestampWithTimeZone | ColumnType::DateTime => json
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| Value::from(dt.with_timezone(&Utc)))
            .ok_or_else(mismatch),
        ColumnType::Date => json
            .as_str()
            .and_then(|s| s.parse::<NaiveDate>().ok())
            .map(Value::from)
            .ok_or_else(mismatch),
        _ => Err(EngineError::InvalidCursor(format!(
            "unsupported cursor column type for value {json}"
        ))),
    }
}

/// Project a row value into the cursor wire format.
fn encoded_value(value: Value) -> ResultEngine<Json> {
    match value {
        Value::Bool(Some(v)) => Ok(Json::from(v)),
        Value::TinyInt(Some(v)) => Ok(Json::from(v)),
        Value::SmallInt(Some(v)) => Ok(Json::from(v)),
        Value::Int(Some(v)) => Ok(Json::from(v)),
        Value::BigInt(Some(v)) => Ok(Json::from(v)),
        Value::String(Some(v)) => Ok(Json::from(*v)),
        Value::Uuid(Some(v)) => Ok(Json::from(v.to_string())),
        Value::ChronoDateTimeUtc(Some(v)) => Ok(Json::from(v.to_rfc3339())),
        Value::ChronoDate(Some(v)) => Ok(Json::from(v.to_string())),
        _ => Err(EngineError::InvalidCursor(
            "unsupported or NULL sort value in cursor".to_string(),
        )),
    }
}

/// Order the select and, when a cursor is present, attach the resumption
/// condition.
///
/// Fails with [`EngineError::OrderRequired`] on an empty ordering: cursor
/// semantics are meaningless without a deterministic order. The cursor's
/// fields and directions must match `order` exactly, in the same order.
pub fn apply<E: EntityTrait>(
    select: Select<E>,
    order: &[(E::Column, SortDirection)],
    cursor: Option<&Cursor>,
) -> ResultEngine<Select<E>> {
    if order.is_empty() {
        return Err(EngineError::OrderRequired);
    }

    let mut select = select;
    for (col, direction) in order {
        select = select.order_by(*col, direction.order());
    }

    let Some(cursor) = cursor else {
        return Ok(select);
    };

    if cursor.values.len() != order.len() {
        return Err(EngineError::InvalidCursor(format!(
            "cursor has {} value(s), statement orders by {} column(s)",
            cursor.values.len(),
            order.len()
        )));
    }
    let mut decoded: Vec<Value> = Vec::with_capacity(order.len());
    for ((col, direction), CursorValue(field, cursor_direction, json)) in
        order.iter().zip(&cursor.values)
    {
        if field.as_str() != col.as_str() || cursor_direction != direction {
            return Err(EngineError::InvalidCursor(format!(
                "cursor field ({field} {}) does not match statement ordering ({} {})",
                cursor_direction.as_str(),
                col.as_str(),
                direction.as_str(),
            )));
        }
        decoded.push(decoded_value(col.def().get_column_type(), json)?);
    }

    // One clause per prefix length: equality on the preceding columns,
    // direction-aware strict comparison at the position.
    let mut resume = Condition::any();
    for position in 0..order.len() {
        let mut clause = Condition::all();
        for preceding in 0..position {
            clause = clause.add(order[preceding].0.eq(decoded[preceding].clone()));
        }
        let (col, direction) = order[position];
        clause = clause.add(match direction {
            SortDirection::Asc => col.gt(decoded[position].clone()),
            SortDirection::Desc => col.lt(decoded[position].clone()),
        });
        resume = resume.add(clause);
    }

    Ok(select.filter(resume))
}

/// Build the next-page cursor from the last row of a page.
pub fn from_row<E: EntityTrait>(
    row: &E::Model,
    order: &[(E::Column, SortDirection)],
) -> ResultEngine<Cursor> {
    let mut values = Vec::with_capacity(order.len());
    for (col, direction) in order {
        values.push(CursorValue(
            col.as_str().to_string(),
            *direction,
            encoded_value(row.get(*col))?,
        ));
    }
    Ok(Cursor { values })
}

/// Run one page of a cursor-paginated listing.
///
/// Fetches `limit + 1` rows to learn whether a further page exists; the
/// returned cursor is absent on the last page. An empty result is a normal
/// "no further pages" outcome, not an error.
pub async fn page<E, C>(
    db: &C,
    select: Select<E>,
    order: &[(E::Column, SortDirection)],
    limit: u64,
    cursor: Option<&str>,
) -> ResultEngine<(Vec<E::Model>, Option<String>)>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let cursor = cursor.map(Cursor::decode).transpose()?;
    let select = apply(select, order, cursor.as_ref())?;

    let mut rows: Vec<E::Model> = select.limit(limit.saturating_add(1)).all(db).await?;
    let has_more = rows.len() > limit as usize;
    rows.truncate(limit as usize);

    let next_cursor = if has_more {
        rows.last()
            .map(|last| from_row::<E>(last, order)?.encode())
            .transpose()?
    } else {
        None
    };

    Ok((rows, next_cursor))
}
