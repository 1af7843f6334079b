//! Bursar bookkeeping engine.
//!
//! Library core of a personal-finance backend: users own accounts,
//! hierarchical categories and transactions. Commands mutate them inside a
//! single storage transaction; queries are composed from explicit, typed
//! filter lists and listed through stable keyset cursors.
//!
//! The storage-facing building blocks are public on their own:
//!
//! - [`query`] — composition of predicate and statement filters
//! - [`repository`] — entity-agnostic load/list/exists with a filter
//!   pipeline
//! - [`cursor`] — opaque, resumable pagination tokens
//! - [`lock`] — named advisory locks scoped to a transaction
//!
//! All state lives in the database; the [`Engine`] itself is an immutable
//! handle and every operation takes its owner and filters explicitly.

pub use accounts::{Account, AccountKind, AccountStatus};
pub use categories::{Category, CategoryStatus};
pub use currency::Currency;
pub use cursor::{Cursor, CursorValue};
pub use error::EngineError;
pub use ops::{
    AccountFilter, CategoryFilter, CategoryNode, Engine, EngineBuilder, NewTransaction,
    TransactionFilter,
};
pub use query::{QueryPart, SortDirection, TagMatch};
pub use repository::{FilterHandler, FilterValue, KeyFilter, Repository};
pub use tags::TagOwner;
pub use transactions::Transaction;
pub use users::User;

mod accounts;
mod categories;
mod currency;
pub mod cursor;
mod error;
pub mod lock;
mod ops;
pub mod query;
pub mod repository;
mod tags;
mod transactions;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
