//! tabconv Core - database-facing abstractions for the tabular converter
//!
//! This crate provides the traits and types the conversion pipeline is
//! written against. It defines:
//!
//! - `Connection` - Trait for database connections
//! - `RowCursor` - Forward-only cursor with typed column accessors
//! - `SchemaIntrospection` - Table, column and key discovery
//! - Common types like `Value`, `Row`, `ColumnMeta`, `SqlType`

mod connection;
mod cursor;
mod error;
mod schema;
mod types;

pub use connection::*;
pub use cursor::*;
pub use error::*;
pub use schema::*;
pub use types::*;
