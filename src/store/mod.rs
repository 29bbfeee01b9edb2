//! Store - Data-store access behind object-safe traits
//!
//! TigerStyle: Every tier reaches the store through an injectable interface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │      StoreClient Trait       │   │      SqlExecutor Trait       │
//! │  (structured operations)     │   │  (literal statements)        │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!      ↑                ↑                 ↑          ↑           ↑
//! ┌────┴─────┐   ┌──────┴─────┐   ┌───────┴──┐ ┌─────┴─────┐ ┌───┴──────┐
//! │RestClient│   │  SimStore  │   │RpcSql    │ │PostgresSql│ │ SimStore │
//! │(primary, │   │ (testing)  │   │Executor  │ │Executor   │ │(testing) │
//! │ bypass)  │   │            │   │          │ │(postgres) │ │          │
//! └──────────┘   └────────────┘   └──────────┘ └───────────┘ └──────────┘
//! ```

mod client;
mod rest;
mod sim;
mod sql;

#[cfg(feature = "postgres")]
mod postgres;

pub use client::{Filter, FilterOp, SelectQuery, StoreClient, StoreHandle};
pub use rest::{RestClient, RestClientOptions};
pub use sim::{Fault, FaultInjector, SimStore};
pub use sql::{probe_statement, RpcSqlExecutor, SqlExecutor, SqlHandle};

#[cfg(feature = "postgres")]
pub use postgres::PostgresSqlExecutor;
