// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mua-core: protocol and cache primitives for the mua mail client
//!
//! This crate provides the method calls and batch builder, result
//! references, the reconciliation of Changes responses into updates, query
//! fingerprints, and the cache contract with its SQLite implementation.

pub mod cache;
pub mod db;
pub mod entity;
pub mod error;
pub mod method;
pub mod protocol;
pub mod query;
pub mod reference;
pub mod request;
pub mod response;
pub mod session;
pub mod state;
pub mod status;
pub mod update;

pub use cache::{Cache, CacheError, CacheResult, Missing, QueryStateWrapper, UpTo};
pub use db::SqliteCache;
pub use entity::{
    Email, EmailAddress, EmailSubmission, Entity, EntityType, Identity, Mailbox, PropertyMask,
    Role, Thread,
};
pub use error::{Error, MethodFailure, Result};
pub use method::{
    ChangesCall, GetCall, MethodCall, MethodName, Namespace, QueryCall, QueryChangesCall, SetCall,
    Verb,
};
pub use query::{Comparator, EmailQuery, Filter, FilterCondition, Operator, QueryKey};
pub use reference::{Arg, ResultReference};
pub use request::{Batch, BatchBuilder, Call, Invocation};
pub use response::{MethodError, MethodErrorType, Request, Response, Responses, SetError};
pub use session::Session;
pub use state::{ObjectsState, StateToken};
pub use status::Status;
pub use update::{AddedQueryItem, QueryItem, QueryResult, QueryUpdate, Update};
