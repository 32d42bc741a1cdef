// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use datalith_db::{
    DbError,
    DbErrorKind,
};

pub type Result<T> = ::std::result::Result<T, DatalithError>;

/// The top-level error: store-management failures of this crate plus
/// everything the db layer reports.
#[derive(Debug,Fail)]
pub enum DatalithError {
    #[fail(display = "store at {} is already open in this process", _0)]
    StoreAlreadyOpen(String),

    #[fail(display = "{}", _0)]
    DbError(#[cause] DbError),
}

impl DatalithError {
    /// The underlying db error kind, when there is one.
    pub fn db_kind(&self) -> Option<DbErrorKind> {
        match *self {
            DatalithError::DbError(ref e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<DbError> for DatalithError {
    fn from(error: DbError) -> DatalithError {
        DatalithError::DbError(error)
    }
}

impl From<DbErrorKind> for DatalithError {
    fn from(kind: DbErrorKind) -> DatalithError {
        DatalithError::DbError(kind.into())
    }
}
