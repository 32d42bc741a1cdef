// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::fmt;
use std::io;

use failure::{
    Backtrace,
    Context,
    Fail,
};

use datalith_core::{
    Entid,
    Ident,
    TypedValue,
};

pub type Result<T> = ::std::result::Result<T, DbError>;

#[derive(Clone,Debug,Fail,PartialEq)]
pub enum DbErrorKind {
    /// A retraction named a fact that is neither currently asserted nor
    /// asserted earlier in the same transaction.
    #[fail(display = "no such fact to retract: [{} {} {:?}]", _0, _1, _2)]
    FactNotFound(Entid, Ident, TypedValue),

    /// Type mismatch, cardinality conflict, uniqueness conflict, or an unknown
    /// attribute in strict mode.
    #[fail(display = "schema violation: {}", _0)]
    SchemaViolation(String),

    /// Transaction function failures, unknown functions, expansion depth
    /// overflow, unresolved lookup refs.
    #[fail(display = "{}", _0)]
    Custom(String),

    #[fail(display = "I/O error: {}", _0)]
    IoError(String),

    #[fail(display = "corrupt journal at line {}: {}", _0, _1)]
    CorruptJournal(usize, String),

    #[fail(display = "corrupt snapshot: {}", _0)]
    CorruptSnapshot(String),
}

#[derive(Debug)]
pub struct DbError {
    inner: Context<DbErrorKind>,
}

impl DbError {
    pub fn kind(&self) -> DbErrorKind {
        self.inner.get_context().clone()
    }
}

impl Fail for DbError {
    fn cause(&self) -> Option<&Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl From<DbErrorKind> for DbError {
    fn from(kind: DbErrorKind) -> DbError {
        DbError { inner: Context::new(kind) }
    }
}

impl From<Context<DbErrorKind>> for DbError {
    fn from(inner: Context<DbErrorKind>) -> DbError {
        DbError { inner: inner }
    }
}

impl From<io::Error> for DbError {
    fn from(error: io::Error) -> DbError {
        DbErrorKind::IoError(error.to_string()).into()
    }
}
