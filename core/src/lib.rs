// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

extern crate base64;
extern crate ordered_float;
extern crate serde;
#[macro_use] extern crate serde_json;

pub use ordered_float::OrderedFloat;

/// Return early with a crate-specific error kind, converting via `Into`.
#[macro_export]
macro_rules! bail {
    ($e:expr) => (
        return Err($e.into());
    )
}

mod types;
mod values;

pub use types::{
    Datom,
    Entid,
    Ident,
    TypedValue,
    TxId,
    ValueType,
    DB_DOC,
    DB_IDENT,
    DB_TX_INSTANT,
    GENESIS_TX,
    NULL_ENTID,
};
