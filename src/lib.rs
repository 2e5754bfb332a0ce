//! `ledgernote`: chunked payload storage inside ledger payment notes.
//!
//! Two write modes ship as library APIs: [`blocknote`] for payloads known
//! up front, and [`streamnote`] for payloads produced incrementally. Both
//! sit on top of the same [`ledger`] adapter, [`codec`] registry, and
//! [`crypto`] primitives; [`manager`] adds two-party funded uploads on top
//! of [`blocknote`].

pub mod blocknote;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod ledger;
pub mod manager;
pub mod metadata;
pub mod search;
pub mod streamnote;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
