//! The HAFAS client-interface protocol family.
//!
//! HAFAS backends expose a single JSON endpoint (`mgate.exe`). Every call
//! POSTs a service request list and gets a `svcResL` envelope back; response
//! entities are index-linked into shared lookup tables (`locL`, `prodL`,
//! `remL`, ...) which are resolved eagerly during parsing. Unlike EFA there
//! is no server-side session: paging and refresh replay the search with an
//! opaque cursor or reconstruction token.

mod parse;
mod provider;
mod types;

pub use provider::{HafasConfig, HafasProvider, HafasQuirks};
