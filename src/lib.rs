//! # Index Harness
//!
//! **Replication and text-extraction core for a full-text search engine.**
//!
//! Two largely independent cores share this crate:
//!
//! ## Replication
//!
//! Keeps a replica database byte-consistent with a master by streaming
//! framed messages — incremental changesets and full database copies —
//! across a unidirectional byte stream.
//!
//! ```text
//! ┌────────┐ write_changesets ┌─────────────┐ apply_next_changeset ┌─────────┐
//! │ Master │─────────────────▶│ byte stream │─────────────────────▶│ Replica │
//! └───┬────┘                  └─────────────┘                      └────┬────┘
//!     │                                                                 │
//! ┌───▼────────┐                                              ┌─────────▼─────────┐
//! │ storage    │                                              │ live DB + stub    │
//! │ engine     │                                              │ pointer + offline │
//! │ (backend)  │                                              │ build directory   │
//! └────────────┘                                              └───────────────────┘
//! ```
//!
//! The replica maintains at most one *offline* database while a full copy
//! or multi-step catch-up is in flight, and atomically promotes it — stub
//! pointer rewrite via write-temp-then-rename — once the storage engine
//! confirms it has reached its required revision. Readers following the
//! stub never observe a half-written database.
//!
//! The storage engine itself is a seam ([`backend`]): this crate moves
//! opaque revision blobs and changesets, never database pages.
//!
//! ## MIME dispatch
//!
//! Converts heterogeneous input files to plain UTF-8 text for the indexer:
//! extension → MIME resolution, MIME → handler routing (external filter
//! commands or built-in HTML/XML/CSV parsers), charset and BOM
//! normalization, and MD5 content hashing.
//!
//! | Module | Role |
//! |--------|------|
//! | [`message`] | Framed message channel and wire codec |
//! | [`backend`] | Storage-engine traits and replication counters |
//! | [`master`] | Master-side changeset writer |
//! | [`replica`] | Replica-side applier state machine |
//! | [`stub`] | Stub pointer and parameter store |
//! | [`extract`] | MIME-dispatched text extraction |
//! | [`mimemap`] | Default extension and command tables |
//! | [`htmlparse`] | Tolerant HTML tokenizer |
//! | [`xmlparse`] | XML-family extraction parsers |
//! | [`charset`] | BOM handling and UTF-8 normalization |
//! | [`quote`] | Shell-argument quoting |
//! | [`runfilter`] | External filter execution |
//! | [`config`] | TOML configuration |
//! | [`error`] | Typed error sums |

pub mod backend;
pub mod charset;
pub mod config;
pub mod error;
pub mod extract;
pub mod htmlparse;
pub mod master;
pub mod message;
pub mod mimemap;
pub mod quote;
pub mod replica;
pub mod runfilter;
pub mod stub;
pub mod xmlparse;
