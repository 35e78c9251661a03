// src/ingest/providers/mod.rs
pub mod edgar_atom;
