//! Shared utility modules used across Tessera components.

pub mod varint;
