//! Low-level primitives underneath the element store.
//!
//! Includes byte utilities for the column codecs and positional file reads
//! used by the archive.

/// Byte-level utilities and encoding/decoding.
///
/// Varints, ZigZag integers and a bounds-checked cursor.
pub mod bytes;

/// I/O abstractions and utilities.
///
/// Positional reads that let the archive load one field without touching others.
pub mod io;
