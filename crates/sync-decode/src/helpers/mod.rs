// crates/sync-decode/src/helpers/mod.rs
//
// Internal helper modules. Not re-exported from lib.rs — implementation
// details of source/player, not part of the public API.

pub mod seek;
