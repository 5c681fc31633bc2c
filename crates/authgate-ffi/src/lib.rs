// flutter_rust_bridge uses cfg flags like `frb_expand` during codegen / macro expansion.
// On stable Rust, `unexpected_cfgs` warns about unknown cfg names; we allow them in this crate.
#![allow(unexpected_cfgs)]

// Flutter Rust Bridge FFI surface for the AuthGate security core.
//
// ## FRB Code Generation
//
// To regenerate bindings:
//
// ```bash
// flutter_rust_bridge_codegen generate --config-file flutter_rust_bridge.yaml
// ```
//
// Generated Dart bindings land in the host app; the Rust glue is produced
// into `src/frb_generated.rs` and is not checked in.

pub mod api;
pub mod models;
pub mod streams;

pub use api::*;
pub use models::*;
pub use streams::*;
