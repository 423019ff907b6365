//! WASM bindings for `rayopt_core`.
//!
//! `WasmLens` owns one optical system; paraxial summaries and solves live in
//! `lens`, exact-trace analyses in `analysis`.

mod analysis;
mod lens;

pub use lens::WasmLens;
