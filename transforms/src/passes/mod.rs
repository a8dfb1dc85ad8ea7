//! Built-in passes.
//!
//! The factory names below are the stable API the frontends depend on:
//! `identity`, `convert_to_ssa`, `flatten_call_expr`,
//! `normalize_stmt_structure`, `flatten_single_stmt`,
//! `outline_incore_scopes`, `convert_tensor_to_block_ops`, `init_mem_ref`,
//! `basic_memory_reuse`, `insert_sync`, `add_alloc`, `run_verifier`.

mod convert_tensor_to_block_ops;
mod flatten_call_expr;
mod identity;
mod insert_sync;
mod memory;
mod normalize;
mod outline;
mod run_verifier;
mod ssa;

pub use convert_tensor_to_block_ops::convert_tensor_to_block_ops;
pub use flatten_call_expr::flatten_call_expr;
pub use identity::identity;
pub use insert_sync::insert_sync;
pub use memory::{add_alloc, basic_memory_reuse, init_mem_ref};
pub use normalize::{flatten_single_stmt, normalize_stmt_structure};
pub use outline::outline_incore_scopes;
pub use run_verifier::run_verifier;
pub use ssa::convert_to_ssa;
