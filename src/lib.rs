//! tile-engine library
//!
//! Tile addressing, instruction dispatch and cross-pipe synchronization for
//! multi-tier vector/matrix accelerators, with a functional simulator.
//!
//! ```
//! use tile_engine::device::Arch;
//! use tile_engine::engine::AiCore;
//! use tile_engine::ops::AtomicMode;
//! use tile_engine::tile::{GlobalTensor, VecTile};
//!
//! let mut core = AiCore::new(Arch::A2A3);
//! core.gm_mut().write_slice(0x1000, &[1.5f32; 64]);
//! let input = GlobalTensor::<f32>::dense_2d(0x1000, 8, 8);
//! let output = GlobalTensor::<f32>::dense_2d(0x2000, 8, 8);
//!
//! let a: VecTile<f32, 8, 8> = VecTile::new(0x0)?;
//! let dst: VecTile<f32, 8, 8> = VecTile::new(0x100)?;
//! let ev = core.tload(&a, &input, []);
//! let ev = core.tadd(&dst, &a, &a, [ev]);
//! let ev = core.tstore(&output, &dst, AtomicMode::None, [ev]);
//! core.wait_event(ev);
//!
//! assert_eq!(core.gm_mut().read_slice::<f32>(0x2000, 64), vec![3.0; 64]);
//! # Ok::<(), tile_engine::tile::TileError>(())
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod ops;
pub mod sync;
pub mod testing;
pub mod tile;
pub mod vector;
