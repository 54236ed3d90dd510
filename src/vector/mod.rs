//! Vector unit: instruction forms, backends and the dispatcher.
//!
//! - [`instr`]: the instruction classes a backend executes
//! - [`mask`]: the mask register and its restore-on-drop scope
//! - [`backend`]: the capability interface each generation implements
//! - [`sim`]: functional simulator backend
//! - [`recording`]: backend wrapper used for legality checks
//! - [`dispatch`]: lowering of logical operations into issues

pub mod alu;
pub mod backend;
pub mod dispatch;
pub mod instr;
pub mod mask;
pub mod recording;
pub mod sim;

pub use backend::InstructionBackend;
pub use dispatch::{execute, plan, Access, Issue, IssueShape, Plan, PlanKind};
pub use instr::{BinaryOp, CmpMode, Operand, ReduceOp, Rhs, RoundMode, UnaryOp, VectorInstr};
pub use mask::{MaskScope, VectorMask};
pub use recording::{IssueRecord, RecordingBackend, Violation};
pub use sim::SimBackend;
