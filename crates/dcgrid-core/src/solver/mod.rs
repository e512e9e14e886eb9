//! Dense linear-system backends used by the Newton iterations.

mod backend;
mod registry;

pub use backend::{FaerSolver, GaussSolver, LinearSolveError, LinearSystemBackend};
pub use registry::SolverKind;
