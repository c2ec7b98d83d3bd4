//! Verisolve Math - expression algebra for sandboxed solvers
//!
//! Provides the value domain the sandbox interpreter computes with:
//! - [`Number`]: exact rationals, machine floats and arbitrary-precision decimals
//! - [`Expr`]: canonicalising symbolic expressions
//! - Calculus: differentiation, integration, limits
//! - Polynomial expansion and root finding, linear systems
//! - [`Matrix`] arithmetic, determinants and inverses
//! - Numeric evaluation (real per [`NumericMode`], complex for comparison)
//!
//! Every operation is a pure function over owned values; nothing here
//! performs I/O or touches process state.

pub mod calculus;
pub mod display;
pub mod error;
pub mod eval;
pub mod expr;
pub mod matrix;
pub mod number;
pub mod poly;
mod precise;

pub use calculus::{diff, integrate, integrate_definite, limit, summation, Direction};
pub use error::{MathError, MathResult};
pub use eval::{eval_complex, eval_number, evalf, to_mode};
pub use expr::{Constant, Expr, Func};
pub use matrix::Matrix;
pub use number::{Number, NumericMode};
pub use poly::{coefficients, expand, factor, factor_roots, solve, solve_linear_system};
