#![doc = include_str!("../README.md")]

mod shared;
pub use shared::*;

mod batch;
pub use batch::*;

mod collector;
pub use collector::*;
