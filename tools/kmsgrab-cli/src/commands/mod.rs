pub mod check;
pub mod daemon;
pub mod grab;
pub mod trigger;
