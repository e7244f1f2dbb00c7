//! Processing passes, run in order over a shared `AudioState`

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
