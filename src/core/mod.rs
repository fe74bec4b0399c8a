#![forbid(unsafe_code)]

pub mod display;
pub mod git;
pub mod worktree;
