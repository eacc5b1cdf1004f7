pub mod entity;
pub mod interaction;
pub mod task;
