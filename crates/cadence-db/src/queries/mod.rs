pub mod contexts;
pub mod generation_log;
pub mod weeks;
