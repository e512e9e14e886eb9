pub mod common;
pub mod pf;
pub mod size;
pub mod topology;
pub mod ts;
