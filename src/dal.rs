pub mod dashboard;
pub mod route_solutions;

pub use dashboard::*;
pub use route_solutions::*;
