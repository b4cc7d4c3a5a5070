pub mod aggregate;
pub mod extract;
pub mod sentiment;
pub mod soap;

pub use aggregate::*;
pub use extract::*;
pub use sentiment::*;
pub use soap::*;
