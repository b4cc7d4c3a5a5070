pub mod record;
pub mod sentiment;
pub mod soap;
pub mod span;
pub mod transcript;

pub use record::*;
pub use sentiment::*;
pub use soap::*;
pub use span::*;
pub use transcript::*;
