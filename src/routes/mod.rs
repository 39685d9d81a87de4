pub mod common;
pub mod content;

pub use common::{common_routes, common_routes_with_ready};
pub use content::content_routes;
