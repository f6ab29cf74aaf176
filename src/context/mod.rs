//! Product context retrieval
//!
//! Turns a product page URL into the opaque context string that grounds
//! every chat request of a session.

mod loader;
mod validate;

pub use loader::{ContextSource, ProductContext, ProductContextLoader};
pub use validate::{is_blocked_ip, validate_product_url};
