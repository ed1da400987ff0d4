mod handler;
pub mod model;

pub use handler::{create_post, find_posts_by_stop};
