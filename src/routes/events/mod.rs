mod handler;

pub use handler::subscribe_events;
