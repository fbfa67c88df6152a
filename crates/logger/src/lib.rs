mod subscriber;

pub use subscriber::{LogFormat, init, init_with};
