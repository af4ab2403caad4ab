pub mod single_flight;
pub mod window;
pub mod window_read;
