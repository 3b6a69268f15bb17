pub mod booking;
pub mod content;
pub mod image;
pub mod review;
pub mod room;
pub mod user;
