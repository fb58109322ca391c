pub mod image;
pub mod session;
pub mod user;
